use colored::{ColoredString, Colorize};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Marks frame trace lines in a program's output so they can be picked out from everything else
pub const TRACE_PREFIX: &str = "!F! ";

#[derive(Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq)]
pub enum FrameOp {
    Begin { roots: usize },
    Extend { roots: usize },
    Local { roots: usize },
    Drop,
    Return { value: u64 },
}

#[derive(Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum FrameOpKind {
    Begin,
    Extend,
    Local,
    Drop,
    Return,
}

impl FrameOp {
    pub fn kind(&self) -> FrameOpKind {
        match self {
            FrameOp::Begin { .. } => FrameOpKind::Begin,
            FrameOp::Extend { .. } => FrameOpKind::Extend,
            FrameOp::Local { .. } => FrameOpKind::Local,
            FrameOp::Drop => FrameOpKind::Drop,
            FrameOp::Return { .. } => FrameOpKind::Return,
        }
    }

    pub fn roots(&self) -> usize {
        match self {
            FrameOp::Begin { roots } | FrameOp::Extend { roots } | FrameOp::Local { roots } => {
                *roots
            }
            FrameOp::Drop | FrameOp::Return { .. } => 0,
        }
    }

    pub fn ends_frame(&self) -> bool {
        matches!(self, FrameOp::Drop | FrameOp::Return { .. })
    }
}

impl fmt::Display for FrameOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameOp::Begin { roots } => write!(f, "begin {}", roots),
            FrameOp::Extend { roots } => write!(f, "extend {}", roots),
            FrameOp::Local { roots } => write!(f, "local {}", roots),
            FrameOp::Drop => write!(f, "drop"),
            FrameOp::Return { value } => write!(f, "return {:#018X}", value),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq)]
pub struct FrameEvent {
    pub thread: u64,
    pub serial: u64,
    // 1 for the outermost active frame
    pub depth: usize,
    pub op: FrameOp,
}

impl FrameEvent {
    fn indent(&self) -> String {
        "  ".repeat(self.depth.saturating_sub(1))
    }

    pub fn print(&self) {
        println!("{}", self);
    }

    pub fn print_colored(&self) {
        let op = format!("{}", self.op);
        let op: ColoredString = match self.op.kind() {
            FrameOpKind::Begin => op.green().bold(),
            FrameOpKind::Extend | FrameOpKind::Local => op.cyan(),
            FrameOpKind::Drop => op.yellow(),
            FrameOpKind::Return => op.blue().bold(),
        };

        println!(
            "{} {}{} {}",
            format!("[t{}]", self.thread).dimmed(),
            self.indent(),
            op,
            format!("#{}", self.serial).bright_black()
        );
    }

    pub fn to_trace_line(&self) -> String {
        // Serialising a plain struct of integers can't fail
        let json = serde_json::to_string(self).unwrap_or_default();
        format!("{}{}", TRACE_PREFIX, json)
    }

    /// `None` if the line isn't a frame trace line at all
    pub fn from_trace_line(line: &str) -> Option<serde_json::Result<FrameEvent>> {
        line.strip_prefix(TRACE_PREFIX)
            .map(|json| serde_json::from_str(json.trim_end()))
    }
}

impl fmt::Display for FrameEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[t{}] {}{} #{}",
            self.thread,
            self.indent(),
            self.op,
            self.serial
        )
    }
}
