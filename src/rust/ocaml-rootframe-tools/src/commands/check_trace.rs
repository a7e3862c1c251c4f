use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use colored::Colorize;
use ocaml_rootframe_shared::{DisciplineError, FrameDiscipline, FrameEvent, FrameOp};
use prettytable::{format::consts::FORMAT_NO_LINESEP_WITH_TITLE, Table};
use structopt::StructOpt;

#[derive(StructOpt)]
#[structopt(about = "replay the frame trace in a program's output and check the frames nest")]
pub struct Options {
    /// Output of a run with ROOTFRAME_OPTIONS="-t --trace-format JSON"
    #[structopt(parse(from_os_str))]
    trace_file: PathBuf,

    /// Print every event as it's replayed
    #[structopt(short, long)]
    verbose: bool,
}

pub fn run(options: Options) -> Result<()> {
    let f = File::open(&options.trace_file)
        .with_context(|| format!("Could not open {}", options.trace_file.display()))?;
    let report = check(BufReader::new(f), options.verbose)?;

    print_summary(&report);

    if let Some(violation) = &report.violation {
        println!(
            "{}",
            format!(
                "Line {}: {} on thread {}: {}",
                violation.line, violation.event.op, violation.event.thread, violation.error
            )
            .red()
            .bold()
        );
        process::exit(1);
    }

    let open = report.open_frames();
    if open > 0 {
        println!(
            "{}",
            format!("{} frames were still active at the end of the trace", open).yellow()
        );
    } else {
        println!("{}", "All frames ended in order".green().bold());
    }

    Ok(())
}

struct ThreadReplay {
    discipline: FrameDiscipline,
    events: usize,
    frames: usize,
    max_depth: usize,
    max_live_roots: usize,
}

impl ThreadReplay {
    fn new(thread: u64) -> ThreadReplay {
        ThreadReplay {
            discipline: FrameDiscipline::new(thread),
            events: 0,
            frames: 0,
            max_depth: 0,
            max_live_roots: 0,
        }
    }

    fn apply(&mut self, event: &FrameEvent) -> Result<(), DisciplineError> {
        self.discipline.apply(event)?;

        self.events += 1;
        if let FrameOp::Begin { .. } = event.op {
            self.frames += 1;
        }
        self.max_depth = self.max_depth.max(self.discipline.depth());
        self.max_live_roots = self.max_live_roots.max(self.discipline.live_roots());
        Ok(())
    }
}

struct Violation {
    line: usize,
    event: FrameEvent,
    error: DisciplineError,
}

struct Report {
    threads: BTreeMap<u64, ThreadReplay>,
    violation: Option<Violation>,
}

impl Report {
    fn open_frames(&self) -> usize {
        self.threads.values().map(|t| t.discipline.depth()).sum()
    }
}

fn check<R: BufRead>(input: R, verbose: bool) -> Result<Report> {
    let mut report = Report {
        threads: BTreeMap::new(),
        violation: None,
    };

    for (index, line) in input.lines().enumerate() {
        let line = line.context("Problem reading trace")?;
        let line_number = index + 1;

        let event = match FrameEvent::from_trace_line(&line) {
            Some(parsed) => parsed
                .with_context(|| format!("Malformed trace entry on line {}", line_number))?,
            None => continue,
        };

        let replay = report
            .threads
            .entry(event.thread)
            .or_insert_with(|| ThreadReplay::new(event.thread));

        if let Err(error) = replay.apply(&event) {
            report.violation = Some(Violation {
                line: line_number,
                event,
                error,
            });
            break;
        }

        if verbose {
            event.print_colored();
        }
    }

    Ok(report)
}

fn print_summary(report: &Report) {
    let mut table = Table::new();
    table.set_format(*FORMAT_NO_LINESEP_WITH_TITLE);
    table.set_titles(row![b => "Thread", "Events", "Frames", "Max depth", "Max roots", "Open"]);

    for (thread, replay) in &report.threads {
        table.add_row(row![r ->
            thread,
            replay.events,
            replay.frames,
            replay.max_depth,
            replay.max_live_roots,
            replay.discipline.depth()
        ]);
    }

    table.printstd();
}

#[cfg(test)]
mod test {
    use super::*;
    use ocaml_rootframe::checked;
    use ocaml_rootframe::sim::SimHost;
    use ocaml_rootframe::Value;
    use std::io::Cursor;

    fn event(thread: u64, serial: u64, depth: usize, op: FrameOp) -> String {
        FrameEvent {
            thread,
            serial,
            depth,
            op,
        }
        .to_trace_line()
    }

    #[test]
    fn test_trace_from_checked_frames() {
        let mut a = Value::int(1);
        let mut b = Value::int(2);
        let mut lines = vec![String::from("program output")];

        unsafe {
            let (outer, e) = checked::begin_frame::<SimHost>(&[&mut a as *mut Value]).unwrap();
            lines.push(e.to_trace_line());
            let e = checked::local_frame::<SimHost>(outer, &[&mut b as *mut Value]).unwrap();
            lines.push(e.to_trace_line());
            let (inner, e) = checked::begin_frame::<SimHost>(&[]).unwrap();
            lines.push(e.to_trace_line());
            lines.push(String::from("more output"));
            lines.push(checked::drop_frame::<SimHost>(inner).unwrap().to_trace_line());
            let (_, e) = checked::return_frame::<SimHost>(outer, a).unwrap();
            lines.push(e.to_trace_line());
        }

        let report = check(Cursor::new(lines.join("\n")), false).unwrap();
        assert!(report.violation.is_none());
        assert_eq!(report.open_frames(), 0);

        let replay = report.threads.values().next().unwrap();
        assert_eq!(replay.events, 5);
        assert_eq!(replay.frames, 2);
        assert_eq!(replay.max_depth, 2);
        assert_eq!(replay.max_live_roots, 2);
    }

    #[test]
    fn test_reports_first_violation() {
        let trace = [
            event(0, 0, 1, FrameOp::Begin { roots: 1 }),
            event(0, 1, 2, FrameOp::Begin { roots: 0 }),
            event(0, 0, 2, FrameOp::Drop),
            event(0, 7, 2, FrameOp::Drop),
        ]
        .join("\n");

        let report = check(Cursor::new(trace), false).unwrap();
        let violation = report.violation.unwrap();
        assert_eq!(violation.line, 3);
        assert_eq!(
            violation.error,
            DisciplineError::OutOfOrder {
                ended: 0,
                innermost: 1
            }
        );
    }

    #[test]
    fn test_threads_are_independent() {
        let trace = [
            event(0, 0, 1, FrameOp::Begin { roots: 2 }),
            event(1, 0, 1, FrameOp::Begin { roots: 3 }),
            event(0, 0, 1, FrameOp::Drop),
        ]
        .join("\n");

        let report = check(Cursor::new(trace), false).unwrap();
        assert!(report.violation.is_none());
        assert_eq!(report.threads.len(), 2);
        assert_eq!(report.open_frames(), 1);
        assert_eq!(report.threads[&1].max_live_roots, 3);
    }

    #[test]
    fn test_malformed_line_is_an_error() {
        let trace = "!F! {\"thread\": 0}";
        assert!(check(Cursor::new(trace), false).is_err());
    }
}
