/*
 *
 * Options are set by setting the ROOTFRAME_OPTIONS environment variable to an argument string
 * which is parsed, so nothing has to change in the OCaml program or its C stubs */

use std::{
    env,
    path::{Path, PathBuf},
};

use clap::arg_enum;
use default_env::default_env;
use structopt::StructOpt;

const PROGRAM_NAME: &str = "ocaml-rootframe";
const ENV_VAR_KEY: &str = "ROOTFRAME_OPTIONS";

const DEFAULT_ROOTFRAME_OPTIONS: &str = default_env!("DEFAULT_ROOTFRAME_OPTIONS", "");

arg_enum! {
    #[derive(Debug, Copy, Clone, Eq, PartialEq)]
    pub enum TraceType {
        Colorful,
        Plain,
        JSON,
        Debug,
        DebugPretty,
        NoPrint,
    }
}

#[derive(Debug, StructOpt)]
#[structopt(name = PROGRAM_NAME, about = "Root frames for C stubs of OCaml programs")]
pub struct Options {
    /// Print every operation on a checked frame
    #[structopt(short, long)]
    pub trace: bool,

    /// The trace format to use if tracing is enabled
    #[structopt(long, default_value = "Colorful", possible_values = &TraceType::variants(), case_insensitive = true)]
    pub trace_format: TraceType,

    /// The base directory to store artifacts from the execution
    #[structopt(short, long, parse(from_os_str))]
    pub output_dir: Option<PathBuf>,

    /// Count checked frame operations by kind and save them at shutdown
    #[structopt(long, requires = "output-dir")]
    pub save_op_counts: bool,
}

impl Options {
    pub fn get_from_env() -> Options {
        let args =
            env::var(ENV_VAR_KEY).unwrap_or_else(|_| String::from(DEFAULT_ROOTFRAME_OPTIONS));
        Options::from_iter(split_args(&args))
    }

    /// Whether checked frames need to report their events at all
    pub fn records_events(&self) -> bool {
        self.trace || self.save_op_counts
    }

    pub fn output_path<P: AsRef<Path>>(&self, name: P) -> Option<PathBuf> {
        self.output_dir.as_ref().map(|base| base.join(name))
    }
}

fn split_args(args: &str) -> Vec<String> {
    let mut arg_sections = shell_words::split(args).unwrap_or_else(|e| {
        eprintln!("Could not parse {} options!", ENV_VAR_KEY);
        eprintln!("Error: {:?}", e);
        Vec::new()
    });
    arg_sections.insert(0, String::from(PROGRAM_NAME));
    arg_sections
}

#[cfg(test)]
mod test {
    use super::*;

    fn parse(args: &str) -> Result<Options, clap::Error> {
        Options::from_iter_safe(split_args(args))
    }

    #[test]
    fn test_defaults() {
        let options = parse("").unwrap();
        assert!(!options.trace);
        assert_eq!(options.trace_format, TraceType::Colorful);
        assert_eq!(options.output_dir, None);
        assert!(!options.records_events());
        assert_eq!(options.output_path("op_counts.json"), None);
    }

    #[test]
    fn test_trace_options() {
        let options = parse("-t --trace-format json").unwrap();
        assert!(options.trace);
        assert_eq!(options.trace_format, TraceType::JSON);
        assert!(options.records_events());
    }

    #[test]
    fn test_quoted_output_dir() {
        let options = parse("--save-op-counts -o '/tmp/some dir'").unwrap();
        assert!(options.save_op_counts);
        assert!(options.records_events());
        assert_eq!(
            options.output_path("op_counts.json"),
            Some(PathBuf::from("/tmp/some dir/op_counts.json"))
        );
    }

    #[test]
    fn test_op_counts_need_an_output_dir() {
        assert!(parse("--save-op-counts").is_err());
    }

    #[test]
    fn test_unbalanced_quotes_fall_back_to_defaults() {
        let options = parse("-t 'oops").unwrap();
        assert!(!options.trace);
    }
}
