#[macro_use]
extern crate prettytable;

use anyhow::{Context, Result};
use structopt::StructOpt;

use commands::{check_trace, header, stress};

mod commands;

#[derive(StructOpt)]
#[structopt(
    name = "ocaml-rootframe-tools",
    about = "additional tools for working with OCaml root frames"
)]
enum BaseCli {
    Header(header::Options),
    CheckTrace(check_trace::Options),
    Stress(stress::Options),
}

fn main() -> Result<()> {
    setup_pipes()?;

    let subcommand = BaseCli::from_args();
    match subcommand {
        BaseCli::Header(opts) => header::run(opts),
        BaseCli::CheckTrace(opts) => check_trace::run(opts),
        BaseCli::Stress(opts) => stress::run(opts),
    }
}

// stop broken pipe errors for these tools
fn setup_pipes() -> Result<()> {
    #[cfg(target_family = "unix")]
    {
        use nix::sys::signal;

        unsafe {
            signal::signal(signal::SIGPIPE, signal::SigHandler::SigDfl)
                .context("Failed to set up broken pipe handler")?;
        }
    }

    Ok(())
}
