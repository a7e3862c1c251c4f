use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use ocaml_rootframe_shared::{render_header, Family};
use structopt::StructOpt;

#[derive(StructOpt)]
#[structopt(about = "write the C header declaring every root frame function")]
pub struct Options {
    /// Write to this file instead of stdout
    #[structopt(short, long, parse(from_os_str))]
    output: Option<PathBuf>,

    /// Leave out the checked family
    #[structopt(long)]
    unchecked_only: bool,
}

pub fn run(options: Options) -> Result<()> {
    let header = render_header(families(options.unchecked_only));

    match &options.output {
        Some(path) => fs::write(path, header)
            .with_context(|| format!("Could not write header to {}", path.display()))?,
        None => print!("{}", header),
    }

    Ok(())
}

fn families(unchecked_only: bool) -> &'static [Family] {
    if unchecked_only {
        &[Family::Unchecked]
    } else {
        &[Family::Unchecked, Family::Checked]
    }
}
