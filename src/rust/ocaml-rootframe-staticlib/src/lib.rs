// Most of the unsafe functions here have the same contract as the OCaml macros they replace, the
// safety doc would just be "use it like CAMLparam"
#![allow(clippy::missing_safety_doc)]

use std::{cmp::Reverse, collections::HashMap, fs, io, io::Write};

use ocaml_rootframe_shared::FrameOpKind;

use configuration::Options;
use global_data::GlobalData;

pub mod block_pool;
mod c_entrypoints;
pub mod caml;
pub mod checked;
mod configuration;
pub mod frame;
mod global_data;
pub mod sim;
mod trace;


pub use caml::mlvalues::Value;
pub use checked::CheckedFrame;
pub use frame::{with_frame, with_frame_on, CamlFrame, Root, RootFrame};

/* These are the hook points from the C side */

pub fn on_startup() -> GlobalData {
    let global_data = GlobalData::new();

    if let Some(output_dir) = global_data.options.output_dir.as_ref() {
        if let Err(e) = fs::create_dir_all(output_dir) {
            eprintln!(
                "Could not create output directory {}: {}",
                output_dir.display(),
                e
            );
        }
    }

    global_data
}

pub fn on_shutdown() {
    let global_data = GlobalData::get();

    if let Some(op_counts) = global_data.op_counts.as_ref() {
        if let Err(e) = save_op_counts(&global_data.options, op_counts) {
            eprintln!("Could not save frame operation counts: {}", e);
        }
    }
}

fn save_op_counts(options: &Options, op_counts: &HashMap<FrameOpKind, usize>) -> io::Result<()> {
    let (json_path, summary_path) = match (
        options.output_path("op_counts.json"),
        options.output_path("op_counts"),
    ) {
        (Some(json_path), Some(summary_path)) => (json_path, summary_path),
        _ => return Ok(()),
    };

    let json = serde_json::to_string_pretty(op_counts)?;
    fs::write(json_path, json)?;

    let total_ops = op_counts.values().sum::<usize>() as f32;
    let mut counts: Vec<_> = op_counts.iter().collect();
    counts.sort_by_key(|(kind, count)| (Reverse(**count), **kind));

    let mut f = fs::File::create(summary_path)?;
    for (kind, count) in counts {
        writeln!(
            f,
            "{:?}: {:.2}% ({})",
            kind,
            (*count as f32) / total_ops * 100.0,
            count
        )?;
    }

    Ok(())
}
