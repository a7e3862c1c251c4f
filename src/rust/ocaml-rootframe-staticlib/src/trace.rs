use ocaml_rootframe_shared::FrameEvent;

use crate::configuration::TraceType;
use crate::global_data::GlobalData;

pub fn trace_frame_event(global_data: &mut GlobalData, event: &FrameEvent) {
    if let Some(op_counts) = global_data.op_counts.as_mut() {
        let count = op_counts.entry(event.op.kind()).or_insert(0);
        *count += 1;
    }

    if !global_data.options.trace {
        return;
    }

    match global_data.options.trace_format {
        TraceType::Colorful => event.print_colored(),
        TraceType::Plain => event.print(),
        TraceType::JSON => println!("{}", event.to_trace_line()),
        TraceType::Debug => println!("{:?}", event),
        TraceType::DebugPretty => println!("{:#?}", event),
        TraceType::NoPrint => {}
    }
}
