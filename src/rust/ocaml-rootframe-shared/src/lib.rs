pub use abi::*;
pub use discipline::*;
pub use frame_trace::*;

pub mod abi;
mod discipline;
mod frame_trace;

pub use serde_json;
