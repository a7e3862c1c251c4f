pub mod check_trace;
pub mod header;
pub mod stress;
