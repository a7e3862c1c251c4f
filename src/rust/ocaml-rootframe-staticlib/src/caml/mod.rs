pub mod domain_state;
pub mod misc;
pub mod mlvalues;
pub mod roots;
