//! Low-level helpers shared by the pipeline and its reports

pub mod buffer;
pub mod fast_time;
pub mod time;
