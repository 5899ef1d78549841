//! Result reporting
//!
//! - Text: console summary
//! - JSON: machine-readable report file

pub mod json;
pub mod text;
