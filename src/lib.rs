//! aiopipe - bounded-concurrency asynchronous block copier
//!
//! aiopipe moves data between files and block devices in fixed-size blocks,
//! keeping up to N operations in flight through the kernel's asynchronous IO
//! interface. Each unit of work is a descriptor that walks through a short
//! state machine (read, then write, then done) and is recycled from a
//! preallocated pool.
//!
//! # Architecture
//!
//! - **Pipeline**: submission stage, completion stage, continuation logic
//! - **Descriptor pool**: preallocated aligned buffers with an index free-list
//! - **IO engines**: libaio, io_uring, sync, mock
//! - **Modes**: copy, read-only, zero-fill; sequential or random offsets
//! - **Stats**: per-direction counters and latency histograms

pub mod config;
pub mod distribution;
pub mod engine;
pub mod output;
pub mod pipeline;
pub mod stats;
pub mod target;
pub mod util;

// Re-export commonly used types
pub use config::PipelineConfig;
pub use engine::IOEngine;
pub use pipeline::{Pipeline, PipelineError};

/// Result type used throughout aiopipe
pub type Result<T> = anyhow::Result<T>;
