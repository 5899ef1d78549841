//! Configuration module
//!
//! Handles CLI argument parsing, TOML configuration files, and validation.
//! Every source ends up as one `PipelineConfig`.

pub mod cli;
pub mod cli_convert;
pub mod toml;
pub mod validator;

use crate::engine::EngineType;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Default block size (64 KiB)
pub const DEFAULT_BLOCK_SIZE: usize = 64 * 1024;

/// Default number of operations in flight
pub const DEFAULT_CONCURRENCY: usize = 32;

/// Default buffer alignment
pub const DEFAULT_ALIGNMENT: usize = 512;

/// Complete run configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// File read from (copy and read-only modes)
    pub source: Option<PathBuf>,

    /// File written to (copy and zero-fill modes)
    pub destination: Option<PathBuf>,

    pub mode: TransferMode,

    /// Bytes moved per operation
    pub block_size: usize,

    /// Maximum operations in flight
    pub concurrency: usize,

    /// Buffer alignment in bytes (power of two)
    pub alignment: usize,

    /// Bytes to transfer; derived from the file length when unset
    pub size: Option<u64>,

    /// Random block offsets instead of a sequential sweep
    pub random: bool,

    /// Keep issuing IO until stopped (read-only and zero-fill only)
    pub continuous: bool,

    /// Stop after this many seconds
    pub duration_secs: Option<u64>,

    /// Sleep between submission batches, in microseconds
    pub delay_us: u64,

    pub engine: EngineType,

    /// Seed for random offsets (entropy when unset)
    pub seed: Option<u64>,

    pub open_flags: OpenFlags,

    /// Diagnostic verbosity (0 = quiet)
    pub debug: u8,

    /// Write a JSON report here
    pub json_output: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source: None,
            destination: None,
            mode: TransferMode::Copy,
            block_size: DEFAULT_BLOCK_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
            alignment: DEFAULT_ALIGNMENT,
            size: None,
            random: false,
            continuous: false,
            duration_secs: None,
            delay_us: 0,
            engine: EngineType::default(),
            seed: None,
            open_flags: OpenFlags::default(),
            debug: 0,
            json_output: None,
        }
    }
}

impl PipelineConfig {
    pub fn offset_mode(&self) -> OffsetMode {
        if self.random {
            OffsetMode::Random
        } else {
            OffsetMode::Sequential
        }
    }
}

/// What each unit of work does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferMode {
    /// Read a block from the source, then write it to the destination
    #[default]
    Copy,
    /// Read from the source and discard
    ReadOnly,
    /// Write zeroed buffers to the destination
    ZeroFill,
}

impl TransferMode {
    pub fn needs_source(&self) -> bool {
        matches!(self, TransferMode::Copy | TransferMode::ReadOnly)
    }

    pub fn needs_destination(&self) -> bool {
        matches!(self, TransferMode::Copy | TransferMode::ZeroFill)
    }
}

impl fmt::Display for TransferMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferMode::Copy => write!(f, "copy"),
            TransferMode::ReadOnly => write!(f, "read-only"),
            TransferMode::ZeroFill => write!(f, "zero-fill"),
        }
    }
}

/// How offsets are chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OffsetMode {
    #[default]
    Sequential,
    Random,
}

impl fmt::Display for OffsetMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OffsetMode::Sequential => write!(f, "sequential"),
            OffsetMode::Random => write!(f, "random"),
        }
    }
}

/// Extra flags for opening the source and destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenFlags {
    /// O_DIRECT on both files
    pub direct: bool,
    /// O_SYNC on the destination
    pub sync: bool,
    /// O_TRUNC on the destination
    pub trunc: bool,
    /// O_CREAT on the destination
    pub creat: bool,
    /// O_LARGEFILE on both files
    pub largefile: bool,
}
