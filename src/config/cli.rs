//! CLI argument parsing using clap

use clap::{ArgAction, Parser, ValueEnum};
use std::path::PathBuf;

/// aiopipe - bounded-concurrency asynchronous block copier
///
/// Copies SOURCE to DEST in fixed-size blocks with many operations in
/// flight. With -w only SOURCE is read; with -z DEST (the only path given)
/// is overwritten with zeros.
#[derive(Parser, Debug, Default)]
#[command(name = "aiopipe")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// SOURCE and DEST paths (a single DEST in zero-fill mode)
    #[arg(value_name = "PATH", num_args = 0..=2)]
    pub paths: Vec<PathBuf>,

    // === Transfer Options ===
    /// Transfer mode
    #[arg(short = 'm', long, value_enum)]
    pub mode: Option<Mode>,

    /// Read the source only, discarding the data (same as --mode read-only)
    #[arg(short = 'w', long, conflicts_with_all = ["zero_fill", "mode"])]
    pub read_only: bool,

    /// Write zeros to the destination (same as --mode zero-fill)
    #[arg(short = 'z', long, conflicts_with = "mode")]
    pub zero_fill: bool,

    /// Block size per operation (e.g., 4k, 64k, 1m)
    #[arg(short = 'b', long)]
    pub block_size: Option<String>,

    /// Maximum operations in flight
    #[arg(short = 'n', long = "num-io")]
    pub num_io: Option<usize>,

    /// Buffer alignment (e.g., 512, 4k)
    #[arg(short = 'a', long)]
    pub alignment: Option<String>,

    /// Bytes to transfer (e.g., 100m, 1g); defaults to the file length
    #[arg(short = 's', long)]
    pub size: Option<String>,

    /// Extra open flag, may be repeated
    #[arg(short = 'f', long = "open-flag", value_enum, action = ArgAction::Append, ignore_case = true)]
    pub open_flags: Vec<OpenFlag>,

    // === Workload Options ===
    /// Use random block offsets instead of a sequential sweep
    #[arg(long)]
    pub random: bool,

    /// Keep issuing IO until stopped (read-only and zero-fill only)
    #[arg(long)]
    pub continuous: bool,

    /// Stop after this long (e.g., 30s, 5m)
    #[arg(long)]
    pub duration: Option<String>,

    /// Sleep between submission batches (e.g., 100us, 1ms)
    #[arg(short = 'D', long)]
    pub delay: Option<String>,

    /// Seed for random offsets
    #[arg(long)]
    pub seed: Option<u64>,

    // === IO Engine Options ===
    /// IO engine to use
    #[arg(long, value_enum)]
    pub engine: Option<EngineKind>,

    // === Output Options ===
    /// JSON report output file
    #[arg(long)]
    pub json_output: Option<PathBuf>,

    // === Configuration File ===
    /// TOML configuration file
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Dry run - validate configuration without executing
    #[arg(long)]
    pub dry_run: bool,

    /// Debug output, repeat for more detail
    #[arg(short = 'd', long, action = ArgAction::Count)]
    pub debug: u8,
}

/// Transfer mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Read each block from SOURCE and write it to DEST
    Copy,
    /// Read SOURCE only
    ReadOnly,
    /// Write zeros to DEST
    ZeroFill,
}

/// Open flag accepted by -f
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OpenFlag {
    /// O_DIRECT on both files
    Direct,
    /// O_SYNC on the destination
    Sync,
    /// O_TRUNC on the destination
    Trunc,
    /// O_CREAT on the destination
    Creat,
    /// O_LARGEFILE on both files
    Largefile,
}

/// IO engine type
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EngineKind {
    /// Linux native AIO
    Libaio,
    /// io_uring (Linux 5.1+)
    #[value(name = "io_uring")]
    IoUring,
    /// Synchronous IO (pread/pwrite)
    Sync,
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
