//! IO engine abstraction
//!
//! An engine is the pipeline's view of the kernel's asynchronous IO facility:
//! it accepts a batch of prepared operations in one call and blocks until at
//! least one of them has finished. The pipeline never talks to the kernel
//! directly, which keeps the scheduler testable against the mock engine.
//!
//! # Engine Types
//!
//! - **libaio**: Linux native AIO through raw `io_setup`/`io_submit`/`io_getevents`
//!   syscalls (default)
//! - **io_uring**: Linux 5.1+ ring interface (cargo feature `io_uring`)
//! - **sync**: blocking `pread`/`pwrite` performed at submission time; a fallback
//!   for kernels or filesystems without AIO support
//! - **mock**: no syscalls; fault injection for tests
//!
//! # Example
//!
//! ```no_run
//! use aiopipe::engine::{IOEngine, EngineConfig, IOOperation, OperationType};
//! use aiopipe::engine::libaio::LibaioEngine;
//!
//! let mut engine = LibaioEngine::new();
//! engine.init(&EngineConfig { queue_depth: 32 })?;
//!
//! let mut buffer = vec![0u8; 4096];
//! let op = IOOperation {
//!     op_type: OperationType::Read,
//!     target_fd: 3,
//!     offset: 0,
//!     buffer: buffer.as_mut_ptr(),
//!     length: 4096,
//!     user_data: 0,
//! };
//! let accepted = engine.submit(&[op])?;
//! assert_eq!(accepted, 1);
//!
//! let mut completions = Vec::new();
//! engine.poll_completions(1, &mut completions)?;
//! engine.cleanup()?;
//! # Ok::<(), anyhow::Error>(())
//! ```

use crate::Result;
use serde::{Deserialize, Serialize};
use std::os::unix::io::RawFd;

/// IO engine trait for all backends
///
/// # Lifecycle
///
/// 1. Create engine instance (via `new()` on concrete type)
/// 2. Call `init()` with configuration
/// 3. Alternate `submit()` and `poll_completions()`
/// 4. Call `cleanup()` when done
///
/// # Thread Safety
///
/// Engines must be `Send` so a pipeline can be built on one thread and run on
/// another. They are never shared between threads.
pub trait IOEngine: Send {
    /// Initialize the engine
    ///
    /// Sets up kernel structures sized for `config.queue_depth` outstanding
    /// operations.
    ///
    /// # Errors
    ///
    /// Returns an error if the facility cannot be created (unsupported kernel,
    /// `aio-max-nr` exhausted, invalid depth).
    fn init(&mut self, config: &EngineConfig) -> Result<()>;

    /// Submit a batch of operations in one call
    ///
    /// Returns how many operations, counted from the front of `ops`, the kernel
    /// accepted. Operations beyond that count were not queued and will never
    /// complete. The pipeline treats anything short of `ops.len()` as fatal.
    ///
    /// # Errors
    ///
    /// Returns an error if the kernel rejects the batch outright.
    ///
    /// # Safety
    ///
    /// Each buffer pointer must stay valid, and must not be touched by the
    /// caller, until the corresponding completion is returned.
    fn submit(&mut self, ops: &[IOOperation]) -> Result<usize>;

    /// Wait for completions
    ///
    /// Blocks until at least `min_complete` operations have finished (returns
    /// immediately when nothing is outstanding), then appends up to
    /// `queue_depth` completion records to `completions` and returns how many
    /// were appended. Records come back in whatever order the kernel reports them.
    ///
    /// # Errors
    ///
    /// Returns an error if the wait call itself fails.
    fn poll_completions(&mut self, min_complete: usize, completions: &mut Vec<IOCompletion>) -> Result<usize>;

    /// Release engine resources
    ///
    /// Waits for anything still outstanding before tearing the facility down,
    /// so no buffer is referenced by the kernel once this returns.
    fn cleanup(&mut self) -> Result<()>;

    /// Describe what this engine supports
    fn capabilities(&self) -> EngineCapabilities;
}

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum number of outstanding IO operations
    ///
    /// Sizes the kernel context (io_setup nr_events, ring entries) and the
    /// number of completion records retrieved per wait.
    pub queue_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { queue_depth: 32 }
    }
}

/// One prepared read or write
///
/// # Safety
///
/// The buffer pointer must be valid and properly aligned for the duration of the
/// operation. For O_DIRECT the buffer, length and offset must all satisfy the
/// device's alignment.
#[derive(Debug)]
pub struct IOOperation {
    pub op_type: OperationType,

    /// File descriptor of the target file or device
    pub target_fd: RawFd,

    /// Byte offset within the target
    pub offset: u64,

    /// Reads fill this buffer; writes drain it
    pub buffer: *mut u8,

    /// Number of bytes to transfer
    pub length: usize,

    /// Returned untouched in the matching `IOCompletion`
    ///
    /// The pipeline stores the descriptor slot index here.
    pub user_data: u64,
}

// Safety: IOOperation contains a raw pointer but is only used within a single thread
// and the pointer lifetime is managed by the caller
unsafe impl Send for IOOperation {}

/// Operation direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Read,
    Write,
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationType::Read => write!(f, "read"),
            OperationType::Write => write!(f, "write"),
        }
    }
}

/// Kernel-reported outcome of one finished operation
///
/// Mirrors the fields of a Linux `io_event`: engines do not interpret the
/// codes, the pipeline's continuation logic does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IOCompletion {
    /// `user_data` of the originating `IOOperation`
    pub user_data: u64,

    /// Bytes transferred, or `-errno` on failure
    pub result: i64,

    /// Secondary status (`io_event.res2`); nonzero means the operation failed
    pub result2: i64,

    pub op_type: OperationType,
}

/// Engine capabilities
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineCapabilities {
    /// Multiple operations can be in flight at once
    pub async_io: bool,

    /// Several operations are handed to the kernel in one syscall
    pub batch_submission: bool,

    /// Maximum number of outstanding operations
    pub max_queue_depth: usize,
}

impl Default for EngineCapabilities {
    fn default() -> Self {
        Self {
            async_io: false,
            batch_submission: false,
            max_queue_depth: 1,
        }
    }
}

/// Engine selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineType {
    /// Linux native AIO
    #[default]
    Libaio,
    /// io_uring (requires the `io_uring` feature)
    IoUring,
    /// Blocking pread/pwrite
    Sync,
}

impl std::fmt::Display for EngineType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineType::Libaio => write!(f, "libaio"),
            EngineType::IoUring => write!(f, "io_uring"),
            EngineType::Sync => write!(f, "sync"),
        }
    }
}

/// Build an uninitialized engine of the requested type
pub fn create_engine(engine_type: EngineType) -> Result<Box<dyn IOEngine>> {
    use crate::engine::sync::SyncEngine;

    #[cfg(feature = "io_uring")]
    use crate::engine::io_uring::IoUringEngine;

    #[cfg(target_os = "linux")]
    use crate::engine::libaio::LibaioEngine;

    let engine: Box<dyn IOEngine> = match engine_type {
        EngineType::Sync => Box::new(SyncEngine::new()),

        #[cfg(feature = "io_uring")]
        EngineType::IoUring => Box::new(IoUringEngine::new()),

        #[cfg(not(feature = "io_uring"))]
        EngineType::IoUring => {
            anyhow::bail!("io_uring engine not available (feature not enabled)")
        }

        #[cfg(target_os = "linux")]
        EngineType::Libaio => Box::new(LibaioEngine::new()),

        #[cfg(not(target_os = "linux"))]
        EngineType::Libaio => {
            anyhow::bail!("libaio engine only available on Linux")
        }
    };

    Ok(engine)
}

pub mod mock;
pub mod sync;

#[cfg(feature = "io_uring")]
pub mod io_uring;

#[cfg(target_os = "linux")]
pub mod libaio;
