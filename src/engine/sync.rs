//! Synchronous IO engine
//!
//! Blocking `pread`/`pwrite` performed inside `submit()`. The results are
//! queued and handed back by the next `poll_completions()`, so the pipeline
//! drives it exactly like an asynchronous engine. Useful where kernel AIO is
//! missing or filtered, and for deterministic tests on tmpfs.
//!
//! # Example
//!
//! ```no_run
//! use aiopipe::engine::{IOEngine, EngineConfig, IOOperation, OperationType};
//! use aiopipe::engine::sync::SyncEngine;
//!
//! let mut engine = SyncEngine::new();
//! engine.init(&EngineConfig::default()).unwrap();
//!
//! let mut buffer = vec![0u8; 4096];
//! let op = IOOperation {
//!     op_type: OperationType::Read,
//!     target_fd: 3,
//!     offset: 0,
//!     buffer: buffer.as_mut_ptr(),
//!     length: 4096,
//!     user_data: 1,
//! };
//! engine.submit(&[op]).unwrap();
//!
//! let mut completions = Vec::new();
//! assert_eq!(engine.poll_completions(1, &mut completions).unwrap(), 1);
//! ```

use super::{EngineCapabilities, EngineConfig, IOCompletion, IOEngine, IOOperation, OperationType};
use crate::Result;
use std::collections::VecDeque;

/// Synchronous IO engine using pread/pwrite
///
/// Each operation is one pread or pwrite and its return value is reported
/// as is, so a partial transfer surfaces as a short count. Only EINTR is
/// retried.
pub struct SyncEngine {
    queue_depth: usize,

    /// Finished operations not yet returned by `poll_completions`
    ready: VecDeque<IOCompletion>,
}

impl SyncEngine {
    pub fn new() -> Self {
        Self {
            queue_depth: 1,
            ready: VecDeque::new(),
        }
    }

    /// Read into `buffer` with a single pread; returns bytes read or `-errno`
    #[inline(always)]
    fn do_read(&self, fd: i32, buffer: *mut u8, length: usize, offset: u64) -> i64 {
        loop {
            // SAFETY: the caller guarantees buffer is valid for length bytes
            let result = unsafe { libc::pread(fd, buffer as *mut libc::c_void, length, offset as i64) };
            match Self::interpret(result) {
                Some(code) => return code,
                None => continue,
            }
        }
    }

    /// Write from `buffer` with a single pwrite; returns bytes written or `-errno`
    #[inline(always)]
    fn do_write(&self, fd: i32, buffer: *const u8, length: usize, offset: u64) -> i64 {
        loop {
            // SAFETY: the caller guarantees buffer is valid for length bytes
            let result = unsafe { libc::pwrite(fd, buffer as *const libc::c_void, length, offset as i64) };
            match Self::interpret(result) {
                Some(code) => return code,
                None => continue,
            }
        }
    }

    /// Byte count or `-errno` for a syscall result; None when interrupted
    /// before any data moved
    fn interpret(result: isize) -> Option<i64> {
        if result >= 0 {
            return Some(result as i64);
        }
        let err = std::io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::EINTR) => None,
            code => Some(-(code.unwrap_or(libc::EIO) as i64)),
        }
    }
}

impl Default for SyncEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl IOEngine for SyncEngine {
    fn init(&mut self, config: &EngineConfig) -> Result<()> {
        self.queue_depth = config.queue_depth.max(1);
        self.ready = VecDeque::with_capacity(self.queue_depth);
        Ok(())
    }

    fn submit(&mut self, ops: &[IOOperation]) -> Result<usize> {
        for op in ops {
            let result = match op.op_type {
                OperationType::Read => self.do_read(op.target_fd, op.buffer, op.length, op.offset),
                OperationType::Write => {
                    self.do_write(op.target_fd, op.buffer as *const u8, op.length, op.offset)
                }
            };

            self.ready.push_back(IOCompletion {
                user_data: op.user_data,
                result,
                result2: 0,
                op_type: op.op_type,
            });
        }

        Ok(ops.len())
    }

    fn poll_completions(&mut self, _min_complete: usize, completions: &mut Vec<IOCompletion>) -> Result<usize> {
        // Everything submitted has already finished, so the minimum is always met
        let count = self.ready.len().min(self.queue_depth);
        completions.extend(self.ready.drain(..count));
        Ok(count)
    }

    fn cleanup(&mut self) -> Result<()> {
        self.ready.clear();
        Ok(())
    }

    fn capabilities(&self) -> EngineCapabilities {
        EngineCapabilities {
            async_io: false,
            batch_submission: true,
            max_queue_depth: self.queue_depth,
        }
    }
}
