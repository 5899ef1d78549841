//! libaio IO engine
//!
//! Linux native asynchronous IO driven through raw syscalls. A whole batch of
//! control blocks goes to the kernel in one `io_submit`, and `io_getevents`
//! blocks until at least the requested number of events is ready.
//!
//! # Implementation
//!
//! This implementation uses direct syscalls via libc rather than a binding crate
//! to maintain MIT license compatibility (libaio library is LGPL).
//!
//! # Requirements
//!
//! - Linux kernel with AIO support (`CONFIG_AIO`)
//! - O_DIRECT for truly asynchronous behaviour on most filesystems; without it
//!   the kernel may complete the operation inside `io_submit`
//!
//! # Example
//!
//! ```no_run
//! use aiopipe::engine::{IOEngine, EngineConfig};
//! use aiopipe::engine::libaio::LibaioEngine;
//!
//! let mut engine = LibaioEngine::new();
//! engine.init(&EngineConfig { queue_depth: 64 }).unwrap();
//! // ... submit batches and poll for completions
//! engine.cleanup().unwrap();
//! ```

use super::{EngineCapabilities, EngineConfig, IOCompletion, IOEngine, IOOperation, OperationType};
use crate::Result;
use anyhow::Context;
use std::collections::HashMap;
use std::mem::MaybeUninit;
use std::ptr;

// libaio types and constants
type AioContext = libc::c_ulong;

const IOCB_CMD_PREAD: u16 = 0;
const IOCB_CMD_PWRITE: u16 = 1;

#[repr(C)]
#[derive(Clone, Copy)]
struct IoControlBlock {
    data: u64,           // User data (aio_data)
    key: u32,            // Key (aio_key)
    aio_rw_flags: u32,   // RWF_* flags
    lio_opcode: u16,     // Operation code
    aio_reqprio: i16,    // Request priority
    aio_fildes: u32,     // File descriptor
    buf: u64,            // Buffer pointer
    nbytes: u64,         // Number of bytes
    offset: i64,         // File offset
    aio_reserved2: u64,  // Reserved
    flags: u32,          // IOCB_FLAG_* flags
    aio_resfd: u32,      // Eventfd for notification
}

#[repr(C)]
#[derive(Clone, Copy)]
struct IoEvent {
    data: u64,   // User data from iocb
    obj: u64,    // Pointer to iocb
    res: i64,    // Bytes transferred or -errno
    res2: i64,   // Secondary result
}

// Per-architecture syscall numbers come from libc
const SYS_IO_SETUP: libc::c_long = libc::SYS_io_setup;
const SYS_IO_DESTROY: libc::c_long = libc::SYS_io_destroy;
const SYS_IO_GETEVENTS: libc::c_long = libc::SYS_io_getevents;
const SYS_IO_SUBMIT: libc::c_long = libc::SYS_io_submit;

unsafe fn io_setup(maxevents: libc::c_int, ctxp: *mut AioContext) -> libc::c_int {
    libc::syscall(SYS_IO_SETUP, maxevents as i64, ctxp) as libc::c_int
}

unsafe fn io_destroy(ctx: AioContext) -> libc::c_int {
    libc::syscall(SYS_IO_DESTROY, ctx) as libc::c_int
}

unsafe fn io_submit(ctx: AioContext, nr: libc::c_long, iocbpp: *mut *mut IoControlBlock) -> libc::c_int {
    libc::syscall(SYS_IO_SUBMIT, ctx, nr, iocbpp) as libc::c_int
}

unsafe fn io_getevents(
    ctx: AioContext,
    min_nr: libc::c_long,
    nr: libc::c_long,
    events: *mut IoEvent,
    timeout: *mut libc::timespec,
) -> libc::c_int {
    libc::syscall(SYS_IO_GETEVENTS, ctx, min_nr, nr, events, timeout) as libc::c_int
}

/// libaio IO engine
pub struct LibaioEngine {
    ctx: Option<AioContext>,

    queue_depth: usize,

    /// Control blocks handed to the kernel; never reallocated after `init`
    iocbs: Vec<IoControlBlock>,

    /// Free control block indices
    available_iocbs: Vec<usize>,

    /// user_data -> (operation type, control block index) for in-flight operations
    pending_ops: HashMap<u64, (OperationType, usize)>,

    /// Scratch array of iocb pointers for one io_submit call
    submit_ptrs: Vec<*mut IoControlBlock>,

    /// Pre-allocated events array (reused across poll_completions calls)
    events: Vec<IoEvent>,
}

// Safety: the raw pointers refer into `iocbs`, which moves with the engine and
// is only touched by the owning thread
unsafe impl Send for LibaioEngine {}

impl LibaioEngine {
    pub fn new() -> Self {
        Self {
            ctx: None,
            queue_depth: 0,
            iocbs: Vec::new(),
            available_iocbs: Vec::new(),
            pending_ops: HashMap::new(),
            submit_ptrs: Vec::new(),
            events: Vec::new(),
        }
    }

    fn context(&self) -> Result<AioContext> {
        self.ctx.ok_or_else(|| anyhow::anyhow!("libaio engine not initialized"))
    }

    /// Number of operations handed to the kernel and not yet reaped
    pub fn in_flight(&self) -> usize {
        self.pending_ops.len()
    }

    /// Give back the control blocks of operations the kernel did not take
    fn release_unaccepted(&mut self, ops: &[IOOperation]) {
        for op in ops {
            if let Some((_, idx)) = self.pending_ops.remove(&op.user_data) {
                self.available_iocbs.push(idx);
            }
        }
    }
}

impl Default for LibaioEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl IOEngine for LibaioEngine {
    fn init(&mut self, config: &EngineConfig) -> Result<()> {
        if config.queue_depth == 0 {
            anyhow::bail!("queue_depth must be at least 1");
        }

        let mut ctx: AioContext = 0;
        let result = unsafe { io_setup(config.queue_depth as i32, &mut ctx) };

        if result < 0 {
            let err = std::io::Error::last_os_error();
            return Err(err).context(format!(
                "io_setup failed with queue_depth={}",
                config.queue_depth
            ));
        }

        self.ctx = Some(ctx);
        self.queue_depth = config.queue_depth;

        self.iocbs = vec![
            unsafe { MaybeUninit::zeroed().assume_init() };
            config.queue_depth
        ];
        self.available_iocbs = (0..config.queue_depth).rev().collect();
        self.submit_ptrs = Vec::with_capacity(config.queue_depth);
        self.events = vec![
            unsafe { MaybeUninit::zeroed().assume_init() };
            config.queue_depth
        ];

        Ok(())
    }

    fn submit(&mut self, ops: &[IOOperation]) -> Result<usize> {
        let ctx = self.context()?;
        if ops.is_empty() {
            return Ok(0);
        }
        if ops.len() > self.available_iocbs.len() {
            anyhow::bail!(
                "batch of {} exceeds free control blocks ({} of {})",
                ops.len(),
                self.available_iocbs.len(),
                self.queue_depth
            );
        }

        self.submit_ptrs.clear();
        for op in ops {
            // Checked above: enough control blocks for the whole batch
            let idx = match self.available_iocbs.pop() {
                Some(idx) => idx,
                None => break,
            };

            let iocb = &mut self.iocbs[idx];
            *iocb = IoControlBlock {
                data: op.user_data,
                key: 0,
                aio_rw_flags: 0,
                lio_opcode: match op.op_type {
                    OperationType::Read => IOCB_CMD_PREAD,
                    OperationType::Write => IOCB_CMD_PWRITE,
                },
                aio_reqprio: 0,
                aio_fildes: op.target_fd as u32,
                buf: op.buffer as u64,
                nbytes: op.length as u64,
                offset: op.offset as i64,
                aio_reserved2: 0,
                flags: 0,
                aio_resfd: 0,
            };
            self.submit_ptrs.push(iocb as *mut IoControlBlock);
            self.pending_ops.insert(op.user_data, (op.op_type, idx));
        }

        let result = unsafe {
            io_submit(ctx, self.submit_ptrs.len() as libc::c_long, self.submit_ptrs.as_mut_ptr())
        };

        if result < 0 {
            let err = std::io::Error::last_os_error();
            self.release_unaccepted(ops);
            return Err(err).context(format!("io_submit failed for batch of {}", ops.len()));
        }

        let accepted = result as usize;
        if accepted < ops.len() {
            self.release_unaccepted(&ops[accepted..]);
        }

        Ok(accepted)
    }

    fn poll_completions(&mut self, min_complete: usize, completions: &mut Vec<IOCompletion>) -> Result<usize> {
        let ctx = self.context()?;

        if self.pending_ops.is_empty() {
            return Ok(0);
        }

        let min_events = min_complete.min(self.pending_ops.len());

        let result = loop {
            let result = unsafe {
                io_getevents(
                    ctx,
                    min_events as libc::c_long,
                    self.queue_depth as libc::c_long,
                    self.events.as_mut_ptr(),
                    ptr::null_mut(), // No timeout
                )
            };
            if result >= 0 {
                break result;
            }
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::EINTR) {
                return Err(err).context("io_getevents failed");
            }
        };

        let num_events = result as usize;
        for event in &self.events[..num_events] {
            let user_data = event.data;

            let op_type = match self.pending_ops.remove(&user_data) {
                Some((op_type, idx)) => {
                    self.available_iocbs.push(idx);
                    op_type
                }
                None => anyhow::bail!("io_getevents returned unknown operation {}", user_data),
            };

            completions.push(IOCompletion {
                user_data,
                result: event.res,
                result2: event.res2,
                op_type,
            });
        }

        Ok(num_events)
    }

    fn cleanup(&mut self) -> Result<()> {
        if let Some(ctx) = self.ctx {
            let mut drained = Vec::new();
            while !self.pending_ops.is_empty() {
                drained.clear();
                self.poll_completions(1, &mut drained)?;
            }

            let result = unsafe { io_destroy(ctx) };
            if result < 0 {
                let err = std::io::Error::last_os_error();
                return Err(err).context("io_destroy failed");
            }

            self.ctx = None;
        }

        self.pending_ops.clear();
        self.available_iocbs.clear();

        Ok(())
    }

    fn capabilities(&self) -> EngineCapabilities {
        EngineCapabilities {
            async_io: true,
            batch_submission: true,
            max_queue_depth: if self.queue_depth > 0 { self.queue_depth } else { 128 },
        }
    }
}

impl Drop for LibaioEngine {
    fn drop(&mut self) {
        let _ = self.cleanup();
    }
}
