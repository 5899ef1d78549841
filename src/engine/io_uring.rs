//! io_uring IO engine
//!
//! Alternative asynchronous backend using Linux's io_uring interface (kernel
//! 5.1+). A batch is pushed onto the submission queue and handed to the kernel
//! with a single `io_uring_enter`; completions are drained from the completion
//! queue after `submit_and_wait`.
//!
//! io_uring has no secondary result field, so completions always carry
//! `result2 == 0`.
//!
//! # Example
//!
//! ```no_run
//! use aiopipe::engine::{IOEngine, EngineConfig};
//! use aiopipe::engine::io_uring::IoUringEngine;
//!
//! let mut engine = IoUringEngine::new();
//! engine.init(&EngineConfig { queue_depth: 128 }).unwrap();
//! // ... submit batches and poll for completions
//! engine.cleanup().unwrap();
//! ```

use super::{EngineCapabilities, EngineConfig, IOCompletion, IOEngine, IOOperation, OperationType};
use crate::Result;
use anyhow::Context;
use io_uring::{opcode, types, IoUring};
use std::collections::HashMap;

/// io_uring IO engine
pub struct IoUringEngine {
    ring: Option<IoUring>,

    queue_depth: usize,

    /// Map of user_data to operation type for completion tracking
    pending_ops: HashMap<u64, OperationType>,
}

impl IoUringEngine {
    pub fn new() -> Self {
        Self {
            ring: None,
            queue_depth: 0,
            pending_ops: HashMap::new(),
        }
    }

    /// Number of operations handed to the kernel and not yet reaped
    pub fn in_flight(&self) -> usize {
        self.pending_ops.len()
    }

    fn drain_completions(&mut self, completions: &mut Vec<IOCompletion>, limit: usize) -> Result<usize> {
        let Some(ring) = self.ring.as_mut() else { return Ok(0) };

        let mut count = 0;
        for cqe in ring.completion() {
            let user_data = cqe.user_data();
            let Some(op_type) = self.pending_ops.remove(&user_data) else {
                anyhow::bail!("io_uring returned unknown operation {}", user_data);
            };

            completions.push(IOCompletion {
                user_data,
                result: cqe.result() as i64,
                result2: 0,
                op_type,
            });

            count += 1;
            if count >= limit {
                break;
            }
        }
        Ok(count)
    }
}

impl Default for IoUringEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl IOEngine for IoUringEngine {
    fn init(&mut self, config: &EngineConfig) -> Result<()> {
        if config.queue_depth == 0 {
            anyhow::bail!("queue_depth must be at least 1");
        }

        let ring = IoUring::new(config.queue_depth as u32)
            .context("Failed to create io_uring instance")?;

        self.ring = Some(ring);
        self.queue_depth = config.queue_depth;

        Ok(())
    }

    fn submit(&mut self, ops: &[IOOperation]) -> Result<usize> {
        let ring = self
            .ring
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("io_uring engine not initialized"))?;

        if ops.is_empty() {
            return Ok(0);
        }

        let mut queued = 0;
        for op in ops {
            let entry = match op.op_type {
                OperationType::Read => opcode::Read::new(
                    types::Fd(op.target_fd),
                    op.buffer,
                    op.length as u32,
                )
                .offset(op.offset)
                .build()
                .user_data(op.user_data),
                OperationType::Write => opcode::Write::new(
                    types::Fd(op.target_fd),
                    op.buffer as *const u8,
                    op.length as u32,
                )
                .offset(op.offset)
                .build()
                .user_data(op.user_data),
            };

            // SAFETY: the caller guarantees each buffer outlives its completion
            let pushed = unsafe { ring.submission().push(&entry).is_ok() };
            if !pushed {
                break;
            }
            queued += 1;
        }

        let accepted = ring
            .submit()
            .context(format!("io_uring_enter failed for batch of {}", queued))?;

        for op in &ops[..accepted.min(ops.len())] {
            self.pending_ops.insert(op.user_data, op.op_type);
        }

        Ok(accepted)
    }

    fn poll_completions(&mut self, min_complete: usize, completions: &mut Vec<IOCompletion>) -> Result<usize> {
        if self.pending_ops.is_empty() {
            return Ok(0);
        }

        let want = min_complete.min(self.pending_ops.len());
        let limit = self.queue_depth.max(1);
        let mut count = 0;

        // Drain what is already there first; wait only for the shortfall
        count += self.drain_completions(completions, limit)?;
        while count < want {
            let ring = self
                .ring
                .as_mut()
                .ok_or_else(|| anyhow::anyhow!("io_uring engine not initialized"))?;
            ring.submit_and_wait(want - count)
                .context("Failed to wait for completions")?;
            count += self.drain_completions(completions, limit - count)?;
        }

        Ok(count)
    }

    fn cleanup(&mut self) -> Result<()> {
        let mut drained = Vec::new();
        while self.ring.is_some() && !self.pending_ops.is_empty() {
            drained.clear();
            self.poll_completions(1, &mut drained)?;
        }

        // Drop the ring (automatic cleanup)
        self.ring = None;
        self.pending_ops.clear();

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
