//! Continuation logic
//!
//! Decides what a finished operation means for its unit:
//!
//! - copy: read → write → done
//! - read-only: read → done
//! - zero-fill: write → done
//!
//! Any error code, nonzero secondary status or byte count other than the one
//! requested is fatal. A unit is counted as done exactly once, at its terminal
//! transition, and only then is its descriptor freed.

use super::error::{kernel_error_message, PipelineError};
use super::pool::Continuation;
use super::Pipeline;
use crate::engine::{IOCompletion, OperationType};
use crate::util::fast_time::FastInstant;

impl Pipeline {
    pub(super) fn handle_completion(&mut self, completion: &IOCompletion) -> Result<(), PipelineError> {
        let idx = completion.user_data as usize;
        if !self.pool.is_busy(idx) {
            return Err(PipelineError::CompletionFailed(format!(
                "completion for descriptor {} which is not in flight",
                completion.user_data
            )));
        }

        let now = FastInstant::now();
        let desc = self.pool.get(idx);
        let (op, offset, expected) = (desc.op_type, desc.offset, desc.length);
        let (continuation, submitted_at) = (desc.continuation, desc.submitted_at);

        if completion.result2 != 0 {
            return Err(PipelineError::OperationFailed {
                op,
                offset,
                code: completion.result2,
            });
        }
        if completion.result < 0 {
            return Err(PipelineError::OperationFailed {
                op,
                offset,
                code: completion.result,
            });
        }
        if completion.result != expected as i64 {
            return Err(PipelineError::ShortTransfer {
                op,
                offset,
                expected,
                transferred: completion.result,
            });
        }

        self.stats
            .record_io(op, expected, now.duration_since(submitted_at));

        if self.debug >= 1 {
            match op {
                OperationType::Read => eprint!("r"),
                OperationType::Write => eprint!("w"),
            }
        }

        match continuation {
            Continuation::ReadThenDone | Continuation::WriteThenDone => {
                self.ctx.on_unit_done();
                self.stats.record_unit_done();
                self.pool.release(idx);
                Ok(())
            }
            Continuation::ReadThenWrite => self.resubmit_as_write(idx, now),
        }
    }

    /// Send the bytes just read to the destination from the same buffer
    fn resubmit_as_write(&mut self, idx: usize, now: FastInstant) -> Result<(), PipelineError> {
        let destination = self.ctx.destination();
        let desc = self.pool.get_mut(idx);
        let (offset, length) = (desc.offset, desc.length);
        desc.prepare(
            OperationType::Write,
            destination,
            offset,
            length,
            Continuation::WriteThenDone,
        );
        desc.submitted_at = now;
        let op = desc.operation(idx as u64);

        let accepted = self
            .engine
            .submit(std::slice::from_ref(&op))
            .map_err(|e| PipelineError::SubmissionFailed {
                stage: "write",
                requested: 1,
                accepted: 0,
                reason: kernel_error_message(&e),
            })?;

        if accepted != 1 {
            return Err(PipelineError::SubmissionFailed {
                stage: "write",
                requested: 1,
                accepted,
                reason: "write was not queued".to_string(),
            });
        }

        self.stats.record_submit(1);
        if self.debug >= 2 {
            eprintln!("DEBUG: io_submit(1) write offset:{} busy:{}", offset, self.ctx.in_flight());
        }
        Ok(())
    }
}
