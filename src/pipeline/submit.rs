//! Submission stage
//!
//! Fills every free slot with a new unit and hands the batch to the engine in
//! a single call. All operations of one batch share one submission timestamp.

use super::error::{kernel_error_message, PipelineError};
use super::Pipeline;
use crate::util::fast_time::FastInstant;

impl Pipeline {
    /// Start as many units as the concurrency limit allows
    ///
    /// Returns the number of operations submitted (0 when nothing may start).
    /// An engine error or a partially accepted batch is fatal; descriptors the
    /// engine did not take go back to the pool, accepted ones stay in flight.
    pub(super) fn submit_stage(&mut self) -> Result<usize, PipelineError> {
        let n = self.ctx.submission_capacity();
        if n == 0 {
            return Ok(0);
        }

        let (op_type, fd, continuation) = self.ctx.first_operation();
        let now = FastInstant::now();

        self.batch.clear();
        for _ in 0..n {
            let Some(idx) = self.pool.acquire() else {
                self.release_batch(0);
                return Err(PipelineError::SubmissionFailed {
                    stage: "submit",
                    requested: n,
                    accepted: 0,
                    reason: "descriptor pool exhausted".to_string(),
                });
            };

            let extent = self.ctx.next_extent(self.dist.as_mut());
            let desc = self.pool.get_mut(idx);
            desc.prepare(op_type, fd, extent.offset, extent.length, continuation);
            desc.submitted_at = now;
            self.batch.push(desc.operation(idx as u64));
        }

        let accepted = match self.engine.submit(&self.batch) {
            Ok(accepted) => accepted.min(n),
            Err(e) => {
                self.release_batch(0);
                return Err(PipelineError::SubmissionFailed {
                    stage: "submit",
                    requested: n,
                    accepted: 0,
                    reason: kernel_error_message(&e),
                });
            }
        };

        self.ctx.on_submitted(accepted);
        self.stats.record_submit(accepted);
        self.stats.observe_in_flight(self.ctx.in_flight());

        if accepted < n {
            self.release_batch(accepted);
            return Err(PipelineError::SubmissionFailed {
                stage: "submit",
                requested: n,
                accepted,
                reason: "kernel did not queue the whole batch".to_string(),
            });
        }

        if self.debug >= 2 {
            eprintln!("DEBUG: io_submit({}) busy:{}", n, self.ctx.in_flight());
        }

        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }

        Ok(n)
    }

    /// Return the descriptors of `batch[from..]` to the pool
    fn release_batch(&mut self, from: usize) {
        for op in &self.batch[from..] {
            self.pool.release(op.user_data as usize);
        }
        self.batch.clear();
    }
}
