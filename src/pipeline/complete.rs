//! Completion stage
//!
//! One blocking wait per iteration. Every record returned is dispatched to the
//! continuation logic in the order the engine reported it.

use super::error::{kernel_error_message, PipelineError};
use super::Pipeline;

impl Pipeline {
    /// Wait for at least one completion and process everything retrieved
    ///
    /// Returns the number of records processed; 0 without waiting when nothing
    /// is in flight.
    pub(super) fn complete_stage(&mut self) -> Result<usize, PipelineError> {
        if self.ctx.in_flight() == 0 {
            return Ok(0);
        }

        self.completions.clear();
        self.stats.record_wait();

        let n = self
            .engine
            .poll_completions(1, &mut self.completions)
            .map_err(|e| PipelineError::CompletionFailed(kernel_error_message(&e)))?;

        if n == 0 {
            return Err(PipelineError::CompletionFailed(format!(
                "wait returned nothing with {} in flight",
                self.ctx.in_flight()
            )));
        }

        if self.debug >= 2 {
            eprintln!(
                "DEBUG: io_getevents({}) busy:{} maxio:{} tocopy:{}",
                n,
                self.ctx.in_flight(),
                self.ctx.concurrency(),
                self.ctx.remaining_units()
            );
        }

        let completions = std::mem::take(&mut self.completions);
        let result = completions
            .iter()
            .try_for_each(|completion| self.handle_completion(completion));
        self.completions = completions;

        result.map(|()| n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PipelineConfig, TransferMode};
    use crate::engine::mock::MockEngine;

    fn read_only(mock: &MockEngine, units: u64) -> Pipeline {
        let config = PipelineConfig {
            block_size: 512,
            concurrency: 4,
            alignment: 512,
            mode: TransferMode::ReadOnly,
            ..PipelineConfig::default()
        };
        Pipeline::new(&config, 512 * units, Some(5), None, Box::new(mock.clone())).unwrap()
    }

    #[test]
    fn test_nothing_in_flight_does_not_wait() {
        let mock = MockEngine::new();
        let mut pipeline = read_only(&mock, 4);
        assert_eq!(pipeline.complete_stage().unwrap(), 0);
        assert_eq!(mock.wait_calls(), 0);
        assert_eq!(pipeline.stats().wait_calls(), 0);
    }

    #[test]
    fn test_processes_every_record_of_one_wait() {
        let mock = MockEngine::new();
        let mut pipeline = read_only(&mock, 4);
        pipeline.submit_stage().unwrap();

        assert_eq!(pipeline.complete_stage().unwrap(), 4);
        assert_eq!(mock.wait_calls(), 1);
        assert_eq!(pipeline.context().in_flight(), 0);
        assert!(pipeline.is_finished());
    }

    #[test]
    fn test_partial_poll_leaves_rest_in_flight() {
        let mock = MockEngine::new();
        mock.set_max_per_poll(Some(1));
        let mut pipeline = read_only(&mock, 4);
        pipeline.submit_stage().unwrap();

        assert_eq!(pipeline.complete_stage().unwrap(), 1);
        assert_eq!(pipeline.context().in_flight(), 3);
        assert_eq!(pipeline.pool().free_count(), 1);
    }

    #[test]
    fn test_wait_error_is_completion_failure() {
        let mock = MockEngine::new();
        mock.set_wait_error(Some(libc::EFAULT));
        let mut pipeline = read_only(&mock, 4);
        pipeline.submit_stage().unwrap();

        match pipeline.complete_stage().unwrap_err() {
            PipelineError::CompletionFailed(msg) => assert!(msg.starts_with("mock wait failed")),
            other => panic!("expected CompletionFailed, got {:?}", other),
        }
    }
}
