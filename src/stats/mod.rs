//! Statistics collection
//!
//! Counters and latency histograms for one pipeline run. The pipeline is single
//! threaded, so plain integers suffice; the completion stage records every
//! finished operation and the submission stage counts batches.
//!
//! # Example
//!
//! ```
//! use aiopipe::stats::PipelineStats;
//! use aiopipe::engine::OperationType;
//! use std::time::Duration;
//!
//! let mut stats = PipelineStats::new();
//! stats.record_io(OperationType::Read, 4096, Duration::from_micros(100));
//! stats.record_io(OperationType::Write, 4096, Duration::from_micros(150));
//!
//! assert_eq!(stats.total_ops(), 2);
//! assert_eq!(stats.total_bytes(), 8192);
//! ```

pub mod histogram;

use crate::engine::OperationType;
use histogram::LatencyHistogram;
use std::time::Duration;

/// Statistics for one pipeline run
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    read_ops: u64,
    write_ops: u64,
    read_bytes: u64,
    write_bytes: u64,

    /// Units whose last operation finished
    units_completed: u64,

    /// Batches handed to the engine (continuation resubmits included)
    submit_calls: u64,

    /// Operations across all batches
    submitted_ops: u64,

    /// Blocking waits for completion
    wait_calls: u64,

    /// Largest number of simultaneously outstanding units
    max_in_flight: usize,

    read_latency: LatencyHistogram,
    write_latency: LatencyHistogram,

    elapsed: Duration,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one successfully finished operation
    #[inline]
    pub fn record_io(&mut self, op_type: OperationType, bytes: usize, latency: Duration) {
        match op_type {
            OperationType::Read => {
                self.read_ops += 1;
                self.read_bytes += bytes as u64;
                self.read_latency.record(latency);
            }
            OperationType::Write => {
                self.write_ops += 1;
                self.write_bytes += bytes as u64;
                self.write_latency.record(latency);
            }
        }
    }

    #[inline]
    pub fn record_submit(&mut self, ops: usize) {
        self.submit_calls += 1;
        self.submitted_ops += ops as u64;
    }

    #[inline]
    pub fn record_wait(&mut self) {
        self.wait_calls += 1;
    }

    #[inline]
    pub fn record_unit_done(&mut self) {
        self.units_completed += 1;
    }

    #[inline]
    pub fn observe_in_flight(&mut self, in_flight: usize) {
        self.max_in_flight = self.max_in_flight.max(in_flight);
    }

    pub fn set_elapsed(&mut self, elapsed: Duration) {
        self.elapsed = elapsed;
    }

    pub fn read_ops(&self) -> u64 {
        self.read_ops
    }

    pub fn write_ops(&self) -> u64 {
        self.write_ops
    }

    pub fn read_bytes(&self) -> u64 {
        self.read_bytes
    }

    pub fn write_bytes(&self) -> u64 {
        self.write_bytes
    }

    pub fn total_ops(&self) -> u64 {
        self.read_ops + self.write_ops
    }

    pub fn total_bytes(&self) -> u64 {
        self.read_bytes + self.write_bytes
    }

    pub fn units_completed(&self) -> u64 {
        self.units_completed
    }

    pub fn submit_calls(&self) -> u64 {
        self.submit_calls
    }

    pub fn submitted_ops(&self) -> u64 {
        self.submitted_ops
    }

    pub fn wait_calls(&self) -> u64 {
        self.wait_calls
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    pub fn read_latency(&self) -> &LatencyHistogram {
        &self.read_latency
    }

    pub fn write_latency(&self) -> &LatencyHistogram {
        &self.write_latency
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Average operations per submit call
    pub fn mean_batch_size(&self) -> f64 {
        if self.submit_calls == 0 {
            0.0
        } else {
            self.submitted_ops as f64 / self.submit_calls as f64
        }
    }
}
