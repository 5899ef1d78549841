//! Bounded-concurrency block IO pipeline
//!
//! The driver keeps up to `concurrency` operations outstanding against the
//! kernel. Each iteration runs two stages:
//!
//! 1. **Submission** fills every free slot with a new unit and hands the whole
//!    batch to the engine in one call.
//! 2. **Completion** blocks until at least one operation finishes, then runs
//!    each descriptor's continuation: a finished copy read is resubmitted as a
//!    write of the same buffer, anything else ends its unit and frees the slot.
//!
//! Completion order is whatever the engine reports. All state is owned by
//! `Pipeline` and mutated through `&mut self` on one thread.
//!
//! # Example
//!
//! ```no_run
//! use aiopipe::config::{PipelineConfig, TransferMode};
//! use aiopipe::engine::{create_engine, EngineType};
//! use aiopipe::pipeline::Pipeline;
//! use std::os::unix::io::AsRawFd;
//!
//! let src = std::fs::File::open("/tmp/in.dat")?;
//! let dst = std::fs::OpenOptions::new().write(true).create(true).open("/tmp/out.dat")?;
//! let len = src.metadata()?.len();
//!
//! let config = PipelineConfig { mode: TransferMode::Copy, ..PipelineConfig::default() };
//! let engine = create_engine(EngineType::Libaio)?;
//! let mut pipeline = Pipeline::new(&config, len, Some(src.as_raw_fd()), Some(dst.as_raw_fd()), engine)?;
//! pipeline.run()?;
//! pipeline.shutdown()?;
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod complete;
pub mod context;
pub mod continuation;
pub mod error;
pub mod pool;
pub mod submit;

pub use context::{Extent, WorkloadContext};
pub use error::PipelineError;
pub use pool::{Continuation, Descriptor, DescriptorPool};

use crate::config::PipelineConfig;
use crate::distribution::uniform::UniformDistribution;
use crate::distribution::Distribution;
use crate::engine::{EngineConfig, IOCompletion, IOEngine, IOOperation};
use crate::stats::PipelineStats;
use crate::util::time::format_bytes;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// One asynchronous transfer
pub struct Pipeline {
    // Declared before `pool` so the kernel lets go of the buffers first
    engine: Box<dyn IOEngine>,
    pool: DescriptorPool,
    ctx: WorkloadContext,
    dist: Box<dyn Distribution>,
    stats: PipelineStats,
    delay: Option<Duration>,
    debug: u8,

    /// Reused by the submission stage
    batch: Vec<IOOperation>,
    /// Reused by the completion stage
    completions: Vec<IOCompletion>,

    started: Option<Instant>,
}

impl Pipeline {
    /// Build a pipeline over already-open files
    ///
    /// Allocates every descriptor buffer and initializes `engine` with a queue
    /// depth equal to the concurrency limit.
    ///
    /// # Errors
    ///
    /// `SetupFailed` if the workload is invalid, a buffer cannot be allocated
    /// or the engine cannot be initialized.
    pub fn new(
        config: &PipelineConfig,
        transfer_length: u64,
        source: Option<RawFd>,
        destination: Option<RawFd>,
        mut engine: Box<dyn IOEngine>,
    ) -> Result<Self, PipelineError> {
        let ctx = WorkloadContext::new(config, transfer_length, source, destination)?;
        let pool = DescriptorPool::new(ctx.concurrency(), ctx.block_size(), ctx.alignment())?;

        if config.debug >= 2 {
            eprintln!(
                "DEBUG: allocated {} buffers of {} aligned to {}",
                pool.capacity(),
                format_bytes(ctx.block_size() as u64),
                ctx.alignment()
            );
        }

        engine
            .init(&EngineConfig {
                queue_depth: config.concurrency,
            })
            .map_err(|e| PipelineError::SetupFailed(error::kernel_error_message(&e)))?;

        Ok(Self {
            engine,
            pool,
            ctx,
            dist: Box::new(UniformDistribution::from_seed_option(config.seed)),
            stats: PipelineStats::new(),
            delay: (config.delay_us > 0).then(|| Duration::from_micros(config.delay_us)),
            debug: config.debug,
            batch: Vec::with_capacity(config.concurrency),
            completions: Vec::with_capacity(config.concurrency),
            started: None,
        })
    }

    /// Replace the random offset source
    pub fn with_distribution(mut self, dist: Box<dyn Distribution>) -> Self {
        self.dist = dist;
        self
    }

    /// Run until every unit is done
    ///
    /// In continuous mode this never returns unless an error occurs; use
    /// `run_until_stopped` instead.
    pub fn run(&mut self) -> Result<(), PipelineError> {
        self.start_clock();
        while !self.ctx.is_finished() {
            self.step()?;
        }
        self.stop_clock();
        Ok(())
    }

    /// Run until finished or until `stop` is raised
    ///
    /// After `stop` is seen no new unit is started, but everything in flight,
    /// including writes still owed by copy units, is completed before this
    /// returns.
    pub fn run_until_stopped(&mut self, stop: &AtomicBool) -> Result<(), PipelineError> {
        self.start_clock();
        while !self.ctx.is_finished() {
            if !self.ctx.is_halted() && stop.load(Ordering::Relaxed) {
                if self.debug >= 2 {
                    eprintln!("DEBUG: stop requested, draining {} in flight", self.ctx.in_flight());
                }
                self.ctx.halt();
                continue;
            }
            self.step()?;
        }
        self.stop_clock();
        Ok(())
    }

    /// One submission stage followed by one completion stage
    pub fn step(&mut self) -> Result<(), PipelineError> {
        self.submit_stage()?;
        self.complete_stage()?;
        Ok(())
    }

    /// Stop starting new units; see `run_until_stopped`
    pub fn halt(&mut self) {
        self.ctx.halt();
    }

    /// Release the engine, waiting for anything the kernel still holds
    pub fn shutdown(&mut self) -> crate::Result<()> {
        self.engine.cleanup()
    }

    pub fn context(&self) -> &WorkloadContext {
        &self.ctx
    }

    pub fn pool(&self) -> &DescriptorPool {
        &self.pool
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    pub fn is_finished(&self) -> bool {
        self.ctx.is_finished()
    }

    fn start_clock(&mut self) {
        if self.started.is_none() {
            self.started = Some(Instant::now());
        }
    }

    fn stop_clock(&mut self) {
        if let Some(started) = self.started {
            self.stats.set_elapsed(started.elapsed());
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        let _ = self.engine.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransferMode;
    use crate::engine::mock::{CompletionOrder, MockEngine, MockFault};
    use crate::engine::sync::SyncEngine;
    use crate::engine::OperationType;
    use std::collections::BTreeMap;
    use std::fs::{File, OpenOptions};
    use std::os::unix::io::AsRawFd;
    use tempfile::TempDir;

    const SRC: RawFd = 100;
    const DST: RawFd = 101;

    fn config(block_size: usize, concurrency: usize, mode: TransferMode) -> PipelineConfig {
        PipelineConfig {
            block_size,
            concurrency,
            mode,
            alignment: 8,
            ..PipelineConfig::default()
        }
    }

    fn mock_pipeline(cfg: &PipelineConfig, length: u64, mock: &MockEngine) -> Pipeline {
        let source = cfg.mode.needs_source().then_some(SRC);
        let destination = cfg.mode.needs_destination().then_some(DST);
        Pipeline::new(cfg, length, source, destination, Box::new(mock.clone())).unwrap()
    }

    fn assert_pool_consistent(pipeline: &Pipeline) {
        assert_eq!(
            pipeline.pool().free_count() + pipeline.context().in_flight(),
            pipeline.pool().capacity()
        );
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 + i / 251) as u8).collect()
    }

    #[test]
    fn test_ten_bytes_four_byte_blocks_two_in_flight() {
        let mock = MockEngine::new();
        let mut pipeline = mock_pipeline(&config(4, 2, TransferMode::Copy), 10, &mock);

        while !pipeline.is_finished() {
            pipeline.step().unwrap();
            assert!(pipeline.context().in_flight() <= 2);
            assert_pool_consistent(&pipeline);
            assert_eq!(
                pipeline.context().remaining_units(),
                pipeline.context().unstarted_units() + pipeline.context().in_flight() as u64
            );
        }

        let ops = mock.submitted_operations();
        let reads: Vec<(u64, usize)> = ops
            .iter()
            .filter(|o| o.op_type == OperationType::Read)
            .map(|o| (o.offset, o.length))
            .collect();
        let mut writes: Vec<(u64, usize)> = ops
            .iter()
            .filter(|o| o.op_type == OperationType::Write)
            .map(|o| (o.offset, o.length))
            .collect();
        writes.sort_unstable();

        assert_eq!(reads, vec![(0, 4), (4, 4), (8, 2)]);
        assert_eq!(writes, vec![(0, 4), (4, 4), (8, 2)]);
        assert!(ops.iter().all(|o| match o.op_type {
            OperationType::Read => o.target_fd == SRC,
            OperationType::Write => o.target_fd == DST,
        }));
        assert!(mock.max_outstanding() <= 2);
        assert_eq!(pipeline.stats().units_completed(), 3);
        assert_eq!(pipeline.stats().read_bytes(), 10);
        assert_eq!(pipeline.stats().write_bytes(), 10);
    }

    #[test]
    fn test_read_only_issues_one_read_per_unit() {
        let mock = MockEngine::new();
        let block = 4096;
        let length = 25 * block as u64 + 17;
        let mut pipeline = mock_pipeline(&config(block, 8, TransferMode::ReadOnly), length, &mock);
        pipeline.run().unwrap();

        let ops = mock.submitted_operations();
        assert_eq!(ops.len(), 26);
        assert!(ops.iter().all(|o| o.op_type == OperationType::Read));
        assert_eq!(pipeline.stats().write_ops(), 0);
        assert_eq!(pipeline.stats().read_bytes(), length);
        assert_eq!(pipeline.pool().free_count(), 8);
    }

    #[test]
    fn test_first_batch_fills_every_slot() {
        let mock = MockEngine::new();
        let mut pipeline = mock_pipeline(&config(512, 4, TransferMode::ReadOnly), 512 * 10, &mock);
        pipeline.run().unwrap();

        let batches = mock.batch_sizes();
        assert_eq!(batches[0], 4);
        assert_eq!(batches.iter().sum::<usize>(), 10);
        assert_eq!(pipeline.stats().submit_calls(), batches.len() as u64);
    }

    #[test]
    fn test_copy_under_reordered_completions() {
        for order in [CompletionOrder::Lifo, CompletionOrder::Shuffled(11), CompletionOrder::Shuffled(12)] {
            let mock = MockEngine::new();
            mock.set_completion_order(order);
            mock.set_max_per_poll(Some(3));

            let block = 1024;
            let length = 37 * block as u64 + 5;
            let mut pipeline = mock_pipeline(&config(block, 6, TransferMode::Copy), length, &mock);
            while !pipeline.is_finished() {
                pipeline.step().unwrap();
                assert_pool_consistent(&pipeline);
            }

            // Every extent read exactly once and written exactly once
            let mut per_offset: BTreeMap<u64, (usize, usize, usize)> = BTreeMap::new();
            for op in mock.submitted_operations() {
                let entry = per_offset.entry(op.offset).or_insert((0, 0, op.length));
                match op.op_type {
                    OperationType::Read => entry.0 += 1,
                    OperationType::Write => entry.1 += 1,
                }
                assert_eq!(entry.2, op.length);
            }
            assert_eq!(per_offset.len(), 38);
            assert!(per_offset.values().all(|&(r, w, _)| r == 1 && w == 1));
            assert_eq!(pipeline.stats().total_bytes(), 2 * length);
            assert!(mock.max_outstanding() <= 6);
        }
    }

    #[test]
    fn test_short_transfer_is_fatal_and_keeps_descriptors() {
        let mock = MockEngine::new();
        mock.inject_fault(2, MockFault::Short(100));
        let mut pipeline = mock_pipeline(&config(4096, 4, TransferMode::ReadOnly), 4096 * 16, &mock);

        let err = pipeline.run().unwrap_err();
        match err {
            PipelineError::ShortTransfer {
                op,
                expected,
                transferred,
                ..
            } => {
                assert_eq!(op, OperationType::Read);
                assert_eq!(expected, 4096);
                assert_eq!(transferred, 100);
            }
            other => panic!("expected ShortTransfer, got {:?}", other),
        }
        assert_pool_consistent(&pipeline);
    }

    #[test]
    fn test_one_byte_short_is_fatal() {
        let mock = MockEngine::new();
        mock.inject_fault(1, MockFault::Short(4095));
        let mut pipeline = mock_pipeline(&config(4096, 4, TransferMode::ReadOnly), 4096 * 16, &mock);

        let err = pipeline.run().unwrap_err();
        assert!(matches!(
            err,
            PipelineError::ShortTransfer {
                op: OperationType::Read,
                expected: 4096,
                transferred: 4095,
                ..
            }
        ));
        assert!(err.to_string().contains("expected 4096 bytes, got 4095"));
        assert_pool_consistent(&pipeline);
    }

    #[test]
    fn test_write_error_is_operation_failure() {
        let mock = MockEngine::new();
        mock.inject_fault_for(OperationType::Write, MockFault::Errno(libc::ENOSPC));
        let mut pipeline = mock_pipeline(&config(512, 2, TransferMode::Copy), 512 * 4, &mock);

        let err = pipeline.run().unwrap_err();
        assert!(matches!(
            err,
            PipelineError::OperationFailed { op: OperationType::Write, code, .. } if code == -(libc::ENOSPC as i64)
        ));
        assert_pool_consistent(&pipeline);
    }

    #[test]
    fn test_secondary_error_is_operation_failure() {
        let mock = MockEngine::new();
        mock.inject_fault(0, MockFault::Secondary(3));
        let mut pipeline = mock_pipeline(&config(512, 2, TransferMode::ZeroFill), 512 * 4, &mock);

        let err = pipeline.run().unwrap_err();
        assert!(matches!(err, PipelineError::OperationFailed { code: 3, .. }));
    }

    #[test]
    fn test_partial_batch_acceptance_is_fatal() {
        let mock = MockEngine::new();
        mock.set_accept_limit(Some(1));
        let mut pipeline = mock_pipeline(&config(512, 4, TransferMode::ReadOnly), 512 * 8, &mock);

        let err = pipeline.step().unwrap_err();
        match err {
            PipelineError::SubmissionFailed {
                requested, accepted, ..
            } => {
                assert_eq!(requested, 4);
                assert_eq!(accepted, 1);
            }
            other => panic!("expected SubmissionFailed, got {:?}", other),
        }
        // The accepted one is still in flight, the rest went back to the pool
        assert_eq!(pipeline.context().in_flight(), 1);
        assert_pool_consistent(&pipeline);
    }

    #[test]
    fn test_rejected_batch_returns_descriptors() {
        let mock = MockEngine::new();
        mock.set_submit_error(Some(libc::EAGAIN));
        let mut pipeline = mock_pipeline(&config(512, 4, TransferMode::ReadOnly), 512 * 8, &mock);

        assert!(matches!(
            pipeline.step().unwrap_err(),
            PipelineError::SubmissionFailed { accepted: 0, .. }
        ));
        assert_eq!(pipeline.pool().free_count(), 4);
        assert_eq!(pipeline.context().in_flight(), 0);
    }

    #[test]
    fn test_wait_without_kernel_aio() {
        let mock = MockEngine::new();
        mock.set_wait_error(Some(libc::ENOSYS));
        let mut pipeline = mock_pipeline(&config(512, 2, TransferMode::ReadOnly), 512 * 2, &mock);

        match pipeline.step().unwrap_err() {
            PipelineError::CompletionFailed(msg) => assert_eq!(msg, "AIO not in this kernel"),
            other => panic!("expected CompletionFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_random_offsets_are_aligned_whole_blocks() {
        let mock = MockEngine::new();
        let mut cfg = config(4096, 8, TransferMode::ReadOnly);
        cfg.random = true;
        cfg.seed = Some(5);
        let length = 64 * 4096 + 1;
        let mut pipeline = mock_pipeline(&cfg, length, &mock);
        pipeline.run().unwrap();

        let ops = mock.submitted_operations();
        assert_eq!(ops.len(), 65);
        for op in ops {
            assert_eq!(op.offset % 4096, 0);
            assert_eq!(op.length, 4096);
            assert!(op.offset < 64 * 4096);
        }
    }

    #[test]
    fn test_continuous_stops_and_drains() {
        let mock = MockEngine::new();
        mock.set_completion_order(CompletionOrder::Lifo);
        mock.set_max_per_poll(Some(1));
        let mut cfg = config(512, 4, TransferMode::ZeroFill);
        cfg.continuous = true;
        let mut pipeline = mock_pipeline(&cfg, 512 * 3, &mock);

        for _ in 0..20 {
            pipeline.step().unwrap();
        }
        // Each step refills to four and reaps one
        assert!(!pipeline.is_finished());
        assert_eq!(pipeline.context().in_flight(), 3);

        let stop = AtomicBool::new(true);
        pipeline.run_until_stopped(&stop).unwrap();

        assert!(pipeline.is_finished());
        assert_eq!(pipeline.context().in_flight(), 0);
        assert_eq!(pipeline.pool().free_count(), 4);
        assert_eq!(mock.pending_count(), 0);
        assert_eq!(pipeline.stats().units_completed(), mock.completed_count() as u64);
        assert!(mock
            .submitted_operations()
            .iter()
            .all(|o| o.offset < 512 * 3 && o.op_type == OperationType::Write));
    }

    #[test]
    fn test_stop_drains_pending_copy_writes() {
        let mock = MockEngine::new();
        let mut pipeline = mock_pipeline(&config(512, 4, TransferMode::Copy), 512 * 100, &mock);

        // One step leaves four reads done and four writes outstanding
        pipeline.step().unwrap();
        let stop = AtomicBool::new(true);
        pipeline.run_until_stopped(&stop).unwrap();

        let ops = mock.submitted_operations();
        let reads = ops.iter().filter(|o| o.op_type == OperationType::Read).count();
        let writes = ops.iter().filter(|o| o.op_type == OperationType::Write).count();
        assert_eq!(reads, 4);
        assert_eq!(writes, 4);
        assert_eq!(pipeline.context().remaining_units(), 0);
    }

    fn copy_with_sync_engine(length: usize, block: usize) {
        let temp_dir = TempDir::new().unwrap();
        let src_path = temp_dir.path().join("src.dat");
        let dst_path = temp_dir.path().join("dst.dat");
        let data = pattern(length);
        std::fs::write(&src_path, &data).unwrap();

        let src = File::open(&src_path).unwrap();
        let dst = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&dst_path)
            .unwrap();

        let cfg = config(block, 3, TransferMode::Copy);
        let mut pipeline = Pipeline::new(
            &cfg,
            length as u64,
            Some(src.as_raw_fd()),
            Some(dst.as_raw_fd()),
            Box::new(SyncEngine::new()),
        )
        .unwrap();
        pipeline.run().unwrap();
        pipeline.shutdown().unwrap();

        assert_eq!(pipeline.stats().read_bytes(), length as u64);
        assert_eq!(pipeline.stats().write_bytes(), length as u64);
        drop(dst);
        assert_eq!(std::fs::read(&dst_path).unwrap(), data);
    }

    #[test]
    fn test_sync_copy_with_partial_last_block() {
        copy_with_sync_engine(10 * 4096 + 123, 4096);
    }

    #[test]
    fn test_sync_copy_exact_multiple() {
        copy_with_sync_engine(8 * 4096, 4096);
    }

    #[test]
    fn test_sync_short_source_is_short_transfer() {
        let temp_dir = TempDir::new().unwrap();
        let src_path = temp_dir.path().join("short.dat");
        std::fs::write(&src_path, vec![3u8; 4096 + 100]).unwrap();
        let src = File::open(&src_path).unwrap();

        // Claimed length is longer than the file, so the second block comes back short
        let cfg = config(4096, 1, TransferMode::ReadOnly);
        let mut pipeline =
            Pipeline::new(&cfg, 3 * 4096, Some(src.as_raw_fd()), None, Box::new(SyncEngine::new())).unwrap();

        match pipeline.run().unwrap_err() {
            PipelineError::ShortTransfer {
                offset,
                expected,
                transferred,
                ..
            } => {
                assert_eq!(offset, 4096);
                assert_eq!(expected, 4096);
                assert_eq!(transferred, 100);
            }
            other => panic!("expected ShortTransfer, got {:?}", other),
        }
        assert_eq!(pipeline.stats().units_completed(), 1);
        assert_pool_consistent(&pipeline);
    }

    #[test]
    fn test_sync_zero_fill_overwrites_destination() {
        let temp_dir = TempDir::new().unwrap();
        let dst_path = temp_dir.path().join("zero.dat");
        std::fs::write(&dst_path, vec![0xffu8; 5000]).unwrap();
        let dst = OpenOptions::new().write(true).open(&dst_path).unwrap();

        let cfg = config(1024, 2, TransferMode::ZeroFill);
        let mut pipeline =
            Pipeline::new(&cfg, 5000, None, Some(dst.as_raw_fd()), Box::new(SyncEngine::new())).unwrap();
        pipeline.run().unwrap();

        assert_eq!(pipeline.stats().write_ops(), 5);
        assert_eq!(pipeline.stats().read_ops(), 0);
        drop(dst);
        assert_eq!(std::fs::read(&dst_path).unwrap(), vec![0u8; 5000]);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_libaio_copy_round_trip() {
        use crate::engine::libaio::LibaioEngine;

        let temp_dir = TempDir::new().unwrap();
        let src_path = temp_dir.path().join("src.dat");
        let dst_path = temp_dir.path().join("dst.dat");
        let length = 6 * 4096 + 700;
        let data = pattern(length);
        std::fs::write(&src_path, &data).unwrap();

        let src = File::open(&src_path).unwrap();
        let dst = OpenOptions::new().write(true).create(true).open(&dst_path).unwrap();

        let cfg = config(4096, 4, TransferMode::Copy);
        let mut pipeline = match Pipeline::new(
            &cfg,
            length as u64,
            Some(src.as_raw_fd()),
            Some(dst.as_raw_fd()),
            Box::new(LibaioEngine::new()),
        ) {
            Ok(pipeline) => pipeline,
            Err(e) => {
                eprintln!("skipping: kernel AIO unavailable ({})", e);
                return;
            }
        };
        pipeline.run().unwrap();
        pipeline.shutdown().unwrap();

        drop(dst);
        assert_eq!(std::fs::read(&dst_path).unwrap(), data);
    }
}
