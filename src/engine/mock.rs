//! Mock IO engine for testing
//!
//! Simulates the kernel without any system calls. Buffers are never touched;
//! operations just sit in a pending list until polled. Tests use it to drive
//! the pipeline through situations a real device produces rarely or never on
//! demand: short transfers, error codes, partial batch acceptance, failed waits
//! and arbitrary completion order.
//!
//! The engine is `Clone` and all clones share state, so a test can keep a
//! handle for inspection after boxing another clone into a pipeline.
//!
//! # Example
//!
//! ```
//! use aiopipe::engine::{IOEngine, EngineConfig, IOOperation, OperationType};
//! use aiopipe::engine::mock::MockEngine;
//!
//! let mut engine = MockEngine::new();
//! engine.init(&EngineConfig::default()).unwrap();
//!
//! let op = IOOperation {
//!     op_type: OperationType::Read,
//!     target_fd: 1,
//!     offset: 0,
//!     buffer: std::ptr::null_mut(),
//!     length: 4096,
//!     user_data: 42,
//! };
//! assert_eq!(engine.submit(&[op]).unwrap(), 1);
//!
//! let mut completions = Vec::new();
//! engine.poll_completions(1, &mut completions).unwrap();
//! assert_eq!(completions[0].user_data, 42);
//! assert_eq!(completions[0].result, 4096);
//! ```

use super::{EngineCapabilities, EngineConfig, IOCompletion, IOEngine, IOOperation, OperationType};
use crate::Result;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Record of a submitted operation for testing verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationRecord {
    pub op_type: OperationType,
    pub target_fd: i32,
    pub offset: u64,
    pub length: usize,
    pub user_data: u64,
}

/// Order in which pending operations are reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionOrder {
    /// Oldest first
    Fifo,
    /// Newest first
    Lifo,
    /// Seeded random permutation of everything pending
    Shuffled(u64),
}

/// Outcome forced onto one completion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFault {
    /// Report this many bytes instead of the requested length
    Short(usize),
    /// Report `-errno`
    Errno(i32),
    /// Full length, but a nonzero secondary result
    Secondary(i64),
}

struct MockState {
    queue_depth: usize,
    pending: Vec<OperationRecord>,
    submitted: Vec<OperationRecord>,
    batch_sizes: Vec<usize>,
    max_outstanding: usize,
    completed: usize,
    order: CompletionOrder,
    rng: Option<Xoshiro256PlusPlus>,
    max_per_poll: Option<usize>,
    accept_limit: Option<usize>,
    submit_errno: Option<i32>,
    wait_errno: Option<i32>,
    bytes_per_op: usize,
    faults: HashMap<usize, MockFault>,
    type_faults: HashMap<OperationType, MockFault>,
    wait_calls: usize,
}

/// Mock IO engine for testing
#[derive(Clone)]
pub struct MockEngine {
    state: Arc<Mutex<MockState>>,
    capabilities: EngineCapabilities,
}

impl MockEngine {
    /// Create a mock engine that completes every operation in full, oldest first
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                queue_depth: 32,
                pending: Vec::new(),
                submitted: Vec::new(),
                batch_sizes: Vec::new(),
                max_outstanding: 0,
                completed: 0,
                order: CompletionOrder::Fifo,
                rng: None,
                max_per_poll: None,
                accept_limit: None,
                submit_errno: None,
                wait_errno: None,
                bytes_per_op: 0,
                faults: HashMap::new(),
                type_faults: HashMap::new(),
                wait_calls: 0,
            })),
            capabilities: EngineCapabilities {
                async_io: true,
                batch_submission: true,
                max_queue_depth: 32,
            },
        }
    }

    pub fn set_completion_order(&self, order: CompletionOrder) {
        let mut state = self.state.lock().unwrap();
        state.rng = match order {
            CompletionOrder::Shuffled(seed) => Some(Xoshiro256PlusPlus::seed_from_u64(seed)),
            _ => None,
        };
        state.order = order;
    }

    /// Report at most `n` completions per poll (None: up to queue depth)
    pub fn set_max_per_poll(&self, n: Option<usize>) {
        self.state.lock().unwrap().max_per_poll = n;
    }

    /// Accept at most `n` operations from each submitted batch
    pub fn set_accept_limit(&self, n: Option<usize>) {
        self.state.lock().unwrap().accept_limit = n;
    }

    /// Make every submit call fail with this errno
    pub fn set_submit_error(&self, errno: Option<i32>) {
        self.state.lock().unwrap().submit_errno = errno;
    }

    /// Make every wait call fail with this errno
    pub fn set_wait_error(&self, errno: Option<i32>) {
        self.state.lock().unwrap().wait_errno = errno;
    }

    /// Bytes reported for successful operations
    ///
    /// 0 (default) reports the requested length. Any other value is reported
    /// for every operation, which simulates partial reads/writes.
    pub fn set_bytes_per_op(&self, bytes: usize) {
        self.state.lock().unwrap().bytes_per_op = bytes;
    }

    /// Force the outcome of the `index`-th completion (0-based, in report order)
    pub fn inject_fault(&self, index: usize, fault: MockFault) {
        self.state.lock().unwrap().faults.insert(index, fault);
    }

    /// Force the outcome of every completion of one direction
    pub fn inject_fault_for(&self, op_type: OperationType, fault: MockFault) {
        self.state.lock().unwrap().type_faults.insert(op_type, fault);
    }

    pub fn pending_count(&self) -> usize {
        self.state.lock().unwrap().pending.len()
    }

    /// Every operation accepted so far, in submission order
    pub fn submitted_operations(&self) -> Vec<OperationRecord> {
        self.state.lock().unwrap().submitted.clone()
    }

    pub fn submitted_count(&self) -> usize {
        self.state.lock().unwrap().submitted.len()
    }

    /// Size of each batch passed to `submit`, including rejected ones
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.state.lock().unwrap().batch_sizes.clone()
    }

    /// Highest number of simultaneously pending operations observed
    pub fn max_outstanding(&self) -> usize {
        self.state.lock().unwrap().max_outstanding
    }

    pub fn completed_count(&self) -> usize {
        self.state.lock().unwrap().completed
    }

    pub fn wait_calls(&self) -> usize {
        self.state.lock().unwrap().wait_calls
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl IOEngine for MockEngine {
    fn init(&mut self, config: &EngineConfig) -> Result<()> {
        let depth = config.queue_depth.max(1);
        self.state.lock().unwrap().queue_depth = depth;
        self.capabilities.max_queue_depth = depth;
        Ok(())
    }

    fn submit(&mut self, ops: &[IOOperation]) -> Result<usize> {
        let mut state = self.state.lock().unwrap();
        state.batch_sizes.push(ops.len());

        if let Some(errno) = state.submit_errno {
            return Err(anyhow::Error::from(std::io::Error::from_raw_os_error(errno))
                .context(format!("mock submit rejected batch of {}", ops.len())));
        }

        let accepted = state.accept_limit.map_or(ops.len(), |limit| limit.min(ops.len()));
        for op in &ops[..accepted] {
            let record = OperationRecord {
                op_type: op.op_type,
                target_fd: op.target_fd,
                offset: op.offset,
                length: op.length,
                user_data: op.user_data,
            };
            state.submitted.push(record.clone());
            state.pending.push(record);
        }
        state.max_outstanding = state.max_outstanding.max(state.pending.len());

        Ok(accepted)
    }

    fn poll_completions(&mut self, _min_complete: usize, completions: &mut Vec<IOCompletion>) -> Result<usize> {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        state.wait_calls += 1;

        if let Some(errno) = state.wait_errno {
            return Err(anyhow::Error::from(std::io::Error::from_raw_os_error(errno))
                .context("mock wait failed"));
        }

        let limit = state
            .max_per_poll
            .unwrap_or(state.queue_depth)
            .min(state.queue_depth)
            .max(1);
        let count = state.pending.len().min(limit);

        for _ in 0..count {
            let idx = match state.order {
                CompletionOrder::Fifo => 0,
                CompletionOrder::Lifo => state.pending.len() - 1,
                CompletionOrder::Shuffled(_) => match state.rng.as_mut() {
                    Some(rng) => rng.gen_range(0..state.pending.len()),
                    None => 0,
                },
            };
            let op = state.pending.remove(idx);

            let fault = state
                .faults
                .remove(&state.completed)
                .or_else(|| state.type_faults.get(&op.op_type).copied());

            let full = if state.bytes_per_op == 0 { op.length } else { state.bytes_per_op };
            let (result, result2) = match fault {
                None => (full as i64, 0),
                Some(MockFault::Short(bytes)) => (bytes as i64, 0),
                Some(MockFault::Errno(errno)) => (-(errno as i64), 0),
                Some(MockFault::Secondary(code)) => (op.length as i64, code),
            };

            completions.push(IOCompletion {
                user_data: op.user_data,
                result,
                result2,
                op_type: op.op_type,
            });
            state.completed += 1;
        }

        Ok(count)
    }

    fn cleanup(&mut self) -> Result<()> {
        self.state.lock().unwrap().pending.clear();
        Ok(())
    }

    fn capabilities(&self) -> EngineCapabilities {
        self.capabilities.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(user_data: u64, op_type: OperationType) -> IOOperation {
        IOOperation {
            op_type,
            target_fd: 3,
            offset: user_data * 4096,
            buffer: std::ptr::null_mut(),
            length: 4096,
            user_data,
        }
    }

    fn engine_with_depth(depth: usize) -> MockEngine {
        let mut engine = MockEngine::new();
        engine.init(&EngineConfig { queue_depth: depth }).unwrap();
        engine
    }

    #[test]
    fn test_mock_engine_basic() {
        let mut engine = engine_with_depth(8);
        let ops: Vec<IOOperation> = (0..3).map(|i| op(i, OperationType::Read)).collect();
        assert_eq!(engine.submit(&ops).unwrap(), 3);
        assert_eq!(engine.pending_count(), 3);

        let mut completions = Vec::new();
        assert_eq!(engine.poll_completions(1, &mut completions).unwrap(), 3);
        let order: Vec<u64> = completions.iter().map(|c| c.user_data).collect();
        assert_eq!(order, vec![0, 1, 2]);
        assert!(completions.iter().all(|c| c.result == 4096 && c.result2 == 0));
        assert_eq!(engine.completed_count(), 3);
    }

    #[test]
    fn test_mock_engine_lifo_order() {
        let mut engine = engine_with_depth(8);
        engine.set_completion_order(CompletionOrder::Lifo);
        let ops: Vec<IOOperation> = (0..3).map(|i| op(i, OperationType::Read)).collect();
        engine.submit(&ops).unwrap();

        let mut completions = Vec::new();
        engine.poll_completions(1, &mut completions).unwrap();
        let order: Vec<u64> = completions.iter().map(|c| c.user_data).collect();
        assert_eq!(order, vec![2, 1, 0]);
    }

    #[test]
    fn test_mock_engine_shuffled_is_permutation() {
        let mut engine = engine_with_depth(16);
        engine.set_completion_order(CompletionOrder::Shuffled(7));
        let ops: Vec<IOOperation> = (0..10).map(|i| op(i, OperationType::Write)).collect();
        engine.submit(&ops).unwrap();

        let mut completions = Vec::new();
        engine.poll_completions(1, &mut completions).unwrap();
        let mut order: Vec<u64> = completions.iter().map(|c| c.user_data).collect();
        order.sort_unstable();
        assert_eq!(order, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_mock_engine_max_per_poll() {
        let mut engine = engine_with_depth(8);
        engine.set_max_per_poll(Some(1));
        let ops: Vec<IOOperation> = (0..2).map(|i| op(i, OperationType::Read)).collect();
        engine.submit(&ops).unwrap();

        let mut completions = Vec::new();
        assert_eq!(engine.poll_completions(1, &mut completions).unwrap(), 1);
        assert_eq!(engine.poll_completions(1, &mut completions).unwrap(), 1);
        assert_eq!(engine.wait_calls(), 2);
    }

    #[test]
    fn test_mock_engine_faults() {
        let mut engine = engine_with_depth(8);
        engine.inject_fault(0, MockFault::Short(100));
        engine.inject_fault(1, MockFault::Errno(libc::EIO));
        engine.inject_fault(2, MockFault::Secondary(5));
        let ops: Vec<IOOperation> = (0..4).map(|i| op(i, OperationType::Read)).collect();
        engine.submit(&ops).unwrap();

        let mut completions = Vec::new();
        engine.poll_completions(1, &mut completions).unwrap();
        assert_eq!(completions[0].result, 100);
        assert_eq!(completions[1].result, -(libc::EIO as i64));
        assert_eq!(completions[2].result2, 5);
        assert_eq!(completions[3].result, 4096);
    }

    #[test]
    fn test_mock_engine_fault_by_type() {
        let mut engine = engine_with_depth(8);
        engine.inject_fault_for(OperationType::Write, MockFault::Errno(libc::ENOSPC));
        engine
            .submit(&[op(0, OperationType::Read), op(1, OperationType::Write)])
            .unwrap();

        let mut completions = Vec::new();
        engine.poll_completions(1, &mut completions).unwrap();
        assert_eq!(completions[0].result, 4096);
        assert_eq!(completions[1].result, -(libc::ENOSPC as i64));
    }

    #[test]
    fn test_mock_engine_partial_acceptance() {
        let mut engine = engine_with_depth(8);
        engine.set_accept_limit(Some(2));
        let ops: Vec<IOOperation> = (0..5).map(|i| op(i, OperationType::Read)).collect();
        assert_eq!(engine.submit(&ops).unwrap(), 2);
        assert_eq!(engine.pending_count(), 2);
        assert_eq!(engine.batch_sizes(), vec![5]);
    }

    #[test]
    fn test_mock_engine_wait_and_submit_errors() {
        let mut engine = engine_with_depth(8);
        engine.set_submit_error(Some(libc::EAGAIN));
        assert!(engine.submit(&[op(0, OperationType::Read)]).is_err());

        engine.set_submit_error(None);
        engine.submit(&[op(0, OperationType::Read)]).unwrap();
        engine.set_wait_error(Some(libc::EINTR));
        let mut completions = Vec::new();
        let err = engine.poll_completions(1, &mut completions).unwrap_err();
        assert_eq!(
            err.downcast_ref::<std::io::Error>().and_then(|e| e.raw_os_error()),
            Some(libc::EINTR)
        );
    }

    #[test]
    fn test_mock_engine_clones_share_state() {
        let handle = engine_with_depth(4);
        let mut boxed: Box<dyn IOEngine> = Box::new(handle.clone());
        boxed.submit(&[op(0, OperationType::Read)]).unwrap();
        assert_eq!(handle.submitted_count(), 1);
        assert_eq!(handle.max_outstanding(), 1);
    }
}
