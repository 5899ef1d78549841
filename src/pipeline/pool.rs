//! Request descriptor pool
//!
//! A fixed arena of descriptors, one per allowed in-flight operation, each
//! owning its aligned buffer. Slots are handed out by index from a free list;
//! the index doubles as the `user_data` the kernel returns with a completion.
//! Nothing is allocated after construction.

use super::error::PipelineError;
use crate::engine::{IOOperation, OperationType};
use crate::util::buffer::AlignedBuffer;
use crate::util::fast_time::FastInstant;
use std::os::unix::io::RawFd;

/// What happens when a descriptor's current operation completes successfully
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuation {
    /// Read-only unit: the read was the whole unit
    ReadThenDone,
    /// Copy unit: write the same bytes to the destination next
    ReadThenWrite,
    /// Final write of a copy unit, or a zero-fill write
    WriteThenDone,
}

/// One request slot
#[derive(Debug)]
pub struct Descriptor {
    pub op_type: OperationType,
    pub fd: RawFd,
    pub offset: u64,
    pub length: usize,
    pub submitted_at: FastInstant,
    pub continuation: Continuation,
    buffer: AlignedBuffer,
}

impl Descriptor {
    fn new(buffer: AlignedBuffer) -> Self {
        Self {
            op_type: OperationType::Read,
            fd: -1,
            offset: 0,
            length: 0,
            submitted_at: FastInstant::default(),
            continuation: Continuation::ReadThenDone,
            buffer,
        }
    }

    /// Point the descriptor at a new operation; the buffer is kept as is
    #[inline]
    pub fn prepare(
        &mut self,
        op_type: OperationType,
        fd: RawFd,
        offset: u64,
        length: usize,
        continuation: Continuation,
    ) {
        debug_assert!(length <= self.buffer.size());
        self.op_type = op_type;
        self.fd = fd;
        self.offset = offset;
        self.length = length;
        self.continuation = continuation;
    }

    /// Engine request for the prepared operation
    #[inline]
    pub fn operation(&mut self, user_data: u64) -> IOOperation {
        IOOperation {
            op_type: self.op_type,
            target_fd: self.fd,
            offset: self.offset,
            buffer: self.buffer.as_mut_ptr(),
            length: self.length,
            user_data,
        }
    }

    pub fn buffer(&self) -> &AlignedBuffer {
        &self.buffer
    }
}

/// Arena of descriptors with an index free list
pub struct DescriptorPool {
    slots: Vec<Descriptor>,
    free: Vec<usize>,
    busy: Vec<bool>,
}

impl DescriptorPool {
    /// Allocate `capacity` descriptors with `buffer_size`-byte buffers
    pub fn new(capacity: usize, buffer_size: usize, alignment: usize) -> Result<Self, PipelineError> {
        if capacity == 0 {
            return Err(PipelineError::SetupFailed(
                "descriptor pool capacity must be at least 1".to_string(),
            ));
        }

        let mut slots = Vec::with_capacity(capacity);
        for i in 0..capacity {
            let buffer = AlignedBuffer::new(buffer_size, alignment).map_err(|e| {
                PipelineError::SetupFailed(format!("buffer {} of {}: {:#}", i, capacity, e))
            })?;
            slots.push(Descriptor::new(buffer));
        }

        Ok(Self {
            slots,
            // Lowest index on top so slots are handed out 0, 1, 2, ...
            free: (0..capacity).rev().collect(),
            busy: vec![false; capacity],
        })
    }

    /// Take a free slot, or None if all are in flight
    #[inline]
    pub fn acquire(&mut self) -> Option<usize> {
        let idx = self.free.pop()?;
        self.busy[idx] = true;
        Some(idx)
    }

    /// Return a slot whose operation has completed
    ///
    /// # Panics
    ///
    /// Panics if the slot is not currently acquired.
    #[inline]
    pub fn release(&mut self, idx: usize) {
        assert!(self.busy[idx], "descriptor {} released while idle", idx);
        self.busy[idx] = false;
        self.free.push(idx);
    }

    /// Whether `idx` names an acquired slot
    #[inline]
    pub fn is_busy(&self, idx: usize) -> bool {
        self.busy.get(idx).copied().unwrap_or(false)
    }

    #[inline]
    pub fn get(&self, idx: usize) -> &Descriptor {
        &self.slots[idx]
    }

    #[inline]
    pub fn get_mut(&mut self, idx: usize) -> &mut Descriptor {
        &mut self.slots[idx]
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    pub fn in_use_count(&self) -> usize {
        self.slots.len() - self.free.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_acquire_until_empty() {
        let mut pool = DescriptorPool::new(3, 4096, 512).unwrap();
        assert_eq!(pool.capacity(), 3);

        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        let c = pool.acquire().unwrap();
        assert_eq!((a, b, c), (0, 1, 2));
        assert!(pool.acquire().is_none());
        assert_eq!(pool.free_count(), 0);
        assert_eq!(pool.in_use_count(), 3);

        pool.release(b);
        assert_eq!(pool.acquire(), Some(b));
    }

    #[test]
    fn test_pool_occupancy_invariant() {
        for capacity in [1usize, 2, 7, 32] {
            let mut pool = DescriptorPool::new(capacity, 512, 512).unwrap();
            let mut held = Vec::new();

            for step in 0..(capacity * 4) {
                if step % 3 == 2 {
                    if let Some(idx) = held.pop() {
                        pool.release(idx);
                    }
                } else if let Some(idx) = pool.acquire() {
                    held.push(idx);
                }
                assert_eq!(pool.free_count() + held.len(), capacity);
                assert_eq!(pool.in_use_count(), held.len());
                assert!(pool.in_use_count() <= capacity);
            }
        }
    }

    #[test]
    fn test_acquired_slots_are_distinct() {
        let mut pool = DescriptorPool::new(16, 512, 512).unwrap();
        let mut seen: Vec<usize> = (0..16).map(|_| pool.acquire().unwrap()).collect();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), 16);
    }

    #[test]
    #[should_panic(expected = "released while idle")]
    fn test_release_idle_slot_panics() {
        let mut pool = DescriptorPool::new(2, 512, 512).unwrap();
        pool.release(0);
    }

    #[test]
    fn test_buffers_are_aligned_and_zeroed() {
        let pool = DescriptorPool::new(4, 8192, 4096).unwrap();
        for i in 0..4 {
            let buffer = pool.get(i).buffer();
            assert!(buffer.is_aligned());
            assert_eq!(buffer.alignment(), 4096);
            assert!(buffer.as_slice().iter().all(|&b| b == 0));
        }
    }

    #[test]
    fn test_bad_alignment_is_setup_failure() {
        let err = DescriptorPool::new(2, 4096, 3).err().unwrap();
        assert!(matches!(err, PipelineError::SetupFailed(_)));
    }

    #[test]
    fn test_prepare_and_operation() {
        let mut pool = DescriptorPool::new(1, 4096, 512).unwrap();
        let idx = pool.acquire().unwrap();

        let desc = pool.get_mut(idx);
        desc.prepare(OperationType::Write, 9, 8192, 100, Continuation::WriteThenDone);
        let op = desc.operation(idx as u64);

        assert_eq!(op.op_type, OperationType::Write);
        assert_eq!(op.target_fd, 9);
        assert_eq!(op.offset, 8192);
        assert_eq!(op.length, 100);
        assert_eq!(op.user_data, 0);
        assert!(!op.buffer.is_null());
    }
}
