//! Workload context
//!
//! The run's parameters plus the counters the stages share. Work is counted in
//! units: one unit is one block-sized extent (the last one may be shorter) that
//! is read, copied or written exactly once.
//!
//! In a bounded run `remaining == unstarted + in_flight` holds after every
//! stage, and the run is over when both reach zero.

use super::error::PipelineError;
use super::pool::Continuation;
use crate::config::{OffsetMode, PipelineConfig, TransferMode};
use crate::distribution::Distribution;
use crate::engine::OperationType;
use std::os::unix::io::RawFd;

/// Byte range of one unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    pub offset: u64,
    pub length: usize,
}

/// Parameters and progress counters of one run
#[derive(Debug, Clone)]
pub struct WorkloadContext {
    pub(crate) block_size: usize,
    pub(crate) concurrency: usize,
    pub(crate) alignment: usize,
    pub(crate) transfer_length: u64,
    pub(crate) mode: TransferMode,
    pub(crate) offsets: OffsetMode,
    pub(crate) continuous: bool,
    pub(crate) source: Option<RawFd>,
    pub(crate) destination: Option<RawFd>,

    total_units: u64,
    remaining: u64,
    unstarted: u64,
    in_flight: usize,
    cursor: u64,
    block_count: u64,
    halted: bool,
}

impl WorkloadContext {
    /// Build the context for `transfer_length` bytes
    ///
    /// # Errors
    ///
    /// `SetupFailed` when the parameters cannot describe a run: zero block
    /// size, concurrency or length, a missing file for the mode, a random run
    /// with fewer than two blocks, or a continuous copy.
    pub fn new(
        config: &PipelineConfig,
        transfer_length: u64,
        source: Option<RawFd>,
        destination: Option<RawFd>,
    ) -> Result<Self, PipelineError> {
        let setup = |msg: String| Err(PipelineError::SetupFailed(msg));

        if config.block_size == 0 {
            return setup("block size must be greater than 0".to_string());
        }
        if config.concurrency == 0 {
            return setup("concurrency must be at least 1".to_string());
        }
        if transfer_length == 0 {
            return setup("nothing to transfer: length is 0".to_string());
        }
        if config.mode.needs_source() && source.is_none() {
            return setup(format!("{} mode needs a source file", config.mode));
        }
        if config.mode.needs_destination() && destination.is_none() {
            return setup(format!("{} mode needs a destination file", config.mode));
        }
        if config.continuous && config.mode == TransferMode::Copy {
            return setup("continuous mode is not available for copies".to_string());
        }

        let block_size = config.block_size as u64;
        let total_units = transfer_length.div_ceil(block_size);
        let offsets = config.offset_mode();

        if offsets == OffsetMode::Random && total_units < 2 {
            return setup(format!(
                "random offsets need at least 2 blocks, {} bytes is {} block(s) of {}",
                transfer_length, total_units, block_size
            ));
        }

        Ok(Self {
            block_size: config.block_size,
            concurrency: config.concurrency,
            alignment: config.alignment,
            transfer_length,
            mode: config.mode,
            offsets,
            continuous: config.continuous,
            source,
            destination,
            total_units,
            remaining: total_units,
            unstarted: total_units,
            in_flight: 0,
            cursor: 0,
            block_count: total_units,
            halted: false,
        })
    }

    /// How many operations the submission stage may start right now
    pub fn submission_capacity(&self) -> usize {
        if self.halted {
            return 0;
        }
        let room = self.concurrency - self.in_flight;
        if self.continuous {
            room
        } else {
            room.min(self.unstarted.min(usize::MAX as u64) as usize)
        }
    }

    /// Byte range for the next unit
    ///
    /// Sequential extents follow a cursor and the last one is truncated to the
    /// transfer length; in continuous mode the cursor wraps to 0. Random
    /// extents are whole blocks drawn from `[0, block_count - 2]`, so the
    /// final, possibly partial, block is never chosen.
    pub fn next_extent(&mut self, dist: &mut dyn Distribution) -> Extent {
        let block_size = self.block_size as u64;
        match self.offsets {
            OffsetMode::Sequential => {
                let offset = self.cursor;
                let length = block_size.min(self.transfer_length - offset);
                self.cursor += length;
                if self.continuous && self.cursor >= self.transfer_length {
                    self.cursor = 0;
                }
                Extent {
                    offset,
                    length: length as usize,
                }
            }
            OffsetMode::Random => {
                let block = dist.next_block(self.block_count - 1);
                Extent {
                    offset: block * block_size,
                    length: self.block_size,
                }
            }
        }
    }

    /// Direction, file and continuation of a unit's first operation
    pub fn first_operation(&self) -> (OperationType, RawFd, Continuation) {
        // Presence of the needed file is checked in new()
        match self.mode {
            TransferMode::Copy => (OperationType::Read, self.source.unwrap_or(-1), Continuation::ReadThenWrite),
            TransferMode::ReadOnly => (OperationType::Read, self.source.unwrap_or(-1), Continuation::ReadThenDone),
            TransferMode::ZeroFill => (
                OperationType::Write,
                self.destination.unwrap_or(-1),
                Continuation::WriteThenDone,
            ),
        }
    }

    /// File the write half of a copy goes to
    pub fn destination(&self) -> RawFd {
        self.destination.unwrap_or(-1)
    }

    /// Account for `n` operations accepted by the engine
    pub fn on_submitted(&mut self, n: usize) {
        debug_assert!(n <= self.concurrency - self.in_flight);
        if !self.continuous {
            self.unstarted -= n as u64;
        }
        self.in_flight += n;
    }

    /// Account for a unit whose final operation completed
    pub fn on_unit_done(&mut self) {
        debug_assert!(self.in_flight > 0);
        self.in_flight -= 1;
        if !self.continuous {
            self.remaining -= 1;
        }
    }

    /// Stop starting new units; in-flight work still drains
    pub fn halt(&mut self) {
        if !self.continuous {
            self.remaining -= self.unstarted;
            self.unstarted = 0;
        }
        self.halted = true;
    }

    /// True once no more work will be started and none is outstanding
    pub fn is_finished(&self) -> bool {
        if self.in_flight > 0 {
            return false;
        }
        if self.continuous {
            self.halted
        } else {
            self.remaining == 0
        }
    }

    pub fn total_units(&self) -> u64 {
        self.total_units
    }

    pub fn remaining_units(&self) -> u64 {
        self.remaining
    }

    pub fn unstarted_units(&self) -> u64 {
        self.unstarted
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn block_count(&self) -> u64 {
        self.block_count
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Alignment of every descriptor buffer
    pub fn alignment(&self) -> usize {
        self.alignment
    }

    pub fn transfer_length(&self) -> u64 {
        self.transfer_length
    }

    pub fn mode(&self) -> TransferMode {
        self.mode
    }

    pub fn offset_mode(&self) -> OffsetMode {
        self.offsets
    }

    pub fn is_continuous(&self) -> bool {
        self.continuous
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }
}
