//! Random block selection
//!
//! Random offset mode draws a block index, never a byte offset, so every offset
//! is a multiple of the block size and stays valid for O_DIRECT.
//!
//! The submission stage converts the index: `offset = block_num * block_size`
//!
//! # Example
//!
//! ```
//! use aiopipe::distribution::{Distribution, uniform::UniformDistribution};
//!
//! let mut dist = UniformDistribution::with_seed(1);
//! let block_num = dist.next_block(1024); // block in [0, 1024)
//! assert!(block_num < 1024);
//! ```

/// Distribution trait for block number generation
///
/// Distributions must be `Send` so a pipeline carrying one can move between
/// threads.
pub trait Distribution: Send {
    /// Next block number in `[0, num_blocks)`
    ///
    /// Returns 0 when `num_blocks` is 0.
    fn next_block(&mut self, num_blocks: u64) -> u64;
}

pub mod uniform;
