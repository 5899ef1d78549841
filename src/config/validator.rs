//! Configuration validation

use super::{PipelineConfig, TransferMode};
use anyhow::Result;

/// Largest accepted block size (64 MiB)
pub const MAX_BLOCK_SIZE: usize = 64 * 1024 * 1024;

/// Largest accepted number of operations in flight
pub const MAX_CONCURRENCY: usize = 65536;

/// Validate complete configuration
///
/// Checks that depend on the transfer length live in
/// [`validate_transfer_length`], which runs once the files are open.
pub fn validate_config(config: &PipelineConfig) -> Result<()> {
    validate_sizes(config)?;
    validate_mode(config)?;
    validate_runtime(config)?;
    Ok(())
}

/// Validate block size, concurrency and alignment
pub fn validate_sizes(config: &PipelineConfig) -> Result<()> {
    if config.block_size == 0 || config.block_size > MAX_BLOCK_SIZE {
        anyhow::bail!(
            "block_size must be between 1 and {} bytes, got {}",
            MAX_BLOCK_SIZE,
            config.block_size
        );
    }

    if config.concurrency == 0 || config.concurrency > MAX_CONCURRENCY {
        anyhow::bail!(
            "concurrency must be between 1 and {}, got {}",
            MAX_CONCURRENCY,
            config.concurrency
        );
    }

    if !config.alignment.is_power_of_two() {
        anyhow::bail!("alignment must be a power of two, got {}", config.alignment);
    }

    if config.open_flags.direct && config.block_size % config.alignment != 0 {
        anyhow::bail!(
            "O_DIRECT needs block_size ({}) to be a multiple of alignment ({})",
            config.block_size,
            config.alignment
        );
    }

    if config.size == Some(0) {
        anyhow::bail!("size must be greater than 0");
    }

    Ok(())
}

/// Validate the mode against the paths and flags given
pub fn validate_mode(config: &PipelineConfig) -> Result<()> {
    if config.mode.needs_source() && config.source.is_none() {
        anyhow::bail!("{} mode needs a source path", config.mode);
    }

    if config.mode.needs_destination() && config.destination.is_none() {
        anyhow::bail!("{} mode needs a destination path", config.mode);
    }

    if config.continuous && config.mode == TransferMode::Copy {
        anyhow::bail!("continuous mode is only supported for read-only and zero-fill transfers");
    }

    if let (Some(source), Some(destination)) = (&config.source, &config.destination) {
        if config.mode == TransferMode::Copy && source == destination {
            anyhow::bail!("source and destination are the same path: {}", source.display());
        }
    }

    Ok(())
}

/// Validate runtime settings
pub fn validate_runtime(config: &PipelineConfig) -> Result<()> {
    if config.duration_secs == Some(0) {
        anyhow::bail!("duration must be at least 1 second");
    }

    if config.duration_secs.is_some() && !config.continuous && config.debug >= 1 {
        eprintln!("DEBUG: duration set without --continuous; run stops at the end of the data or the deadline");
    }

    Ok(())
}

/// Validate the resolved transfer length against the block geometry
pub fn validate_transfer_length(config: &PipelineConfig, length: u64) -> Result<()> {
    if length == 0 {
        anyhow::bail!("transfer length must be greater than 0");
    }

    let blocks = length.div_ceil(config.block_size as u64);
    if config.random && blocks < 2 {
        anyhow::bail!(
            "random offsets need at least 2 blocks, got {} ({} bytes with block_size {})",
            blocks,
            length,
            config.block_size
        );
    }

    Ok(())
}
