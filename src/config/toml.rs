//! TOML configuration file parsing
//!
//! A config file is a flat table of `PipelineConfig` fields; anything left
//! out keeps its default:
//!
//! ```toml
//! source = "/dev/sdb"
//! destination = "/dev/sdc"
//! mode = "copy"
//! block_size = 65536
//! concurrency = 64
//! engine = "libaio"
//!
//! [open_flags]
//! direct = true
//! ```

use super::cli::Cli;
use super::cli_convert::{apply_open_flags, cli_mode, convert_engine_kind, parse_duration, parse_size, parse_time_us};
use super::{PipelineConfig, TransferMode};
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Parse TOML configuration file
pub fn parse_toml_file(path: &Path) -> Result<PipelineConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_toml_string(&contents)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Parse TOML configuration from string
pub fn parse_toml_string(contents: &str) -> Result<PipelineConfig> {
    let config: PipelineConfig = ::toml::from_str(contents)
        .context("Failed to parse TOML configuration")?;

    Ok(config)
}

/// Merge CLI arguments with TOML configuration (CLI takes precedence)
pub fn merge_cli_with_config(cli: &Cli, mut config: PipelineConfig) -> Result<PipelineConfig> {
    if let Some(mode) = cli_mode(cli) {
        config.mode = mode;
    }

    // Positional paths are read against the final mode
    match cli.paths.as_slice() {
        [] => {}
        [only] if config.mode == TransferMode::ZeroFill => {
            config.destination = Some(only.clone());
        }
        [_, _] if config.mode == TransferMode::ZeroFill => {
            anyhow::bail!("zero-fill mode takes a single DEST path");
        }
        [_, _] if config.mode == TransferMode::ReadOnly => {
            anyhow::bail!("read-only mode takes a single SOURCE path");
        }
        [source] => {
            config.source = Some(source.clone());
        }
        [source, destination, ..] => {
            config.source = Some(source.clone());
            config.destination = Some(destination.clone());
        }
    }

    if let Some(ref s) = cli.block_size {
        config.block_size = usize::try_from(parse_size(s)?)
            .with_context(|| format!("Block size too large: {}", s))?;
    }
    if let Some(n) = cli.num_io {
        config.concurrency = n;
    }
    if let Some(ref s) = cli.alignment {
        config.alignment = usize::try_from(parse_size(s)?)
            .with_context(|| format!("Alignment too large: {}", s))?;
    }
    if let Some(ref s) = cli.size {
        config.size = Some(parse_size(s)?);
    }

    apply_open_flags(&mut config.open_flags, &cli.open_flags);

    if cli.random {
        config.random = true;
    }
    if cli.continuous {
        config.continuous = true;
    }
    if let Some(ref s) = cli.duration {
        config.duration_secs = Some(parse_duration(s)?);
    }
    if let Some(ref s) = cli.delay {
        config.delay_us = parse_time_us(s)?;
    }
    if let Some(seed) = cli.seed {
        config.seed = Some(seed);
    }
    if let Some(kind) = cli.engine {
        config.engine = convert_engine_kind(kind);
    }
    if let Some(ref path) = cli.json_output {
        config.json_output = Some(path.clone());
    }
    if cli.debug > 0 {
        config.debug = cli.debug;
    }

    Ok(config)
}
