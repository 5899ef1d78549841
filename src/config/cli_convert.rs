//! CLI to Config conversion utilities

use crate::config::cli::{Cli, EngineKind, Mode, OpenFlag};
use crate::config::{OpenFlags, PipelineConfig, TransferMode};
use crate::engine::EngineType;
use anyhow::{Context, Result};

/// Parse a size string (e.g., "4k", "64K", "1m", "2g") to bytes
///
/// Suffixes are binary multiples and case-insensitive; a trailing "b" is
/// accepted ("4kb").
pub fn parse_size(s: &str) -> Result<u64> {
    let lower = s.trim().to_lowercase();
    let digits = match lower.strip_suffix('b') {
        Some(rest) if rest.ends_with(&['k', 'm', 'g', 't'][..]) => rest,
        _ => lower.as_str(),
    };

    let (num_str, shift) = match digits.chars().last() {
        Some('k') => (&digits[..digits.len() - 1], 10),
        Some('m') => (&digits[..digits.len() - 1], 20),
        Some('g') => (&digits[..digits.len() - 1], 30),
        Some('t') => (&digits[..digits.len() - 1], 40),
        _ => (digits, 0),
    };

    let num: u64 = num_str
        .parse()
        .with_context(|| format!("Invalid size format: {}", s))?;

    num.checked_mul(1u64 << shift)
        .ok_or_else(|| anyhow::anyhow!("Size out of range: {}", s))
}

/// Parse a duration string (e.g., "60s", "5m", "1h") to seconds
pub fn parse_duration(s: &str) -> Result<u64> {
    let lower = s.trim().to_lowercase();

    let (num_str, multiplier) = if let Some(n) = lower.strip_suffix("sec").or_else(|| lower.strip_suffix('s')) {
        (n, 1u64)
    } else if let Some(n) = lower.strip_suffix("min").or_else(|| lower.strip_suffix('m')) {
        (n, 60)
    } else if let Some(n) = lower.strip_suffix("hr").or_else(|| lower.strip_suffix('h')) {
        (n, 3600)
    } else {
        (lower.as_str(), 1)
    };

    let num: u64 = num_str
        .parse()
        .with_context(|| format!("Invalid duration format: {}", s))?;

    Ok(num * multiplier)
}

/// Parse a time string (e.g., "100us", "1ms", "2s") to microseconds
///
/// A bare number is taken as microseconds.
pub fn parse_time_us(s: &str) -> Result<u64> {
    let lower = s.trim().to_lowercase();

    let (num_str, multiplier) = if let Some(n) = lower.strip_suffix("us") {
        (n, 1u64)
    } else if let Some(n) = lower.strip_suffix("ms") {
        (n, 1000)
    } else if let Some(n) = lower.strip_suffix('s') {
        (n, 1_000_000)
    } else {
        (lower.as_str(), 1)
    };

    let num: u64 = num_str
        .parse()
        .with_context(|| format!("Invalid time format: {}", s))?;

    Ok(num * multiplier)
}

/// Convert CLI Mode to TransferMode
pub fn convert_mode(mode: Mode) -> TransferMode {
    match mode {
        Mode::Copy => TransferMode::Copy,
        Mode::ReadOnly => TransferMode::ReadOnly,
        Mode::ZeroFill => TransferMode::ZeroFill,
    }
}

/// Convert CLI EngineKind to EngineType
pub fn convert_engine_kind(kind: EngineKind) -> EngineType {
    match kind {
        EngineKind::Libaio => EngineType::Libaio,
        EngineKind::IoUring => EngineType::IoUring,
        EngineKind::Sync => EngineType::Sync,
    }
}

/// Switch on every flag in `cli_flags`
pub fn apply_open_flags(flags: &mut OpenFlags, cli_flags: &[OpenFlag]) {
    for flag in cli_flags {
        match flag {
            OpenFlag::Direct => flags.direct = true,
            OpenFlag::Sync => flags.sync = true,
            OpenFlag::Trunc => flags.trunc = true,
            OpenFlag::Creat => flags.creat = true,
            OpenFlag::Largefile => flags.largefile = true,
        }
    }
}

/// Mode selected on the command line, if any
pub fn cli_mode(cli: &Cli) -> Option<TransferMode> {
    if cli.read_only {
        Some(TransferMode::ReadOnly)
    } else if cli.zero_fill {
        Some(TransferMode::ZeroFill)
    } else {
        cli.mode.map(convert_mode)
    }
}

/// Build the run configuration: the `--config` file (or defaults) with CLI
/// flags layered on top
pub fn config_from_cli(cli: &Cli) -> Result<PipelineConfig> {
    let base = match &cli.config {
        Some(path) => crate::config::toml::parse_toml_file(path)?,
        None => PipelineConfig::default(),
    };
    crate::config::toml::merge_cli_with_config(cli, base)
}
