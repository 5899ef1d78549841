//! JSON output format
//!
//! One report per run: when it ran, what was configured, and what the
//! pipeline measured. Durations and rates carry both a raw number and a
//! human-readable string.

use crate::config::PipelineConfig;
use crate::stats::histogram::LatencyHistogram;
use crate::stats::PipelineStats;
use crate::util::time::{format_duration, format_throughput, per_second};
use crate::Result;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::time::Duration;

/// Duration with both microseconds and human-readable format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonDuration {
    pub micros: u64,
    pub human: String,
}

impl JsonDuration {
    pub fn from_duration(d: Duration) -> Self {
        Self {
            micros: d.as_micros() as u64,
            human: format_duration(d),
        }
    }
}

/// Throughput with bytes/sec and human-readable format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonThroughput {
    pub bytes_per_sec: u64,
    pub human: String,
}

impl JsonThroughput {
    pub fn new(bytes_per_sec: f64) -> Self {
        Self {
            bytes_per_sec: bytes_per_sec as u64,
            human: format_throughput(bytes_per_sec),
        }
    }
}

/// Latency statistics with percentiles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonLatency {
    pub samples: u64,
    pub min: JsonDuration,
    pub mean: JsonDuration,
    pub max: JsonDuration,
    pub p50: JsonDuration,
    pub p90: JsonDuration,
    pub p99: JsonDuration,
    pub p99_9: JsonDuration,
}

impl JsonLatency {
    /// None for a direction with no samples
    pub fn from_histogram(hist: &LatencyHistogram) -> Option<Self> {
        let at = |p: f64| JsonDuration::from_duration(hist.percentile(p).unwrap_or_default());
        Some(Self {
            samples: hist.len(),
            min: JsonDuration::from_duration(hist.min()?),
            mean: JsonDuration::from_duration(hist.mean()?),
            max: JsonDuration::from_duration(hist.max()?),
            p50: at(50.0),
            p90: at(90.0),
            p99: at(99.0),
            p99_9: at(99.9),
        })
    }
}

/// Per-direction counters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonDirection {
    pub ops: u64,
    pub bytes: u64,
    pub iops: f64,
    pub throughput: JsonThroughput,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency: Option<JsonLatency>,
}

/// Configuration echoed into the report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRunConfig {
    pub mode: String,
    pub offsets: String,
    pub engine: String,
    pub block_size: usize,
    pub concurrency: usize,
    pub alignment: usize,
    pub transfer_length: u64,
    pub continuous: bool,
    pub delay_us: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
}

/// Submission and completion call counts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonBatching {
    pub submit_calls: u64,
    pub submitted_ops: u64,
    pub mean_batch_size: f64,
    pub wait_calls: u64,
    pub max_in_flight: usize,
}

/// Complete report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonReport {
    /// RFC 3339 wall-clock time the report was built
    pub timestamp: String,
    pub config: JsonRunConfig,
    pub elapsed: JsonDuration,
    pub units_completed: u64,
    pub read: JsonDirection,
    pub write: JsonDirection,
    pub batching: JsonBatching,
}

/// Build the report for a finished run
pub fn build_report(stats: &PipelineStats, config: &PipelineConfig, transfer_length: u64) -> JsonReport {
    let elapsed = stats.elapsed();
    let direction = |ops: u64, bytes: u64, hist: &LatencyHistogram| JsonDirection {
        ops,
        bytes,
        iops: per_second(ops, elapsed),
        throughput: JsonThroughput::new(per_second(bytes, elapsed)),
        latency: JsonLatency::from_histogram(hist),
    };

    JsonReport {
        timestamp: chrono::Utc::now().to_rfc3339(),
        config: JsonRunConfig {
            mode: config.mode.to_string(),
            offsets: config.offset_mode().to_string(),
            engine: config.engine.to_string(),
            block_size: config.block_size,
            concurrency: config.concurrency,
            alignment: config.alignment,
            transfer_length,
            continuous: config.continuous,
            delay_us: config.delay_us,
            source: config.source.as_ref().map(|p| p.display().to_string()),
            destination: config.destination.as_ref().map(|p| p.display().to_string()),
        },
        elapsed: JsonDuration::from_duration(elapsed),
        units_completed: stats.units_completed(),
        read: direction(stats.read_ops(), stats.read_bytes(), stats.read_latency()),
        write: direction(stats.write_ops(), stats.write_bytes(), stats.write_latency()),
        batching: JsonBatching {
            submit_calls: stats.submit_calls(),
            submitted_ops: stats.submitted_ops(),
            mean_batch_size: stats.mean_batch_size(),
            wait_calls: stats.wait_calls(),
            max_in_flight: stats.max_in_flight(),
        },
    }
}

/// Write JSON output to file
pub fn write_json_output(output_path: &Path, report: &JsonReport, pretty: bool) -> Result<()> {
    let file = File::create(output_path)
        .with_context(|| format!("Failed to create JSON output: {}", output_path.display()))?;
    let writer = BufWriter::new(file);

    if pretty {
        serde_json::to_writer_pretty(writer, report)?;
    } else {
        serde_json::to_writer(writer, report)?;
    }

    Ok(())
}
