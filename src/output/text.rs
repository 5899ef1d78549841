//! Human-readable text output

use crate::config::PipelineConfig;
use crate::stats::histogram::LatencyHistogram;
use crate::stats::PipelineStats;
use crate::util::time::{format_bytes, format_duration, format_rate, format_throughput, per_second};

/// Print run results to console
///
/// Displays:
/// - Transfer summary (mode, engine, geometry)
/// - Operations and IOPS per direction
/// - Throughput
/// - Submission batching and peak in-flight
/// - Latency percentiles per direction
pub fn print_results(stats: &PipelineStats, config: &PipelineConfig, transfer_length: u64) {
    let duration = stats.elapsed();

    println!("═══════════════════════════════════════════════════════════");
    println!("                    TRANSFER RESULTS");
    println!("═══════════════════════════════════════════════════════════");
    println!();

    println!(
        "Mode: {} ({}), engine {}",
        config.mode,
        config.offset_mode(),
        config.engine
    );
    println!(
        "Geometry: {} blocks of {}, {} in flight max",
        format_number(transfer_length.div_ceil(config.block_size as u64)),
        format_bytes(config.block_size as u64),
        config.concurrency
    );
    println!("Elapsed Time: {:.3}s", duration.as_secs_f64());
    println!();

    println!("Operations:");
    println!(
        "  Read:  {} ops ({}) - {} IOPS",
        format_number(stats.read_ops()),
        format_bytes(stats.read_bytes()),
        format_rate(per_second(stats.read_ops(), duration))
    );
    println!(
        "  Write: {} ops ({}) - {} IOPS",
        format_number(stats.write_ops()),
        format_bytes(stats.write_bytes()),
        format_rate(per_second(stats.write_ops(), duration))
    );
    println!("  Units: {}", format_number(stats.units_completed()));
    println!();

    println!("Throughput:");
    println!("  Read:  {}", format_throughput(per_second(stats.read_bytes(), duration)));
    println!("  Write: {}", format_throughput(per_second(stats.write_bytes(), duration)));
    println!();

    println!("Submission:");
    println!(
        "  io_submit calls:    {} ({:.1} ops/call)",
        format_number(stats.submit_calls()),
        stats.mean_batch_size()
    );
    println!("  io_getevents calls: {}", format_number(stats.wait_calls()));
    println!("  Peak in flight:     {}", stats.max_in_flight());
    println!();

    print_latency("Read latency", stats.read_latency());
    print_latency("Write latency", stats.write_latency());

    println!("═══════════════════════════════════════════════════════════");
}

fn print_latency(title: &str, hist: &LatencyHistogram) {
    if hist.is_empty() {
        return;
    }

    println!("{}:", title);
    let show = |d: Option<std::time::Duration>| d.map(format_duration).unwrap_or_else(|| "-".to_string());
    println!("  Min:    {}", show(hist.min()));
    println!("  Mean:   {}", show(hist.mean()));
    println!("  Max:    {}", show(hist.max()));
    for &p in &[50.0, 90.0, 99.0, 99.9] {
        println!("  p{:<5}: {}", p, show(hist.percentile(p)));
    }
    println!();
}

/// Format a number with thousands separators
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);

    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }

    result
}
