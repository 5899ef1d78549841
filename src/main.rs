//! aiopipe CLI entry point

use aiopipe::config::{cli::Cli, cli_convert, validator, PipelineConfig};
use aiopipe::engine::{create_engine, IOEngine};
use aiopipe::output::{json, text};
use aiopipe::pipeline::Pipeline;
use aiopipe::target::Endpoints;
use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn main() -> Result<()> {
    let cli = Cli::parse_args();

    let config = cli_convert::config_from_cli(&cli)?;
    validator::validate_config(&config).context("Configuration validation failed")?;

    if cli.dry_run || config.debug >= 1 {
        print_configuration(&config);
    }
    if cli.dry_run {
        println!();
        println!("Dry run mode - configuration validated successfully");
        return Ok(());
    }

    let mut endpoints = Endpoints::open(&config)?;
    let (transfer_length, engine) = prepare(&mut endpoints, &config)?;

    let mut pipeline = match Pipeline::new(
        &config,
        transfer_length,
        endpoints.source_fd(),
        endpoints.destination_fd(),
        engine,
    ) {
        Ok(pipeline) => pipeline,
        Err(e) => fail(&mut endpoints, &e),
    };

    let result = match config.duration_secs {
        Some(secs) => {
            let stop = Arc::new(AtomicBool::new(false));
            spawn_timer(Arc::clone(&stop), Duration::from_secs(secs));
            pipeline.run_until_stopped(&stop)
        }
        None => pipeline.run(),
    };

    if config.debug >= 1 {
        eprintln!();
    }

    if let Err(e) = result {
        drop(pipeline);
        fail(&mut endpoints, &e);
    }

    pipeline.shutdown().context("Failed to release the IO engine")?;
    endpoints.close();

    text::print_results(pipeline.stats(), &config, transfer_length);

    if let Some(ref path) = config.json_output {
        let report = json::build_report(pipeline.stats(), &config, transfer_length);
        json::write_json_output(path, &report, true)?;
        println!("JSON report written to {}", path.display());
    }

    Ok(())
}

/// Resolve the length and create the engine; on failure the files are closed
/// and a destination this run created is removed
fn prepare(endpoints: &mut Endpoints, config: &PipelineConfig) -> Result<(u64, Box<dyn IOEngine>)> {
    let prepared = resolve_length(endpoints, config)
        .and_then(|length| Ok((length, create_engine(config.engine)?)));
    if prepared.is_err() {
        let _ = endpoints.abandon();
    }
    prepared
}

/// Length to transfer, checked against the block geometry
fn resolve_length(endpoints: &Endpoints, config: &PipelineConfig) -> Result<u64> {
    let length = endpoints.transfer_length(config)?;
    validator::validate_transfer_length(config, length)?;
    Ok(length)
}

/// Report a fatal pipeline error, remove a half-written new destination and exit
fn fail(endpoints: &mut Endpoints, err: &aiopipe::PipelineError) -> ! {
    eprintln!("aiopipe: {}", err);
    if let Err(cleanup) = endpoints.abandon() {
        eprintln!("aiopipe: {:#}", cleanup);
    }
    std::process::exit(1);
}

/// Raise `stop` once `after` has elapsed
fn spawn_timer(stop: Arc<AtomicBool>, after: Duration) {
    std::thread::spawn(move || {
        std::thread::sleep(after);
        stop.store(true, Ordering::Relaxed);
    });
}

fn print_configuration(config: &PipelineConfig) {
    println!("aiopipe v{}", env!("CARGO_PKG_VERSION"));
    println!("Configuration:");
    println!("  Mode:        {} ({})", config.mode, config.offset_mode());
    if let Some(ref source) = config.source {
        println!("  Source:      {}", source.display());
    }
    if let Some(ref destination) = config.destination {
        println!("  Destination: {}", destination.display());
    }
    println!("  Engine:      {}", config.engine);
    println!("  Block size:  {}", aiopipe::util::time::format_bytes(config.block_size as u64));
    println!("  In flight:   {}", config.concurrency);
    println!("  Alignment:   {}", config.alignment);
    if let Some(size) = config.size {
        println!("  Size:        {}", aiopipe::util::time::format_bytes(size));
    }
    if config.continuous {
        println!("  Continuous:  yes");
    }
    if let Some(secs) = config.duration_secs {
        println!("  Duration:    {}s", secs);
    }
    if config.delay_us > 0 {
        println!("  Delay:       {}us", config.delay_us);
    }
    let flags = config.open_flags;
    let names: Vec<&str> = [
        (flags.direct, "direct"),
        (flags.sync, "sync"),
        (flags.trunc, "trunc"),
        (flags.creat, "creat"),
        (flags.largefile, "largefile"),
    ]
    .iter()
    .filter(|(on, _)| *on)
    .map(|(_, name)| *name)
    .collect();
    if !names.is_empty() {
        println!("  Open flags:  {}", names.join(","));
    }
}
