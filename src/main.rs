//! statsnap - one-shot system usage report
//!
//! Samples OS counters for a few ticks, prints a single JSON report to
//! stdout and exits. Logs go to stderr.

use anyhow::Result;
use clap::Parser;
use serde::Serialize;
use statsnap::{app::App, cli::Cli, config::Config};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// How long exit waits for reads still stuck on the blocking pool.
const BLOCKING_SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn to_json<T: Serialize>(value: &T, pretty: bool) -> serde_json::Result<String> {
    if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(run(cli));
    // A reader stuck in the kernel must not keep the process alive.
    runtime.shutdown_timeout(BLOCKING_SHUTDOWN_GRACE);
    result
}

async fn run(cli: Cli) -> Result<()> {
    // Load configuration by layering sources: defaults, file, environment, and CLI args.
    let config = Config::load(&cli).unwrap_or_else(|err| {
        init_tracing("info");
        error!("Failed to load configuration: {:#}", err);
        std::process::exit(1);
    });

    init_tracing(&config.log_level);

    info!("statsnap starting up...");
    info!("-------------------- Configuration --------------------");
    info!("Log Level: {}", config.log_level);
    info!("Sampling Interval: {}ms", config.sampling.interval_ms);
    info!("Warmup Ticks: {}", config.sampling.warmup_ticks);
    info!("Read Timeout: {}ms", config.sampling.read_timeout_ms);
    info!("Process Selector: {}", config.report.pid);
    info!("Top N: {}", config.report.top_n);
    info!("Filter: {:?}", config.filter.mode);
    info!("Proc Root: {}", config.procfs.proc_root.display());
    info!("-------------------------------------------------------");

    // Kept alive so the samplers only stop through `App::shutdown`.
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let app = App::builder(config.clone()).build(shutdown_rx).await?;

    let warmup = u64::from(config.sampling.warmup_ticks);
    let interrupted = tokio::select! {
        result = app.wait_for_ticks(warmup) => {
            result?;
            false
        }
        _ = tokio::signal::ctrl_c() => true,
    };
    if interrupted {
        warn!("Interrupted before the report was ready.");
        app.shutdown().await?;
        std::process::exit(130);
    }

    let selector = app.configured_selector();
    let json = match cli.rank {
        Some(dimension) => to_json(&app.top(dimension, &selector), cli.pretty)?,
        None => to_json(&app.snapshot(&selector), cli.pretty)?,
    };
    println!("{}", json);

    app.shutdown().await?;
    info!("statsnap finished.");
    Ok(())
}
