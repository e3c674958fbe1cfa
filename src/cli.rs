//! Command-Line Interface (CLI) argument parsing.
//!
//! This module defines the command-line arguments for the application using the
//! `clap` crate. These arguments are parsed at startup and then merged with
//! the configuration from the `statsnap.toml` file and environment variables.

use crate::ranking::Dimension;
use clap::Parser;
use figment::{
    providers::Serialized,
    value::{Dict, Map},
    Error, Figment, Metadata, Profile, Provider,
};
use std::path::PathBuf;

/// Samples OS counters for a few ticks and prints one usage report as JSON.
#[derive(Parser, Debug, Default, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Process to report on: "all" or a pid.
    #[arg(long, value_name = "PID")]
    pub pid: Option<String>,

    /// Sampling interval in milliseconds.
    #[arg(long, value_name = "MS")]
    pub interval_ms: Option<u64>,

    /// Number of ticks to wait for before reporting.
    #[arg(long, value_name = "TICKS")]
    pub warmup_ticks: Option<u32>,

    /// Number of processes listed per ranking.
    #[arg(long, value_name = "N")]
    pub top_n: Option<usize>,

    /// Logging level (e.g. "debug").
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Print only the ranking by this dimension (cpu, cpu_user, cpu_kernel
    /// or memory) instead of the full report.
    #[arg(long, value_name = "DIMENSION")]
    pub rank: Option<Dimension>,

    /// Pretty-print the JSON output.
    #[arg(long)]
    pub pretty: bool,
}

impl Provider for Cli {
    fn metadata(&self) -> Metadata {
        Metadata::named("Command-Line Arguments")
    }

    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        // Only flags that were actually given override lower layers.
        let mut figment = Figment::new();

        if let Some(pid) = &self.pid {
            figment = figment.merge(Serialized::default("report.pid", pid));
        }
        if let Some(interval_ms) = self.interval_ms {
            figment = figment.merge(Serialized::default("sampling.interval_ms", interval_ms));
        }
        if let Some(warmup_ticks) = self.warmup_ticks {
            figment = figment.merge(Serialized::default("sampling.warmup_ticks", warmup_ticks));
        }
        if let Some(top_n) = self.top_n {
            figment = figment.merge(Serialized::default("report.top_n", top_n));
        }
        if let Some(log_level) = &self.log_level {
            figment = figment.merge(Serialized::default("log_level", log_level));
        }

        figment.data()
    }
}
