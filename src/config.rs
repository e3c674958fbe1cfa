//! Configuration management for statsnap
//!
//! This module defines the main `Config` struct and its sub-structs,
//! responsible for holding all application settings. It uses the `figment`
//! crate to layer built-in defaults, a `statsnap.toml` file, `STATSNAP_`
//! environment variables and command-line flags, in that order.

use crate::cli::Cli;
use crate::ranking::PidSelector;
use anyhow::{bail, Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Config file read when `--config` is not given. Missing is fine.
pub const DEFAULT_CONFIG_FILE: &str = "statsnap.toml";

/// The main configuration struct for the application.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// The logging level for the application.
    pub log_level: String,
    /// How often and how carefully counters are read.
    pub sampling: SamplingConfig,
    /// What goes into the report.
    pub report: ReportConfig,
    /// Which processes are considered at all.
    pub filter: FilterConfig,
    /// Where the Linux reader finds its files.
    pub procfs: ProcfsConfig,
    /// Self-observability.
    pub metrics: MetricsConfig,
}

/// Configuration for the samplers.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct SamplingConfig {
    /// Tick period shared by all samplers, in milliseconds.
    pub interval_ms: u64,
    /// Number of CPU ticks to wait for before building the report.
    pub warmup_ticks: u32,
    /// Upper bound for a single counter read, in milliseconds.
    pub read_timeout_ms: u64,
}

impl SamplingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// Configuration for the report.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct ReportConfig {
    /// Number of processes kept per ranking dimension.
    pub top_n: usize,
    /// Number of disks listed in the disk usage summary.
    pub disk_top_n: usize,
    /// Process selector: "all" or a pid.
    pub pid: String,
    pub thresholds: ThresholdConfig,
}

/// Percentages above which a problem is reported.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct ThresholdConfig {
    pub cpu_pct: f64,
    pub kernel_pct: f64,
    pub memory_pct: f64,
}

/// How processes are filtered before ranking.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    /// No filtering.
    #[default]
    All,
    /// Keep processes above `min_cpu_pct` or `min_mem_pct`.
    Threshold,
}

/// Configuration for the process interest filter.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct FilterConfig {
    pub mode: FilterMode,
    /// Minimum share of total CPU capacity, in percent.
    pub min_cpu_pct: f64,
    /// Minimum share of total memory, in percent.
    pub min_mem_pct: f64,
}

/// Configuration for the procfs reader.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct ProcfsConfig {
    pub proc_root: PathBuf,
    pub passwd_path: PathBuf,
}

/// Configuration for internal metrics.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct MetricsConfig {
    /// Log internal metrics periodically.
    pub log_metrics: bool,
    /// The interval at which internal metrics are logged, in seconds.
    pub log_aggregation_seconds: u64,
    /// Track statsnap's own CPU and memory footprint.
    pub self_monitoring: bool,
}

impl Config {
    /// Loads the application configuration, layering defaults, the TOML
    /// file, environment variables and CLI flags.
    pub fn load(cli: &Cli) -> Result<Self> {
        let path = match &cli.config {
            Some(path) => {
                if !path.exists() {
                    bail!("Configuration file not found: {}", path.display());
                }
                path.clone()
            }
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&path))
            // e.g. STATSNAP_SAMPLING__INTERVAL_MS=500
            .merge(Env::prefixed("STATSNAP_").split("__"))
            .merge(cli.clone())
            .extract()
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the samplers cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.sampling.interval_ms == 0 {
            bail!("sampling.interval_ms must be greater than zero");
        }
        if self.sampling.read_timeout_ms == 0 {
            bail!("sampling.read_timeout_ms must be greater than zero");
        }
        self.pid_selector()?;
        let thresholds = &self.report.thresholds;
        for (name, value) in [
            ("cpu_pct", thresholds.cpu_pct),
            ("kernel_pct", thresholds.kernel_pct),
            ("memory_pct", thresholds.memory_pct),
        ] {
            if !value.is_finite() {
                bail!("report.thresholds.{} must be a finite number", name);
            }
        }
        Ok(())
    }

    /// The configured process selector.
    pub fn pid_selector(&self) -> Result<PidSelector> {
        Ok(self.report.pid.parse::<PidSelector>()?)
    }
}

// Provide a default implementation for tests and easy setup.
impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            sampling: SamplingConfig::default(),
            report: ReportConfig::default(),
            filter: FilterConfig::default(),
            procfs: ProcfsConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            interval_ms: 3_000,
            warmup_ticks: 2,
            read_timeout_ms: 1_000,
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            top_n: 1,
            disk_top_n: 5,
            pid: "all".to_string(),
            thresholds: ThresholdConfig::default(),
        }
    }
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            cpu_pct: 80.0,
            kernel_pct: 30.0,
            memory_pct: 80.0,
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            mode: FilterMode::All,
            min_cpu_pct: 1.0,
            min_mem_pct: 1.0,
        }
    }
}

impl Default for ProcfsConfig {
    fn default() -> Self {
        Self {
            proc_root: PathBuf::from("/proc"),
            passwd_path: PathBuf::from("/etc/passwd"),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            log_metrics: false,
            log_aggregation_seconds: 10,
            self_monitoring: false,
        }
    }
}
