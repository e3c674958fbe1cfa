#![allow(dead_code)]
//! Test helpers for running the full application against a scripted source.

use anyhow::Result;
use statsnap::{
    app::App, config::Config, internal_metrics::Metrics, test_utils::FakeSource,
};
use std::{sync::Arc, time::Duration};
use tokio::{sync::watch, time::timeout};

const TICK_TIMEOUT: Duration = Duration::from_secs(10);

/// A running application wired to a `FakeSource`.
pub struct TestApp {
    pub app: App,
    pub source: Arc<FakeSource>,
    pub shutdown_tx: watch::Sender<bool>,
}

impl TestApp {
    /// Waits until every sampler has completed `n` ticks.
    pub async fn wait_for_ticks(&self, n: u64) -> Result<()> {
        timeout(TICK_TIMEOUT, self.app.wait_for_ticks(n))
            .await
            .map_err(|_| anyhow::anyhow!("samplers did not complete {} ticks in time", n))?
    }

    /// Shuts down the application and waits for it to terminate.
    /// Fails if the application does not shut down within the specified timeout.
    pub async fn shutdown(self, timeout_duration: Duration) -> Result<()> {
        match timeout(timeout_duration, self.app.shutdown()).await {
            Ok(result) => result,
            Err(_) => Err(anyhow::anyhow!("App failed to shut down within the timeout")),
        }
    }
}

/// A builder for creating `TestApp` instances with specific configurations.
pub struct TestAppBuilder {
    pub config: Config,
    source: Arc<FakeSource>,
}

impl Default for TestAppBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestAppBuilder {
    pub fn new() -> Self {
        let mut config = Config::default();
        // Long enough that a snapshot taken right after a tick sees its values.
        config.sampling.interval_ms = 200;
        config.sampling.read_timeout_ms = 1_000;
        config.report.top_n = 5;

        Self {
            config,
            source: Arc::new(FakeSource::new()),
        }
    }

    pub fn with_config(mut self, update: impl FnOnce(&mut Config)) -> Self {
        update(&mut self.config);
        self
    }

    /// The source the app will read from, for scripting responses up front.
    pub fn source(&self) -> &FakeSource {
        &self.source
    }

    pub async fn start(self) -> Result<TestApp> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let app = App::builder(self.config)
            .source_override(self.source.clone())
            .metrics_override(Metrics::new())
            .build(shutdown_rx)
            .await?;

        Ok(TestApp {
            app,
            source: self.source,
            shutdown_tx,
        })
    }
}
