//! Manages the lifecycle of the sampler and background tasks.
use futures::future::join_all;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Spawns named tasks and awaits them all on shutdown.
///
/// Every task receives the same shutdown receiver through
/// `get_shutdown_rx` and is expected to exit once it fires.
#[derive(Clone, Debug)]
pub struct TaskManager {
    handles: Arc<Mutex<Vec<(&'static str, JoinHandle<()>)>>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl TaskManager {
    pub fn new(shutdown_rx: watch::Receiver<bool>) -> Self {
        Self {
            handles: Arc::new(Mutex::new(Vec::new())),
            shutdown_rx,
        }
    }

    pub fn spawn<F>(&self, name: &'static str, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        debug!(task_name = name, "Spawning task");
        let handle = tokio::spawn(future);
        self.handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((name, handle));
    }

    pub fn get_shutdown_rx(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// Names of the tasks spawned so far, in spawn order.
    pub fn task_names(&self) -> Vec<&'static str> {
        self.handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, _)| *name)
            .collect()
    }

    /// Waits for all managed tasks to complete. Returns the names of the
    /// tasks that panicked.
    pub async fn shutdown(self) -> Vec<&'static str> {
        let handles: Vec<_> = self
            .handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        info!(tasks = handles.len(), "TaskManager waiting for tasks to complete");

        let (names, handles): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
        let results = join_all(handles).await;

        let mut panicked = Vec::new();
        for (name, result) in names.into_iter().zip(results) {
            match result {
                Ok(()) => debug!(task_name = name, "Task shut down gracefully."),
                Err(e) => {
                    error!(task_name = name, error = %e, "Task failed during shutdown.");
                    panicked.push(name);
                }
            }
        }

        if panicked.is_empty() {
            info!("All tasks shut down gracefully.");
        }
        panicked
    }
}
