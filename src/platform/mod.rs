//! Platform-specific counter sources.

pub mod procfs;

use crate::config::ProcfsConfig;
use crate::core::CounterSource;
use std::sync::Arc;

/// The counter source for the platform statsnap was built for.
#[cfg(target_os = "linux")]
pub fn default_source(config: &ProcfsConfig) -> anyhow::Result<Arc<dyn CounterSource>> {
    use anyhow::bail;

    let source = procfs::ProcfsSource::from_config(config);
    if !source.proc_root().join("stat").is_file() {
        bail!(
            "{} does not look like a procfs mount (no stat file)",
            source.proc_root().display()
        );
    }
    Ok(Arc::new(source))
}

/// The counter source for the platform statsnap was built for.
#[cfg(not(target_os = "linux"))]
pub fn default_source(_config: &ProcfsConfig) -> anyhow::Result<Arc<dyn CounterSource>> {
    Err(crate::core::SourceError::Unsupported.into())
}
