//! Operational helpers: logging setup, activity history, data directories.

use std::{
    collections::VecDeque,
    fs::{self, OpenOptions},
    path::{Path, PathBuf},
    sync::{Arc, Mutex as StdMutex},
};

use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};
use weft_types::{
    config::OpsConfig,
    events::{EventKind, SystemEvent},
    Result, WeftError,
};

pub fn init_tracing(config: &OpsConfig) -> Result<()> {
    let filter = EnvFilter::try_new(config.log_level.clone())
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|err| ops_error(format!("failed to create log filter: {err}")))?;

    let builder = fmt().with_env_filter(filter);
    match &config.log_file {
        Some(path) => {
            ensure_parent_dir(Path::new(path))?;
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|err| ops_error(format!("failed to open log file {path}: {err}")))?;
            builder
                .with_ansi(false)
                .with_writer(StdMutex::new(file))
                .try_init()
        }
        None => builder.with_writer(std::io::stderr).try_init(),
    }
    .map_err(|err| ops_error(format!("tracing init error: {err}")))?;
    Ok(())
}

/// Bounded in-memory history of recent system events.
#[derive(Clone)]
pub struct ActivityLog {
    events: Arc<Mutex<VecDeque<SystemEvent>>>,
    capacity: usize,
}

impl ActivityLog {
    pub const DEFAULT_CAPACITY: usize = 512;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity: capacity.max(1),
        }
    }

    pub async fn record_event(&self, event: SystemEvent) -> Result<()> {
        let mut events = self.events.lock().await;
        if events.len() == self.capacity {
            events.pop_front();
        }
        events.push_back(event);
        Ok(())
    }

    /// Oldest first.
    pub async fn snapshot_events(&self) -> Vec<SystemEvent> {
        self.events.lock().await.iter().cloned().collect()
    }

    pub async fn count_kind(&self, kind: EventKind) -> usize {
        self.events
            .lock()
            .await
            .iter()
            .filter(|event| event.kind == kind)
            .count()
    }
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Make sure the directory holding `path` exists.
pub fn ensure_parent_dir(path: &Path) -> Result<Option<PathBuf>> {
    let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return Ok(None);
    };
    fs::create_dir_all(parent)
        .map_err(|err| ops_error(format!("failed to create {}: {err}", parent.display())))?;
    info!("Data directory ready at {:?}", parent);
    Ok(Some(parent.to_path_buf()))
}

pub fn ops_error(message: impl Into<String>) -> WeftError {
    WeftError::Ops(message.into())
}
