//! Hot reload of the route set
//!
//! The watcher re-reads the file after every modification and hands valid
//! configurations to the poll loop. An invalid file is reported and the
//! running configuration stays in place.

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::AppConfig;

/// Editors often write a file in several steps
const SETTLE_DELAY: Duration = Duration::from_millis(100);

pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<AppConfig>,
}

impl ConfigWatcher {
    /// Load `config_path` and start watching it
    ///
    /// Must be called from within a tokio runtime: notify delivers events on
    /// its own thread and reloads are spawned onto the current runtime.
    pub async fn new(config_path: &str) -> Result<(Self, AppConfig)> {
        let initial = AppConfig::load(config_path)
            .await
            .context("Failed to load initial config")?;

        let (tx, rx) = mpsc::channel(4);
        let runtime = Handle::current();
        let path = config_path.to_string();

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) if matches!(event.kind, EventKind::Modify(_)) => {
                    debug!("Config file modified: {:?}", event.paths);
                    runtime.spawn(reload(path.clone(), tx.clone()));
                }
                Ok(_) => {}
                Err(e) => error!("Watch error: {}", e),
            }
        })?;

        watcher
            .watch(Path::new(config_path), RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch config file: {}", config_path))?;
        info!("Watching {} for changes", config_path);

        Ok((
            Self {
                _watcher: watcher,
                rx,
            },
            initial,
        ))
    }

    /// Next valid configuration, `None` once the watcher is gone
    pub async fn next_config(&mut self) -> Option<AppConfig> {
        self.rx.recv().await
    }
}

async fn reload(path: String, tx: mpsc::Sender<AppConfig>) {
    tokio::time::sleep(SETTLE_DELAY).await;
    match AppConfig::load(&path).await {
        Ok(config) => {
            info!("Reloaded {} ({} routes)", path, config.routes.len());
            if tx.send(config).await.is_err() {
                debug!("Config receiver dropped");
            }
        }
        Err(e) => warn!("Keeping current routes, reload failed: {:#}", e),
    }
}
