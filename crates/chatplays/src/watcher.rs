//! Plugin File Watcher
//!
//! Watches the scripts directory and asks the engine to reload a plugin when
//! its `<id>.js` is created or modified. The engine ignores reloads for
//! plugins other than the active one.

use std::path::Path;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::engine::EngineHandle;

/// Plugin scripts directory watcher
pub struct PluginWatcher {
    engine: EngineHandle,
    rx: mpsc::Receiver<String>,
    /// Kept alive for the lifetime of the loop
    _watcher: RecommendedWatcher,
}

impl PluginWatcher {
    pub fn new(scripts_dir: impl AsRef<Path>, engine: EngineHandle) -> Result<Self, notify::Error> {
        let scripts_dir = scripts_dir
            .as_ref()
            .canonicalize()
            .unwrap_or_else(|_| scripts_dir.as_ref().to_path_buf());
        let (tx, rx) = mpsc::channel(64);

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) => {
                    if let Some(id) = changed_plugin(&event) {
                        let _ = tx.blocking_send(id);
                    }
                }
                Err(e) => error!("Plugin watcher error: {}", e),
            }
        })?;

        watcher.watch(&scripts_dir, RecursiveMode::NonRecursive)?;
        info!(path = %scripts_dir.display(), "Watching plugin scripts");

        Ok(Self {
            engine,
            rx,
            _watcher: watcher,
        })
    }

    /// Forward changes to the engine until it stops
    pub async fn run(mut self) {
        while let Some(id) = self.rx.recv().await {
            debug!(plugin = %id, "Plugin script changed");
            if self.engine.reload(id).await.is_err() {
                break;
            }
        }
        debug!("Plugin watcher stopped");
    }
}

/// Plugin id of a created or modified `.js` file
fn changed_plugin(event: &Event) -> Option<String> {
    if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
        return None;
    }

    let path = event.paths.first()?;
    if path.extension()? != "js" {
        return None;
    }
    Some(path.file_stem()?.to_string_lossy().into_owned())
}
