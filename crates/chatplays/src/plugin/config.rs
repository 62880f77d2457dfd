//! Plugin Config Resolution
//!
//! Combines the configuration a plugin declares with the user's persisted
//! overrides in `<config_dir>/<plugin>.json`, then fills the vote tunables the
//! result still lacks from the session settings.

use std::path::Path;

use serde::Serialize;

use chatplays_types::{PluginConfig, SessionTunables};

use super::{PluginError, PluginResult};

/// Resolve the effective configuration for a plugin
///
/// - persisted file present and valid: overlaid on the declared defaults
/// - file absent: defaults used and written out verbatim
/// - file unreadable or invalid: logged, defaults used, file left untouched
pub async fn resolve(
    path: &Path,
    declared: &PluginConfig,
    session: &SessionTunables,
) -> PluginConfig {
    let merged = match load(path).await {
        Ok(Some(persisted)) => {
            tracing::debug!(path = %path.display(), "Applying persisted plugin config");
            declared.overlay(&persisted)
        }
        Ok(None) => {
            match persist(path, declared).await {
                Ok(()) => tracing::info!(path = %path.display(), "Wrote default plugin config"),
                Err(e) => tracing::error!(error = %e, "Failed to write default plugin config"),
            }
            declared.clone()
        }
        Err(e) => {
            tracing::error!(error = %e, "Ignoring persisted plugin config");
            declared.clone()
        }
    };

    merged.with_session_fallback(session)
}

/// Read persisted overrides; `None` when the file does not exist
pub async fn load(path: &Path) -> PluginResult<Option<PluginConfig>> {
    let text = match tokio::fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(PluginError::Io {
                path: path.to_path_buf(),
                source: e,
            });
        }
    };

    serde_json::from_str(&text)
        .map(Some)
        .map_err(|e| PluginError::Config {
            path: path.to_path_buf(),
            source: e,
        })
}

/// Write a config as 4-space indented JSON
pub async fn persist(path: &Path, config: &PluginConfig) -> PluginResult<()> {
    let io_error = |source| PluginError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
        }
    }

    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    config
        .serialize(&mut serializer)
        .map_err(|e| PluginError::Config {
            path: path.to_path_buf(),
            source: e,
        })?;

    tokio::fs::write(path, buf).await.map_err(io_error)
}
