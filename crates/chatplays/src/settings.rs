//! Application Settings
//!
//! Layered with figment: built-in defaults, then `chatplays.toml`, then
//! `CHATPLAYS_*` environment variables (`__` separates nested keys, e.g.
//! `CHATPLAYS_PATHS__SCRIPTS`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

use chatplays_types::SessionTunables;

use crate::engine::EngineConfig;

pub const DEFAULT_SETTINGS_FILE: &str = "chatplays.toml";
const ENV_PREFIX: &str = "CHATPLAYS_";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid settings: {0}")]
    Extract(#[from] Box<figment::Error>),
}

pub type SettingsResult<T> = Result<T, SettingsError>;

/// On-disk locations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Paths {
    /// Plugin scripts, `<id>.js`
    pub scripts: PathBuf,
    /// Persisted plugin configs, `<id>.json`
    pub plugin_configs: PathBuf,
    /// Available commands snapshot
    pub snapshot: PathBuf,
    /// `latest.log` / `previous.log`
    pub logs: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Self {
            scripts: PathBuf::from("plugins"),
            plugin_configs: PathBuf::from("config"),
            snapshot: PathBuf::from("currentcommands.txt"),
            logs: PathBuf::from("logs"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Chat channel to listen to
    pub channel: String,
    /// Plugin to load at startup
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugin: Option<String>,
    /// Votes needed to fire
    pub threshold: u32,
    /// Vote window, in seconds
    pub timeout: f64,
    /// Cooldown after a fire, in seconds
    pub wait: f64,
    pub group_commands_in_file: bool,
    pub debug: bool,
    pub log_json: bool,
    /// Default settle time before a click
    pub click_delay_ms: u64,
    /// Script heap limit in bytes, 0 for none
    pub script_memory_limit: usize,
    pub paths: Paths,
}

impl Default for Settings {
    fn default() -> Self {
        let tunables = SessionTunables::default();
        Self {
            channel: "twitch".to_string(),
            plugin: None,
            threshold: tunables.threshold,
            timeout: tunables.timeout,
            wait: tunables.wait,
            group_commands_in_file: true,
            debug: false,
            log_json: false,
            click_delay_ms: 10,
            script_memory_limit: 64 * 1024 * 1024,
            paths: Paths::default(),
        }
    }
}

impl Settings {
    /// The provider stack for a settings file
    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn load(path: &Path) -> SettingsResult<Self> {
        Self::figment(path).extract().map_err(|e| Box::new(e).into())
    }

    /// Write the defaults as TOML
    pub fn write_default(path: &Path) -> SettingsResult<()> {
        let contents = toml::to_string_pretty(&Settings::default())?;
        std::fs::write(path, contents).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn tunables(&self) -> SessionTunables {
        SessionTunables {
            threshold: self.threshold,
            timeout: self.timeout,
            wait: self.wait,
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            tunables: self.tunables(),
            group_commands: self.group_commands_in_file,
            scripts_dir: self.paths.scripts.clone(),
            config_dir: self.paths.plugin_configs.clone(),
            memory_limit: (self.script_memory_limit > 0).then_some(self.script_memory_limit),
            click_delay: Duration::from_millis(self.click_delay_ms),
        }
    }
}
