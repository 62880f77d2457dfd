//! Plugin Host
//!
//! Owns the lifecycle of the single live plugin session:
//! `Unloaded -> Loading -> Loaded -> Unloaded`. A failed load goes straight
//! back to `Unloaded`.
//!
//! The host runs script code and keeps the session's timers, but does not
//! apply what the script asks for. Callers drain [`PluginHost::take_ops`]
//! after every entry into the script.

use std::collections::HashMap;
use std::path::PathBuf;

use tokio::task::AbortHandle;

use chatplays_types::{PluginConfig, SessionTunables};

use super::config;
use super::globals::ScriptOp;
use super::script::{Hook, ScriptError, ScriptRuntime};

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid plugin config {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Script(#[from] ScriptError),
}

pub type PluginResult<T> = Result<T, PluginError>;

// ─────────────────────────────────────────────────────────────────────────────
// State
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostState {
    Unloaded,
    Loading,
    Loaded,
}

impl std::fmt::Display for HostState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HostState::Unloaded => write!(f, "unloaded"),
            HostState::Loading => write!(f, "loading"),
            HostState::Loaded => write!(f, "loaded"),
        }
    }
}

/// Result of a load request that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The script was evaluated
    Loaded,
    /// No script with that id; the host stays unloaded
    NotFound,
}

/// Live state of one loaded script
#[derive(Debug)]
pub struct PluginSession {
    id: String,
    generation: u64,
    runtime: ScriptRuntime,
    declared: PluginConfig,
    config: PluginConfig,
    timers: HashMap<u32, AbortHandle>,
}

impl PluginSession {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Resolved configuration
    pub fn config(&self) -> &PluginConfig {
        &self.config
    }

    pub fn timer_count(&self) -> usize {
        self.timers.len()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Host
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct PluginHost {
    scripts_dir: PathBuf,
    config_dir: PathBuf,
    memory_limit: Option<usize>,
    state: HostState,
    session: Option<PluginSession>,
    generation: u64,
}

impl PluginHost {
    pub fn new(
        scripts_dir: impl Into<PathBuf>,
        config_dir: impl Into<PathBuf>,
        memory_limit: Option<usize>,
    ) -> Self {
        Self {
            scripts_dir: scripts_dir.into(),
            config_dir: config_dir.into(),
            memory_limit,
            state: HostState::Unloaded,
            session: None,
            generation: 0,
        }
    }

    pub fn state(&self) -> HostState {
        self.state
    }

    pub fn session(&self) -> Option<&PluginSession> {
        self.session.as_ref()
    }

    pub fn active_id(&self) -> Option<&str> {
        self.session.as_ref().map(|session| session.id.as_str())
    }

    /// Resolved config of the live session
    pub fn config(&self) -> Option<&PluginConfig> {
        self.session.as_ref().map(|session| &session.config)
    }

    pub fn script_path(&self, id: &str) -> PathBuf {
        self.scripts_dir.join(format!("{id}.js"))
    }

    pub fn config_path(&self, id: &str) -> PathBuf {
        self.config_dir.join(format!("{id}.json"))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Enter `Loading` and evaluate `<scripts_dir>/<id>.js` in a fresh context
    ///
    /// A live session must be unloaded first. On any error the host is left
    /// `Unloaded` with no session.
    pub async fn begin_load(&mut self, id: &str) -> PluginResult<LoadOutcome> {
        self.state = HostState::Loading;
        self.generation += 1;

        let path = self.script_path(id);
        let source = match tokio::fs::read_to_string(&path).await {
            Ok(source) => source,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(plugin = %id, path = %path.display(), "No plugin loaded");
                self.state = HostState::Unloaded;
                return Ok(LoadOutcome::NotFound);
            }
            Err(e) => {
                self.state = HostState::Unloaded;
                return Err(PluginError::Io { path, source: e });
            }
        };

        let runtime = match ScriptRuntime::new(self.memory_limit)
            .and_then(|runtime| runtime.eval(&format!("{id}.js"), &source).map(|()| runtime))
        {
            Ok(runtime) => runtime,
            Err(e) => {
                self.state = HostState::Unloaded;
                return Err(e.into());
            }
        };

        tracing::debug!(plugin = %id, generation = self.generation, "Plugin script evaluated");
        self.session = Some(PluginSession {
            id: id.to_string(),
            generation: self.generation,
            runtime,
            declared: PluginConfig::default(),
            config: PluginConfig::default(),
            timers: HashMap::new(),
        });
        Ok(LoadOutcome::Loaded)
    }

    /// Record the configuration the script declared
    pub fn declare_defaults(&mut self, config: PluginConfig) {
        if let Some(session) = self.session.as_mut() {
            session.declared = config.clone();
            session.config = config;
        }
    }

    /// Resolve and install the session's effective configuration
    pub async fn resolve_config(&mut self, tunables: &SessionTunables) -> Option<PluginConfig> {
        let path = self.config_path(self.active_id()?);
        let session = self.session.as_mut()?;

        let resolved = config::resolve(&path, &session.declared, tunables).await;
        if let Err(e) = session.runtime.set_config(&resolved) {
            tracing::error!(plugin = %session.id, error = %e, "Failed to expose plugin config");
        }
        session.config = resolved.clone();
        Some(resolved)
    }

    /// Complete a load started with [`begin_load`](Self::begin_load)
    pub fn finish_load(&mut self) {
        if self.session.is_some() {
            self.state = HostState::Loaded;
        }
    }

    /// Tear down the live session; returns its id
    pub fn unload(&mut self) -> Option<String> {
        self.state = HostState::Unloaded;
        let mut session = self.session.take()?;
        for (_, handle) in session.timers.drain() {
            handle.abort();
        }
        tracing::debug!(plugin = %session.id, "Plugin session torn down");
        Some(session.id)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Script entry points
    // ─────────────────────────────────────────────────────────────────────────

    /// Invoke every handler bound to `command`, logging each failure
    pub fn dispatch(&self, command: &str) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        match session.runtime.dispatch(command) {
            Ok(errors) => {
                for error in errors {
                    tracing::error!(plugin = %session.id, command = %command, %error, "Command handler failed");
                }
            }
            Err(e) => tracing::error!(plugin = %session.id, command = %command, error = %e, "Dispatch failed"),
        }
    }

    /// Invoke a lifecycle hook if the script registered one
    pub fn run_hook(&self, hook: Hook) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        match session.runtime.run_hook(hook) {
            Ok(None) => {}
            Ok(Some(error)) => tracing::error!(plugin = %session.id, %hook, %error, "Plugin hook failed"),
            Err(e) => tracing::error!(plugin = %session.id, %hook, error = %e, "Plugin hook call failed"),
        }
    }

    /// Capability calls recorded since the last take
    pub fn take_ops(&self) -> Vec<ScriptOp> {
        self.session
            .as_ref()
            .map(|session| session.runtime.take_ops())
            .unwrap_or_default()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Timers
    // ─────────────────────────────────────────────────────────────────────────

    /// Current session generation; stale timer messages carry an older one
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn track_timer(&mut self, id: u32, handle: AbortHandle) {
        match self.session.as_mut() {
            Some(session) => {
                session.timers.insert(id, handle);
            }
            None => handle.abort(),
        }
    }

    pub fn cancel_timer(&mut self, id: u32) {
        if let Some(handle) = self
            .session
            .as_mut()
            .and_then(|session| session.timers.remove(&id))
        {
            handle.abort();
        }
    }

    /// Abort every pending timer of the live session
    pub fn cancel_timers(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let count = session.timers.len();
        for (_, handle) in session.timers.drain() {
            handle.abort();
        }
        if let Err(e) = session.runtime.clear_timers() {
            tracing::error!(plugin = %session.id, error = %e, "Failed to clear plugin timers");
        }
        if count > 0 {
            tracing::debug!(plugin = %session.id, count, "Cancelled plugin timers");
        }
    }

    /// Run an expired timer's callback
    ///
    /// Ignored when the timer belongs to an older session or was cancelled.
    pub fn fire_timer(&mut self, generation: u64, id: u32) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        if session.generation != generation || session.timers.remove(&id).is_none() {
            return false;
        }
        match session.runtime.fire_timer(id) {
            Ok(None) => {}
            Ok(Some(error)) => tracing::error!(plugin = %session.id, timer = id, %error, "Plugin timer failed"),
            Err(e) => tracing::error!(plugin = %session.id, timer = id, error = %e, "Plugin timer call failed"),
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::time::Duration;

    fn host(dir: &Path) -> PluginHost {
        PluginHost::new(dir.join("plugins"), dir.join("config"), None)
    }

    fn write_script(dir: &Path, id: &str, source: &str) {
        let scripts = dir.join("plugins");
        std::fs::create_dir_all(&scripts).unwrap();
        std::fs::write(scripts.join(format!("{id}.js")), source).unwrap();
    }

    #[tokio::test]
    async fn test_missing_script_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut host = host(dir.path());

        let outcome = host.begin_load("ghost").await.unwrap();
        assert_eq!(outcome, LoadOutcome::NotFound);
        assert_eq!(host.state(), HostState::Unloaded);
        assert!(host.session().is_none());
    }

    #[tokio::test]
    async fn test_script_error_leaves_host_unloaded() {
        let dir = tempfile::tempdir().unwrap();
        write_script(dir.path(), "broken", "command(\"a\", () => {});\nthrow new Error(\"nope\");");
        let mut host = host(dir.path());

        let err = host.begin_load("broken").await.unwrap_err();
        assert!(matches!(err, PluginError::Script(ScriptError::Eval { .. })));
        assert_eq!(host.state(), HostState::Unloaded);
        assert!(host.take_ops().is_empty());
    }

    #[tokio::test]
    async fn test_load_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        write_script(
            dir.path(),
            "demo",
            r#"
            defaultConfig({threshold: 3});
            command("boop", () => {});
            "#,
        );
        let mut host = host(dir.path());

        assert_eq!(host.begin_load("demo").await.unwrap(), LoadOutcome::Loaded);
        assert_eq!(host.state(), HostState::Loading);

        for op in host.take_ops() {
            if let ScriptOp::DefaultConfig(config) = op {
                host.declare_defaults(config);
            }
        }
        let resolved = host.resolve_config(&SessionTunables::default()).await.unwrap();
        assert_eq!(resolved.threshold, Some(3));
        assert!(dir.path().join("config").join("demo.json").exists());

        host.finish_load();
        assert_eq!(host.state(), HostState::Loaded);
        assert_eq!(host.active_id(), Some("demo"));

        assert_eq!(host.unload().as_deref(), Some("demo"));
        assert_eq!(host.state(), HostState::Unloaded);
        assert!(host.unload().is_none());
    }

    #[tokio::test]
    async fn test_stale_and_cancelled_timers_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        write_script(dir.path(), "timers", "setTimeout(() => {}, 10);");
        let mut host = host(dir.path());
        host.begin_load("timers").await.unwrap();

        let generation = host.generation();
        let task = tokio::spawn(tokio::time::sleep(Duration::from_secs(60)));
        host.track_timer(1, task.abort_handle());
        assert_eq!(host.session().unwrap().timer_count(), 1);

        assert!(!host.fire_timer(generation + 1, 1));
        assert!(host.fire_timer(generation, 1));
        assert!(!host.fire_timer(generation, 1));

        let task = tokio::spawn(tokio::time::sleep(Duration::from_secs(60)));
        host.track_timer(2, task.abort_handle());
        host.cancel_timers();
        assert!(!host.fire_timer(generation, 2));
        assert!(task.await.unwrap_err().is_cancelled());
    }
}
