//! Plugin Hosting
//!
//! Loads one plugin script at a time into an isolated QuickJS context that
//! exposes a fixed capability API:
//!
//! - `command(id, handler)` / `addToGroup(group, ...ids)`
//! - `execute(item)` / `availabilityChanged(ids)`
//! - `defaultConfig(object)` / `config`
//! - `setTimeout(callback, ms)` / `clearTimeout(id)`
//! - `reset(cb)` / `register(cb)` / `start(cb)`
//! - `console.*`

pub mod config;
mod globals;
mod host;
mod script;

pub use globals::{ScriptOp, ScriptOps};
pub use host::{HostState, LoadOutcome, PluginError, PluginHost, PluginResult, PluginSession};
pub use script::{Hook, ScriptError, ScriptResult, ScriptRuntime};
