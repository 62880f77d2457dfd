//! Engine Events
//!
//! Events published outward for UI mirrors and other observers.

use serde::{Deserialize, Serialize};

/// Per-command view mirrored to UI collaborators
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandState {
    pub id: String,
    pub enabled: bool,
    /// Groups containing the command, in group creation order
    pub groups: Vec<String>,
}

/// An event broadcast by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum EngineEvent {
    /// One batch of enable/disable changes completed
    Toggled { commands: Vec<CommandState> },

    /// A command crossed its vote threshold
    Command { id: String },

    /// The `stop`/`reset` host command ran
    Stop,

    /// The `start` host command ran
    Start,

    /// A snapshot of available commands was written
    AvailabilityPublished { commands: Vec<String> },

    /// A plugin finished loading
    PluginLoaded { id: String },

    /// The active plugin was torn down
    PluginUnloaded { id: String },
}

impl EngineEvent {
    /// Stable event name
    pub fn name(&self) -> &'static str {
        match self {
            EngineEvent::Toggled { .. } => "toggled",
            EngineEvent::Command { .. } => "command",
            EngineEvent::Stop => "stop",
            EngineEvent::Start => "start",
            EngineEvent::AvailabilityPublished { .. } => "availabilityPublished",
            EngineEvent::PluginLoaded { .. } => "pluginLoaded",
            EngineEvent::PluginUnloaded { .. } => "pluginUnloaded",
        }
    }
}
