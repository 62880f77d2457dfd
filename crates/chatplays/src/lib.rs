//! chatplays
//!
//! Aggregates crowd chat votes into rate-limited command fires and drives a
//! serialized pointer-action queue from a sandboxed plugin script.

pub mod commands;
pub mod engine;
pub mod logging;
pub mod plugin;
pub mod publisher;
pub mod queue;
pub mod settings;
pub mod transport;
pub mod watcher;

pub use commands::{HostCommand, VoteAggregator, VoteOrigin, VoteOutcome, VotePolicy};
pub use engine::{EngineConfig, EngineError, EngineHandle, EngineResult, EngineStatus, spawn_engine};
pub use plugin::{HostState, LoadOutcome, PluginError, PluginHost};
pub use publisher::{AvailabilityPublisher, FileSnapshotSink, SnapshotSink};
pub use queue::{ActionQueue, Actuator, TracingActuator};
pub use settings::{Settings, SettingsError};
pub use transport::{ChatMessage, ChatToken, tokenize};
