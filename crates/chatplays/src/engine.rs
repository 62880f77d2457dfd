//! Engine
//!
//! The single owner of the vote aggregator, the action queue, the
//! availability publisher and the plugin host. It runs as one task that
//! processes [`EngineMsg`]s in arrival order; everything else talks to it
//! through a cloneable [`EngineHandle`] and observes it on a broadcast bus of
//! [`EngineEvent`]s.
//!
//! Between suspension points all state changes are synchronous. After each
//! message the engine pumps: it applies the capability calls the script
//! recorded and routes the aggregator's events, repeating until both are
//! empty.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use chatplays_types::{CommandState, EngineEvent, PluginConfig, SessionTunables};

use crate::commands::{
    AggregatorEvent, HostCommand, VoteAggregator, VoteOrigin, VotePolicy, seconds,
};
use crate::plugin::{Hook, HostState, LoadOutcome, PluginError, PluginHost, ScriptOp};
use crate::publisher::{AvailabilityPublisher, SnapshotSink, render_snapshot};
use crate::queue::{ActionQueue, Actuator, DEFAULT_CLICK_DELAY};
use crate::transport::ChatToken;

const COMMAND_CHANNEL_CAPACITY: usize = 256;
const EVENT_CHANNEL_CAPACITY: usize = 256;

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Engine is not running")]
    NotRunning,

    #[error("Engine dropped the reply channel")]
    ChannelClosed,

    #[error(transparent)]
    Plugin(#[from] PluginError),
}

pub type EngineResult<T> = Result<T, EngineError>;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration and messages
// ─────────────────────────────────────────────────────────────────────────────

/// Engine construction parameters
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Session-wide vote defaults
    pub tunables: SessionTunables,
    /// Render the snapshot one line per group
    pub group_commands: bool,
    pub scripts_dir: PathBuf,
    pub config_dir: PathBuf,
    /// Script heap limit in bytes
    pub memory_limit: Option<usize>,
    pub click_delay: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tunables: SessionTunables::default(),
            group_commands: true,
            scripts_dir: PathBuf::from("plugins"),
            config_dir: PathBuf::from("config"),
            memory_limit: None,
            click_delay: DEFAULT_CLICK_DELAY,
        }
    }
}

/// Point-in-time view of the engine
#[derive(Debug, Clone, PartialEq)]
pub struct EngineStatus {
    pub plugin: Option<String>,
    pub state: HostState,
    pub commands: Vec<CommandState>,
    pub available: Vec<String>,
    pub policy: VotePolicy,
    /// Actions waiting behind the one in flight
    pub queued: usize,
    pub timers: usize,
}

/// Messages processed by the engine task
pub enum EngineMsg {
    Vote {
        command: String,
        origin: VoteOrigin,
    },
    Host {
        args: Vec<String>,
    },
    Load {
        id: String,
        reply: oneshot::Sender<EngineResult<LoadOutcome>>,
    },
    /// Reload `id` if it is the active plugin
    Reload {
        id: String,
    },
    Unload {
        reply: oneshot::Sender<Option<String>>,
    },
    TimerFired {
        generation: u64,
        id: u32,
    },
    PublishComplete {
        commands: Vec<String>,
    },
    Status(oneshot::Sender<EngineStatus>),
    Shutdown(oneshot::Sender<()>),
}

// ─────────────────────────────────────────────────────────────────────────────
// Handle
// ─────────────────────────────────────────────────────────────────────────────

/// Cloneable handle to the engine task
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineMsg>,
    events: broadcast::Sender<EngineEvent>,
}

impl EngineHandle {
    async fn send(&self, msg: EngineMsg) -> EngineResult<()> {
        self.tx.send(msg).await.map_err(|_| EngineError::NotRunning)
    }

    async fn request<T>(&self, msg: EngineMsg, rx: oneshot::Receiver<T>) -> EngineResult<T> {
        self.send(msg).await?;
        rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    pub async fn vote(&self, command: impl Into<String>, origin: VoteOrigin) -> EngineResult<()> {
        self.send(EngineMsg::Vote {
            command: command.into(),
            origin,
        })
        .await
    }

    pub async fn host_command(&self, args: Vec<String>) -> EngineResult<()> {
        self.send(EngineMsg::Host { args }).await
    }

    /// Route a tokenized chat message
    pub async fn submit(&self, token: ChatToken) -> EngineResult<()> {
        match token {
            ChatToken::Vote { command, origin } => self.vote(command, origin).await,
            ChatToken::Host { args } => self.host_command(args).await,
        }
    }

    /// Load a plugin, replacing the active one
    pub async fn load(&self, id: impl Into<String>) -> EngineResult<LoadOutcome> {
        let (reply, rx) = oneshot::channel();
        let msg = EngineMsg::Load {
            id: id.into(),
            reply,
        };
        self.request(msg, rx).await?
    }

    pub async fn reload(&self, id: impl Into<String>) -> EngineResult<()> {
        self.send(EngineMsg::Reload { id: id.into() }).await
    }

    /// Unload the active plugin; returns its id
    pub async fn unload(&self) -> EngineResult<Option<String>> {
        let (reply, rx) = oneshot::channel();
        self.request(EngineMsg::Unload { reply }, rx).await
    }

    pub async fn status(&self) -> EngineResult<EngineStatus> {
        let (reply, rx) = oneshot::channel();
        self.request(EngineMsg::Status(reply), rx).await
    }

    /// Unload, let the in-flight action finish, and stop the engine task
    pub async fn shutdown(&self) -> EngineResult<()> {
        let (reply, rx) = oneshot::channel();
        self.request(EngineMsg::Shutdown(reply), rx).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }
}

impl std::fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHandle")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

/// Spawn the engine task
pub fn spawn_engine(
    config: EngineConfig,
    actuator: Arc<dyn Actuator>,
    sink: Arc<dyn SnapshotSink>,
) -> (EngineHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
    let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

    let engine = Engine::new(config, actuator, sink, tx.downgrade(), rx, events.clone());
    let task = tokio::spawn(engine.run());

    (EngineHandle { tx, events }, task)
}

// ─────────────────────────────────────────────────────────────────────────────
// Engine
// ─────────────────────────────────────────────────────────────────────────────

pub struct Engine {
    aggregator: VoteAggregator,
    queue: ActionQueue,
    publisher: AvailabilityPublisher,
    host: PluginHost,
    sink: Arc<dyn SnapshotSink>,
    tunables: SessionTunables,
    group_commands: bool,
    self_tx: mpsc::WeakSender<EngineMsg>,
    rx: mpsc::Receiver<EngineMsg>,
    events: broadcast::Sender<EngineEvent>,
}

fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

impl Engine {
    fn new(
        config: EngineConfig,
        actuator: Arc<dyn Actuator>,
        sink: Arc<dyn SnapshotSink>,
        self_tx: mpsc::WeakSender<EngineMsg>,
        rx: mpsc::Receiver<EngineMsg>,
        events: broadcast::Sender<EngineEvent>,
    ) -> Self {
        Self {
            aggregator: VoteAggregator::new(VotePolicy::from(&config.tunables)),
            queue: ActionQueue::with_click_delay(actuator, config.click_delay),
            publisher: AvailabilityPublisher::new(),
            host: PluginHost::new(config.scripts_dir, config.config_dir, config.memory_limit),
            sink,
            tunables: config.tunables,
            group_commands: config.group_commands,
            self_tx,
            rx,
            events,
        }
    }

    pub async fn run(mut self) {
        tracing::debug!("Engine started");
        while let Some(msg) = self.rx.recv().await {
            if !self.handle(msg).await {
                break;
            }
        }
        tracing::info!("Engine stopped");
    }

    /// Process one message; `false` stops the loop
    async fn handle(&mut self, msg: EngineMsg) -> bool {
        match msg {
            EngineMsg::Vote { command, origin } => {
                let outcome = self.aggregator.receive_from(&command, origin, now());
                tracing::trace!(command = %command, ?origin, ?outcome, "Vote");
                self.pump();
            }
            EngineMsg::Host { args } => self.host_command(&args),
            EngineMsg::Load { id, reply } => {
                let result = self.load(&id).await;
                let _ = reply.send(result);
            }
            EngineMsg::Reload { id } => {
                if self.host.active_id() == Some(id.as_str()) {
                    tracing::info!(plugin = %id, "Plugin changed, reloading");
                    let _ = self.load(&id).await;
                } else {
                    tracing::debug!(plugin = %id, "Ignoring change to inactive plugin");
                }
            }
            EngineMsg::Unload { reply } => {
                let id = self.unload();
                let _ = reply.send(id);
            }
            EngineMsg::TimerFired { generation, id } => {
                if self.host.fire_timer(generation, id) {
                    self.pump();
                }
            }
            EngineMsg::PublishComplete { commands } => {
                self.emit(EngineEvent::AvailabilityPublished { commands });
                if self.publisher.complete() {
                    self.start_write();
                }
            }
            EngineMsg::Status(reply) => {
                let _ = reply.send(self.status());
            }
            EngineMsg::Shutdown(reply) => {
                self.unload();
                self.queue.wait_idle().await;
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    fn emit(&self, event: EngineEvent) {
        tracing::trace!(event = event.name(), "Engine event");
        let _ = self.events.send(event);
    }

    fn status(&self) -> EngineStatus {
        let registry = self.aggregator.registry();
        EngineStatus {
            plugin: self.host.active_id().map(str::to_string),
            state: self.host.state(),
            commands: registry.states(),
            available: self.publisher.available(registry),
            policy: self.aggregator.policy(),
            queued: self.queue.len(),
            timers: self.host.session().map_or(0, |session| session.timer_count()),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Host commands
    // ─────────────────────────────────────────────────────────────────────────

    fn host_command(&mut self, args: &[String]) {
        let Some(command) = HostCommand::parse(args) else {
            tracing::debug!(?args, "Unknown host command");
            return;
        };
        match self.aggregator.apply_host_command(&command, now()) {
            Some(line) => tracing::info!("{}", line),
            None => tracing::debug!(?command, "Host command target not found"),
        }
        self.pump();
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Plugin lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    async fn load(&mut self, id: &str) -> EngineResult<LoadOutcome> {
        if self.host.state() != HostState::Unloaded {
            self.unload();
        }

        tracing::info!(plugin = %id, "Loading plugin");
        let outcome = match self.host.begin_load(id).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(plugin = %id, error = %e, "Failed to load plugin");
                return Err(e.into());
            }
        };
        if outcome == LoadOutcome::NotFound {
            return Ok(outcome);
        }

        self.pump();
        if let Some(config) = self.host.resolve_config(&self.tunables).await {
            self.apply_config(&config);
        }

        self.host.finish_load();
        tracing::info!(
            plugin = %id,
            commands = self.aggregator.registry().len(),
            "Plugin loaded"
        );
        self.emit(EngineEvent::PluginLoaded { id: id.to_string() });

        self.host.run_hook(Hook::Register);
        self.pump();
        self.reset_session();
        self.pump();

        Ok(LoadOutcome::Loaded)
    }

    fn unload(&mut self) -> Option<String> {
        let id = self.host.unload()?;
        let dropped = self.queue.clear();
        self.aggregator.reset();
        self.set_policy(self.tunables);
        self.publisher.clear();

        tracing::info!(plugin = %id, dropped_actions = dropped, "Plugin unloaded");
        self.emit(EngineEvent::PluginUnloaded { id: id.clone() });
        self.pump();
        Some(id)
    }

    /// Cancel timers, drop queued actions, then run the reset hook
    fn reset_session(&mut self) {
        self.host.cancel_timers();
        let dropped = self.queue.clear();
        if dropped > 0 {
            tracing::debug!(dropped, "Discarded queued actions");
        }
        self.host.run_hook(Hook::Reset);
    }

    fn set_policy(&mut self, tunables: SessionTunables) {
        let policy = VotePolicy::from(&tunables);
        self.aggregator.set_threshold(policy.threshold);
        self.aggregator.set_timeout(policy.timeout);
        self.aggregator.set_wait(policy.wait);
    }

    fn apply_config(&mut self, config: &PluginConfig) {
        let tunables = config.tunables(&self.tunables);
        self.aggregator.set_threshold(tunables.threshold);
        self.aggregator.set_timeout(seconds(tunables.timeout));
        self.aggregator.set_wait(seconds(tunables.wait));

        for (id, options) in &config.commands {
            if !self.aggregator.set_options(id, options) {
                tracing::debug!(command = %id, "Options for unregistered command ignored");
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Pump
    // ─────────────────────────────────────────────────────────────────────────

    fn pump(&mut self) {
        loop {
            let ops = self.host.take_ops();
            let events = self.aggregator.drain_events();
            if ops.is_empty() && events.is_empty() {
                break;
            }
            for op in ops {
                self.apply_op(op);
            }
            for event in events {
                self.route(event);
            }
        }
    }

    fn apply_op(&mut self, op: ScriptOp) {
        match op {
            ScriptOp::Register(id) => {
                let options = self
                    .host
                    .config()
                    .and_then(|config| config.commands.get(&id))
                    .cloned();
                self.aggregator.register(&id, None, options);
            }
            ScriptOp::AddToGroup { group, ids } => self.aggregator.add_to_group(&group, ids),
            ScriptOp::Execute(item) => self.queue.enqueue(item),
            ScriptOp::Availability(ids) => {
                self.publisher.declare(ids);
                self.request_publish();
            }
            ScriptOp::DefaultConfig(config) => self.host.declare_defaults(config),
            ScriptOp::Schedule { id, delay } => self.schedule_timer(id, delay),
            ScriptOp::Cancel(id) => self.host.cancel_timer(id),
        }
    }

    fn route(&mut self, event: AggregatorEvent) {
        match event {
            AggregatorEvent::Toggled => {
                let commands = self.aggregator.registry().states();
                self.emit(EngineEvent::Toggled { commands });
                self.request_publish();
            }
            AggregatorEvent::Command(id) => {
                tracing::info!(command = %id, "Command fired");
                self.emit(EngineEvent::Command { id: id.clone() });
                self.host.dispatch(&id);
            }
            AggregatorEvent::Stop => {
                self.emit(EngineEvent::Stop);
                self.reset_session();
            }
            AggregatorEvent::Start => {
                self.emit(EngineEvent::Start);
                self.host.run_hook(Hook::Start);
            }
        }
    }

    fn schedule_timer(&mut self, id: u32, delay: Duration) {
        let Some(tx) = self.self_tx.upgrade() else {
            return;
        };
        let generation = self.host.generation();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(EngineMsg::TimerFired { generation, id }).await;
        });
        self.host.track_timer(id, task.abort_handle());
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Availability snapshot
    // ─────────────────────────────────────────────────────────────────────────

    fn request_publish(&mut self) {
        if self.publisher.request() {
            self.start_write();
        }
    }

    fn start_write(&mut self) {
        let Some(tx) = self.self_tx.upgrade() else {
            return;
        };

        let registry = self.aggregator.registry();
        let available = self.publisher.available(registry);
        let contents = render_snapshot(&available, registry, self.group_commands);
        let sink = Arc::clone(&self.sink);

        tokio::spawn(async move {
            if let Err(e) = sink.write(contents).await {
                tracing::error!(error = %e, "Failed to write availability snapshot");
            }
            let _ = tx.send(EngineMsg::PublishComplete { commands: available }).await;
        });
    }
}
