//! Plugin Native Bindings
//!
//! Native functions backing the capability API. They never touch engine state
//! directly: every call is recorded as a [`ScriptOp`] in the session's
//! [`ScriptOps`] buffer, and the engine applies the buffer once control
//! returns from the script.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use rquickjs::{Ctx, Function, Object, Result as JsResult};

use chatplays_types::{ActionItem, PluginConfig};

/// Name of the temporary global the prelude picks the natives up from
pub(crate) const NATIVE_GLOBAL: &str = "__native";

// ─────────────────────────────────────────────────────────────────────────────
// Recorded operations
// ─────────────────────────────────────────────────────────────────────────────

/// A capability call made by script code
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptOp {
    /// `command(id, handler)`
    Register(String),
    /// `addToGroup(group, ...ids)`
    AddToGroup { group: String, ids: Vec<String> },
    /// `execute(item)`
    Execute(ActionItem),
    /// `availabilityChanged(ids)`
    Availability(Vec<String>),
    /// `defaultConfig(object)`
    DefaultConfig(PluginConfig),
    /// `setTimeout(callback, ms)`
    Schedule { id: u32, delay: Duration },
    /// `clearTimeout(id)`
    Cancel(u32),
}

/// Per-session operation buffer shared with the native closures
#[derive(Debug, Clone, Default)]
pub struct ScriptOps {
    ops: Arc<Mutex<Vec<ScriptOp>>>,
    next_timer: Arc<AtomicU32>,
}

impl ScriptOps {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, op: ScriptOp) {
        self.ops.lock().push(op);
    }

    /// Take every recorded operation, oldest first
    pub fn take(&self) -> Vec<ScriptOp> {
        std::mem::take(&mut *self.ops.lock())
    }

    pub fn is_empty(&self) -> bool {
        self.ops.lock().is_empty()
    }

    fn next_timer_id(&self) -> u32 {
        self.next_timer.fetch_add(1, Ordering::Relaxed) + 1
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Registration
// ─────────────────────────────────────────────────────────────────────────────

/// Install the native object the prelude wraps
pub fn register_natives(ctx: &Ctx<'_>, ops: &ScriptOps) -> JsResult<()> {
    let native = Object::new(ctx.clone())?;

    let sink = ops.clone();
    native.set(
        "register",
        Function::new(ctx.clone(), move |id: String| {
            sink.push(ScriptOp::Register(id));
        })?,
    )?;

    let sink = ops.clone();
    native.set(
        "addToGroup",
        Function::new(ctx.clone(), move |group: String, ids: Vec<String>| {
            sink.push(ScriptOp::AddToGroup { group, ids });
        })?,
    )?;

    // Malformed input comes back as a message; the prelude throws it as a TypeError
    let sink = ops.clone();
    native.set(
        "execute",
        Function::new(ctx.clone(), move |json: String| -> Option<String> {
            match serde_json::from_str::<ActionItem>(&json) {
                Ok(item) => {
                    sink.push(ScriptOp::Execute(item));
                    None
                }
                Err(e) => Some(e.to_string()),
            }
        })?,
    )?;

    let sink = ops.clone();
    native.set(
        "availability",
        Function::new(ctx.clone(), move |ids: Vec<String>| {
            sink.push(ScriptOp::Availability(ids));
        })?,
    )?;

    let sink = ops.clone();
    native.set(
        "defaultConfig",
        Function::new(ctx.clone(), move |json: String| -> Option<String> {
            match serde_json::from_str::<PluginConfig>(&json) {
                Ok(config) => {
                    sink.push(ScriptOp::DefaultConfig(config));
                    None
                }
                Err(e) => Some(e.to_string()),
            }
        })?,
    )?;

    let sink = ops.clone();
    native.set(
        "schedule",
        Function::new(ctx.clone(), move |ms: f64| -> u32 {
            let id = sink.next_timer_id();
            let delay = Duration::try_from_secs_f64(ms / 1000.0).unwrap_or(Duration::ZERO);
            sink.push(ScriptOp::Schedule { id, delay });
            id
        })?,
    )?;

    let sink = ops.clone();
    native.set(
        "cancel",
        Function::new(ctx.clone(), move |id: u32| {
            sink.push(ScriptOp::Cancel(id));
        })?,
    )?;

    native.set(
        "log",
        Function::new(ctx.clone(), |level: String, msg: String| match level.as_str() {
            "error" => tracing::error!(target: "chatplays::plugin", "{}", msg),
            "warn" => tracing::warn!(target: "chatplays::plugin", "{}", msg),
            "debug" => tracing::debug!(target: "chatplays::plugin", "{}", msg),
            _ => tracing::info!(target: "chatplays::plugin", "{}", msg),
        })?,
    )?;

    ctx.globals().set(NATIVE_GLOBAL, native)?;

    Ok(())
}
