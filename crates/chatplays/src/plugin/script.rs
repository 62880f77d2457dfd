//! Plugin Script Runtime
//!
//! Wraps one QuickJS runtime and context per plugin session. The context gets
//! the native bindings and the prelude that defines the capability API, then
//! the plugin source is evaluated on top.

use rquickjs::context::EvalOptions;
use rquickjs::{Context, Ctx, Function, Object, Runtime};

use chatplays_types::PluginConfig;

use super::globals::{ScriptOp, ScriptOps, register_natives};

const PRELUDE: &str = include_str!("prelude.js");

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Errors raised by the script runtime itself
///
/// Exceptions thrown by plugin handlers are not errors at this level; they
/// are returned as messages so each one can be logged on its own.
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("Failed to create script runtime: {0}")]
    RuntimeCreation(String),

    #[error("Failed to install plugin globals: {0}")]
    Globals(String),

    #[error("Failed to evaluate {name}: {message}")]
    Eval { name: String, message: String },

    #[error("Call to {call} failed: {message}")]
    Call { call: &'static str, message: String },
}

pub type ScriptResult<T> = Result<T, ScriptError>;

/// Lifecycle hooks a plugin can register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    Reset,
    Register,
    Start,
}

impl Hook {
    pub fn as_str(&self) -> &'static str {
        match self {
            Hook::Reset => "reset",
            Hook::Register => "register",
            Hook::Start => "start",
        }
    }
}

impl std::fmt::Display for Hook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Runtime
// ─────────────────────────────────────────────────────────────────────────────

/// An isolated script context for one plugin session
pub struct ScriptRuntime {
    context: Context,
    _runtime: Runtime,
    ops: ScriptOps,
}

impl ScriptRuntime {
    /// Create a fresh runtime with the capability API installed
    pub fn new(memory_limit: Option<usize>) -> ScriptResult<Self> {
        let runtime = Runtime::new().map_err(|e| ScriptError::RuntimeCreation(e.to_string()))?;
        if let Some(limit) = memory_limit {
            runtime.set_memory_limit(limit);
        }
        let context =
            Context::full(&runtime).map_err(|e| ScriptError::RuntimeCreation(e.to_string()))?;

        let ops = ScriptOps::new();
        context.with(|ctx| {
            register_natives(&ctx, &ops).map_err(|e| ScriptError::Globals(e.to_string()))?;
            ctx.eval_with_options::<(), _>(PRELUDE, eval_options())
                .map_err(|e| ScriptError::Globals(exception_message(&ctx, e)))
        })?;

        Ok(Self {
            context,
            _runtime: runtime,
            ops,
        })
    }

    /// Evaluate plugin source in the global scope
    pub fn eval(&self, name: &str, source: &str) -> ScriptResult<()> {
        self.context.with(|ctx| {
            ctx.eval_with_options::<(), _>(source, eval_options())
                .map_err(|e| ScriptError::Eval {
                    name: name.to_string(),
                    message: exception_message(&ctx, e),
                })
        })
    }

    /// Run every handler bound to `id`; returns one message per handler that threw
    pub fn dispatch(&self, id: &str) -> ScriptResult<Vec<String>> {
        self.call_session("dispatch", |f| f.call((id.to_string(),)))
    }

    /// Run a lifecycle hook; returns the exception message if it threw
    pub fn run_hook(&self, hook: Hook) -> ScriptResult<Option<String>> {
        self.call_session("hook", |f| f.call((hook.as_str(),)))
    }

    /// Run a timer callback; unknown or cleared ids do nothing
    pub fn fire_timer(&self, id: u32) -> ScriptResult<Option<String>> {
        self.call_session("fire", |f| f.call((id,)))
    }

    /// Forget every pending timer callback
    pub fn clear_timers(&self) -> ScriptResult<()> {
        self.call_session("clearTimers", |f| f.call(()))
    }

    /// Replace the object behind the `config` global
    pub fn set_config(&self, config: &PluginConfig) -> ScriptResult<()> {
        let json = serde_json::to_string(config).map_err(|e| ScriptError::Call {
            call: "setConfig",
            message: e.to_string(),
        })?;
        self.call_session("setConfig", |f| f.call((json,)))
    }

    /// Capability calls recorded since the last take
    pub fn take_ops(&self) -> Vec<ScriptOp> {
        self.ops.take()
    }

    fn call_session<R, F>(&self, call: &'static str, f: F) -> ScriptResult<R>
    where
        F: for<'js> FnOnce(Function<'js>) -> rquickjs::Result<R>,
    {
        self.context.with(|ctx| {
            let session: Object = ctx
                .globals()
                .get("__session")
                .map_err(|e| ScriptError::Call {
                    call,
                    message: e.to_string(),
                })?;
            let function: Function = session.get(call).map_err(|e| ScriptError::Call {
                call,
                message: e.to_string(),
            })?;
            f(function).map_err(|e| ScriptError::Call {
                call,
                message: exception_message(&ctx, e),
            })
        })
    }
}

impl std::fmt::Debug for ScriptRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptRuntime").finish_non_exhaustive()
    }
}

fn eval_options() -> EvalOptions {
    let mut options = EvalOptions::default();
    options.global = true;
    options.strict = true;
    options.backtrace_barrier = true;
    options
}

/// Message of a pending exception, or the error itself
fn exception_message(ctx: &Ctx<'_>, error: rquickjs::Error) -> String {
    if !matches!(error, rquickjs::Error::Exception) {
        return error.to_string();
    }

    let value = ctx.catch();
    if let Some(exception) = value.as_exception() {
        let message = exception.message().unwrap_or_default();
        return match exception.stack() {
            Some(stack) if !stack.trim().is_empty() => format!("{message}\n{}", stack.trim_end()),
            _ => message,
        };
    }
    match value.as_string().and_then(|s| s.to_string().ok()) {
        Some(message) => message,
        None => format!("{value:?}"),
    }
}
