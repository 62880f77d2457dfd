//! Action Queue
//!
//! A FIFO of timed actuator operations drained by a single task. At most one
//! item is in flight system-wide: the drain loop awaits each operation (and
//! any artificial delay) before taking the next one, and yields to the
//! scheduler between items instead of recursing.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;

use chatplays_types::{ActionItem, Point, SMOOTH_MOVE_SPEED};

/// Settle delay before a click when the item does not specify one
pub const DEFAULT_CLICK_DELAY: Duration = Duration::from_millis(10);

// ─────────────────────────────────────────────────────────────────────────────
// Actuator
// ─────────────────────────────────────────────────────────────────────────────

/// Pointer driver the queue drains into
#[async_trait]
pub trait Actuator: Send + Sync + 'static {
    /// Jump to a point
    async fn move_to(&self, point: Point) -> anyhow::Result<()>;

    /// Interpolated move to a point
    async fn move_smooth(&self, point: Point, speed: f64) -> anyhow::Result<()>;

    /// Click at a point the pointer already sits on
    async fn click(&self, point: Point) -> anyhow::Result<()>;
}

/// Actuator that only logs what it would do
#[derive(Debug, Default, Clone)]
pub struct TracingActuator;

#[async_trait]
impl Actuator for TracingActuator {
    async fn move_to(&self, point: Point) -> anyhow::Result<()> {
        tracing::info!(target: "chatplays::actuator", %point, "move");
        Ok(())
    }

    async fn move_smooth(&self, point: Point, speed: f64) -> anyhow::Result<()> {
        tracing::info!(target: "chatplays::actuator", %point, speed, "smooth move");
        Ok(())
    }

    async fn click(&self, point: Point) -> anyhow::Result<()> {
        tracing::info!(target: "chatplays::actuator", %point, "click");
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Queue
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct QueueState {
    items: VecDeque<ActionItem>,
    draining: bool,
}

struct QueueInner {
    state: Mutex<QueueState>,
    /// Mirrors `!state.draining`; only written while `state` is locked
    idle: watch::Sender<bool>,
    actuator: Arc<dyn Actuator>,
    click_delay: Duration,
}

/// Serialized actuator queue
///
/// Cloning gives another handle to the same queue.
#[derive(Clone)]
pub struct ActionQueue {
    inner: Arc<QueueInner>,
}

impl ActionQueue {
    pub fn new(actuator: Arc<dyn Actuator>) -> Self {
        Self::with_click_delay(actuator, DEFAULT_CLICK_DELAY)
    }

    pub fn with_click_delay(actuator: Arc<dyn Actuator>, click_delay: Duration) -> Self {
        let (idle, _) = watch::channel(true);
        Self {
            inner: Arc::new(QueueInner {
                state: Mutex::new(QueueState::default()),
                idle,
                actuator,
                click_delay,
            }),
        }
    }

    /// Append an item, starting the drain loop if it is idle
    ///
    /// Must be called from within a tokio runtime.
    pub fn enqueue(&self, item: ActionItem) {
        let start = {
            let mut state = self.inner.state.lock();
            state.items.push_back(item);
            let start = !std::mem::replace(&mut state.draining, true);
            if start {
                self.inner.idle.send_replace(false);
            }
            start
        };

        if start {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(drain(inner));
        }
    }

    /// Drop every item that has not started; an in-flight item finishes
    pub fn clear(&self) -> usize {
        let mut state = self.inner.state.lock();
        let dropped = state.items.len();
        state.items.clear();
        dropped
    }

    /// Items waiting behind the one in flight
    pub fn len(&self) -> usize {
        self.inner.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_idle(&self) -> bool {
        !self.inner.state.lock().draining
    }

    /// Resolve once the drain loop has stopped
    pub async fn wait_idle(&self) {
        let mut rx = self.inner.idle.subscribe();
        let _ = rx.wait_for(|idle| *idle).await;
    }
}

impl std::fmt::Debug for ActionQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("ActionQueue")
            .field("pending", &state.items.len())
            .field("draining", &state.draining)
            .finish()
    }
}

async fn drain(inner: Arc<QueueInner>) {
    loop {
        let next = {
            let mut state = inner.state.lock();
            let next = state.items.pop_front();
            if next.is_none() {
                // Flag and signal change together under the lock
                state.draining = false;
                inner.idle.send_replace(true);
            }
            next
        };

        let Some(item) = next else {
            return;
        };

        tracing::debug!(kind = item.kind(), point = ?item.point(), "Executing queued action");
        if let Err(e) = execute(&inner, &item).await {
            tracing::warn!(kind = item.kind(), error = %e, "Actuator operation failed");
        }

        tokio::task::yield_now().await;
    }
}

async fn execute(inner: &QueueInner, item: &ActionItem) -> anyhow::Result<()> {
    let actuator = &inner.actuator;
    match *item {
        ActionItem::Delay { ms } => {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
        ActionItem::Click { x, y, delay } => {
            let point = Point::new(x, y);
            let settle = delay.map_or(inner.click_delay, Duration::from_millis);
            actuator.move_to(point).await?;
            tokio::time::sleep(settle).await;
            actuator.click(point).await?;
        }
        ActionItem::InstantMove { x, y } => {
            actuator.move_to(Point::new(x, y)).await?;
        }
        ActionItem::SmoothMove { x, y } => {
            actuator.move_smooth(Point::new(x, y), SMOOTH_MOVE_SPEED).await?;
        }
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
