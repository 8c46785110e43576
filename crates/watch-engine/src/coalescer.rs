//! Bounded, latest-wins event coalescer.
//!
//! Raw change notifications arm a flush for a stream key. At most one flush is
//! pending per key; arming an already pending key replaces its action without
//! changing its position. When the pending map is full, arming a new key
//! evicts the oldest pending key first.
//!
//! Every tick swaps the pending map out for an empty one and runs the swapped
//! actions outside the lock, so `arm` calls made during a flush are never
//! blocked and start a fresh cycle.

use crate::sync::lock;
use crate::tenant::{StreamKey, TenantKey};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Churn class of a resource kind, selecting its coalescer tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TickClass {
    /// High-churn resources (pods, events, ...)
    Fast,
    /// Low-churn resources (namespaces, RBAC, storage classes, ...)
    Slow,
}

/// An owned, one-shot flush.
pub struct FlushAction(Box<dyn FnOnce() + Send>);

impl FlushAction {
    /// Wraps a closure.
    pub fn new(action: impl FnOnce() + Send + 'static) -> Self {
        Self(Box::new(action))
    }

    /// Runs the flush.
    pub fn run(self) {
        (self.0)();
    }
}

impl fmt::Debug for FlushAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FlushAction")
    }
}

#[derive(Default)]
struct Pending {
    order: VecDeque<StreamKey>,
    actions: HashMap<StreamKey, FlushAction>,
}

/// Debouncer executing at most one flush per key per tick.
pub struct Coalescer {
    name: String,
    tick: Duration,
    capacity: usize,
    pending: Mutex<Pending>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for Coalescer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coalescer")
            .field("name", &self.name)
            .field("tick", &self.tick)
            .field("capacity", &self.capacity)
            .field("pending", &self.len())
            .finish_non_exhaustive()
    }
}

impl Coalescer {
    /// Creates a stopped coalescer. A capacity of zero is treated as one.
    pub fn new(name: impl Into<String>, tick: Duration, capacity: usize) -> Self {
        Self {
            name: name.into(),
            tick,
            capacity: capacity.max(1),
            pending: Mutex::new(Pending::default()),
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
        }
    }

    /// Tick interval.
    #[must_use]
    pub fn tick(&self) -> Duration {
        self.tick
    }

    /// Arms a flush for `key`, replacing any pending action for it.
    ///
    /// Returns the key evicted to make room, if any.
    pub fn arm(&self, key: StreamKey, action: FlushAction) -> Option<StreamKey> {
        let evicted = {
            let mut pending = lock(&self.pending);
            if let Some(slot) = pending.actions.get_mut(&key) {
                *slot = action;
                return None;
            }

            let evicted = if pending.actions.len() >= self.capacity {
                let oldest = pending.order.pop_front();
                if let Some(oldest) = &oldest {
                    pending.actions.remove(oldest);
                }
                oldest
            } else {
                None
            };

            pending.order.push_back(key.clone());
            pending.actions.insert(key, action);
            evicted
        };

        if let Some(evicted) = &evicted {
            warn!("{} coalescer full, evicted pending flush for {}", self.name, evicted);
        }
        evicted
    }

    /// Runs one cycle: swaps out every pending flush and executes them in arm order.
    ///
    /// Returns the number of flushes executed.
    pub fn drain(&self) -> usize {
        let Pending { order, mut actions } = std::mem::take(&mut *lock(&self.pending));

        let mut executed = 0;
        for key in order {
            let Some(action) = actions.remove(&key) else {
                continue;
            };
            if panic::catch_unwind(AssertUnwindSafe(|| action.run())).is_err() {
                error!("{} coalescer: flush for {} panicked", self.name, key);
            }
            executed += 1;
        }
        executed
    }

    /// Spawns the tick loop. Calling it again while running is a no-op.
    pub fn start(self: &Arc<Self>) {
        let mut task = lock(&self.task);
        if task.is_some() {
            return;
        }
        let this = Arc::clone(self);
        *task = Some(tokio::spawn(async move { this.run().await }));
        info!("{} coalescer started (tick {:?})", self.name, self.tick);
    }

    /// Stops the tick loop; a flush already running completes.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Stops the tick loop and waits for it to exit.
    pub async fn shutdown(&self) {
        self.stop();
        let task = lock(&self.task).take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }

    /// Drops every pending flush of a tenant.
    pub fn remove_tenant(&self, tenant: &TenantKey) -> usize {
        let mut pending = lock(&self.pending);
        let before = pending.actions.len();
        pending.actions.retain(|key, _| key.tenant() != tenant);
        pending.order.retain(|key| key.tenant() != tenant);
        before - pending.actions.len()
    }

    /// Pending keys in arm order.
    #[must_use]
    pub fn pending_keys(&self) -> Vec<StreamKey> {
        lock(&self.pending).order.iter().cloned().collect()
    }

    /// Number of pending flushes.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.pending).actions.len()
    }

    /// True when nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        lock(&self.pending).actions.is_empty()
    }

    async fn run(&self) {
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let executed = self.drain();
                    if executed > 0 {
                        debug!("{} coalescer flushed {} streams", self.name, executed);
                    }
                }
            }
        }
        info!("{} coalescer stopped", self.name);
    }
}
