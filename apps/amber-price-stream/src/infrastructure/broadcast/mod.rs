//! Listener Fan-out and Event Bus
//!
//! Two ways of distributing updates:
//!
//! - [`ListenerRegistry`]: synchronous callbacks invoked in-line on the
//!   dispatching task. Dispatch iterates a snapshot of the registered
//!   callbacks, so registering or removing listeners from anywhere,
//!   including from inside a callback, never disturbs a dispatch already
//!   in flight. A panicking callback is contained and logged.
//! - [`EventBus`]: a tokio broadcast channel carrying [`PriceUpdateEvent`]s
//!   for host consumers that want a system-wide stream instead of a direct
//!   registration.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::domain::payload::PricePayload;
use crate::infrastructure::metrics;

/// Name of the host-environment event fired for every decoded payload.
pub const EVENT_PRICE_UPDATE: &str = "amber_websocket_event";

// =============================================================================
// Listener Registry
// =============================================================================

/// Identifier of one registration.
pub type ListenerId = u64;

type Callback<A> = Arc<dyn Fn(&A) + Send + Sync>;

struct RegistryInner<A> {
    label: &'static str,
    next_id: AtomicU64,
    listeners: Mutex<Vec<(ListenerId, Callback<A>)>>,
}

impl<A> RegistryInner<A> {
    fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }
}

/// Set of callbacks receiving `&A` on every dispatch.
pub struct ListenerRegistry<A> {
    inner: Arc<RegistryInner<A>>,
}

impl<A: 'static> ListenerRegistry<A> {
    /// Create an empty registry. `label` names it in log output.
    #[must_use]
    pub fn new(label: &'static str) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                label,
                next_id: AtomicU64::new(1),
                listeners: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Register a callback.
    ///
    /// The returned handle removes the registration; dropping the handle
    /// leaves the callback registered.
    pub fn add<F>(&self, callback: F) -> ListenerHandle
    where
        F: Fn(&A) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners.lock().push((id, Arc::new(callback)));
        tracing::trace!(registry = self.inner.label, listener_id = id, "Listener added");

        let weak: Weak<RegistryInner<A>> = Arc::downgrade(&self.inner);
        ListenerHandle {
            id,
            remover: Box::new(move |id| weak.upgrade().is_some_and(|inner| inner.remove(id))),
        }
    }

    /// Number of registered callbacks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.listeners.lock().len()
    }

    /// Whether no callbacks are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invoke every callback registered at the moment of the call.
    ///
    /// Returns how many callbacks panicked.
    pub fn dispatch(&self, arg: &A) -> usize {
        let snapshot: Vec<(ListenerId, Callback<A>)> = self.inner.listeners.lock().clone();

        let mut failures = 0;
        for (id, callback) in snapshot {
            if catch_unwind(AssertUnwindSafe(|| callback(arg))).is_err() {
                failures += 1;
                metrics::record_listener_panic(self.inner.label);
                tracing::error!(
                    registry = self.inner.label,
                    listener_id = id,
                    "Listener panicked; continuing with remaining listeners"
                );
            }
        }
        failures
    }
}

impl<A> std::fmt::Debug for ListenerRegistry<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("label", &self.inner.label)
            .field("listeners", &self.inner.listeners.lock().len())
            .finish()
    }
}

/// Removes one listener registration.
///
/// Removal is idempotent and safe from any context, including the
/// listener's own callback. It only affects dispatches that start after it.
pub struct ListenerHandle {
    id: ListenerId,
    remover: Box<dyn Fn(ListenerId) -> bool + Send + Sync>,
}

impl ListenerHandle {
    /// The registration's identifier.
    #[must_use]
    pub const fn id(&self) -> ListenerId {
        self.id
    }

    /// Deregister the listener.
    ///
    /// Returns `true` if this call removed it.
    pub fn remove(&self) -> bool {
        (self.remover)(self.id)
    }
}

impl std::fmt::Debug for ListenerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerHandle")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Event Bus
// =============================================================================

/// System-wide notification for one decoded payload.
#[derive(Debug, Clone)]
pub struct PriceUpdateEvent {
    /// Site the subscription belongs to.
    pub site_id: String,
    /// The decoded payload.
    pub payload: Arc<PricePayload>,
}

/// Broadcast channel for [`PriceUpdateEvent`]s.
#[derive(Debug)]
pub struct EventBus {
    tx: broadcast::Sender<PriceUpdateEvent>,
}

impl EventBus {
    /// Create a bus; lagging receivers lose the oldest events past `capacity`.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            tx: broadcast::channel(capacity.max(1)).0,
        }
    }

    /// Publish an event.
    ///
    /// Returns the number of receivers, or `None` if nobody is listening.
    pub fn publish(&self, event: PriceUpdateEvent) -> Option<usize> {
        self.tx.send(event).ok()
    }

    /// Get a new receiver.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PriceUpdateEvent> {
        self.tx.subscribe()
    }

    /// Number of active receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
