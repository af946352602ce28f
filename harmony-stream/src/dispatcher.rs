//! Push-event fan-out.
//!
//! The receive loop decodes `<message>` stanzas and WebSocket event frames
//! into [`HubEvent`] values and hands them here. Listeners run on the
//! receive task, so they should be quick; a panicking listener is isolated
//! so the others still run and the loop survives.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{error, trace};

use harmony_protocol::HubEvent;

type Listener = Arc<dyn Fn(&HubEvent) + Send + Sync>;

/// Handle returned by [`Dispatcher::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

#[derive(Default)]
pub struct Dispatcher {
    listeners: RwLock<Vec<(ListenerId, Listener)>>,
    next_id: AtomicU64,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&HubEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, Arc::new(listener)));
        id
    }

    pub fn unsubscribe(&self, id: ListenerId) {
        self.listeners.write().retain(|(lid, _)| *lid != id);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Deliver one event to every listener in subscription order.
    ///
    /// The listener list is snapshotted before any callback runs, so a
    /// listener may subscribe or unsubscribe (itself included) from inside
    /// its own callback without blocking the receive task.
    pub fn dispatch(&self, event: &HubEvent) {
        let listeners: Vec<(ListenerId, Listener)> = self.listeners.read().clone();
        trace!(listeners = listeners.len(), ?event, "dispatching event");
        for (id, listener) in &listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                error!(listener = id.0, "event listener panicked");
            }
        }
    }
}
