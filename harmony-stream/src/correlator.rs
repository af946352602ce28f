//! Request/response correlation.
//!
//! Every outbound request carries a fresh correlation id; the receive loop
//! hands inbound replies here to wake the caller parked on the matching
//! oneshot. Timeouts remove the pending entry, so a reply that arrives
//! after its caller gave up finds nothing and is dropped.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, warn};
use uuid::Uuid;

use harmony_protocol::Reply;

use crate::error::RequestError;

type PendingMap = HashMap<String, oneshot::Sender<Result<Reply, RequestError>>>;

#[derive(Default)]
pub struct Correlator {
    pending: Mutex<PendingMap>,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a correlation id for a request. The kind prefix makes wire
    /// captures readable; uniqueness comes from the uuid.
    pub fn next_id(&self, kind: &str) -> String {
        format!("{kind}-{}", Uuid::new_v4())
    }

    /// Register interest in the reply for `correlation_id`.
    pub fn register(
        &self,
        correlation_id: &str,
    ) -> oneshot::Receiver<Result<Reply, RequestError>> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(correlation_id.to_string(), tx);
        rx
    }

    /// Route an inbound reply to its waiter. Replies whose waiter already
    /// timed out or was cancelled are logged and dropped.
    pub fn resolve(&self, reply: Reply) {
        let Some(id) = reply.correlation_id.clone() else {
            debug!("dropping reply without correlation id");
            return;
        };
        let sender = self.pending.lock().remove(&id);
        match sender {
            Some(tx) => {
                if tx.send(Ok(reply)).is_err() {
                    debug!(correlation_id = %id, "waiter gone before reply arrived");
                }
            }
            None => {
                warn!(correlation_id = %id, "late or unexpected reply dropped");
            }
        }
    }

    /// Remove a pending entry, typically after the caller's deadline passed.
    pub fn cancel(&self, correlation_id: &str) {
        self.pending.lock().remove(correlation_id);
    }

    /// Fail every in-flight request. Called when the connection drops or
    /// the session shuts down.
    pub fn fail_all(&self) {
        let drained: Vec<_> = self.pending.lock().drain().collect();
        if !drained.is_empty() {
            debug!(count = drained.len(), "failing in-flight requests");
        }
        for (_, tx) in drained {
            let _ = tx.send(Err(RequestError::Disconnected));
        }
    }

    #[cfg(test)]
    fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}
