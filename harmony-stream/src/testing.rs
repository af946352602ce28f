//! In-memory wire for exercising a session without a hub.
//!
//! Available to unit tests and, behind the `test-support` feature, to
//! downstream crates. [`memory_wire`] returns the wire half for
//! [`Session::from_wire`](crate::Session::from_wire) and a [`MemoryHub`]
//! handle that plays the hub side: it observes every frame the session
//! writes and injects frames for the receive loop to decode.

use async_trait::async_trait;
use tokio::sync::mpsc;

use harmony_protocol::{decode_frame, DecodedMessage};

use crate::error::TransportError;
use crate::wire::{WireConnection, WireFormat, WireSink, WireStream};

/// The hub side of an in-memory wire.
pub struct MemoryHub {
    outbound: mpsc::UnboundedReceiver<String>,
    inbound: mpsc::UnboundedSender<String>,
}

impl MemoryHub {
    /// Next frame the session wrote, or `None` once the session closed
    /// its sink and all buffered frames are drained.
    pub async fn sent(&mut self) -> Option<String> {
        self.outbound.recv().await
    }

    /// Deliver a frame to the session's receive loop.
    pub fn push(&self, frame: impl Into<String>) {
        let _ = self.inbound.send(frame.into());
    }

    /// Drop the hub side, ending the session's inbound stream.
    pub fn close(self) {}
}

/// Build a connected in-memory wire speaking the given format.
pub fn memory_wire(format: WireFormat) -> (WireConnection, MemoryHub) {
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    let wire = WireConnection {
        sink: Box::new(ChannelSink {
            tx: out_tx,
            closed: false,
        }),
        stream: Box::new(ChannelStream { rx: in_rx }),
        format,
    };
    let hub = MemoryHub {
        outbound: out_rx,
        inbound: in_tx,
    };
    (wire, hub)
}

/// Fabricate an XMPP reply stanza for a captured correlation id.
pub fn iq_reply(correlation_id: &str, error_code: &str, body: &str) -> String {
    format!(
        "<iq id=\"{correlation_id}\" type=\"get\">\
         <oa xmlns=\"connect.logitech.com\" errorcode=\"{error_code}\">{body}</oa></iq>"
    )
}

/// Fabricate a WebSocket reply frame for a captured correlation id.
pub fn ws_reply(correlation_id: &str, code: u32, data: serde_json::Value) -> String {
    serde_json::json!({
        "id": correlation_id,
        "code": code,
        "data": data,
    })
    .to_string()
}

/// Extract the correlation id from a frame the session sent, for either
/// wire variant.
pub fn sent_correlation_id(frame: &str) -> Option<String> {
    let trimmed = frame.trim();
    if trimmed.starts_with('{') {
        let value: serde_json::Value = serde_json::from_str(trimmed).ok()?;
        return value
            .get("hbus")?
            .get("id")
            .and_then(|id| id.as_str())
            .map(str::to_string);
    }
    match decode_frame(trimmed) {
        DecodedMessage::Reply(reply) => reply.correlation_id,
        _ => None,
    }
}

struct ChannelSink {
    tx: mpsc::UnboundedSender<String>,
    closed: bool,
}

#[async_trait]
impl WireSink for ChannelSink {
    async fn send(&mut self, frame: String) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.tx.send(frame).map_err(|_| TransportError::Closed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.closed = true;
        Ok(())
    }
}

struct ChannelStream {
    rx: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl WireStream for ChannelStream {
    async fn next_frame(&mut self) -> Option<Result<String, TransportError>> {
        self.rx.recv().await.map(Ok)
    }
}
