//! Async transport for the Logitech Harmony hub.
//!
//! This crate owns everything between the socket and the typed protocol in
//! `harmony-protocol`: the stanza framing codec, the XMPP and WebSocket
//! wires with their connect handshakes, the request/response correlator,
//! the push-event dispatcher and the [`Session`] that binds them together.
//!
//! A session runs one background receive task. Callers issue requests
//! through [`Session::request`] and get correlated replies back under
//! bounded deadlines; hub-initiated push events fan out to listeners
//! registered with [`Session::subscribe`].

mod codec;
mod config;
mod correlator;
mod dispatcher;
mod error;
mod session;
mod wire;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use codec::StanzaCodec;
pub use config::{ProtocolVariant, SessionConfig};
pub use correlator::Correlator;
pub use dispatcher::{Dispatcher, ListenerId};
pub use error::{ConfigurationError, ConnectError, RequestError, TransportError};
pub use session::{Session, SessionState, WEBSOCKET_PORT, XMPP_PORT};
pub use wire::{
    connect_websocket, connect_xmpp, WireConnection, WireFormat, WireSink, WireStream,
};
