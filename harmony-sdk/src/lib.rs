//! High-level async client for Logitech Harmony hubs.
//!
//! [`HarmonyClient`] is the entry point: connect to a hub, fetch its
//! activity/device catalog, start activities, send IR commands and watch
//! push notifications. The lower layers are re-exported for callers that
//! need them: `harmony-protocol` for the wire types and `harmony-stream`
//! for direct session control.

mod client;
mod error;

pub use client::HarmonyClient;
pub use error::ClientError;

pub use harmony_protocol::{
    Action, Activity, ActivityId, ChannelChangeResult, ControlGroup, Device, Function, HubConfig,
    HubEvent,
};
pub use harmony_stream::{ListenerId, ProtocolVariant, SessionConfig, SessionState};
