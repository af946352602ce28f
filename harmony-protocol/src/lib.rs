//! Wire codec and data model for the Logitech Harmony hub protocol
//!
//! This crate is the pure, transport-free half of the Harmony SDK: typed
//! request kinds with their exact wire bodies, envelope construction for
//! both the XMPP and WebSocket variants, decoding of inbound frames into a
//! closed [`DecodedMessage`] set, the hub configuration model, and the
//! push-notification taxonomy.
//!
//! Nothing here performs I/O; the `harmony-sdk-stream` crate owns the
//! connection and feeds frames through [`decode_frame`].

mod activity;
mod config;
mod envelope;
mod error;
mod event;
mod message;
mod reply;
mod request;

pub use activity::ActivityId;
pub use config::{Action, Activity, ControlGroup, Device, Function, HubConfig};
pub use envelope::{encode_iq, encode_ws};
pub use error::{ProtocolError, Result};
pub use event::{parse_events, HubEvent};
pub use message::{decode_frame, DecodedMessage, Reply, ReplyPayload};
pub use reply::{
    channel_change_from_reply, config_from_reply, current_activity_from_reply,
    start_activity_succeeded, ChannelChangeResult,
};
pub use request::{HoldStatus, HubRequest, TimeoutPolicy};
