//! Kind-specific reply payload extraction.
//!
//! Each request kind interprets its reply body differently: the config
//! reply is a JSON document, the current-activity reply is a `result=<id>`
//! pair, and the start-activity reply signals success by an *absent* error
//! text rather than any status code.

use serde_json::Value;

use crate::activity::ActivityId;
use crate::config::HubConfig;
use crate::error::{ProtocolError, Result};
use crate::message::{Reply, ReplyPayload};

/// Outcome of a channel change request; the hub's reply body is free-form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelChangeResult {
    pub raw: Option<String>,
}

/// Extract the hub configuration from a config reply.
pub fn config_from_reply(reply: &Reply) -> Result<HubConfig> {
    match &reply.payload {
        ReplyPayload::Text(text) => {
            if text.trim().is_empty() {
                return Err(ProtocolError::MalformedReply {
                    kind: "config",
                    detail: "empty payload".to_string(),
                });
            }
            HubConfig::from_json(text)
        }
        ReplyPayload::Json(value) => Ok(serde_json::from_value(value.clone())?),
    }
}

/// Extract the current activity id from a getCurrentActivity reply.
///
/// The XMPP body is a `result=<id>` pair; the WebSocket body is an object
/// with a `result` field. Either way the id string is normalized once here.
pub fn current_activity_from_reply(reply: &Reply) -> Result<ActivityId> {
    match &reply.payload {
        ReplyPayload::Text(text) => {
            let (_, id) = text
                .trim()
                .split_once('=')
                .ok_or_else(|| ProtocolError::MalformedReply {
                    kind: "getCurrentActivity",
                    detail: format!("expected result=<id>, got {text:?}"),
                })?;
            ActivityId::parse(id)
        }
        ReplyPayload::Json(value) => match &value["result"] {
            Value::String(s) => ActivityId::parse(s),
            Value::Number(n) => n
                .as_i64()
                .map(ActivityId::new)
                .ok_or_else(|| ProtocolError::MalformedReply {
                    kind: "getCurrentActivity",
                    detail: "non-integer result".to_string(),
                }),
            other => Err(ProtocolError::MalformedReply {
                kind: "getCurrentActivity",
                detail: format!("missing result field, got {other}"),
            }),
        },
    }
}

/// Whether a start-activity reply indicates success.
///
/// Success is "no error text present", not any particular code value; a
/// non-empty body is the hub's error description.
pub fn start_activity_succeeded(reply: &Reply) -> bool {
    match &reply.payload {
        ReplyPayload::Text(text) => text.trim().is_empty(),
        ReplyPayload::Json(_) => reply.is_ok(),
    }
}

/// Extract the channel change outcome.
pub fn channel_change_from_reply(reply: &Reply) -> ChannelChangeResult {
    match &reply.payload {
        ReplyPayload::Text(text) => ChannelChangeResult {
            raw: if text.trim().is_empty() {
                None
            } else {
                Some(text.clone())
            },
        },
        ReplyPayload::Json(value) => ChannelChangeResult {
            raw: if value.is_null() {
                None
            } else {
                Some(value.to_string())
            },
        },
    }
}
