//! Outbound request kinds and their wire bodies.
//!
//! Each request kind maps to a fixed "mime" endpoint string on the hub's
//! RPC surface plus a body format. Most bodies are colon-separated
//! `key=value` pairs; the hold-action body is the hub's inline pseudo-JSON
//! with the literal two-colon separator. That `::` syntax is not a typo and
//! is not valid JSON — it is what the hub expects on the wire, byte for
//! byte.

use serde_json::{json, Value};

use crate::activity::ActivityId;

/// Press or release half of an IR command pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldStatus {
    Press,
    Release,
}

impl HoldStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            HoldStatus::Press => "press",
            HoldStatus::Release => "release",
        }
    }
}

/// What a timeout on this request kind means to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutPolicy {
    /// No reply within the deadline is a reportable failure.
    Fail,
    /// The hub does not reliably reply to this kind; a timeout means
    /// "possibly succeeded, no confirmation".
    Tolerate,
}

/// A typed outbound request to the hub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubRequest {
    /// Fetch the full activity/device catalog.
    GetConfig,
    /// Fetch the id of the currently running activity.
    GetCurrentActivity,
    /// Start an activity (the `-1` sentinel powers everything off).
    StartActivity {
        activity_id: ActivityId,
        timestamp_ms: u64,
    },
    /// One half of an IR command press/release pair.
    HoldAction {
        device_id: String,
        command: String,
        status: HoldStatus,
    },
    /// Tune the current activity to a channel.
    ChangeChannel {
        channel: String,
        timestamp_ms: u64,
    },
    /// Ask the hub to resync with the Logitech web service.
    Sync,
}

impl HubRequest {
    /// Build the press/release envelope pair for one IR command.
    ///
    /// The hub acts on press and release as separate frames; callers must
    /// send both, press first.
    pub fn hold_action_pair(device_id: &str, command: &str) -> (HubRequest, HubRequest) {
        let press = HubRequest::HoldAction {
            device_id: device_id.to_string(),
            command: command.to_string(),
            status: HoldStatus::Press,
        };
        let release = HubRequest::HoldAction {
            device_id: device_id.to_string(),
            command: command.to_string(),
            status: HoldStatus::Release,
        };
        (press, release)
    }

    /// The RPC endpoint selector carried in the `mime` attribute.
    pub fn mime(&self) -> &'static str {
        match self {
            HubRequest::GetConfig => "vnd.logitech.harmony/vnd.logitech.harmony.engine?config",
            HubRequest::GetCurrentActivity => {
                "vnd.logitech.harmony/vnd.logitech.harmony.engine?getCurrentActivity"
            }
            HubRequest::StartActivity { .. } => "harmony.activityengine?runactivity",
            HubRequest::HoldAction { .. } => {
                "vnd.logitech.harmony/vnd.logitech.harmony.engine?holdAction"
            }
            HubRequest::ChangeChannel { .. } => "harmony.engine?changeChannel",
            HubRequest::Sync => "setup.sync",
        }
    }

    /// Short kind name for logs and error payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            HubRequest::GetConfig => "config",
            HubRequest::GetCurrentActivity => "getCurrentActivity",
            HubRequest::StartActivity { .. } => "startActivity",
            HubRequest::HoldAction { .. } => "holdAction",
            HubRequest::ChangeChannel { .. } => "changeChannel",
            HubRequest::Sync => "sync",
        }
    }

    pub fn timeout_policy(&self) -> TimeoutPolicy {
        match self {
            HubRequest::GetConfig
            | HubRequest::GetCurrentActivity
            | HubRequest::ChangeChannel { .. }
            | HubRequest::Sync => TimeoutPolicy::Fail,
            HubRequest::StartActivity { .. } | HubRequest::HoldAction { .. } => {
                TimeoutPolicy::Tolerate
            }
        }
    }

    /// The text body for the XMPP `<oa>` element.
    pub fn xmpp_body(&self) -> String {
        match self {
            HubRequest::GetConfig | HubRequest::GetCurrentActivity | HubRequest::Sync => {
                String::new()
            }
            HubRequest::StartActivity {
                activity_id,
                timestamp_ms,
            } => format!("activityId={activity_id}:timestamp={timestamp_ms}:async=1"),
            HubRequest::HoldAction {
                device_id,
                command,
                status,
            } => format!(
                "action={{\"type\"::\"IRCommand\",\"deviceId\"::\"{device_id}\",\"command\"::\"{command}\"}}:status={}",
                status.as_str()
            ),
            HubRequest::ChangeChannel {
                channel,
                timestamp_ms,
            } => format!("channel={channel}:timestamp={timestamp_ms}"),
        }
    }

    /// The parameter object for the WebSocket `hbus` frame.
    ///
    /// The WebSocket variant carries the action blob as a properly
    /// JSON-encoded string; the `::` quirk is XMPP-only.
    pub fn ws_params(&self) -> Value {
        match self {
            HubRequest::GetConfig | HubRequest::GetCurrentActivity => json!({"verb": "get"}),
            HubRequest::Sync => json!({}),
            HubRequest::StartActivity {
                activity_id,
                timestamp_ms,
            } => json!({
                "activityId": activity_id.to_string(),
                "timestamp": timestamp_ms,
                "async": "1",
            }),
            HubRequest::HoldAction {
                device_id,
                command,
                status,
            } => {
                let action = json!({
                    "type": "IRCommand",
                    "deviceId": device_id,
                    "command": command,
                })
                .to_string();
                json!({
                    "action": action,
                    "status": status.as_str(),
                    "timestamp": "0",
                })
            }
            HubRequest::ChangeChannel {
                channel,
                timestamp_ms,
            } => json!({
                "channel": channel,
                "timestamp": timestamp_ms,
            }),
        }
    }
}
