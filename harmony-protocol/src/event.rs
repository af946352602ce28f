//! Unsolicited push notifications from the hub.
//!
//! The hub interleaves these on the same stream as request replies. Each
//! decoded frame produces one or more `HubEvent`s; a frame whose body fails
//! to parse degrades to [`HubEvent::Unknown`] and is still delivered, so the
//! boundary can log it instead of losing it.

use serde_json::Value;

use crate::activity::ActivityId;

/// A decoded hub push notification.
#[derive(Debug, Clone, PartialEq)]
pub enum HubEvent {
    /// Activity state digest: the hub's periodic/current activity report.
    ActivityStateDigest {
        activity_id: ActivityId,
        /// Hub status code: 0 off, 1 starting, 2 started, 3 stopping.
        activity_status: i64,
    },
    /// A home-automation device changed state.
    AutomationStateChanged {
        device_key: String,
        status: i64,
        brightness: i64,
        on: bool,
    },
    /// An activity start sequence completed (successfully or not).
    ActivityStartFinished {
        activity_id: ActivityId,
        error_code: String,
        error_string: String,
    },
    /// Progress report during an activity start sequence.
    ActivityStartProgress {
        done: u32,
        total: u32,
        device_id: String,
    },
    /// Engine metadata push; carried through raw.
    MetadataUpdate { raw: String },
    /// Anything the decoder does not recognize. Never dropped silently.
    Unknown { event_type: String, raw: String },
}

/// Event type tag fragments, matched by containment the way the hub's own
/// clients do (the full attribute value carries a namespace prefix that has
/// varied across firmware revisions).
mod tag {
    pub const STATE_DIGEST: &str = "connect.stateDigest";
    pub const AUTOMATION_STATE: &str = "automation.state";
    pub const START_FINISHED: &str = "startActivityFinished";
    pub const START_PROGRESS: &str = "startActivity";
    pub const METADATA: &str = "metadata";
}

/// Decode an event frame body into its typed events.
///
/// `automation.state` frames report every changed device in one body, so a
/// single frame can fan out to several events; delivery order follows the
/// body's own ordering.
pub fn parse_events(event_type: &str, text: &str) -> Vec<HubEvent> {
    let unknown = || {
        vec![HubEvent::Unknown {
            event_type: event_type.to_string(),
            raw: text.to_string(),
        }]
    };

    if event_type.contains(tag::STATE_DIGEST) {
        parse_state_digest(text).map_or_else(unknown, |e| vec![e])
    } else if event_type.contains(tag::AUTOMATION_STATE) {
        let events = parse_automation_state(text);
        if events.is_empty() {
            unknown()
        } else {
            events
        }
    } else if event_type.contains(tag::START_FINISHED) {
        parse_start_finished(text).map_or_else(unknown, |e| vec![e])
    } else if event_type.contains(tag::START_PROGRESS) {
        parse_start_progress(text).map_or_else(unknown, |e| vec![e])
    } else if event_type.contains(tag::METADATA) {
        vec![HubEvent::MetadataUpdate {
            raw: text.to_string(),
        }]
    } else {
        unknown()
    }
}

/// Split a `key=value:key=value` body into pairs. Values may be empty
/// (`errorString=` is the success case for start-activity).
fn key_value_pairs(text: &str) -> impl Iterator<Item = (&str, &str)> {
    text.split(':').filter_map(|pair| pair.split_once('='))
}

fn lookup<'a>(text: &'a str, key: &str) -> Option<&'a str> {
    key_value_pairs(text).find(|(k, _)| *k == key).map(|(_, v)| v)
}

fn parse_state_digest(text: &str) -> Option<HubEvent> {
    let value: Value = serde_json::from_str(text).ok()?;
    let activity_id = match &value["activityId"] {
        Value::String(s) => ActivityId::parse(s).ok()?,
        Value::Number(n) => ActivityId::new(n.as_i64()?),
        _ => return None,
    };
    let activity_status = value["activityStatus"].as_i64()?;
    Some(HubEvent::ActivityStateDigest {
        activity_id,
        activity_status,
    })
}

fn parse_automation_state(text: &str) -> Vec<HubEvent> {
    let Ok(Value::Object(devices)) = serde_json::from_str::<Value>(text) else {
        return Vec::new();
    };
    devices
        .into_iter()
        .filter_map(|(device_key, state)| {
            Some(HubEvent::AutomationStateChanged {
                device_key,
                status: state["status"].as_i64()?,
                brightness: state["brightness"].as_i64().unwrap_or(0),
                on: state["on"].as_bool().unwrap_or(false),
            })
        })
        .collect()
}

/// Field access that works for both body syntaxes: the XMPP variant sends
/// `key=value` text, the WebSocket variant sends a JSON object.
fn field(text: &str, json: Option<&Value>, key: &str) -> Option<String> {
    if let Some(value) = json {
        return match &value[key] {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        };
    }
    lookup(text, key).map(str::to_string)
}

fn parse_start_finished(text: &str) -> Option<HubEvent> {
    let json: Option<Value> = serde_json::from_str(text).ok();
    let json = json.as_ref();
    let activity_id = ActivityId::parse(&field(text, json, "activityId")?).ok()?;
    let error_code = field(text, json, "errorCode")?;
    let error_string = field(text, json, "errorString").unwrap_or_default();
    Some(HubEvent::ActivityStartFinished {
        activity_id,
        error_code,
        error_string,
    })
}

fn parse_start_progress(text: &str) -> Option<HubEvent> {
    let json: Option<Value> = serde_json::from_str(text).ok();
    let json = json.as_ref();
    Some(HubEvent::ActivityStartProgress {
        done: field(text, json, "done")?.parse().ok()?,
        total: field(text, json, "total")?.parse().ok()?,
        device_id: field(text, json, "deviceId")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_digest_decodes() {
        let events = parse_events(
            "connect.stateDigest?notify",
            r#"{"activityId":"5","activityStatus":2,"sleepTimerId":-1}"#,
        );
        assert_eq!(
            events,
            vec![HubEvent::ActivityStateDigest {
                activity_id: ActivityId::new(5),
                activity_status: 2,
            }]
        );
    }

    #[test]
    fn state_digest_accepts_numeric_id() {
        // Some firmware revisions send the id as a bare number.
        let events = parse_events(
            "connect.stateDigest?notify",
            r#"{"activityId":-1,"activityStatus":0}"#,
        );
        assert_eq!(
            events,
            vec![HubEvent::ActivityStateDigest {
                activity_id: ActivityId::POWER_OFF,
                activity_status: 0,
            }]
        );
    }

    #[test]
    fn automation_state_fans_out_per_device() {
        let body = r#"{
            "hue-1": {"status": 0, "brightness": 120, "on": true},
            "hue-2": {"status": 0, "brightness": 0, "on": false}
        }"#;
        let events = parse_events("automation.state?notify", body);
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| matches!(
            e,
            HubEvent::AutomationStateChanged { .. }
        )));
    }

    #[test]
    fn start_finished_success_has_empty_error_string() {
        let events = parse_events(
            "harmony.engine?startActivityFinished",
            "activityId=5:errorCode=0:errorString=",
        );
        assert_eq!(
            events,
            vec![HubEvent::ActivityStartFinished {
                activity_id: ActivityId::new(5),
                error_code: "0".to_string(),
                error_string: String::new(),
            }]
        );
    }

    #[test]
    fn start_progress_decodes() {
        let events = parse_events("harmony.engine?startActivity", "done=2:total=7:deviceId=37");
        assert_eq!(
            events,
            vec![HubEvent::ActivityStartProgress {
                done: 2,
                total: 7,
                device_id: "37".to_string(),
            }]
        );
    }

    #[test]
    fn finished_checked_before_progress() {
        // "startActivityFinished" contains "startActivity"; tag order matters.
        let events = parse_events(
            "harmony.engine?startActivityFinished",
            "activityId=-1:errorCode=200:errorString=OK",
        );
        assert!(matches!(
            events[0],
            HubEvent::ActivityStartFinished { .. }
        ));
    }

    #[test]
    fn metadata_carried_raw() {
        let events = parse_events("harmonyengine.metadata", "some opaque payload");
        assert_eq!(
            events,
            vec![HubEvent::MetadataUpdate {
                raw: "some opaque payload".to_string(),
            }]
        );
    }

    #[test]
    fn unrecognized_tag_degrades_to_unknown() {
        let events = parse_events("vnd.logitech.pressType", "type=short");
        assert_eq!(
            events,
            vec![HubEvent::Unknown {
                event_type: "vnd.logitech.pressType".to_string(),
                raw: "type=short".to_string(),
            }]
        );
    }

    #[test]
    fn start_finished_accepts_json_body() {
        // WebSocket frames carry the same event as a JSON object.
        let events = parse_events(
            "harmony.engine?startActivityFinished",
            r#"{"activityId":"5","errorCode":"200","errorString":"OK"}"#,
        );
        assert_eq!(
            events,
            vec![HubEvent::ActivityStartFinished {
                activity_id: ActivityId::new(5),
                error_code: "200".to_string(),
                error_string: "OK".to_string(),
            }]
        );
    }

    #[test]
    fn malformed_body_degrades_to_unknown() {
        let events = parse_events("connect.stateDigest?notify", "this is not json");
        assert!(matches!(events[0], HubEvent::Unknown { .. }));

        let events = parse_events("harmony.engine?startActivityFinished", "gibberish");
        assert!(matches!(events[0], HubEvent::Unknown { .. }));
    }
}
