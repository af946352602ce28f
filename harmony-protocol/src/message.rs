//! Inbound frame decoding.
//!
//! Every complete frame off the wire decodes to exactly one
//! [`DecodedMessage`] variant. The receive loop routes on this closed set —
//! there is no type introspection and no frame shape that raises: anything
//! unrecognizable becomes [`DecodedMessage::Unknown`], which the boundary
//! logs and moves past.

use quick_xml::events::Event as Xml;
use quick_xml::Reader;
use serde_json::Value;

use crate::event::{parse_events, HubEvent};

/// A reply envelope correlated to an earlier request.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    /// The correlation id the request was sent with, when present.
    pub correlation_id: Option<String>,
    /// The hub's status code; `"200"` is the success convention for
    /// catalog and activity-id fetches.
    pub error_code: Option<String>,
    pub payload: ReplyPayload,
}

/// A reply body, kept in its wire-native shape until a kind-specific
/// extractor (see [`crate::reply`]) is applied.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyPayload {
    /// XMPP `<oa>` element text.
    Text(String),
    /// WebSocket `data` object.
    Json(Value),
}

impl Reply {
    /// Whether the hub reported success for a reply that uses status codes.
    pub fn is_ok(&self) -> bool {
        match self.error_code.as_deref() {
            None => true,
            Some(code) => code == "200",
        }
    }
}

/// One decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedMessage {
    /// Reply to a correlated request.
    Reply(Reply),
    /// Hub-initiated push notifications (one frame can carry several).
    Events(Vec<HubEvent>),
    /// XMPP stream header from the remote side.
    StreamOpen,
    /// `<stream:features>` during negotiation; raw text kept for the
    /// handshake to inspect offered mechanisms.
    StreamFeatures { raw: String },
    /// SASL authentication accepted.
    AuthSuccess,
    /// SASL authentication rejected.
    AuthFailure { raw: String },
    /// Remote closed the stream.
    StreamClosed,
    /// Anything else; logged at the boundary, never an error.
    Unknown { raw: String },
}

/// Decode one complete frame.
///
/// WebSocket frames are JSON objects; everything else is treated as an XMPP
/// stanza. This function never fails: undecodable input yields `Unknown`.
pub fn decode_frame(frame: &str) -> DecodedMessage {
    let trimmed = frame.trim();
    if trimmed.is_empty() {
        return DecodedMessage::Unknown {
            raw: frame.to_string(),
        };
    }
    if trimmed.starts_with('{') {
        decode_ws(trimmed)
    } else {
        decode_stanza(trimmed)
    }
}

fn decode_ws(frame: &str) -> DecodedMessage {
    let Ok(value) = serde_json::from_str::<Value>(frame) else {
        return DecodedMessage::Unknown {
            raw: frame.to_string(),
        };
    };

    // Push notifications carry a "type" tag matching the event taxonomy.
    if let Some(event_type) = value.get("type").and_then(Value::as_str) {
        let data = value.get("data").cloned().unwrap_or(Value::Null);
        let text = match &data {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        return DecodedMessage::Events(parse_events(event_type, &text));
    }

    // Replies carry the request id back plus a numeric status code.
    if value.get("id").is_some() || value.get("code").is_some() {
        let correlation_id = match value.get("id") {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        let error_code = match value.get("code") {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        let payload = value.get("data").cloned().unwrap_or(Value::Null);
        return DecodedMessage::Reply(Reply {
            correlation_id,
            error_code,
            payload: ReplyPayload::Json(payload),
        });
    }

    DecodedMessage::Unknown {
        raw: frame.to_string(),
    }
}

fn decode_stanza(frame: &str) -> DecodedMessage {
    // Stream headers arrive as unterminated open tags; quick-xml would wait
    // for the matching close that never comes inside this frame.
    if frame.starts_with("<?xml") || frame.starts_with("<stream:stream") {
        return DecodedMessage::StreamOpen;
    }
    if frame.starts_with("</stream:stream") {
        return DecodedMessage::StreamClosed;
    }

    let mut reader = Reader::from_str(frame);
    reader.trim_text(true);
    loop {
        match reader.read_event() {
            Ok(Xml::Start(e)) | Ok(Xml::Empty(e)) => {
                return match e.local_name().as_ref() {
                    b"features" => DecodedMessage::StreamFeatures {
                        raw: frame.to_string(),
                    },
                    b"success" => DecodedMessage::AuthSuccess,
                    b"failure" => DecodedMessage::AuthFailure {
                        raw: frame.to_string(),
                    },
                    b"iq" => decode_iq(frame),
                    b"message" => decode_message_stanza(frame),
                    _ => DecodedMessage::Unknown {
                        raw: frame.to_string(),
                    },
                };
            }
            Ok(Xml::Eof) => {
                return DecodedMessage::Unknown {
                    raw: frame.to_string(),
                }
            }
            Ok(_) => continue,
            Err(_) => {
                return DecodedMessage::Unknown {
                    raw: frame.to_string(),
                }
            }
        }
    }
}

fn attr_value(e: &quick_xml::events::BytesStart<'_>, name: &[u8]) -> Option<String> {
    e.attributes()
        .filter_map(|a| a.ok())
        .find(|a| a.key.local_name().as_ref() == name)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

fn decode_iq(frame: &str) -> DecodedMessage {
    let mut reader = Reader::from_str(frame);
    reader.trim_text(true);

    let mut correlation_id = None;
    let mut error_code = None;
    let mut payload = String::new();
    let mut in_oa = false;

    loop {
        match reader.read_event() {
            Ok(Xml::Start(e)) => match e.local_name().as_ref() {
                b"iq" => correlation_id = attr_value(&e, b"id"),
                b"oa" => {
                    error_code = attr_value(&e, b"errorcode");
                    in_oa = true;
                }
                _ => {}
            },
            Ok(Xml::Empty(e)) => match e.local_name().as_ref() {
                b"iq" => correlation_id = attr_value(&e, b"id"),
                b"oa" => error_code = attr_value(&e, b"errorcode"),
                _ => {}
            },
            Ok(Xml::Text(t)) if in_oa => {
                if let Ok(text) = t.unescape() {
                    payload.push_str(&text);
                }
            }
            Ok(Xml::End(e)) if e.local_name().as_ref() == b"oa" => in_oa = false,
            Ok(Xml::Eof) => break,
            Ok(_) => {}
            Err(_) => {
                return DecodedMessage::Unknown {
                    raw: frame.to_string(),
                }
            }
        }
    }

    DecodedMessage::Reply(Reply {
        correlation_id,
        error_code,
        payload: ReplyPayload::Text(payload),
    })
}

fn decode_message_stanza(frame: &str) -> DecodedMessage {
    let mut reader = Reader::from_str(frame);
    reader.trim_text(true);

    let mut events = Vec::new();
    let mut current_type: Option<String> = None;
    let mut current_text = String::new();

    loop {
        match reader.read_event() {
            Ok(Xml::Start(e)) if e.local_name().as_ref() == b"event" => {
                current_type = attr_value(&e, b"type");
                current_text.clear();
            }
            Ok(Xml::Empty(e)) if e.local_name().as_ref() == b"event" => {
                if let Some(event_type) = attr_value(&e, b"type") {
                    events.extend(parse_events(&event_type, ""));
                }
            }
            Ok(Xml::Text(t)) if current_type.is_some() => {
                if let Ok(text) = t.unescape() {
                    current_text.push_str(&text);
                }
            }
            Ok(Xml::End(e)) if e.local_name().as_ref() == b"event" => {
                if let Some(event_type) = current_type.take() {
                    events.extend(parse_events(&event_type, &current_text));
                }
            }
            Ok(Xml::Eof) => break,
            Ok(_) => {}
            Err(_) => {
                return DecodedMessage::Unknown {
                    raw: frame.to_string(),
                }
            }
        }
    }

    if events.is_empty() {
        DecodedMessage::Unknown {
            raw: frame.to_string(),
        }
    } else {
        DecodedMessage::Events(events)
    }
}
