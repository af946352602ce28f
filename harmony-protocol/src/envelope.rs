//! Outbound envelope construction for both wire variants.
//!
//! The XMPP variant wraps every request in an `<iq type="get">` stanza
//! carrying an `<oa xmlns="connect.logitech.com">` element; the correlation
//! id rides on the `iq` `id` attribute. The WebSocket variant wraps the
//! same endpoint selector and parameters in an `hbus` JSON object.

use serde_json::json;

use crate::request::HubRequest;

/// Escape an attribute value (quotes matter here).
fn escape_attr(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Escape element text content.
///
/// Quotes are left alone: the hold-action body must reach the hub with its
/// literal `"deviceId"::"..."` quoting intact, which is also what the
/// original XMPP stack emitted.
fn escape_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// Build the XMPP `<iq>` stanza for a request.
pub fn encode_iq(correlation_id: &str, request: &HubRequest) -> String {
    let body = request.xmpp_body();
    format!(
        "<iq type=\"get\" id=\"{id}\"><oa xmlns=\"connect.logitech.com\" mime=\"{mime}\">{body}</oa></iq>",
        id = escape_attr(correlation_id),
        mime = escape_attr(request.mime()),
        body = escape_text(&body),
    )
}

/// Build the WebSocket `hbus` frame for a request.
pub fn encode_ws(correlation_id: &str, hub_id: &str, request: &HubRequest) -> String {
    json!({
        "hubId": hub_id,
        "timeout": 30,
        "hbus": {
            "cmd": request.mime(),
            "id": correlation_id,
            "params": request.ws_params(),
        },
    })
    .to_string()
}
