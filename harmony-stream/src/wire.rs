//! Wire transports and the connect handshakes.
//!
//! A session speaks exactly one wire: either a framed TCP stream carrying
//! XMPP stanzas or a WebSocket carrying JSON text messages. Both sides of a
//! connection are boxed behind small traits so the session loop and the
//! tests never care which one is underneath.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::codec::Framed;
use tracing::{debug, trace};

use harmony_protocol::{decode_frame, encode_iq, encode_ws, DecodedMessage, HubRequest};

use crate::codec::StanzaCodec;
use crate::error::{ConnectError, TransportError};

const XMPP_DOMAIN: &str = "connect.logitech.com";
// The trailing dot is part of the resource the hub expects; not a typo.
const XMPP_RESOURCE: &str = "gatorade.";
const SASL_NS: &str = "urn:ietf:params:xml:ns:xmpp-sasl";
const BIND_NS: &str = "urn:ietf:params:xml:ns:xmpp-bind";
const WS_DOMAIN: &str = "svcs.myharmony.com";

/// Outbound half of a wire.
#[async_trait]
pub trait WireSink: Send {
    async fn send(&mut self, frame: String) -> Result<(), TransportError>;
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Inbound half of a wire. Yields whole text frames; `None` means the
/// peer closed the connection.
#[async_trait]
pub trait WireStream: Send {
    async fn next_frame(&mut self) -> Option<Result<String, TransportError>>;
}

/// How to render a request for the wire a session speaks.
#[derive(Debug, Clone)]
pub enum WireFormat {
    Xmpp,
    WebSocket { hub_id: String },
}

impl WireFormat {
    pub fn encode(&self, correlation_id: &str, request: &HubRequest) -> String {
        match self {
            WireFormat::Xmpp => encode_iq(correlation_id, request),
            WireFormat::WebSocket { hub_id } => encode_ws(correlation_id, hub_id, request),
        }
    }

    /// Frame to send ahead of closing the connection, if the wire has one.
    pub fn close_frame(&self) -> Option<String> {
        match self {
            WireFormat::Xmpp => Some("</stream:stream>".to_string()),
            WireFormat::WebSocket { .. } => None,
        }
    }
}

/// An established, authenticated connection ready for the session loop.
pub struct WireConnection {
    pub sink: Box<dyn WireSink>,
    pub stream: Box<dyn WireStream>,
    pub format: WireFormat,
}

// ---------------------------------------------------------------------------
// XMPP wire
// ---------------------------------------------------------------------------

type XmppFramed = Framed<TcpStream, StanzaCodec>;

struct XmppSink(SplitSink<XmppFramed, String>);
struct XmppStream(SplitStream<XmppFramed>);

#[async_trait]
impl WireSink for XmppSink {
    async fn send(&mut self, frame: String) -> Result<(), TransportError> {
        self.0.send(frame).await
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.0.close().await
    }
}

#[async_trait]
impl WireStream for XmppStream {
    async fn next_frame(&mut self) -> Option<Result<String, TransportError>> {
        self.0.next().await
    }
}

/// Full JID the hub authenticates: the token as localpart, with the
/// resource carried in the PLAIN identity itself.
fn plain_identity(token: &str) -> String {
    format!("{token}@{XMPP_DOMAIN}/{XMPP_RESOURCE}")
}

fn stream_header() -> String {
    format!(
        "<stream:stream to='{XMPP_DOMAIN}' xmlns='jabber:client' \
         xmlns:stream='http://etherx.jabber.org/streams' version='1.0'>"
    )
}

/// Read frames until the server's `<stream:features>` arrives, skipping
/// the stream header echoes in front of it.
async fn await_features(framed: &mut XmppFramed) -> Result<String, ConnectError> {
    loop {
        let frame = next_handshake_frame(framed).await?;
        match decode_frame(&frame) {
            DecodedMessage::StreamOpen => continue,
            DecodedMessage::StreamFeatures { raw } => return Ok(raw),
            other => {
                return Err(ConnectError::ProtocolMismatch(format!(
                    "expected stream features, got {other:?}"
                )))
            }
        }
    }
}

async fn next_handshake_frame(framed: &mut XmppFramed) -> Result<String, ConnectError> {
    match framed.next().await {
        Some(Ok(frame)) => {
            trace!(frame = %frame, "handshake frame");
            Ok(frame)
        }
        Some(Err(TransportError::Io(e))) => Err(ConnectError::Refused(e)),
        Some(Err(e)) => Err(ConnectError::ProtocolMismatch(e.to_string())),
        None => Err(ConnectError::ProtocolMismatch(
            "connection closed during handshake".to_string(),
        )),
    }
}

async fn handshake_send(framed: &mut XmppFramed, frame: String) -> Result<(), ConnectError> {
    match framed.send(frame).await {
        Ok(()) => Ok(()),
        Err(TransportError::Io(e)) => Err(ConnectError::Refused(e)),
        Err(e) => Err(ConnectError::ProtocolMismatch(e.to_string())),
    }
}

/// Open a TCP connection to the hub's XMPP port and run stream negotiation:
/// header exchange, SASL PLAIN with the token, stream restart and, unless
/// the legacy variant is in use, resource binding.
///
/// Callers bound this with their connect timeout; nothing here waits on
/// its own clock.
pub async fn connect_xmpp(
    host: &str,
    port: u16,
    token: &str,
    bind_resource: bool,
) -> Result<WireConnection, ConnectError> {
    let tcp = TcpStream::connect((host, port))
        .await
        .map_err(ConnectError::Refused)?;
    let mut framed = Framed::new(tcp, StanzaCodec::new());

    handshake_send(&mut framed, stream_header()).await?;
    let features = await_features(&mut framed).await?;
    if !features.contains("PLAIN") {
        return Err(ConnectError::ProtocolMismatch(
            "hub does not offer SASL PLAIN".to_string(),
        ));
    }

    // PLAIN initial response: authzid NUL authcid NUL password. The hub
    // takes the full JID as identity and the token again as password.
    let identity = plain_identity(token);
    let plain = BASE64.encode(format!("\0{identity}\0{token}"));
    handshake_send(
        &mut framed,
        format!("<auth xmlns='{SASL_NS}' mechanism='PLAIN'>{plain}</auth>"),
    )
    .await?;

    loop {
        let frame = next_handshake_frame(&mut framed).await?;
        match decode_frame(&frame) {
            DecodedMessage::AuthSuccess => break,
            DecodedMessage::AuthFailure { raw } => {
                return Err(ConnectError::AuthRejected(raw));
            }
            other => {
                return Err(ConnectError::ProtocolMismatch(format!(
                    "expected auth result, got {other:?}"
                )))
            }
        }
    }
    debug!("authenticated with hub");

    // The stream restarts from scratch after authentication.
    handshake_send(&mut framed, stream_header()).await?;
    await_features(&mut framed).await?;

    if bind_resource {
        handshake_send(
            &mut framed,
            format!(
                "<iq type='set' id='bind'><bind xmlns='{BIND_NS}'>\
                 <resource>{XMPP_RESOURCE}</resource></bind></iq>"
            ),
        )
        .await?;
        loop {
            let frame = next_handshake_frame(&mut framed).await?;
            match decode_frame(&frame) {
                DecodedMessage::Reply(_) => break,
                DecodedMessage::Events(_) => continue,
                other => {
                    return Err(ConnectError::ProtocolMismatch(format!(
                        "expected bind result, got {other:?}"
                    )))
                }
            }
        }
        debug!(resource = XMPP_RESOURCE, "bound session resource");
    }

    let (sink, stream) = framed.split();
    Ok(WireConnection {
        sink: Box::new(XmppSink(sink)),
        stream: Box::new(XmppStream(stream)),
        format: WireFormat::Xmpp,
    })
}

// ---------------------------------------------------------------------------
// WebSocket wire
// ---------------------------------------------------------------------------

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct WebSocketSink(SplitSink<WsStream, Message>);
struct WebSocketFrames(SplitStream<WsStream>);

fn ws_error(e: tokio_tungstenite::tungstenite::Error) -> TransportError {
    match e {
        tokio_tungstenite::tungstenite::Error::Io(io) => TransportError::Io(io),
        tokio_tungstenite::tungstenite::Error::ConnectionClosed
        | tokio_tungstenite::tungstenite::Error::AlreadyClosed => TransportError::Closed,
        other => TransportError::Io(std::io::Error::other(other)),
    }
}

#[async_trait]
impl WireSink for WebSocketSink {
    async fn send(&mut self, frame: String) -> Result<(), TransportError> {
        self.0.send(Message::Text(frame.into())).await.map_err(ws_error)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.0.close().await.map_err(ws_error)
    }
}

#[async_trait]
impl WireStream for WebSocketFrames {
    async fn next_frame(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            match self.0.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.to_string())),
                Ok(Message::Close(_)) => return None,
                // Control frames and binary payloads carry no hub traffic.
                Ok(_) => continue,
                Err(e) => return Some(Err(ws_error(e))),
            }
        }
    }
}

/// Connect the WebSocket wire and verify the hub is answering by probing
/// with a current-activity query. Newer firmware accepts the upgrade from
/// anyone; only a correlated 200 proves the hub-id routing works.
pub async fn connect_websocket(
    host: &str,
    port: u16,
    hub_id: &str,
) -> Result<WireConnection, ConnectError> {
    let url = format!("ws://{host}:{port}/?domain={WS_DOMAIN}&hubId={hub_id}");
    let (ws, _response) = tokio_tungstenite::connect_async(&url)
        .await
        .map_err(|e| match e {
            tokio_tungstenite::tungstenite::Error::Io(io) => ConnectError::Refused(io),
            other => ConnectError::ProtocolMismatch(other.to_string()),
        })?;
    debug!(%url, "websocket upgraded");

    let format = WireFormat::WebSocket {
        hub_id: hub_id.to_string(),
    };
    let probe_id = "connect-probe";
    let probe = format.encode(probe_id, &HubRequest::GetCurrentActivity);

    let (sink, stream) = ws.split();
    let mut sink = WebSocketSink(sink);
    let mut stream = WebSocketFrames(stream);

    sink.send(probe)
        .await
        .map_err(|e| ConnectError::ProtocolMismatch(e.to_string()))?;

    loop {
        let frame = match stream.next_frame().await {
            Some(Ok(frame)) => frame,
            Some(Err(e)) => return Err(ConnectError::ProtocolMismatch(e.to_string())),
            None => {
                return Err(ConnectError::ProtocolMismatch(
                    "connection closed during probe".to_string(),
                ))
            }
        };
        match decode_frame(&frame) {
            DecodedMessage::Reply(reply)
                if reply.correlation_id.as_deref() == Some(probe_id) =>
            {
                match reply.error_code.as_deref() {
                    None | Some("200") => break,
                    Some(code) => return Err(ConnectError::AuthRejected(code.to_string())),
                }
            }
            // Unsolicited events may interleave with the probe reply.
            _ => continue,
        }
    }
    debug!(hub_id, "websocket session verified");

    Ok(WireConnection {
        sink: Box::new(sink),
        stream: Box::new(stream),
        format,
    })
}
