//! The transport session.
//!
//! One session owns one wire. A background task reads inbound frames and
//! routes them: replies to the correlator, push events to the dispatcher,
//! everything else to the log. Callers send requests through [`Session`]
//! and park on correlator futures with bounded deadlines; nothing in this
//! module waits without a clock.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex as SyncMutex;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use harmony_protocol::{decode_frame, DecodedMessage, HubEvent, HubRequest, Reply};

use crate::config::{ProtocolVariant, SessionConfig};
use crate::correlator::Correlator;
use crate::dispatcher::{Dispatcher, ListenerId};
use crate::error::{ConnectError, RequestError};
use crate::wire::{connect_websocket, connect_xmpp, WireConnection, WireFormat, WireSink, WireStream};

/// Default XMPP port on the hub.
pub const XMPP_PORT: u16 = 5222;
/// Default WebSocket port on newer firmware.
pub const WEBSOCKET_PORT: u16 = 8088;

/// Lifecycle of a session. Transitions only move forward; a dropped
/// connection lands in `Disconnected` and the session is not reusable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Authenticating,
    Established,
    Closing,
}

/// An authenticated hub session with a running receive loop.
pub struct Session {
    config: SessionConfig,
    format: WireFormat,
    sink: Arc<AsyncMutex<Box<dyn WireSink>>>,
    correlator: Arc<Correlator>,
    dispatcher: Arc<Dispatcher>,
    state: Arc<SyncMutex<SessionState>>,
    receive_task: JoinHandle<()>,
}

impl Session {
    /// Connect and authenticate, bounded by the configured connect timeout.
    ///
    /// `credential` is the hub token for the XMPP variants and the remote
    /// hub id for the WebSocket variant.
    pub async fn connect(
        host: &str,
        port: u16,
        credential: &str,
        config: SessionConfig,
    ) -> Result<Self, ConnectError> {
        config.validate()?;
        let state = Arc::new(SyncMutex::new(SessionState::Connecting));

        let handshake = {
            let state = Arc::clone(&state);
            async move {
                *state.lock() = SessionState::Authenticating;
                match config.variant {
                    ProtocolVariant::XmppPlain => connect_xmpp(host, port, credential, false).await,
                    ProtocolVariant::Xmpp => connect_xmpp(host, port, credential, true).await,
                    ProtocolVariant::WebSocket => connect_websocket(host, port, credential).await,
                }
            }
        };

        let wire = match tokio::time::timeout(config.connect_timeout, handshake).await {
            Ok(Ok(wire)) => wire,
            Ok(Err(e)) => {
                *state.lock() = SessionState::Disconnected;
                return Err(e);
            }
            Err(_) => {
                *state.lock() = SessionState::Disconnected;
                return Err(ConnectError::Timeout);
            }
        };

        *state.lock() = SessionState::Established;
        info!(host, port, variant = ?config.variant, "session established");
        Ok(Self::spawn(wire, config, state))
    }

    /// Build a session on an already-established wire. The entry point for
    /// tests driving the session over an in-memory connection.
    pub fn from_wire(wire: WireConnection, config: SessionConfig) -> Self {
        Self::spawn(
            wire,
            config,
            Arc::new(SyncMutex::new(SessionState::Established)),
        )
    }

    fn spawn(
        wire: WireConnection,
        config: SessionConfig,
        state: Arc<SyncMutex<SessionState>>,
    ) -> Self {
        let correlator = Arc::new(Correlator::new());
        let dispatcher = Arc::new(Dispatcher::new());
        let receive_task = tokio::spawn(receive_loop(
            wire.stream,
            Arc::clone(&correlator),
            Arc::clone(&dispatcher),
            Arc::clone(&state),
        ));
        Self {
            config,
            format: wire.format,
            sink: Arc::new(AsyncMutex::new(wire.sink)),
            correlator,
            dispatcher,
            state,
            receive_task,
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    pub fn is_established(&self) -> bool {
        self.state() == SessionState::Established
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Register a push-event listener. Listeners run on the receive task.
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&HubEvent) + Send + Sync + 'static,
    {
        self.dispatcher.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: ListenerId) {
        self.dispatcher.unsubscribe(id)
    }

    /// Send a request and await its correlated reply under the configured
    /// request timeout.
    pub async fn request(&self, request: &HubRequest) -> Result<Reply, RequestError> {
        self.request_with_timeout(request, self.config.request_timeout)
            .await
    }

    /// Send a request and await its reply under an explicit deadline. The
    /// deadline covers the write as well as the wait, so a wedged sink
    /// cannot suspend the caller past it. On timeout the pending entry is
    /// removed, so a reply that arrives later is dropped by the correlator
    /// instead of leaking.
    pub async fn request_with_timeout(
        &self,
        request: &HubRequest,
        deadline: Duration,
    ) -> Result<Reply, RequestError> {
        if !self.is_established() {
            return Err(RequestError::Disconnected);
        }

        let correlation_id = self.correlator.next_id(request.kind());
        let reply_rx = self.correlator.register(&correlation_id);
        let frame = self.format.encode(&correlation_id, request);

        let send_and_wait = async {
            if let Err(e) = self.sink.lock().await.send(frame).await {
                warn!(error = %e, kind = request.kind(), "request send failed");
                return Err(RequestError::Disconnected);
            }
            match reply_rx.await {
                Ok(result) => result,
                Err(_) => Err(RequestError::Disconnected),
            }
        };

        match tokio::time::timeout(deadline, send_and_wait).await {
            Ok(result) => {
                if result.is_err() {
                    self.correlator.cancel(&correlation_id);
                }
                result
            }
            Err(_) => {
                self.correlator.cancel(&correlation_id);
                debug!(correlation_id = %correlation_id, "request deadline passed");
                Err(RequestError::TimedOut)
            }
        }
    }

    /// Send a request without awaiting a reply. Used for the press/release
    /// halves of an IR command, which the hub never answers. The write
    /// itself is still bounded by the configured request timeout.
    pub async fn send_with_id(
        &self,
        correlation_id: &str,
        request: &HubRequest,
    ) -> Result<(), RequestError> {
        if !self.is_established() {
            return Err(RequestError::Disconnected);
        }
        let frame = self.format.encode(correlation_id, request);
        let send = async { self.sink.lock().await.send(frame).await };
        match tokio::time::timeout(self.config.request_timeout, send).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(RequestError::Disconnected),
            Err(_) => Err(RequestError::TimedOut),
        }
    }

    /// Mint a correlation id without registering a waiter.
    pub fn next_id(&self, kind: &str) -> String {
        self.correlator.next_id(kind)
    }

    /// Tear the session down and fail every in-flight request. A graceful
    /// teardown sends the wire's close frame first; a non-graceful one
    /// just closes the sink. Either way the wire work is bounded by the
    /// request timeout, and the call is idempotent.
    pub async fn disconnect(&self, graceful: bool) {
        {
            let mut state = self.state.lock();
            if matches!(
                *state,
                SessionState::Closing | SessionState::Disconnected
            ) {
                return;
            }
            *state = SessionState::Closing;
        }

        let teardown = async {
            let mut sink = self.sink.lock().await;
            if graceful {
                if let Some(frame) = self.format.close_frame() {
                    if let Err(e) = sink.send(frame).await {
                        debug!(error = %e, "close frame not delivered");
                    }
                }
            }
            if let Err(e) = sink.close().await {
                debug!(error = %e, "sink close failed");
            }
        };
        if tokio::time::timeout(self.config.request_timeout, teardown)
            .await
            .is_err()
        {
            debug!("teardown deadline passed, abandoning the wire");
        }

        self.correlator.fail_all();
        *self.state.lock() = SessionState::Disconnected;
        info!("session closed");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.receive_task.abort();
    }
}

async fn receive_loop(
    mut stream: Box<dyn WireStream>,
    correlator: Arc<Correlator>,
    dispatcher: Arc<Dispatcher>,
    state: Arc<SyncMutex<SessionState>>,
) {
    loop {
        match stream.next_frame().await {
            Some(Ok(frame)) => route_frame(&frame, &correlator, &dispatcher),
            Some(Err(e)) => {
                warn!(error = %e, "receive failed, ending session");
                break;
            }
            None => {
                debug!("wire closed by remote");
                break;
            }
        }
        if *state.lock() == SessionState::Disconnected {
            break;
        }
    }
    correlator.fail_all();
    let mut state = state.lock();
    if *state != SessionState::Disconnected {
        *state = SessionState::Disconnected;
    }
}

fn route_frame(frame: &str, correlator: &Correlator, dispatcher: &Dispatcher) {
    match decode_frame(frame) {
        DecodedMessage::Reply(reply) => correlator.resolve(reply),
        DecodedMessage::Events(events) => {
            for event in &events {
                dispatcher.dispatch(event);
            }
        }
        DecodedMessage::StreamClosed => {
            debug!("hub announced stream close");
        }
        DecodedMessage::Unknown { raw } => {
            debug!(frame = %raw, "unroutable frame ignored");
        }
        other => {
            debug!(message = ?other, "handshake frame outside handshake ignored");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use harmony_protocol::{ActivityId, ReplyPayload};
    use tokio::sync::mpsc;

    use crate::testing::{iq_reply, memory_wire, sent_correlation_id};

    fn session_config() -> SessionConfig {
        SessionConfig::default().with_request_timeout(Duration::from_secs(2))
    }

    #[tokio::test]
    async fn request_resolves_when_reply_arrives() {
        let (wire, mut hub) = memory_wire(WireFormat::Xmpp);
        let session = Arc::new(Session::from_wire(wire, session_config()));

        let pending = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.request(&HubRequest::GetCurrentActivity).await }
        });

        let sent = hub.sent().await.unwrap();
        assert!(sent.starts_with("<iq"));
        let id = sent_correlation_id(&sent).unwrap();
        hub.push(iq_reply(&id, "200", "result=5"));

        let reply = pending.await.unwrap().unwrap();
        assert!(reply.is_ok());
        assert_eq!(reply.payload, ReplyPayload::Text("result=5".to_string()));
    }

    #[tokio::test]
    async fn concurrent_requests_resolve_out_of_order() {
        let (wire, mut hub) = memory_wire(WireFormat::Xmpp);
        let session = Arc::new(Session::from_wire(wire, session_config()));

        let first = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.request(&HubRequest::GetCurrentActivity).await }
        });
        let id_a = sent_correlation_id(&hub.sent().await.unwrap()).unwrap();

        let second = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.request(&HubRequest::GetConfig).await }
        });
        let id_b = sent_correlation_id(&hub.sent().await.unwrap()).unwrap();

        // Replies in reverse order of sending.
        hub.push(iq_reply(&id_b, "200", "{\"activity\":[],\"device\":[]}"));
        hub.push(iq_reply(&id_a, "200", "result=-1"));

        let reply_a = first.await.unwrap().unwrap();
        let reply_b = second.await.unwrap().unwrap();
        assert_eq!(reply_a.payload, ReplyPayload::Text("result=-1".to_string()));
        assert_eq!(
            reply_b.payload,
            ReplyPayload::Text("{\"activity\":[],\"device\":[]}".to_string())
        );
    }

    #[tokio::test]
    async fn timeout_removes_pending_and_late_reply_is_dropped() {
        let (wire, mut hub) = memory_wire(WireFormat::Xmpp);
        let session = Session::from_wire(wire, session_config());

        let result = session
            .request_with_timeout(&HubRequest::GetCurrentActivity, Duration::from_millis(20))
            .await;
        assert!(matches!(result, Err(RequestError::TimedOut)));

        // A late reply must not disturb the session.
        let sent = hub.sent().await.unwrap();
        let id = sent_correlation_id(&sent).unwrap();
        hub.push(iq_reply(&id, "200", "result=5"));

        // The session still serves fresh requests afterwards.
        let session = Arc::new(session);
        let pending = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.request(&HubRequest::GetCurrentActivity).await }
        });
        let id = sent_correlation_id(&hub.sent().await.unwrap()).unwrap();
        hub.push(iq_reply(&id, "200", "result=7"));
        assert!(pending.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn malformed_frames_do_not_halt_the_receive_loop() {
        let (wire, mut hub) = memory_wire(WireFormat::Xmpp);
        let session = Arc::new(Session::from_wire(wire, session_config()));

        hub.push("<<<<garbage");
        hub.push("<presence from=\"nobody\"/>");

        let pending = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.request(&HubRequest::GetCurrentActivity).await }
        });
        let id = sent_correlation_id(&hub.sent().await.unwrap()).unwrap();
        hub.push(iq_reply(&id, "200", "result=5"));
        assert!(pending.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn events_reach_subscribers() {
        let (wire, hub) = memory_wire(WireFormat::Xmpp);
        let session = Session::from_wire(wire, session_config());

        let (tx, mut rx) = mpsc::unbounded_channel();
        session.subscribe(move |event| {
            let _ = tx.send(event.clone());
        });

        hub.push(
            "<message><event xmlns=\"connect.logitech.com\" \
             type=\"connect.stateDigest?notify\">\
             {\"activityId\":\"5\",\"activityStatus\":2}</event></message>",
        );

        let event = rx.recv().await.unwrap();
        assert_eq!(
            event,
            HubEvent::ActivityStateDigest {
                activity_id: ActivityId::new(5),
                activity_status: 2,
            }
        );
    }

    #[tokio::test]
    async fn send_with_id_writes_without_waiting() {
        let (wire, mut hub) = memory_wire(WireFormat::Xmpp);
        let session = Session::from_wire(wire, session_config());

        let (press, release) = HubRequest::hold_action_pair("37", "VolumeUp");
        session.send_with_id("hold-1-press", &press).await.unwrap();
        session
            .send_with_id("hold-1-release", &release)
            .await
            .unwrap();

        let first = hub.sent().await.unwrap();
        let second = hub.sent().await.unwrap();
        assert!(first.contains(":status=press"));
        assert!(second.contains(":status=release"));
    }

    #[tokio::test]
    async fn disconnect_is_idempotent_and_fails_pending() {
        let (wire, mut hub) = memory_wire(WireFormat::Xmpp);
        let session = Arc::new(Session::from_wire(wire, session_config()));

        let pending = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.request(&HubRequest::GetConfig).await }
        });
        // Request must be on the wire before teardown starts.
        let _ = hub.sent().await.unwrap();

        session.disconnect(true).await;
        session.disconnect(true).await;

        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(matches!(
            pending.await.unwrap(),
            Err(RequestError::Disconnected)
        ));
        assert_eq!(hub.sent().await.as_deref(), Some("</stream:stream>"));

        assert!(matches!(
            session.request(&HubRequest::GetConfig).await,
            Err(RequestError::Disconnected)
        ));
    }

    #[tokio::test]
    async fn non_graceful_disconnect_skips_close_frame() {
        let (wire, mut hub) = memory_wire(WireFormat::Xmpp);
        let session = Session::from_wire(wire, session_config());

        session.disconnect(false).await;
        assert_eq!(session.state(), SessionState::Disconnected);

        let extra = tokio::time::timeout(Duration::from_millis(100), hub.sent()).await;
        assert!(extra.is_err());
    }

    struct StuckSink;

    #[async_trait::async_trait]
    impl WireSink for StuckSink {
        async fn send(&mut self, _frame: String) -> Result<(), crate::TransportError> {
            futures::future::pending().await
        }

        async fn close(&mut self) -> Result<(), crate::TransportError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn wedged_sink_cannot_hang_callers() {
        let (mut wire, _hub) = memory_wire(WireFormat::Xmpp);
        wire.sink = Box::new(StuckSink);
        let config = SessionConfig::default().with_request_timeout(Duration::from_millis(50));
        let session = Session::from_wire(wire, config);

        // The deadline covers the write, not just the reply wait.
        let result = session
            .request_with_timeout(&HubRequest::GetCurrentActivity, Duration::from_millis(50))
            .await;
        assert!(matches!(result, Err(RequestError::TimedOut)));

        let (press, _) = HubRequest::hold_action_pair("37", "VolumeUp");
        assert!(matches!(
            session.send_with_id("hold-1-press", &press).await,
            Err(RequestError::TimedOut)
        ));

        // Teardown must come back even when the close frame cannot be
        // written.
        tokio::time::timeout(Duration::from_secs(1), session.disconnect(true))
            .await
            .expect("disconnect must be bounded");
        assert_eq!(session.state(), SessionState::Disconnected);
    }
}
