//! HarmonyClient - main entry point for the SDK.
//!
//! Wraps one hub session behind a typed facade. The client keeps two
//! caches: the activity/device catalog, replaced wholesale on every fetch,
//! and the current activity id, updated both by explicit queries and by
//! the hub's own push notifications.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use harmony_protocol::{
    channel_change_from_reply, config_from_reply, current_activity_from_reply,
    start_activity_succeeded, ActivityId, ChannelChangeResult, HubConfig, HubEvent, HubRequest,
    Reply,
};
use harmony_stream::{
    ListenerId, ProtocolVariant, RequestError, Session, SessionConfig, WEBSOCKET_PORT, XMPP_PORT,
};

use crate::ClientError;

/// High-level client for one Harmony hub.
///
/// All operations are async and bounded by the session's timeouts. The
/// client is cheap to share behind an `Arc`; every method takes `&self`.
pub struct HarmonyClient {
    session: Session,
    cache: Arc<ClientCache>,
}

#[derive(Default)]
struct ClientCache {
    hub_config: RwLock<Option<Arc<HubConfig>>>,
    current_activity: RwLock<Option<ActivityId>>,
}

impl ClientCache {
    /// Fold a push notification into the caches.
    fn observe(&self, event: &HubEvent) {
        match event {
            HubEvent::ActivityStateDigest { activity_id, .. } => {
                *self.current_activity.write() = Some(*activity_id);
            }
            HubEvent::ActivityStartFinished {
                activity_id,
                error_code,
                ..
            } if error_code == "0" || error_code == "200" => {
                *self.current_activity.write() = Some(*activity_id);
            }
            _ => {}
        }
    }
}

fn timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn request_err(e: RequestError) -> ClientError {
    match e {
        RequestError::Disconnected => ClientError::NotConnected,
        other => ClientError::Request(other),
    }
}

impl HarmonyClient {
    /// Connect to a hub with default settings (XMPP variant, default port).
    ///
    /// `credential` is the hub token for XMPP variants and the remote hub
    /// id for the WebSocket variant.
    pub async fn connect(host: &str, credential: &str) -> Result<Self, ClientError> {
        Self::connect_with_config(host, credential, SessionConfig::default()).await
    }

    /// Connect with explicit session settings. The port follows the wire
    /// variant.
    pub async fn connect_with_config(
        host: &str,
        credential: &str,
        config: SessionConfig,
    ) -> Result<Self, ClientError> {
        let port = match config.variant {
            ProtocolVariant::WebSocket => WEBSOCKET_PORT,
            _ => XMPP_PORT,
        };
        let session = Session::connect(host, port, credential, config).await?;
        Ok(Self::from_session(session))
    }

    /// Wrap an already-established session.
    pub fn from_session(session: Session) -> Self {
        let cache = Arc::new(ClientCache::default());
        {
            let cache = Arc::clone(&cache);
            session.subscribe(move |event| cache.observe(event));
        }
        Self { session, cache }
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_established()
    }

    /// Fetch the activity/device catalog and replace the cached copy.
    pub async fn get_config(&self) -> Result<Arc<HubConfig>, ClientError> {
        let reply = self
            .session
            .request(&HubRequest::GetConfig)
            .await
            .map_err(request_err)?;
        self.check_code(&reply)?;
        let config = Arc::new(config_from_reply(&reply)?);
        info!(
            activities = config.activities.len(),
            devices = config.devices.len(),
            "hub catalog refreshed"
        );
        *self.cache.hub_config.write() = Some(Arc::clone(&config));
        Ok(config)
    }

    /// The cached catalog, if one has been fetched.
    pub fn cached_config(&self) -> Option<Arc<HubConfig>> {
        self.cache.hub_config.read().clone()
    }

    /// Query the hub for the running activity and update the cache.
    pub async fn get_current_activity(&self) -> Result<ActivityId, ClientError> {
        let reply = self
            .session
            .request(&HubRequest::GetCurrentActivity)
            .await
            .map_err(request_err)?;
        self.check_code(&reply)?;
        let id = current_activity_from_reply(&reply)?;
        *self.cache.current_activity.write() = Some(id);
        Ok(id)
    }

    /// The last known running activity, fed by queries and push events.
    pub fn current_activity(&self) -> Option<ActivityId> {
        *self.cache.current_activity.read()
    }

    /// Start an activity, retrying up to the configured attempt budget.
    ///
    /// The hub often carries out an activity start without replying, so a
    /// timed-out attempt checks whether a push notification already
    /// reported the target as running before retrying. Returns `false`
    /// when every attempt was rejected or went unanswered.
    pub async fn start_activity(&self, activity_id: ActivityId) -> Result<bool, ClientError> {
        let attempts = self.session.config().start_activity_attempts;
        for attempt in 1..=attempts {
            let request = HubRequest::StartActivity {
                activity_id,
                timestamp_ms: timestamp_ms(),
            };
            match self.session.request(&request).await {
                Ok(reply) => {
                    if start_activity_succeeded(&reply) {
                        *self.cache.current_activity.write() = Some(activity_id);
                        return Ok(true);
                    }
                    warn!(%activity_id, attempt, "hub rejected activity start");
                }
                Err(RequestError::TimedOut) => {
                    if self.current_activity() == Some(activity_id) {
                        debug!(%activity_id, "activity start confirmed by push event");
                        return Ok(true);
                    }
                    warn!(%activity_id, attempt, "no reply to activity start");
                }
                Err(e) => return Err(request_err(e)),
            }
        }
        Ok(false)
    }

    /// Start an activity by its label, or by id when the string parses as
    /// one. Requires a catalog; fetches it if none is cached.
    pub async fn start_activity_named(&self, activity: &str) -> Result<bool, ClientError> {
        if let Ok(id) = activity.parse::<ActivityId>() {
            return self.start_activity(id).await;
        }
        let config = self.ensure_config().await?;
        let target = config
            .activity_by_label(activity)
            .ok_or_else(|| ClientError::ActivityNotFound(activity.to_string()))?;
        self.start_activity(target.id).await
    }

    /// Power everything off. Already being off counts as success and
    /// sends nothing beyond the current-activity query.
    pub async fn power_off(&self) -> Result<bool, ClientError> {
        let current = self.get_current_activity().await?;
        if current.is_power_off() {
            debug!("hub already powered off");
            return Ok(true);
        }
        self.start_activity(ActivityId::POWER_OFF).await
    }

    /// Send one IR command to a device, addressed by id or label.
    ///
    /// The command must exist in the device's catalog entry; its action
    /// blob supplies the wire device id. Press and release go out as a
    /// fire-and-forget pair sharing a base correlation id.
    pub async fn send_command(&self, device: &str, command: &str) -> Result<(), ClientError> {
        let config = self.ensure_config().await?;
        let entry = config
            .device_by_id(device)
            .or_else(|| config.device_by_label(device))
            .ok_or_else(|| ClientError::DeviceNotFound(device.to_string()))?;
        let action = config.device_action(&entry.id, command).ok_or_else(|| {
            ClientError::CommandNotFound {
                device: device.to_string(),
                command: command.to_string(),
            }
        })?;

        let attempts = self.session.config().send_command_attempts;
        for _ in 0..attempts {
            let (press, release) = HubRequest::hold_action_pair(&action.device_id, &action.command);
            let base = self.session.next_id("holdAction");
            self.session
                .send_with_id(&format!("{base}-press"), &press)
                .await
                .map_err(request_err)?;
            self.session
                .send_with_id(&format!("{base}-release"), &release)
                .await
                .map_err(request_err)?;
        }
        debug!(device = %entry.label, command, "IR command sent");
        Ok(())
    }

    /// Tune the running activity to a channel. The hub's reply body, when
    /// it sends one, comes back in the result.
    pub async fn change_channel(&self, channel: &str) -> Result<ChannelChangeResult, ClientError> {
        let request = HubRequest::ChangeChannel {
            channel: channel.to_string(),
            timestamp_ms: timestamp_ms(),
        };
        let reply = self.session.request(&request).await.map_err(request_err)?;
        self.check_code(&reply)?;
        let outcome = channel_change_from_reply(&reply);
        if let Some(raw) = &outcome.raw {
            debug!(channel, %raw, "channel change reply");
        }
        Ok(outcome)
    }

    /// Ask the hub to resync its catalog with the Logitech service.
    pub async fn sync(&self) -> Result<(), ClientError> {
        let reply = self
            .session
            .request(&HubRequest::Sync)
            .await
            .map_err(request_err)?;
        self.check_code(&reply)
    }

    /// Register a listener for hub push notifications.
    pub fn on_event<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&HubEvent) + Send + Sync + 'static,
    {
        self.session.subscribe(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) {
        self.session.unsubscribe(id)
    }

    /// Close the session. A graceful teardown announces the close on the
    /// wire first; a non-graceful one just drops the connection.
    /// Idempotent.
    pub async fn disconnect(&self, graceful: bool) {
        self.session.disconnect(graceful).await
    }

    async fn ensure_config(&self) -> Result<Arc<HubConfig>, ClientError> {
        if let Some(config) = self.cached_config() {
            return Ok(config);
        }
        self.get_config().await
    }

    fn check_code(&self, reply: &Reply) -> Result<(), ClientError> {
        if reply.is_ok() {
            Ok(())
        } else {
            let code = reply.error_code.clone().unwrap_or_default();
            Err(ClientError::Hub(code))
        }
    }
}
