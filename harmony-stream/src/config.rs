//! Session configuration.
//!
//! Controls the wire variant, every bounded deadline, and the retry budgets
//! for the request kinds the hub answers unreliably. Every suspension point
//! in the crate derives its upper bound from here; nothing waits forever.

use std::time::Duration;

use crate::error::ConfigurationError;

/// Which wire protocol to speak to the hub.
///
/// Chosen once at construction; a session speaks exactly one variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtocolVariant {
    /// Legacy XMPP with unencrypted SASL PLAIN and no resource binding.
    XmppPlain,
    /// XMPP with PLAIN authentication followed by resource binding.
    #[default]
    Xmpp,
    /// WebSocket-framed JSON exchange used by newer hub firmware.
    WebSocket,
}

/// Configuration for a hub session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Wire protocol variant.
    pub variant: ProtocolVariant,

    /// Upper bound on connect + handshake, including the wait for the
    /// hub's session-started signal.
    /// Default: 10 seconds
    pub connect_timeout: Duration,

    /// Per-request reply deadline.
    /// Default: 10 seconds
    pub request_timeout: Duration,

    /// Attempts for start-activity before surfacing failure.
    /// Default: 3
    pub start_activity_attempts: u32,

    /// Attempts for fire-and-forget IR commands.
    /// Default: 1
    pub send_command_attempts: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            variant: ProtocolVariant::default(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(10),
            start_activity_attempts: 3,
            send_command_attempts: 1,
        }
    }
}

impl SessionConfig {
    /// Create a new SessionConfig with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Preset for the legacy XMPP variant spoken by pre-2018 firmware.
    pub fn legacy_xmpp() -> Self {
        Self {
            variant: ProtocolVariant::XmppPlain,
            ..Default::default()
        }
    }

    /// Preset for the WebSocket variant spoken by newer firmware.
    pub fn websocket() -> Self {
        Self {
            variant: ProtocolVariant::WebSocket,
            ..Default::default()
        }
    }

    /// Validate the configuration and return any issues
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.connect_timeout == Duration::ZERO {
            return Err(ConfigurationError(
                "connect_timeout must be greater than 0".to_string(),
            ));
        }
        if self.request_timeout == Duration::ZERO {
            return Err(ConfigurationError(
                "request_timeout must be greater than 0".to_string(),
            ));
        }
        if self.start_activity_attempts == 0 {
            return Err(ConfigurationError(
                "start_activity_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_variant(mut self, variant: ProtocolVariant) -> Self {
        self.variant = variant;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_start_activity_attempts(mut self, attempts: u32) -> Self {
        self.start_activity_attempts = attempts;
        self
    }
}
