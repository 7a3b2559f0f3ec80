//! Live channel to the notification server.
//!
//! - [`LiveTransport`]: trait the session talks to
//! - [`SocketIoTransport`]: Socket.IO v5 over an Engine.IO v4 WebSocket
//! - [`packet`]: wire codec for both protocol layers

pub mod packet;
mod socketio;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::bus::EventRegistry;

pub use socketio::SocketIoTransport;

// ============================================================================
// Backoff Constants
// ============================================================================

/// Base delay for exponential backoff (milliseconds).
pub const RECONNECT_BASE_DELAY_MS: u64 = 500;

/// Maximum delay for exponential backoff (milliseconds).
pub const RECONNECT_MAX_DELAY_MS: u64 = 10_000;

// ============================================================================
// Transport State
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportState {
    /// No connection and none in progress.
    Disconnected,
    /// Initial handshake in progress.
    Connecting,
    /// Handshake complete; events are being dispatched.
    Connected,
    /// Connection dropped; waiting to retry under the reconnect policy.
    Reconnecting,
    /// Connection dropped or was rejected and will not be retried.
    Failed,
}

impl TransportState {
    /// True while a connection is up or being (re)established.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Connecting | Self::Connected | Self::Reconnecting)
    }
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportState::Disconnected => write!(f, "disconnected"),
            TransportState::Connecting => write!(f, "connecting"),
            TransportState::Connected => write!(f, "connected"),
            TransportState::Reconnecting => write!(f, "reconnecting"),
            TransportState::Failed => write!(f, "failed"),
        }
    }
}

// ============================================================================
// Transport Error Types
// ============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("transport already connected")]
    AlreadyConnected,
    #[error("transport not connected")]
    NotConnected,
    #[error("connection error: {0}")]
    Connection(String),
    #[error("handshake timed out after {0:?}")]
    Timeout(Duration),
    /// The server refused the Socket.IO connect (bad or missing credentials).
    #[error("connection rejected by server: {0}")]
    Rejected(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("reconnection failed after {attempts} attempts: {last_error}")]
    ReconnectionFailed { attempts: u32, last_error: String },
}

impl TransportError {
    pub fn connection<E: fmt::Display>(err: E) -> Self {
        TransportError::Connection(err.to_string())
    }

    pub fn protocol<E: fmt::Display>(err: E) -> Self {
        TransportError::Protocol(err.to_string())
    }

    /// Check if this error is worth retrying under a reconnect policy.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransportError::Connection(_) | TransportError::Timeout(_)
        )
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Credentials sent in the Socket.IO connect packet.
#[derive(Clone, Serialize)]
pub struct ConnectAuth {
    pub user_id: i64,
    pub token: Option<String>,
}

impl fmt::Debug for ConnectAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectAuth")
            .field("user_id", &self.user_id)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// When and how often to re-establish a dropped connection.
///
/// The default never reconnects.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReconnectPolicy {
    #[serde(default)]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Upper bound of the random delay added to each backoff step.
    #[serde(default)]
    pub jitter_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            base_delay_ms: RECONNECT_BASE_DELAY_MS,
            max_delay_ms: RECONNECT_MAX_DELAY_MS,
            jitter_ms: 0,
        }
    }
}

impl ReconnectPolicy {
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_delays(mut self, base: Duration, max: Duration) -> Self {
        self.base_delay_ms = base.as_millis() as u64;
        self.max_delay_ms = max.as_millis() as u64;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.max_attempts > 0
    }

    /// Delay before reconnect attempt `attempt` (zero-based), jitter included.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = exponential_backoff(attempt, self.base_delay_ms, self.max_delay_ms);
        if self.jitter_ms == 0 {
            return base;
        }
        let jitter = rand::thread_rng().gen_range(0..=self.jitter_ms);
        base + Duration::from_millis(jitter)
    }
}

fn default_base_delay_ms() -> u64 {
    RECONNECT_BASE_DELAY_MS
}

fn default_max_delay_ms() -> u64 {
    RECONNECT_MAX_DELAY_MS
}

/// Calculate exponential backoff delay.
fn exponential_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    let delay_ms = base_ms.saturating_mul(2_u64.pow(attempt.min(10)));
    Duration::from_millis(delay_ms.min(max_ms))
}

// ============================================================================
// Transport Trait
// ============================================================================

/// A persistent server-push connection scoped to one authenticated session.
///
/// Implementations dispatch every inbound event, plus the lifecycle events in
/// [`crate::bus::event_types`], into [`events`](Self::events).
#[async_trait]
pub trait LiveTransport: Send + Sync {
    /// Open the connection. Fails with [`TransportError::AlreadyConnected`]
    /// if a connection is already up or in progress.
    async fn connect(&self, auth: ConnectAuth) -> Result<(), TransportError>;

    /// Close the connection. A no-op when not connected.
    async fn disconnect(&self);

    fn state(&self) -> TransportState;

    fn events(&self) -> &EventRegistry;

    fn is_connected(&self) -> bool {
        self.state() == TransportState::Connected
    }
}

// ============================================================================
// Tests
// ============================================================================
