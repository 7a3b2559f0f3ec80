//! One authenticated user's notification session.
//!
//! The session is constructed explicitly with the transport and store it
//! drives. `start` wires the live channel into the store and performs the
//! initial fetch; `end` tears everything down and drops the cached state.

use std::sync::Arc;

use tracing::{info, warn};

use crate::api::{ClientError, SessionCredentials};
use crate::bus::Subscription;
use crate::store::NotificationStore;
use crate::transport::{ConnectAuth, LiveTransport, TransportError};

/// Outcome of each step of [`NotificationSession::start`].
///
/// Every step runs regardless of earlier failures; the caller decides which
/// failures matter.
#[derive(Debug)]
pub struct StartReport {
    pub connected: Result<(), TransportError>,
    pub fetched: Result<usize, ClientError>,
    pub unread: Result<u64, ClientError>,
}

impl StartReport {
    /// True if any step failed.
    pub fn is_degraded(&self) -> bool {
        self.connected.is_err() || self.fetched.is_err() || self.unread.is_err()
    }

    /// Log every failed step at `warn`.
    pub fn log_failures(&self) {
        if let Err(e) = &self.connected {
            warn!("live notifications unavailable: {e}");
        }
        if let Err(e) = &self.fetched {
            warn!("error fetching notifications: {e}");
        }
        if let Err(e) = &self.unread {
            warn!("error fetching unread count: {e}");
        }
    }
}

pub struct NotificationSession {
    credentials: SessionCredentials,
    transport: Arc<dyn LiveTransport>,
    store: NotificationStore,
    live: Option<Subscription>,
}

impl NotificationSession {
    pub fn new(
        credentials: SessionCredentials,
        transport: Arc<dyn LiveTransport>,
        store: NotificationStore,
    ) -> Self {
        Self {
            credentials,
            transport,
            store,
            live: None,
        }
    }

    pub fn user_id(&self) -> i64 {
        self.credentials.user_id
    }

    pub fn store(&self) -> &NotificationStore {
        &self.store
    }

    pub fn transport(&self) -> &Arc<dyn LiveTransport> {
        &self.transport
    }

    pub fn is_started(&self) -> bool {
        self.live.is_some()
    }

    /// Subscribe the store to live pushes, connect, then fetch the current
    /// list and unread count.
    ///
    /// Subscribing first means nothing pushed during the fetch is missed.
    /// Calling `start` again never subscribes twice; it retries the
    /// connection if the transport is not up and repeats the fetch.
    pub async fn start(&mut self) -> StartReport {
        if self.live.is_none() {
            info!(user_id = self.credentials.user_id, "starting notification session");
            self.live = Some(self.store.listen(self.transport.events()));
        }

        let connected = if self.transport.state().is_active() {
            Ok(())
        } else {
            self.transport
                .connect(ConnectAuth {
                    user_id: self.credentials.user_id,
                    token: self.credentials.tokens.access_token(),
                })
                .await
        };

        let fetched = self.store.fetch_all().await;
        let unread = self.store.fetch_unread_count().await;

        StartReport {
            connected,
            fetched,
            unread,
        }
    }

    /// Unsubscribe, disconnect and discard cached notifications.
    pub async fn end(&mut self) {
        if let Some(live) = self.live.take() {
            live.unsubscribe();
        }
        self.transport.disconnect().await;
        self.store.clear();
        info!(user_id = self.credentials.user_id, "notification session ended");
    }
}
