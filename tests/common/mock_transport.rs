//! In-process transport for session integration testing.

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use hms_notify::bus::event_types::{EVENT_CONNECT, EVENT_DISCONNECT};
use hms_notify::transport::{ConnectAuth, LiveTransport, TransportError, TransportState};
use hms_notify::EventRegistry;

/// A transport whose server side is driven directly by the test.
pub struct MockTransport {
    events: EventRegistry,
    state: Mutex<TransportState>,
    auths: Mutex<Vec<ConnectAuth>>,
    should_fail_connection: Mutex<Option<String>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            events: EventRegistry::new(),
            state: Mutex::new(TransportState::Disconnected),
            auths: Mutex::new(Vec::new()),
            should_fail_connection: Mutex::new(None),
        }
    }

    /// Make subsequent connects fail with `message`.
    pub fn set_should_fail_connection(&self, message: impl Into<String>) {
        *self.should_fail_connection.lock().unwrap() = Some(message.into());
    }

    /// Deliver a server event to subscribers, as the wire transport would.
    pub fn emit(&self, event: &str, payload: Value) -> usize {
        self.events.dispatch(event, &payload)
    }

    pub fn auths(&self) -> Vec<ConnectAuth> {
        self.auths.lock().unwrap().clone()
    }
}

#[async_trait]
impl LiveTransport for MockTransport {
    async fn connect(&self, auth: ConnectAuth) -> Result<(), TransportError> {
        if self.state().is_active() {
            return Err(TransportError::AlreadyConnected);
        }
        self.auths.lock().unwrap().push(auth);

        if let Some(message) = self.should_fail_connection.lock().unwrap().clone() {
            *self.state.lock().unwrap() = TransportState::Failed;
            return Err(TransportError::Connection(message));
        }

        *self.state.lock().unwrap() = TransportState::Connected;
        self.events
            .dispatch(EVENT_CONNECT, &serde_json::json!({ "sid": "mock" }));
        Ok(())
    }

    async fn disconnect(&self) {
        let was_active = {
            let mut state = self.state.lock().unwrap();
            let was_active = state.is_active();
            *state = TransportState::Disconnected;
            was_active
        };
        if was_active {
            self.events.dispatch(
                EVENT_DISCONNECT,
                &serde_json::json!({ "reason": "io client disconnect" }),
            );
        }
    }

    fn state(&self) -> TransportState {
        *self.state.lock().unwrap()
    }

    fn events(&self) -> &EventRegistry {
        &self.events
    }
}
