//! Common test utilities for the notification integration tests.

#![allow(dead_code)]

pub mod mock_socketio_server;
pub mod mock_transport;

use std::time::Duration;

use chrono::{TimeZone, Utc};
use hms_notify::{Notification, NotificationId, NotificationKind};
use serde_json::{json, Value};

pub use mock_socketio_server::MockSocketIoServer;
pub use mock_transport::MockTransport;

/// Upper bound for anything a test waits on.
pub const WAIT: Duration = Duration::from_secs(3);

pub fn notification(id: i64, kind: NotificationKind) -> Notification {
    Notification {
        id: NotificationId(id),
        kind,
        title: format!("Notification {id}"),
        message: "Body".to_string(),
        created_at: Utc.with_ymd_and_hms(2025, 1, 10, 8, 30, 0).unwrap(),
        is_read: false,
        action_url: None,
        user_id: Some(4),
        read_at: None,
    }
}

/// A notification row as the backend serializes it.
pub fn record(id: i64, kind: &str) -> Value {
    json!({
        "id": id,
        "user_id": 4,
        "type": kind,
        "title": format!("Notification {id}"),
        "message": "Body",
        "is_read": false,
        "action_url": null,
        "created_at": "2025-01-10T08:30:00",
        "read_at": "2025-01-10T08:30:00"
    })
}

/// Poll `condition` until it holds or [`WAIT`] elapses.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
