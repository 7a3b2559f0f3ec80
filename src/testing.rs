//! Test doubles shared by the unit tests.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use crate::api::{ApiMessage, ClientError, ListQuery, NotificationApi};
use crate::model::{Notification, NotificationId, NotificationKind};

pub fn notification(id: i64) -> Notification {
    Notification {
        id: NotificationId(id),
        kind: NotificationKind::Appointment,
        title: format!("Appointment #{id}"),
        message: "You have an upcoming appointment".to_string(),
        created_at: Utc.with_ymd_and_hms(2025, 1, 10, 8, 30, 0).unwrap(),
        is_read: false,
        action_url: Some("/patient/appointments".to_string()),
        user_id: Some(4),
        read_at: None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    List,
    UnreadCount,
    MarkRead(NotificationId),
    MarkAllRead,
    Delete(NotificationId),
}

/// In-memory backend with the server's delete-on-read semantics.
#[derive(Default)]
pub struct StubApi {
    server: Mutex<Vec<Notification>>,
    calls: Mutex<Vec<Call>>,
    offline: Mutex<bool>,
}

impl StubApi {
    pub fn with_notifications(notifications: Vec<Notification>) -> Self {
        Self {
            server: Mutex::new(notifications),
            ..Self::default()
        }
    }

    /// Make every subsequent call fail with a connection error.
    pub fn set_offline(&self, offline: bool) {
        *self.offline.lock().unwrap() = offline;
    }

    pub fn push(&self, notification: Notification) {
        self.server.lock().unwrap().insert(0, notification);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn server_len(&self) -> usize {
        self.server.lock().unwrap().len()
    }

    fn record(&self, call: Call) -> Result<(), ClientError> {
        self.calls.lock().unwrap().push(call);
        if *self.offline.lock().unwrap() {
            return Err(ClientError::Request("could not reach the backend".to_string()));
        }
        Ok(())
    }

    fn remove(&self, id: NotificationId) -> Result<(), ClientError> {
        let mut server = self.server.lock().unwrap();
        let before = server.len();
        server.retain(|n| n.id != id);
        if server.len() == before {
            return Err(ClientError::NotFound(format!(
                "notification {id}: Notification not found"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationApi for StubApi {
    async fn list(&self, query: &ListQuery) -> Result<Vec<Notification>, ClientError> {
        self.record(Call::List)?;
        let server = self.server.lock().unwrap();
        let skip = query.skip.unwrap_or(0) as usize;
        let limit = query.limit.unwrap_or(50) as usize;
        Ok(server
            .iter()
            .filter(|n| !query.unread_only.unwrap_or(false) || !n.is_read)
            .skip(skip)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn unread_count(&self) -> Result<u64, ClientError> {
        self.record(Call::UnreadCount)?;
        Ok(self.server.lock().unwrap().iter().filter(|n| !n.is_read).count() as u64)
    }

    async fn mark_read(&self, id: NotificationId) -> Result<ApiMessage, ClientError> {
        self.record(Call::MarkRead(id))?;
        self.remove(id)?;
        Ok(ApiMessage {
            message: "Notification marked as read and removed".to_string(),
        })
    }

    async fn mark_all_read(&self) -> Result<ApiMessage, ClientError> {
        self.record(Call::MarkAllRead)?;
        let mut server = self.server.lock().unwrap();
        let before = server.len();
        server.retain(|n| n.is_read);
        Ok(ApiMessage {
            message: format!("{} notifications marked as read and removed", before - server.len()),
        })
    }

    async fn delete(&self, id: NotificationId) -> Result<(), ClientError> {
        self.record(Call::Delete(id))?;
        self.remove(id)
    }
}
