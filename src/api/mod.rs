pub mod auth;
mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::model::{Notification, NotificationId};

pub use auth::{SessionCredentials, TokenPair, TokenStore};
pub use http::HttpNotificationApi;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("request timeout: {0}")]
    Timeout(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// The access token was rejected and could not be refreshed.
    #[error("session expired: {0}")]
    SessionExpired(String),
    #[error("server returned status {status}: {detail}")]
    Http { status: u16, detail: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for ClientError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_timeout() {
            return Self::Timeout(value.to_string());
        }
        Self::Request(value.to_string())
    }
}

/// Filters for `GET /notifications`. Unset fields are left to server defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ListQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unread_only: Option<bool>,
}

impl ListQuery {
    pub fn unread() -> Self {
        Self {
            unread_only: Some(true),
            ..Self::default()
        }
    }

    pub fn page(skip: u32, limit: u32) -> Self {
        Self {
            skip: Some(skip),
            limit: Some(limit),
            unread_only: None,
        }
    }
}

/// Acknowledgement body returned by the read endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiMessage {
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub(crate) struct UnreadCount {
    pub unread_count: u64,
}

/// The notification endpoints of the hospital backend.
///
/// The server deletes a notification when it is marked read; both read
/// operations are therefore destructive.
#[async_trait]
pub trait NotificationApi: Send + Sync {
    async fn list(&self, query: &ListQuery) -> Result<Vec<Notification>, ClientError>;

    async fn unread_count(&self) -> Result<u64, ClientError>;

    async fn mark_read(&self, id: NotificationId) -> Result<ApiMessage, ClientError>;

    async fn mark_all_read(&self) -> Result<ApiMessage, ClientError>;

    async fn delete(&self, id: NotificationId) -> Result<(), ClientError>;
}
