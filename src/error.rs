use serde::Serialize;

use crate::api::ClientError;
use crate::calendar::CalendarError;
use crate::config::ConfigError;
use crate::transport::TransportError;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("{0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Client(#[from] ClientError),
    #[error("{0}")]
    Transport(#[from] TransportError),
    #[error("{0}")]
    Calendar(#[from] CalendarError),
    #[error("{0}")]
    Other(String),
}

impl Serialize for NotifyError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

/// Log-and-swallow policy for call sites that must not fail the caller.
pub trait ResultExt<T> {
    /// Logs the error at `warn` with `context` and discards it.
    fn or_log(self, context: &str) -> Option<T>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for Result<T, E> {
    fn or_log(self, context: &str) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(error) => {
                tracing::warn!("{context}: {error}");
                None
            }
        }
    }
}
