use std::fmt;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

/// Access/refresh pair as issued by `POST /auth/login` and `/auth/refresh`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Shared, replaceable token storage for one login.
///
/// The REST client writes refreshed tokens here. The session reads the
/// access token for the first connect, and a transport given this store via
/// `SocketIoTransport::with_token_source` reads it again on every reconnect.
/// Cloning shares the storage.
#[derive(Clone, Default)]
pub struct TokenStore {
    inner: Arc<RwLock<Option<TokenPair>>>,
}

impl fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenStore")
            .field("has_tokens", &self.get().is_some())
            .finish()
    }
}

impl TokenStore {
    pub fn new(tokens: TokenPair) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Some(tokens))),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<TokenPair> {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.get().map(|pair| pair.access_token)
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.get().and_then(|pair| pair.refresh_token)
    }

    pub fn set(&self, tokens: TokenPair) {
        *self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(tokens);
    }

    pub fn clear(&self) {
        *self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
    }
}

/// Who the session belongs to and how it authenticates.
#[derive(Debug, Clone)]
pub struct SessionCredentials {
    pub user_id: i64,
    pub tokens: TokenStore,
}

impl SessionCredentials {
    pub fn new(user_id: i64, tokens: TokenStore) -> Self {
        Self { user_id, tokens }
    }
}
