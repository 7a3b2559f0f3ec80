use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::auth::{TokenPair, TokenStore};
use super::{ApiMessage, ClientError, ListQuery, NotificationApi, UnreadCount};
use crate::config::ClientConfig;
use crate::model::{Notification, NotificationId};

/// `NotificationApi` over the backend's REST endpoints.
pub struct HttpNotificationApi {
    base_url: String,
    timeout_ms: u64,
    client: reqwest::Client,
    tokens: TokenStore,
    refresh_lock: Mutex<()>,
}

impl HttpNotificationApi {
    pub fn new(config: &ClientConfig, tokens: TokenStore) -> Result<Self, ClientError> {
        Self::with_base_url(&config.api_base_url, config.request_timeout_ms, tokens)
    }

    pub fn with_base_url(
        base_url: &str,
        timeout_ms: u64,
        tokens: TokenStore,
    ) -> Result<Self, ClientError> {
        if base_url.trim().is_empty() {
            return Err(ClientError::Request("api base url cannot be empty".to_string()));
        }
        Ok(Self {
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            timeout_ms,
            client: reqwest::Client::builder()
                .timeout(Duration::from_millis(timeout_ms))
                .build()
                .map_err(|error| ClientError::Request(error.to_string()))?,
            tokens,
            refresh_lock: Mutex::new(()),
        })
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a request, refreshing the access token once on a 401.
    async fn execute(
        &self,
        method: Method,
        path: &str,
        query: Option<&ListQuery>,
    ) -> Result<Response, ClientError> {
        let url = self.url(path);
        let (response, used_token) = self.send_once(&method, &url, query).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        debug!("{method} {url} returned 401, refreshing access token");
        self.refresh_tokens(used_token).await?;

        let (retry, _) = self.send_once(&method, &url, query).await?;
        if retry.status() == StatusCode::UNAUTHORIZED {
            self.tokens.clear();
            return Err(ClientError::SessionExpired(
                "access token rejected after refresh".to_string(),
            ));
        }
        Ok(retry)
    }

    async fn send_once(
        &self,
        method: &Method,
        url: &str,
        query: Option<&ListQuery>,
    ) -> Result<(Response, Option<String>), ClientError> {
        let token = self.tokens.access_token();
        let mut request = self
            .client
            .request(method.clone(), url)
            .header(CONTENT_TYPE, "application/json");
        if let Some(query) = query {
            request = request.query(query);
        }
        match &token {
            Some(token) => request = request.bearer_auth(token),
            None => warn!("request without access token: {method} {url}"),
        }

        let response = request
            .send()
            .await
            .map_err(|error| self.map_connectivity_error(error))?;
        Ok((response, token))
    }

    async fn refresh_tokens(&self, rejected: Option<String>) -> Result<(), ClientError> {
        let _guard = self.refresh_lock.lock().await;

        // Another request refreshed while this one waited for the lock.
        if self.tokens.access_token() != rejected && self.tokens.access_token().is_some() {
            return Ok(());
        }

        let Some(refresh_token) = self.tokens.refresh_token() else {
            self.tokens.clear();
            return Err(ClientError::SessionExpired("no refresh token available".to_string()));
        };

        let response = self
            .client
            .post(self.url("/auth/refresh"))
            .json(&json!({ "refresh_token": refresh_token }))
            .send()
            .await;

        let response = match response {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                self.tokens.clear();
                return Err(ClientError::SessionExpired(format!(
                    "token refresh returned status {}",
                    response.status().as_u16()
                )));
            }
            Err(error) => {
                self.tokens.clear();
                return Err(ClientError::SessionExpired(format!(
                    "token refresh failed: {error}"
                )));
            }
        };

        let pair: TokenPair = match response.json().await {
            Ok(pair) => pair,
            Err(error) => {
                self.tokens.clear();
                return Err(ClientError::SessionExpired(format!(
                    "token refresh returned an invalid body: {error}"
                )));
            }
        };

        self.tokens.set(TokenPair {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token.or(Some(refresh_token)),
        });
        info!("access token refreshed");
        Ok(())
    }

    fn map_connectivity_error(&self, error: reqwest::Error) -> ClientError {
        if error.is_connect() {
            return ClientError::Request(format!(
                "could not reach the backend at {}: {error}",
                self.base_url
            ));
        }
        if error.is_timeout() {
            return ClientError::Timeout(format!(
                "request timed out after {} ms",
                self.timeout_ms
            ));
        }
        ClientError::from(error)
    }
}

#[async_trait]
impl NotificationApi for HttpNotificationApi {
    async fn list(&self, query: &ListQuery) -> Result<Vec<Notification>, ClientError> {
        let response = self
            .execute(Method::GET, "/notifications", Some(query))
            .await?;
        read_json(response, "notification list").await
    }

    async fn unread_count(&self) -> Result<u64, ClientError> {
        let response = self
            .execute(Method::GET, "/notifications/unread-count", None)
            .await?;
        let body: UnreadCount = read_json(response, "unread count").await?;
        Ok(body.unread_count)
    }

    async fn mark_read(&self, id: NotificationId) -> Result<ApiMessage, ClientError> {
        let response = self
            .execute(Method::PUT, &format!("/notifications/{id}/read"), None)
            .await?;
        read_json(response, &format!("notification {id}")).await
    }

    async fn mark_all_read(&self) -> Result<ApiMessage, ClientError> {
        let response = self
            .execute(Method::PUT, "/notifications/mark-all-read", None)
            .await?;
        read_json(response, "mark all read").await
    }

    async fn delete(&self, id: NotificationId) -> Result<(), ClientError> {
        let response = self
            .execute(Method::DELETE, &format!("/notifications/{id}"), None)
            .await?;
        check_status(response, &format!("notification {id}")).await?;
        Ok(())
    }
}

async fn read_json<T: DeserializeOwned>(response: Response, what: &str) -> Result<T, ClientError> {
    let response = check_status(response, what).await?;
    response
        .json::<T>()
        .await
        .map_err(|error| ClientError::InvalidResponse(format!("failed to parse {what} JSON: {error}")))
}

async fn check_status(response: Response, what: &str) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let detail = error_detail(&body);
    Err(match status {
        StatusCode::NOT_FOUND => ClientError::NotFound(format!("{what}: {detail}")),
        StatusCode::FORBIDDEN => ClientError::Forbidden(format!("{what}: {detail}")),
        _ => ClientError::Http {
            status: status.as_u16(),
            detail,
        },
    })
}

/// FastAPI error bodies look like `{"detail": ...}`; fall back to the raw body.
fn error_detail(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value.get("detail").map(|detail| match detail.as_str() {
                Some(text) => text.to_string(),
                None => detail.to_string(),
            })
        })
        .unwrap_or_else(|| body.trim().to_string())
}

#[cfg(test)]
mod tests;
