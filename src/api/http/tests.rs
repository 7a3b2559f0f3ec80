use httpmock::Method::{DELETE, GET, POST, PUT};
use httpmock::MockServer;
use pretty_assertions::assert_eq;
use serde_json::json;

use super::*;
use crate::model::NotificationKind;

fn tokens(access: &str, refresh: Option<&str>) -> TokenStore {
    TokenStore::new(TokenPair {
        access_token: access.to_string(),
        refresh_token: refresh.map(str::to_string),
    })
}

fn api_for(server: &MockServer, tokens: TokenStore) -> HttpNotificationApi {
    HttpNotificationApi::with_base_url(&format!("{}/api/v1", server.base_url()), 5_000, tokens)
        .expect("client should initialize")
}

fn record(id: i64, kind: &str) -> Value {
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

#[tokio::test]
async fn list_sends_bearer_token_and_decodes_records() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/api/v1/notifications")
            .header("authorization", "Bearer access-1")
            .header("content-type", "application/json");
        then.status(200).json_body(json!([
            record(1, "appointment"),
            record(2, "lab_test"),
            record(3, "billing")
        ]));
    });

    let api = api_for(&server, tokens("access-1", None));
    let notifications = api
        .list(&ListQuery::default())
        .await
        .expect("list should succeed");

    mock.assert();
    assert_eq!(notifications.len(), 3);
    assert_eq!(notifications[1].kind, NotificationKind::LabTest);
    assert_eq!(notifications[2].id, NotificationId(3));
}

#[tokio::test]
async fn list_forwards_query_filters() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/api/v1/notifications")
            .query_param("unread_only", "true");
        then.status(200).json_body(json!([]));
    });

    let api = api_for(&server, tokens("access-1", None));
    let notifications = api.list(&ListQuery::unread()).await.unwrap();

    mock.assert();
    assert!(notifications.is_empty());
}

#[tokio::test]
async fn unread_count_reads_wrapped_value() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/api/v1/notifications/unread-count");
        then.status(200).json_body(json!({ "unread_count": 7 }));
    });

    let api = api_for(&server, tokens("access-1", None));
    assert_eq!(api.unread_count().await.unwrap(), 7);
    mock.assert();
}

#[tokio::test]
async fn mark_read_and_mark_all_use_put() {
    let server = MockServer::start();
    let one = server.mock(|when, then| {
        when.method(PUT).path("/api/v1/notifications/12/read");
        then.status(200)
            .json_body(json!({ "message": "Notification marked as read and removed" }));
    });
    let all = server.mock(|when, then| {
        when.method(PUT).path("/api/v1/notifications/mark-all-read");
        then.status(200)
            .json_body(json!({ "message": "5 notifications marked as read and removed" }));
    });

    let api = api_for(&server, tokens("access-1", None));
    let ack = api.mark_read(NotificationId(12)).await.unwrap();
    assert_eq!(ack.message, "Notification marked as read and removed");
    let ack = api.mark_all_read().await.unwrap();
    assert!(ack.message.starts_with("5 notifications"));

    one.assert();
    all.assert();
}

#[tokio::test]
async fn delete_accepts_no_content() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(DELETE).path("/api/v1/notifications/9");
        then.status(204);
    });

    let api = api_for(&server, tokens("access-1", None));
    api.delete(NotificationId(9)).await.expect("delete should succeed");
    mock.assert();
}

#[tokio::test]
async fn maps_fastapi_error_details() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(DELETE).path("/api/v1/notifications/404");
        then.status(404).json_body(json!({ "detail": "Notification not found" }));
    });
    server.mock(|when, then| {
        when.method(PUT).path("/api/v1/notifications/403/read");
        then.status(403).json_body(json!({ "detail": "Not enough permissions" }));
    });
    server.mock(|when, then| {
        when.method(GET).path("/api/v1/notifications/unread-count");
        then.status(500).body("Internal Server Error");
    });

    let api = api_for(&server, tokens("access-1", None));

    let err = api.delete(NotificationId(404)).await.unwrap_err();
    assert!(
        matches!(&err, ClientError::NotFound(detail) if detail.contains("Notification not found")),
        "{err}"
    );

    let err = api.mark_read(NotificationId(403)).await.unwrap_err();
    assert!(matches!(err, ClientError::Forbidden(_)), "{err}");

    let err = api.unread_count().await.unwrap_err();
    match err {
        ClientError::Http { status, detail } => {
            assert_eq!(status, 500);
            assert_eq!(detail, "Internal Server Error");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn refreshes_token_once_on_unauthorized() {
    let server = MockServer::start();
    let stale = server.mock(|when, then| {
        when.method(GET)
            .path("/api/v1/notifications/unread-count")
            .header("authorization", "Bearer stale");
        then.status(401).json_body(json!({ "detail": "Could not validate credentials" }));
    });
    let refresh = server.mock(|when, then| {
        when.method(POST)
            .path("/api/v1/auth/refresh")
            .json_body(json!({ "refresh_token": "refresh-1" }));
        then.status(200).json_body(json!({
            "access_token": "fresh",
            "refresh_token": "refresh-2",
            "token_type": "bearer"
        }));
    });
    let fresh = server.mock(|when, then| {
        when.method(GET)
            .path("/api/v1/notifications/unread-count")
            .header("authorization", "Bearer fresh");
        then.status(200).json_body(json!({ "unread_count": 2 }));
    });

    let store = tokens("stale", Some("refresh-1"));
    let api = api_for(&server, store.clone());

    assert_eq!(api.unread_count().await.unwrap(), 2);
    stale.assert();
    refresh.assert();
    fresh.assert();
    assert_eq!(store.access_token().as_deref(), Some("fresh"));
    assert_eq!(store.refresh_token().as_deref(), Some("refresh-2"));
}

#[tokio::test]
async fn failed_refresh_expires_the_session() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/api/v1/notifications");
        then.status(401);
    });
    let refresh = server.mock(|when, then| {
        when.method(POST).path("/api/v1/auth/refresh");
        then.status(401).json_body(json!({ "detail": "Invalid refresh token" }));
    });

    let store = tokens("stale", Some("refresh-1"));
    let api = api_for(&server, store.clone());

    let err = api.list(&ListQuery::default()).await.unwrap_err();
    assert!(matches!(err, ClientError::SessionExpired(_)), "{err}");
    refresh.assert();
    assert!(store.get().is_none());
}

#[tokio::test]
async fn missing_refresh_token_expires_without_calling_refresh() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/api/v1/notifications/unread-count");
        then.status(401);
    });
    let refresh = server.mock(|when, then| {
        when.method(POST).path("/api/v1/auth/refresh");
        then.status(200);
    });

    let api = api_for(&server, tokens("stale", None));
    let err = api.unread_count().await.unwrap_err();

    assert!(matches!(err, ClientError::SessionExpired(_)));
    refresh.assert_hits(0);
}

#[tokio::test]
async fn malformed_body_is_an_invalid_response() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/api/v1/notifications");
        then.status(200).json_body(json!({ "unexpected": true }));
    });

    let api = api_for(&server, tokens("access-1", None));
    let err = api.list(&ListQuery::default()).await.unwrap_err();
    assert!(matches!(err, ClientError::InvalidResponse(_)), "{err}");
}

#[test]
fn error_detail_prefers_detail_field() {
    assert_eq!(error_detail(r#"{"detail":"nope"}"#), "nope");
    assert_eq!(
        error_detail(r#"{"detail":[{"loc":["path","id"]}]}"#),
        r#"[{"loc":["path","id"]}]"#
    );
    assert_eq!(error_detail("plain text\n"), "plain text");
}

#[test]
fn rejects_empty_base_url() {
    assert!(HttpNotificationApi::with_base_url("  ", 1_000, TokenStore::empty()).is_err());
}
