// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Operator API tests against the full router, wired with mock sockets and
//! a tempfile SQLite store.

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use zapline_core::types::SocketEvent;
use zapline_core::{LateRegistry, RecordStore};
use zapline_dispatch::{DispatchSettings, Dispatcher, ReplyChain};
use zapline_gateway::{build_router, AuthConfig, GatewayState};
use zapline_session::{SessionManager, SessionSettings};
use zapline_storage::SqliteStore;
use zapline_test_utils::{
    eventually, CollectingSink, MemoryCredentialStore, MockDriver, MockTextProvider,
};

const TOKEN: &str = "test-operator-token";

struct Fixture {
    router: Router,
    driver: Arc<MockDriver>,
    store: Arc<SqliteStore>,
    _dir: tempfile::TempDir,
}

async fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let config = zapline_config::model::StorageConfig {
        database_path: dir.path().join("test.db").to_str().unwrap().to_string(),
        credentials_dir: "unused".to_string(),
    };
    let store = Arc::new(SqliteStore::open(&config).await.unwrap());
    let driver = Arc::new(MockDriver::new());
    let credentials = Arc::new(MemoryCredentialStore::new());
    let sink = Arc::new(CollectingSink::new());

    let late = LateRegistry::new();
    let chain = ReplyChain::new(
        Arc::new(MockTextProvider::new("primary", "olá!")),
        None,
        None,
        None,
        "fallback".to_string(),
    );
    let dispatcher = Dispatcher::new(
        store.clone(),
        Arc::new(late.clone()),
        chain,
        DispatchSettings::default(),
    );
    let manager = SessionManager::new(
        driver.clone(),
        credentials,
        store.clone(),
        sink,
        Arc::new(dispatcher.clone()),
        SessionSettings::default(),
    );
    late.bind(Arc::new(manager.clone()));

    let state = GatewayState {
        manager,
        dispatcher,
        store: store.clone(),
        auth: AuthConfig {
            bearer_token: Some(TOKEN.to_string()),
        },
        start_time: Instant::now(),
    };

    Fixture {
        router: build_router(state),
        driver,
        store,
        _dir: dir,
    }
}

fn request(method: &str, uri: &str, body: Option<serde_json::Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {TOKEN}"))
        .header("content-type", "application/json");
    match body {
        Some(json) => builder.body(Body::from(json.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_is_public() {
    let fx = fixture().await;
    let response = fx
        .router
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn api_rejects_missing_and_wrong_tokens() {
    let fx = fixture().await;

    let response = fx
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/v1/sessions/s1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = fx
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/v1/sessions/s1")
                .header("authorization", "Bearer wrong")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test(start_paused = true)]
async fn connect_exposes_qr_through_status_endpoint() {
    let fx = fixture().await;
    fx.driver
        .push_script(vec![SocketEvent::Qr {
            code: "qr-payload".into(),
        }])
        .await;

    let response = fx
        .router
        .clone()
        .oneshot(request(
            "POST",
            "/v1/sessions/s1/connect",
            Some(serde_json::json!({"tenant_id": "t1"})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    assert!(
        eventually(|| async {
            let record = fx.store.get_session("s1").await.unwrap();
            matches!(record, Some(r) if r.qr_code.is_some())
        })
        .await
    );

    let response = fx
        .router
        .clone()
        .oneshot(request("GET", "/v1/sessions/s1", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "qr_ready");
    assert_eq!(json["qr_code"], "qr-payload");
}

#[tokio::test]
async fn unknown_session_status_is_404() {
    let fx = fixture().await;
    let response = fx
        .router
        .clone()
        .oneshot(request("GET", "/v1/sessions/ghost", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test(start_paused = true)]
async fn invalid_pairing_number_is_rejected_with_400() {
    let fx = fixture().await;
    fx.driver.push_script(vec![]).await;
    fx.router
        .clone()
        .oneshot(request(
            "POST",
            "/v1/sessions/s1/connect",
            Some(serde_json::json!({"tenant_id": "t1"})),
        ))
        .await
        .unwrap();
    assert!(eventually(|| async { fx.driver.open_count() == 1 }).await);

    let response = fx
        .router
        .clone()
        .oneshot(request(
            "POST",
            "/v1/sessions/s1/pairing-code",
            Some(serde_json::json!({"phone_number": "+55 1"})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert!(json["error"].as_str().unwrap().contains("phone number"));
}

#[tokio::test(start_paused = true)]
async fn one_off_send_goes_through_the_live_socket() {
    let fx = fixture().await;
    fx.driver
        .push_script(vec![SocketEvent::ConnectionOpen {
            phone_number: "5511999990000".into(),
        }])
        .await;
    fx.router
        .clone()
        .oneshot(request(
            "POST",
            "/v1/sessions/s1/connect",
            Some(serde_json::json!({"tenant_id": "t1"})),
        ))
        .await
        .unwrap();
    assert!(
        eventually(|| async {
            fx.store
                .get_session("s1")
                .await
                .unwrap()
                .is_some_and(|r| r.status == zapline_core::SessionStatus::Connected)
        })
        .await
    );

    let response = fx
        .router
        .clone()
        .oneshot(request(
            "POST",
            "/v1/sessions/s1/messages",
            Some(serde_json::json!({"to": "5511988887777", "text": "tudo certo!"})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert!(json["message_id"].as_str().is_some());

    let socket = fx.driver.last_socket().await.unwrap();
    assert_eq!(
        socket.sent().await,
        vec![("5511988887777".to_string(), "tudo certo!".to_string())]
    );
}

#[tokio::test]
async fn broadcast_lifecycle_via_api() {
    let fx = fixture().await;

    let response = fx
        .router
        .clone()
        .oneshot(request(
            "POST",
            "/v1/broadcasts",
            Some(serde_json::json!({
                "session_id": "s1",
                "content": "promoção!",
                "recipients": ["111", "222"]
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let json = body_json(response).await;
    let job_id = json["id"].as_str().unwrap().to_string();

    let response = fx
        .router
        .clone()
        .oneshot(request("GET", &format!("/v1/broadcasts/{job_id}"), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["job_status"], "queued");
    assert_eq!(json["recipients"].as_array().unwrap().len(), 2);

    let response = fx
        .router
        .clone()
        .oneshot(request("DELETE", &format!("/v1/broadcasts/{job_id}"), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn broadcast_without_recipients_is_400() {
    let fx = fixture().await;
    let response = fx
        .router
        .clone()
        .oneshot(request(
            "POST",
            "/v1/broadcasts",
            Some(serde_json::json!({
                "session_id": "s1",
                "content": "promoção!",
                "recipients": []
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
