//! Integration tests for the web chat API.
//!
//! Most tests spin up an Axum server on a random port and talk to it with
//! reqwest; the router-level ones drive it in-process with `oneshot`.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::time::timeout;
use tower::ServiceExt;

use lead_assist::chat::ChatService;
use lead_assist::config::SessionConfig;
use lead_assist::notify::LogNotifier;
use lead_assist::reply::{DATA_DELETED_TEXT, GuidedResponder, WELCOME_TEXT};
use lead_assist::session::{Platform, SessionManager};
use lead_assist::store::{LibSqlBackend, SessionStore};
use lead_assist::web;

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

async fn app() -> Router {
    app_with_manager().await.0
}

async fn app_with_manager() -> (Router, Arc<SessionManager>) {
    let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let manager = Arc::new(SessionManager::new(
        SessionStore::new(db),
        SessionConfig::default(),
    ));
    let chat = Arc::new(ChatService::new(
        manager.clone(),
        Arc::new(GuidedResponder),
        Arc::new(LogNotifier),
        4,
    ));
    (web::routes(chat, &["*".to_string()]), manager)
}

/// Start the API on a random port, return the base URL.
async fn start_server() -> String {
    let app = app().await;
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    format!("http://127.0.0.1:{port}")
}

async fn post_chat(base: &str, body: Value) -> Value {
    let resp = reqwest::Client::new()
        .post(format!("{base}/api/chat"))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    resp.json().await.unwrap()
}

#[tokio::test]
async fn health_endpoint() {
    timeout(TEST_TIMEOUT, async {
        let base = start_server().await;
        let resp = reqwest::get(format!("{base}/health")).await.unwrap();
        assert_eq!(resp.status(), 200);

        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "ok");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn chat_assigns_session_and_reports_extraction() {
    timeout(TEST_TIMEOUT, async {
        let base = start_server().await;

        let first = post_chat(&base, json!({"message": "I'm Ram Thapa, ram@mail.com"})).await;
        let session_id = first["session_id"].as_str().unwrap().to_string();
        assert!(session_id.starts_with("web_"));
        assert_eq!(first["user_info_extracted"]["name"], "Ram Thapa");
        assert_eq!(first["user_info_extracted"]["email"], "ram@mail.com");
        assert_eq!(first["is_complete"], false);
        assert_eq!(first["progress_state"], "conversation_active");
        let missing = first["missing_fields"].as_array().unwrap();
        assert!(missing.contains(&json!("phone")));

        let second = post_chat(
            &base,
            json!({"message": "9841234567, I want to go to Australia", "session_id": session_id}),
        )
        .await;
        assert_eq!(second["session_id"], session_id.as_str());
        assert_eq!(second["is_complete"], true);
        assert_eq!(second["progress_state"], "lead_captured");
        assert_eq!(second["user_info_extracted"]["target_country"], "Australia");
        assert!(second["user_info_extracted"].get("name").is_none());
        assert!(
            second["context"]
                .as_str()
                .unwrap()
                .starts_with("Lead complete")
        );
        assert!(second["response"].as_str().unwrap().starts_with("Thank you, Ram Thapa!"));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn session_endpoints_round_trip() {
    timeout(TEST_TIMEOUT, async {
        let base = start_server().await;
        let reply = post_chat(&base, json!({"message": "hello, study in the UK"})).await;
        let id = reply["session_id"].as_str().unwrap().to_string();

        let resp = reqwest::get(format!("{base}/api/sessions/{id}")).await.unwrap();
        assert_eq!(resp.status(), 200);
        let summary: Value = resp.json().await.unwrap();
        assert_eq!(summary["exchange_count"], 1);
        assert_eq!(summary["collected"]["target_country"], "UK");

        let list: Value = reqwest::get(format!("{base}/api/sessions"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(list.as_array().unwrap().len(), 1);

        let resp = reqwest::Client::new()
            .delete(format!("{base}/api/sessions/{id}"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 204);

        let resp = reqwest::get(format!("{base}/api/sessions/{id}")).await.unwrap();
        assert_eq!(resp.status(), 404);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn commands_through_the_api() {
    timeout(TEST_TIMEOUT, async {
        let base = start_server().await;
        let welcome = post_chat(&base, json!({"message": "/start"})).await;
        assert_eq!(welcome["response"], WELCOME_TEXT);
        assert_eq!(welcome["user_info_extracted"], json!({}));

        let id = welcome["session_id"].as_str().unwrap().to_string();
        post_chat(&base, json!({"message": "a@b.co", "session_id": id})).await;
        let deleted = post_chat(&base, json!({"message": "clear chat", "session_id": id})).await;
        assert_eq!(deleted["response"], DATA_DELETED_TEXT);
        assert_eq!(deleted["missing_fields"].as_array().unwrap().len(), 8);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn empty_message_is_rejected() {
    let response = app()
        .await
        .oneshot(
            Request::post("/api/chat")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"message": "   "}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_session_is_404() {
    let response = app()
        .await
        .oneshot(
            Request::get("/api/sessions/web_missing")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn telegram_sessions_are_not_reachable_over_http() {
    let (app, manager) = app_with_manager().await;
    manager
        .process_turn("telegram_1", Platform::Telegram, "tg@mail.com")
        .await;

    let response = app
        .clone()
        .oneshot(
            Request::get("/api/sessions/telegram_1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .oneshot(
            Request::delete("/api/sessions/telegram_1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let kept = manager.get("telegram_1").await.unwrap();
    assert_eq!(kept.draft.email.as_deref(), Some("tg@mail.com"));
}
