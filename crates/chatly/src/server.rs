//! HTTP server assembly: router, middleware, and startup.

use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::api::{ask_api, chat_api, events_api, export_api, feedback_api, key_api, send_api};
use crate::app_state::AppState;
use crate::config::Config;
use crate::store::ChatDatabase;

pub async fn run_server(config: Config) -> anyhow::Result<()> {
    config.print_config();

    let store = match ChatDatabase::new(Path::new(&config.database_path)) {
        Ok(db) => Arc::new(db),
        Err(e) => {
            warn!(
                "Failed to open database at {}: {}. Falling back to in-memory store.",
                config.database_path, e
            );
            Arc::new(ChatDatabase::new_in_memory()?)
        }
    };

    let addr = config.api_addr()?;
    let state = AppState::new(config, store);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Chatly listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    // Streaming sends outlive ordinary requests, so the layer-wide timeout
    // follows the stream setting.
    let timeout = Duration::from_secs(state.config.stream_timeout_seconds);

    Router::new()
        .route("/healthz", get(health))
        .route("/api/ask", post(ask_api::ask))
        .route(
            "/api/chats",
            post(chat_api::create_chat).get(chat_api::list_chats),
        )
        .route(
            "/api/chats/:chat_id",
            get(chat_api::get_chat)
                .patch(chat_api::update_chat)
                .delete(chat_api::delete_chat),
        )
        .route("/api/chats/:chat_id/send", post(send_api::send_message))
        .route("/api/chats/:chat_id/events", get(events_api::chat_events))
        .route("/api/feedback", post(feedback_api::submit_feedback))
        .route("/api/export/:chat_id", get(export_api::export_chat))
        .route("/api/keys", post(key_api::create_key).get(key_api::list_keys))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(TimeoutLayer::new(timeout))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "total_requests": state.counters.total_requests.load(Ordering::Relaxed),
        "sends_started": state.counters.sends_started.load(Ordering::Relaxed),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use tower::util::ServiceExt;

    fn test_state() -> AppState {
        let config = Config {
            api_host: "127.0.0.1".into(),
            api_port: 0,
            database_path: ":memory:".into(),
            openai_api_key: None,
            openai_base_url: "http://127.0.0.1:1".into(),
            completion_model: "test-model".into(),
            request_timeout_seconds: 5,
            stream_timeout_seconds: 5,
        };
        let store = Arc::new(ChatDatabase::new_in_memory().unwrap());
        AppState::new(config, store)
    }

    fn json_request(method: &str, uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn healthz_reports_ok() {
        let app = build_router(test_state());
        let response = app
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn chats_can_be_created_and_listed() {
        let app = build_router(test_state());

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/chats",
                r#"{"userId": "user-1", "title": "First"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(
                Request::get("/api/chats?user_id=user-1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let chats: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(chats.as_array().unwrap().len(), 1);
        assert_eq!(chats[0]["title"], "First");
    }

    #[tokio::test]
    async fn ask_without_a_user_id_is_rejected() {
        let app = build_router(test_state());
        let response = app
            .oneshot(json_request(
                "POST",
                "/api/ask",
                r#"{"messages": [{"role": "user", "content": "hi"}]}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["error"], "User ID is required");
    }

    #[tokio::test]
    async fn ask_without_any_credential_names_the_missing_key() {
        let app = build_router(test_state());
        let response = app
            .oneshot(json_request(
                "POST",
                "/api/ask",
                r#"{"userId": "user-1", "messages": [{"role": "user", "content": "hi"}]}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["error"], "API key not configured.");
    }

    #[tokio::test]
    async fn missing_chats_return_not_found() {
        let app = build_router(test_state());
        let response = app
            .oneshot(
                Request::get("/api/chats/no-such-chat")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
