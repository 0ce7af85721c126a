//! The /api/ask endpoint: stateless question answering for clients that
//! manage their own transcripts. The body carries the full message history;
//! the reply is streamed back as plain text (hosted backend) or relayed
//! byte-for-byte (external endpoint).

use axum::body::Body;
use axum::extract::State;
use axum::http::header;
use axum::response::Response;
use axum::Json;
use bytes::Bytes;
use futures_util::StreamExt;
use serde::Deserialize;
use tracing::{info, warn};

use crate::app_state::AppState;
use crate::backend::CompletionBackend;
use crate::completion::{system_prompt, ExternalPayload, WireMessage};
use crate::error::ChatError;
use crate::ruleset::render_ruleset;
use crate::store::Persona;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AskRequest {
    #[serde(default)]
    pub messages: Vec<WireMessage>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub chat_id: Option<String>,
    #[serde(default)]
    pub persona: Option<Persona>,
    /// Client-rendered ruleset block. When absent the server renders one
    /// from the user's rulebook.
    #[serde(default)]
    pub dynamic_ruleset: Option<String>,
}

pub async fn ask(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> Result<Response, ChatError> {
    state.counters.record_request();

    let user_id = request
        .user_id
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ChatError::Validation("User ID is required".into()))?;
    if request.messages.is_empty() {
        return Err(ChatError::Validation("Messages are required".into()));
    }

    info!(
        "Ask request from user {} ({} messages)",
        user_id,
        request.messages.len()
    );

    let ruleset = match request.dynamic_ruleset {
        Some(r) => r,
        None => match state.store.rulebook.for_user(user_id) {
            Ok(entries) => render_ruleset(&entries),
            Err(e) => {
                warn!("Failed to load rulebook for user {}: {}", user_id, e);
                String::new()
            }
        },
    };

    let stored_key = match state.store.api_keys.enabled_key_for_user(user_id) {
        Ok(key) => key,
        Err(e) => {
            warn!("Failed to look up stored keys for user {}: {}", user_id, e);
            None
        }
    };
    let persona_key = request.persona.as_ref().and_then(|p| p.api_key.clone());
    let credential = stored_key.or(persona_key);

    match CompletionBackend::select(
        credential.as_deref(),
        state.config.openai_api_key.as_deref(),
    ) {
        CompletionBackend::Hosted { api_key } => {
            let mut messages = Vec::with_capacity(request.messages.len() + 1);
            if let Some(prompt) = system_prompt(request.persona.as_ref(), &ruleset) {
                messages.push(WireMessage {
                    role: "system".into(),
                    content: prompt,
                });
            }
            messages.extend(request.messages);

            let fragments = state.completions.stream_hosted(&api_key, messages).await?;
            let body = Body::from_stream(fragments.map(|r| r.map(Bytes::from)));
            Response::builder()
                .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
                .body(body)
                .map_err(|e| ChatError::Persistence(format!("response build failed: {}", e)))
        }
        CompletionBackend::External { endpoint } => {
            // Last message is the question; the rest is history.
            let mut history = request.messages;
            let question = history
                .pop()
                .map(|m| m.content)
                .unwrap_or_default();
            let payload = ExternalPayload {
                question,
                history,
                persona: request.persona,
                dynamic_ruleset: Some(ruleset).filter(|r| !r.is_empty()),
            };

            let reply = state.completions.call_external(&endpoint, &payload).await?;
            Response::builder()
                .header(header::CONTENT_TYPE, reply.content_type)
                .body(Body::from_stream(reply.bytes))
                .map_err(|e| ChatError::Persistence(format!("response build failed: {}", e)))
        }
        CompletionBackend::Unconfigured => {
            Err(ChatError::Configuration("API key not configured.".into()))
        }
    }
}
