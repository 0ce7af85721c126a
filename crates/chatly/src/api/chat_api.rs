//! Chat CRUD endpoints.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info};

use crate::app_state::AppState;
use crate::store::{Chat, MessageRow, Persona};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateChatRequest {
    pub user_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub persona: Option<Persona>,
}

#[derive(Debug, Deserialize)]
pub struct ListChatsQuery {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateChatRequest {
    pub title: String,
}

#[derive(Debug, Serialize)]
pub struct ChatDetailResponse {
    pub chat: Chat,
    pub messages: Vec<MessageRow>,
}

pub async fn create_chat(
    State(state): State<AppState>,
    Json(request): Json<CreateChatRequest>,
) -> Result<Json<Chat>, Response> {
    state.counters.record_request();

    match state.store.chats.create(
        &request.user_id,
        request.title.as_deref(),
        request.persona.as_ref(),
    ) {
        Ok(chat) => Ok(Json(chat)),
        Err(e) => {
            error!("Failed to create chat: {}", e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, format!("Database error: {}", e))
                .into_response())
        }
    }
}

pub async fn list_chats(
    State(state): State<AppState>,
    Query(query): Query<ListChatsQuery>,
) -> Result<Json<Vec<Chat>>, Response> {
    state.counters.record_request();

    match state.store.chats.list_for_user(&query.user_id) {
        Ok(chats) => {
            info!("Found {} chats for user {}", chats.len(), query.user_id);
            Ok(Json(chats))
        }
        Err(e) => {
            error!("Failed to list chats: {}", e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, format!("Database error: {}", e))
                .into_response())
        }
    }
}

pub async fn get_chat(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
) -> Result<Json<ChatDetailResponse>, Response> {
    state.counters.record_request();

    let chat = match state.store.chats.get(&chat_id) {
        Ok(Some(chat)) => chat,
        Ok(None) => {
            return Err((StatusCode::NOT_FOUND, "Chat not found").into_response());
        }
        Err(e) => {
            error!("Failed to fetch chat {}: {}", chat_id, e);
            return Err((StatusCode::INTERNAL_SERVER_ERROR, format!("Database error: {}", e))
                .into_response());
        }
    };

    match state.store.messages.for_chat(&chat_id) {
        Ok(messages) => Ok(Json(ChatDetailResponse { chat, messages })),
        Err(e) => {
            error!("Failed to fetch messages for chat {}: {}", chat_id, e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, format!("Database error: {}", e))
                .into_response())
        }
    }
}

pub async fn update_chat(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Json(request): Json<UpdateChatRequest>,
) -> Result<Json<Value>, Response> {
    state.counters.record_request();

    match state.store.chats.update_title(&chat_id, &request.title) {
        Ok(()) => Ok(Json(json!({ "success": true }))),
        Err(e) => {
            error!("Failed to update chat {}: {}", chat_id, e);
            Err((StatusCode::NOT_FOUND, format!("Update failed: {}", e)).into_response())
        }
    }
}

pub async fn delete_chat(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
) -> Result<Json<Value>, Response> {
    state.counters.record_request();

    match state.store.chats.delete(&chat_id) {
        Ok(0) => Err((StatusCode::NOT_FOUND, "Chat not found").into_response()),
        Ok(_) => Ok(Json(json!({ "success": true }))),
        Err(e) => {
            error!("Failed to delete chat {}: {}", chat_id, e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, format!("Database error: {}", e))
                .into_response())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_request_accepts_camel_case_and_optional_fields() {
        let json = r#"{"userId": "user-1", "persona": {"role": "helper"}}"#;
        let request: CreateChatRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.user_id, "user-1");
        assert!(request.title.is_none());
        assert_eq!(request.persona.unwrap().role.as_deref(), Some("helper"));
    }
}
