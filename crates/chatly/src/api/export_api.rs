//! Chat export: one JSON document with the transcript, the user's learned
//! rules rendered as readable lines, and summary counts, served as a
//! download.

use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::Response;
use axum::body::Body;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::app_state::AppState;
use crate::error::ChatError;
use crate::store::{Chat, FeedbackEntry, FeedbackKind, MessageRow};

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    pub user_id: String,
}

#[derive(Debug, Serialize)]
pub struct ExportDocument {
    pub chat: Chat,
    pub messages: Vec<MessageRow>,
    /// Human-readable rule lines, one per feedback entry.
    pub ruleset: Vec<String>,
    pub export_date: String,
    pub total_messages: usize,
    pub total_rules: usize,
}

/// Renders a feedback entry as an export line. Edits missing their
/// replacement text are skipped; the other kinds always render.
fn export_line(entry: &FeedbackEntry) -> Option<String> {
    match entry.kind {
        FeedbackKind::Like => Some(format!(
            "\u{2713} GOOD RESPONSE: \"{}\"",
            entry.original_content
        )),
        FeedbackKind::Dislike => Some(format!(
            "\u{2717} BAD RESPONSE: \"{}\"",
            entry.original_content
        )),
        FeedbackKind::Edit => entry.new_content.as_deref().map(|new| {
            format!(
                "\u{1F4DD} EDIT: Original: \"{}\" \u{2192} Improved: \"{}\"",
                entry.original_content, new
            )
        }),
    }
}

fn sanitize_for_filename(title: &str) -> String {
    let sanitized: String = title
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect();
    if sanitized.is_empty() {
        "chat".to_string()
    } else {
        sanitized
    }
}

pub async fn export_chat(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, ChatError> {
    state.counters.record_request();

    let chat = state
        .store
        .chats
        .get(&chat_id)?
        .ok_or_else(|| ChatError::Validation(format!("Chat {} not found", chat_id)))?;
    if chat.user_id != query.user_id {
        return Err(ChatError::Validation("Chat belongs to another user.".into()));
    }

    let messages = state.store.messages.for_chat(&chat_id)?;
    let entries = state.store.rulebook.for_user(&query.user_id)?;
    let ruleset: Vec<String> = entries.iter().filter_map(export_line).collect();

    let now = Utc::now();
    let filename = format!(
        "chatly-export-{}-{}.json",
        sanitize_for_filename(chat.title.as_deref().unwrap_or("chat")),
        now.format("%Y-%m-%d")
    );

    let document = ExportDocument {
        total_messages: messages.len(),
        total_rules: ruleset.len(),
        chat,
        messages,
        ruleset,
        export_date: now.to_rfc3339(),
    };

    info!(
        "Exporting chat {} ({} messages, {} rules)",
        chat_id, document.total_messages, document.total_rules
    );

    let body = serde_json::to_vec_pretty(&document)
        .map_err(|e| ChatError::Persistence(format!("export serialization failed: {}", e)))?;

    Response::builder()
        .header(header::CONTENT_TYPE, "application/json")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", filename),
        )
        .body(Body::from(body))
        .map_err(|e| ChatError::Persistence(format!("response build failed: {}", e)))
}
