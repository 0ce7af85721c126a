//! The feedback endpoint: records like/dislike/edit events into the
//! rulebook.

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use tracing::info;

use crate::app_state::AppState;
use crate::error::ChatError;
use crate::feedback::{record_feedback, FeedbackParams};
use crate::store::{FeedbackEntry, FeedbackKind};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRequest {
    pub user_id: String,
    #[serde(default)]
    pub chat_id: Option<String>,
    pub message_id: String,
    #[serde(rename = "type")]
    pub kind: FeedbackKind,
    #[serde(default)]
    pub original_content: Option<String>,
    #[serde(default)]
    pub new_content: Option<String>,
}

pub async fn submit_feedback(
    State(state): State<AppState>,
    Json(request): Json<FeedbackRequest>,
) -> Result<Json<FeedbackEntry>, ChatError> {
    state.counters.record_request();
    info!(
        "Feedback ({}) from user {} on message {}",
        request.kind.as_str(),
        request.user_id,
        request.message_id
    );

    let entry = record_feedback(
        &state.store,
        FeedbackParams {
            user_id: request.user_id,
            chat_id: request.chat_id,
            message_id: request.message_id,
            kind: request.kind,
            original_content: request.original_content,
            new_content: request.new_content,
        },
    )?;

    Ok(Json(entry))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_maps_the_type_field_onto_the_kind() {
        let json = r#"{
            "userId": "user-1",
            "messageId": "m1",
            "type": "edit",
            "originalContent": "old",
            "newContent": "new"
        }"#;
        let request: FeedbackRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.kind, FeedbackKind::Edit);
        assert_eq!(request.new_content.as_deref(), Some("new"));
    }

    #[test]
    fn unknown_feedback_type_fails_to_parse() {
        let json = r#"{"userId": "u", "messageId": "m", "type": "meh"}"#;
        assert!(serde_json::from_str::<FeedbackRequest>(json).is_err());
    }
}
