//! Validates and records feedback against assistant messages.

use crate::error::ChatError;
use crate::store::{ChatDatabase, FeedbackEntry, FeedbackKind};
use tracing::debug;

pub struct FeedbackParams {
    pub user_id: String,
    pub chat_id: Option<String>,
    pub message_id: String,
    pub kind: FeedbackKind,
    /// Snapshot of the message text as the user saw it. Falls back to the
    /// stored message content when absent.
    pub original_content: Option<String>,
    pub new_content: Option<String>,
}

/// Records one feedback event. The target message must exist and be an
/// assistant message; edits must carry replacement text. Messages are never
/// mutated by feedback, only the rulebook grows.
pub fn record_feedback(
    store: &ChatDatabase,
    params: FeedbackParams,
) -> Result<FeedbackEntry, ChatError> {
    let message = store
        .messages
        .get(&params.message_id)?
        .ok_or_else(|| {
            ChatError::Validation(format!("Message {} not found", params.message_id))
        })?;
    if message.role != "assistant" {
        return Err(ChatError::Validation(
            "Feedback can only target assistant messages.".into(),
        ));
    }

    let new_content = match params.kind {
        FeedbackKind::Edit => {
            let text = params
                .new_content
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .ok_or_else(|| {
                    ChatError::Validation("Edit feedback requires replacement text.".into())
                })?;
            Some(text.to_string())
        }
        FeedbackKind::Like | FeedbackKind::Dislike => None,
    };

    let original = params
        .original_content
        .filter(|c| !c.is_empty())
        .unwrap_or(message.content);

    let chat_id = params.chat_id.or(Some(message.chat_id));
    let entry = store.rulebook.insert(
        &params.user_id,
        chat_id.as_deref(),
        Some(&params.message_id),
        params.kind,
        &original,
        new_content.as_deref(),
    )?;

    debug!(
        "Feedback {} recorded against message {}",
        entry.id, params.message_id
    );
    Ok(entry)
}
