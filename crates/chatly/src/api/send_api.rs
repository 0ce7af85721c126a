//! The stateful send endpoint: runs the message pipeline for a chat and
//! streams its events back as SSE.

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

use crate::app_state::AppState;
use crate::error::ChatError;
use crate::pipeline::SendEvent;
use crate::store::MessageRow;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    pub user_id: String,
    pub message: String,
}

/// Wire form of a pipeline event.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum SendWireEvent {
    UserSaveFailed,
    Fragment { text: String },
    Saved { message: MessageRow },
    SaveFailed { content: String },
    EmptyReply,
    Failed { error: String },
}

impl From<SendEvent> for SendWireEvent {
    fn from(event: SendEvent) -> Self {
        match event {
            SendEvent::UserSaveFailed => SendWireEvent::UserSaveFailed,
            SendEvent::Fragment(text) => SendWireEvent::Fragment { text },
            SendEvent::Saved(message) => SendWireEvent::Saved { message },
            SendEvent::SaveFailed { content } => SendWireEvent::SaveFailed { content },
            SendEvent::EmptyReply => SendWireEvent::EmptyReply,
            SendEvent::Failed(e) => SendWireEvent::Failed {
                error: e.to_string(),
            },
        }
    }
}

pub async fn send_message(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Json(request): Json<SendRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ChatError> {
    state.counters.record_request();
    state.counters.record_send();
    info!("Send request for chat {}", chat_id);

    let events = state
        .pipeline
        .send(&chat_id, &request.user_id, &request.message)
        .await?;

    let stream = events.map(|event| Event::default().json_data(SendWireEvent::from(event)));
    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}
