//! Per-chat message feed over SSE. Clients subscribe to see rows inserted
//! by other sessions; rows they inserted themselves come back too, so
//! consumers dedupe by row id.

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::{Stream, StreamExt};
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tracing::info;

use crate::app_state::AppState;

pub async fn chat_events(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    state.counters.record_request();
    info!("New event subscriber for chat {}", chat_id);

    let rx = state.store.feed.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(move |result| {
        let chat_id = chat_id.clone();
        async move {
            match result {
                // Lagged receivers just skip what they missed
                Err(_) => None,
                Ok(row) if row.chat_id != chat_id => None,
                Ok(row) => Some(Event::default().json_data(row)),
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

#[cfg(test)]
mod tests {
    use crate::store::ChatDatabase;
    use tokio_stream::wrappers::BroadcastStream;
    use tokio_stream::StreamExt;

    #[tokio::test]
    async fn feed_subscribers_see_rows_for_their_chat() {
        let db = ChatDatabase::new_in_memory().unwrap();
        let chat_a = db.chats.create("user-1", None, None).unwrap();
        let chat_b = db.chats.create("user-1", None, None).unwrap();

        let mut stream = BroadcastStream::new(db.feed.subscribe())
            .filter_map(|r| r.ok())
            .filter({
                let id = chat_a.id.clone();
                move |row| row.chat_id == id
            });

        db.messages.insert(&chat_b.id, "user", "other chat").unwrap();
        db.messages.insert(&chat_a.id, "user", "this chat").unwrap();

        let row = stream.next().await.unwrap();
        assert_eq!(row.content, "this chat");
    }
}
