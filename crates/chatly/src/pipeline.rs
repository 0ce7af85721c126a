//! The send pipeline: one user message in, one streamed assistant reply out.
//!
//! A send moves through sending (optimistic user row, persist), streaming
//! (fragments appended in arrival order), and finalizing (persist the reply
//! or mark it unsaved). Failures on the persistence side degrade the result;
//! failures on the completion side end the attempt. At most one send per
//! chat is in flight at a time.

use crate::backend::CompletionBackend;
use crate::completion::{system_prompt, CompletionClient, ExternalPayload, WireMessage};
use crate::error::ChatError;
use crate::ruleset::render_ruleset;
use crate::store::{Chat, ChatDatabase, MessageRow};
use crate::transcript::Transcript;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::stream::BoxStream;
use futures_util::{Stream, StreamExt};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Appended to rendered reply text when the finalize write fails.
pub const SAVE_FAILED_MARKER: &str = " (failed to save)";

/// What a consumer of an in-flight send observes, in order: an optional
/// user-save warning, zero or more fragments, then exactly one terminal
/// event.
#[derive(Debug)]
pub enum SendEvent {
    /// The user message could not be persisted; the send continues anyway.
    UserSaveFailed,
    Fragment(String),
    /// Terminal: reply persisted as this row.
    Saved(MessageRow),
    /// Terminal: reply rendered but not persisted; content carries the
    /// unsaved marker.
    SaveFailed { content: String },
    /// Terminal: the backend produced no text; nothing was persisted.
    EmptyReply,
    /// Terminal: the stream failed mid-flight. Text rendered so far stays
    /// visible but is not persisted.
    Failed(ChatError),
}

pub struct MessagePipeline {
    store: Arc<ChatDatabase>,
    completions: Arc<CompletionClient>,
    server_api_key: Option<String>,
    in_flight: Arc<DashMap<String, ()>>,
}

/// Releases the chat's in-flight slot when the send's event stream is
/// dropped, consumed or not.
struct SendGuard {
    chat_id: String,
    in_flight: Arc<DashMap<String, ()>>,
}

impl Drop for SendGuard {
    fn drop(&mut self) {
        self.in_flight.remove(&self.chat_id);
    }
}

impl MessagePipeline {
    pub fn new(
        store: Arc<ChatDatabase>,
        completions: Arc<CompletionClient>,
        server_api_key: Option<String>,
    ) -> Self {
        Self {
            store,
            completions,
            server_api_key,
            in_flight: Arc::new(DashMap::new()),
        }
    }

    /// Runs a send for `chat_id`. Errors returned here happened before any
    /// fragment could exist (bad input, no backend, upstream refused the
    /// request); once this returns Ok, failures arrive as events.
    pub async fn send(
        &self,
        chat_id: &str,
        user_id: &str,
        input: &str,
    ) -> Result<impl Stream<Item = SendEvent> + Send + 'static, ChatError> {
        let input = input.trim().to_string();
        if input.is_empty() {
            return Err(ChatError::Validation("Message is empty.".into()));
        }

        let guard = self.acquire(chat_id)?;

        let chat = self
            .store
            .chats
            .get(chat_id)?
            .ok_or_else(|| ChatError::Validation(format!("Chat {} not found", chat_id)))?;
        if chat.user_id != user_id {
            return Err(ChatError::Validation("Chat belongs to another user.".into()));
        }

        let mut transcript = Transcript::new(self.store.messages.for_chat(chat_id)?);

        // Optimistic user row; swapped for the persisted one below.
        let local_user = MessageRow::local(chat_id, "user", &input);
        let local_user_id = local_user.id.clone();
        transcript.append(local_user);
        let history = transcript.wire_history();

        let mut user_save_failed = false;
        match self.store.messages.insert(chat_id, "user", &input) {
            Ok(row) => transcript.replace(&local_user_id, row),
            Err(e) => {
                warn!("Failed to persist user message in chat {}: {}", chat_id, e);
                transcript.remove(&local_user_id);
                user_save_failed = true;
            }
        }

        let ruleset = match self.store.rulebook.for_user(user_id) {
            Ok(entries) => render_ruleset(&entries),
            Err(e) => {
                warn!("Failed to load rulebook for user {}: {}", user_id, e);
                String::new()
            }
        };

        let fragments = self
            .open_fragment_stream(&chat, user_id, &input, history, &ruleset)
            .await?;

        // The optimistic row may have been rolled back, so the transcript
        // can be empty here.
        debug!(
            "Send started in chat {} ({} prior rows)",
            chat_id,
            transcript.len().saturating_sub(1)
        );

        let store = Arc::clone(&self.store);
        let chat_id = chat_id.to_string();
        let events = async_stream::stream! {
            let _guard = guard;

            if user_save_failed {
                yield SendEvent::UserSaveFailed;
            }

            let placeholder = MessageRow::local(&chat_id, "assistant", "");
            let placeholder_id = placeholder.id.clone();
            transcript.append(placeholder);

            futures_util::pin_mut!(fragments);
            while let Some(item) = fragments.next().await {
                match item {
                    Ok(fragment) => {
                        transcript.append_fragment(&placeholder_id, &fragment);
                        yield SendEvent::Fragment(fragment);
                    }
                    Err(e) => {
                        error!("Completion stream failed in chat {}: {}", chat_id, e);
                        yield SendEvent::Failed(e);
                        return;
                    }
                }
            }

            let content = transcript
                .get(&placeholder_id)
                .map(|r| r.content.clone())
                .unwrap_or_default();
            if content.trim().is_empty() {
                info!("Empty reply in chat {}; nothing persisted", chat_id);
                transcript.remove(&placeholder_id);
                yield SendEvent::EmptyReply;
                return;
            }

            match store.messages.insert(&chat_id, "assistant", &content) {
                Ok(row) => {
                    transcript.replace(&placeholder_id, row.clone());
                    yield SendEvent::Saved(row);
                }
                Err(e) => {
                    warn!("Failed to persist reply in chat {}: {}", chat_id, e);
                    let marked = format!("{}{}", content, SAVE_FAILED_MARKER);
                    transcript.set_content(&placeholder_id, &marked);
                    yield SendEvent::SaveFailed { content: marked };
                }
            }
        };

        Ok(events)
    }

    fn acquire(&self, chat_id: &str) -> Result<SendGuard, ChatError> {
        match self.in_flight.entry(chat_id.to_string()) {
            Entry::Occupied(_) => Err(ChatError::Validation(
                "A response is already being generated for this chat.".into(),
            )),
            Entry::Vacant(slot) => {
                slot.insert(());
                Ok(SendGuard {
                    chat_id: chat_id.to_string(),
                    in_flight: Arc::clone(&self.in_flight),
                })
            }
        }
    }

    /// Resolves the backend for this send and opens the fragment stream.
    /// Both backends come back as the same shape: decoded text fragments.
    async fn open_fragment_stream(
        &self,
        chat: &Chat,
        user_id: &str,
        question: &str,
        history: Vec<WireMessage>,
        ruleset: &str,
    ) -> Result<BoxStream<'static, Result<String, ChatError>>, ChatError> {
        let stored_key = match self.store.api_keys.enabled_key_for_user(user_id) {
            Ok(key) => key,
            Err(e) => {
                warn!("Failed to look up stored keys for user {}: {}", user_id, e);
                None
            }
        };
        let persona_key = chat.persona.as_ref().and_then(|p| p.api_key.clone());
        let credential = stored_key.or(persona_key);

        match CompletionBackend::select(credential.as_deref(), self.server_api_key.as_deref()) {
            CompletionBackend::Hosted { api_key } => {
                let mut messages = Vec::with_capacity(history.len() + 1);
                if let Some(prompt) = system_prompt(chat.persona.as_ref(), ruleset) {
                    messages.push(WireMessage {
                        role: "system".into(),
                        content: prompt,
                    });
                }
                messages.extend(history);
                self.completions.stream_hosted(&api_key, messages).await
            }
            CompletionBackend::External { endpoint } => {
                let prior: Vec<WireMessage> =
                    history[..history.len().saturating_sub(1)].to_vec();
                let payload = ExternalPayload {
                    question: question.to_string(),
                    history: prior,
                    persona: chat.persona.clone(),
                    dynamic_ruleset: Some(ruleset.to_string()).filter(|r| !r.is_empty()),
                };
                let reply = self.completions.call_external(&endpoint, &payload).await?;
                // Reply bytes become text fragments; decoding is lossy per
                // chunk.
                Ok(reply
                    .bytes
                    .map(|r| r.map(|b| String::from_utf8_lossy(&b).into_owned()))
                    .boxed())
            }
            CompletionBackend::Unconfigured => {
                Err(ChatError::Configuration("API key not configured.".into()))
            }
        }
    }
}
