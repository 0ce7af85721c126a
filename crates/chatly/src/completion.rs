//! Completion backends: the hosted chat-completions API (streamed SSE,
//! decoded into text fragments) and user-supplied external endpoints (relayed
//! as raw bytes with the upstream content type preserved).

use crate::config::Config;
use crate::error::ChatError;
use crate::store::Persona;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: String,
    pub content: String,
}

/// Payload POSTed to a user-supplied external endpoint. Mirrors the shape the
/// client sends on /api/ask so an endpoint can serve either path.
#[derive(Debug, Serialize)]
pub struct ExternalPayload {
    pub question: String,
    pub history: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persona: Option<Persona>,
    #[serde(rename = "dynamicRuleset", skip_serializing_if = "Option::is_none")]
    pub dynamic_ruleset: Option<String>,
}

/// Response from an external endpoint: the upstream content type plus its
/// body bytes, untouched.
pub struct ExternalReply {
    pub content_type: String,
    pub bytes: BoxStream<'static, Result<Bytes, ChatError>>,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<WireMessage>,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: Option<ChatDelta>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatDelta {
    content: Option<String>,
}

pub struct CompletionClient {
    http_client: reqwest::Client,
    base_url: String,
    model: String,
}

impl CompletionClient {
    pub fn new(config: &Config) -> Self {
        Self::new_with_backend(
            config.openai_base_url.clone(),
            config.completion_model.clone(),
            config.stream_timeout_seconds,
        )
    }

    pub fn new_with_backend(base_url: String, model: String, timeout_seconds: u64) -> Self {
        Self {
            http_client: reqwest::Client::builder()
                .timeout(Duration::from_secs(timeout_seconds))
                .build()
                .unwrap_or_default(),
            base_url,
            model,
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }

    /// Streams a hosted completion as decoded text fragments, in arrival
    /// order. The stream ends at `[DONE]`, at a `finish_reason`, or when the
    /// connection closes; a non-success status before any bytes arrive is
    /// returned as an error up front.
    pub async fn stream_hosted(
        &self,
        api_key: &str,
        messages: Vec<WireMessage>,
    ) -> Result<BoxStream<'static, Result<String, ChatError>>, ChatError> {
        debug!("Starting hosted completion stream ({} messages)", messages.len());
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages,
            temperature: 0.7,
            stream: true,
        };

        let response = self
            .http_client
            .post(self.completions_url())
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ChatError::upstream(502, format!("completion request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::upstream(status, body));
        }

        let byte_stream = response.bytes_stream();
        let fragments = async_stream::try_stream! {
            let mut buffer = String::new();
            futures_util::pin_mut!(byte_stream);
            while let Some(chunk_result) = byte_stream.next().await {
                let chunk = chunk_result
                    .map_err(|e| ChatError::upstream(502, format!("stream read error: {}", e)))?;
                buffer.push_str(&String::from_utf8_lossy(&chunk));
                while let Some(newline_pos) = buffer.find('\n') {
                    let line = buffer[..newline_pos].trim().to_string();
                    buffer = buffer[newline_pos + 1..].to_string();
                    let Some(data) = line.strip_prefix("data: ") else {
                        continue;
                    };
                    if data == "[DONE]" {
                        return;
                    }
                    // Unparseable chunks are skipped rather than failing the
                    // whole stream.
                    let Ok(parsed) = serde_json::from_str::<StreamChunk>(data) else {
                        continue;
                    };
                    let finished = parsed.choices.iter().any(|c| c.finish_reason.is_some());
                    for choice in parsed.choices {
                        if let Some(content) = choice.delta.and_then(|d| d.content) {
                            if !content.is_empty() {
                                yield content;
                            }
                        }
                    }
                    if finished {
                        return;
                    }
                }
            }
        };

        Ok(fragments.boxed())
    }

    /// POSTs the payload to a user-supplied endpoint and hands back the reply
    /// bytes with the upstream content type. No interpretation happens here;
    /// callers decide whether to relay or decode.
    pub async fn call_external(
        &self,
        endpoint: &str,
        payload: &ExternalPayload,
    ) -> Result<ExternalReply, ChatError> {
        debug!("Calling external endpoint: {}", endpoint);
        let response = self
            .http_client
            .post(endpoint)
            .json(payload)
            .send()
            .await
            .map_err(|e| ChatError::upstream(502, format!("external endpoint failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::upstream(status, body));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("text/plain; charset=utf-8")
            .to_string();

        let bytes = response
            .bytes_stream()
            .map(|r| r.map_err(|e| ChatError::upstream(502, format!("stream read error: {}", e))))
            .boxed();

        Ok(ExternalReply { content_type, bytes })
    }
}

/// Builds the system prompt for a send: the persona's own prompt (or one
/// assembled from its fields) with the rendered ruleset appended. Returns
/// None when there is nothing to say.
pub fn system_prompt(persona: Option<&Persona>, ruleset: &str) -> Option<String> {
    let mut prompt = String::new();

    if let Some(p) = persona {
        if let Some(sp) = p.system_prompt.as_deref().filter(|s| !s.trim().is_empty()) {
            prompt.push_str(sp);
        } else {
            if let Some(role) = p.role.as_deref().filter(|s| !s.trim().is_empty()) {
                prompt.push_str(&format!("You are {}.", role));
            }
            if let Some(tone) = p.tone.as_deref().filter(|s| !s.trim().is_empty()) {
                if !prompt.is_empty() {
                    prompt.push(' ');
                }
                prompt.push_str(&format!("Respond in a {} tone.", tone));
            }
            if let Some(info) = p.additional_info.as_deref().filter(|s| !s.trim().is_empty()) {
                if !prompt.is_empty() {
                    prompt.push(' ');
                }
                prompt.push_str(info);
            }
        }
    }

    prompt.push_str(ruleset);

    if prompt.is_empty() {
        None
    } else {
        Some(prompt)
    }
}
