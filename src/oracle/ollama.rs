//! Ollama chat client.
//!
//! Requests go to `POST /api/chat` with `stream: true`; the response is
//! newline-delimited JSON, one object per fragment, the last one carrying
//! `"done": true`. The HTTP client is built without a request timeout since a
//! long document part can keep the model busy for a long time.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use serde::{Deserialize, Serialize};

use super::{CorrectionOracle, FragmentStream};
use crate::errors::OracleError;

/// Streaming chat client for one model.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    context_window: u32,
    system_prompt: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    options: ChatOptions,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    num_ctx: u32,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: Option<ChunkMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

/// One decoded line of the chat stream.
#[derive(Debug, PartialEq, Eq)]
struct Fragment {
    content: String,
    done: bool,
}

impl OllamaClient {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        context_window: u32,
    ) -> Result<Self, OracleError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(60))
            .pool_idle_timeout(None)
            .build()
            .map_err(|e| OracleError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            context_window,
            system_prompt: None,
        })
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Names of the models the server has pulled.
    pub async fn list_models(&self) -> Result<Vec<String>, OracleError> {
        let resp = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
            .map_err(|e| OracleError::Transport(e.to_string()))?;
        let resp = check_status(resp).await?;
        let tags: TagsResponse = resp
            .json()
            .await
            .map_err(|e| OracleError::Transport(e.to_string()))?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    /// Fail early when the configured model is not on the server.
    pub async fn ensure_model(&self) -> Result<(), OracleError> {
        let models = self.list_models().await?;
        if model_listed(&models, &self.model) {
            Ok(())
        } else {
            Err(OracleError::ModelMissing {
                model: self.model.clone(),
            })
        }
    }

    fn chat_request<'a>(&'a self, text: &'a str) -> ChatRequest<'a> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = self.system_prompt.as_deref() {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: text,
        });
        ChatRequest {
            model: &self.model,
            messages,
            stream: true,
            options: ChatOptions {
                num_ctx: self.context_window,
            },
        }
    }
}

#[async_trait]
impl CorrectionOracle for OllamaClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn correct(&self, text: &str) -> Result<FragmentStream, OracleError> {
        tracing::debug!(model = %self.model, chars = text.chars().count(), "sending unit to oracle");
        let resp = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&self.chat_request(text))
            .send()
            .await
            .map_err(|e| OracleError::Transport(e.to_string()))?;
        let resp = check_status(resp).await?;

        let bytes = resp
            .bytes_stream()
            .map(|chunk| {
                chunk
                    .map(|b| b.to_vec())
                    .map_err(|e| OracleError::Transport(e.to_string()))
            })
            .boxed();
        Ok(decode_chat_stream(bytes))
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, OracleError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(OracleError::Status {
        status: status.as_u16(),
        body,
    })
}

fn model_listed(models: &[String], model: &str) -> bool {
    models
        .iter()
        .any(|m| m == model || (!model.contains(':') && *m == format!("{}:latest", model)))
}

fn parse_chat_line(line: &[u8]) -> Result<Option<Fragment>, OracleError> {
    let text = String::from_utf8_lossy(line);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let chunk: ChatChunk = serde_json::from_str(trimmed).map_err(OracleError::Decode)?;
    if let Some(error) = chunk.error {
        return Err(OracleError::Remote(error));
    }
    Ok(Some(Fragment {
        content: chunk.message.map(|m| m.content).unwrap_or_default(),
        done: chunk.done,
    }))
}

struct DecodeState {
    bytes: BoxStream<'static, Result<Vec<u8>, OracleError>>,
    buffer: Vec<u8>,
    finished: bool,
}

/// Turn a raw NDJSON byte stream into text fragments.
///
/// The stream ends cleanly only after a `done` line; running out of bytes
/// before that yields `OracleError::Truncated`.
fn decode_chat_stream(bytes: BoxStream<'static, Result<Vec<u8>, OracleError>>) -> FragmentStream {
    let state = DecodeState {
        bytes,
        buffer: Vec::new(),
        finished: false,
    };

    stream::try_unfold(state, |mut state| async move {
        loop {
            if state.finished {
                return Ok(None);
            }

            if let Some(pos) = state.buffer.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = state.buffer.drain(..=pos).collect();
                if let Some(fragment) = parse_chat_line(&line)? {
                    state.finished = fragment.done;
                    return Ok(Some((fragment.content, state)));
                }
                continue;
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => state.buffer.extend_from_slice(&chunk),
                Some(Err(e)) => return Err(e),
                None => {
                    let rest = std::mem::take(&mut state.buffer);
                    return match parse_chat_line(&rest)? {
                        Some(fragment) if fragment.done => {
                            state.finished = true;
                            Ok(Some((fragment.content, state)))
                        }
                        _ => Err(OracleError::Truncated),
                    };
                }
            }
        }
    })
    .boxed()
}
