use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::error::CompletionError;
use crate::core::AppConfig;

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub enum Role {
    #[serde(rename = "system")]
    System,
    #[serde(rename = "assistant")]
    Assistant,
    #[serde(rename = "user")]
    User,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct ImageUrl {
    pub url: String,
}

// Object {
//     "type": String("image_url"),
//     "image_url": Object {
//         "url": String("data:image/png;base64,iVBORw0KGg...")
//     }
// }
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(tag = "type")]
pub enum ContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrl },
}

impl ContentPart {
    pub fn text(text: &str) -> Self {
        ContentPart::Text {
            text: text.to_string(),
        }
    }

    pub fn image(url: &str) -> Self {
        ContentPart::ImageUrl {
            image_url: ImageUrl {
                url: url.to_string(),
            },
        }
    }
}

/// Message content is either a plain string or, for messages that
/// carry images, an ordered list of parts.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl Content {
    /// The text of the message, or its first text part.
    pub fn text(&self) -> Option<&str> {
        match self {
            Content::Text(text) => Some(text),
            Content::Parts(parts) => parts.iter().find_map(|part| match part {
                ContentPart::Text { text } => Some(text.as_str()),
                ContentPart::ImageUrl { .. } => None,
            }),
        }
    }
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Message {
    role: Role,
    pub content: Content,
}

impl Message {
    pub fn new(role: Role, content: &str) -> Self {
        Message {
            role,
            content: Content::Text(content.to_string()),
        }
    }

    pub fn new_with_parts(role: Role, parts: Vec<ContentPart>) -> Self {
        Message {
            role,
            content: Content::Parts(parts),
        }
    }

    pub fn role(&self) -> &Role {
        &self.role
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Everything the completion service needs for one reply.
#[derive(Clone, Debug, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub system_prompt: String,
    pub messages: Vec<Message>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl CompletionRequest {
    /// JSON body for a streaming chat completion. The system prompt is
    /// sent as the first message.
    pub fn payload(&self) -> Value {
        let mut messages = Vec::with_capacity(self.messages.len() + 1);
        messages.push(Message::new(Role::System, &self.system_prompt));
        messages.extend(self.messages.iter().cloned());

        json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "stream": true,
            "stream_options": {"include_usage": true}
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent {
    /// The next piece of reply text.
    Delta(String),
    /// The reply is complete. Always the last event of a successful
    /// stream.
    Finished { text: String, usage: Option<Usage> },
}

pub type TextStream = BoxStream<'static, Result<StreamEvent, CompletionError>>;

/// Turns a message list into a streamed text reply.
///
/// An `Err` from `stream` means the request was rejected before any
/// text was produced. Failures after that arrive as an `Err` item in
/// the stream.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn stream(&self, request: CompletionRequest) -> Result<TextStream, CompletionError>;
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorEnvelope {
    error: ProviderErrorBody,
}

#[derive(Debug, Deserialize)]
struct Delta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionChunkChoice {
    delta: Delta,
    #[allow(dead_code)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<CompletionChunkChoice>,
    usage: Option<Usage>,
}

// The error variant has to come first, a chunk with every field
// defaulted would match an error payload too.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StreamPayload {
    Error(ProviderErrorEnvelope),
    Chunk(CompletionChunk),
}

/// Client for an OpenAI compatible chat completions API.
#[derive(Clone, Debug)]
pub struct OpenAiClient {
    api_hostname: String,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(api_hostname: &str, api_key: Option<&str>) -> Self {
        Self {
            api_hostname: api_hostname.trim_end_matches('/').to_string(),
            api_key: api_key.map(str::to_string),
            http: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            &config.openai_api_hostname,
            config.openai_api_key.as_deref(),
        )
    }
}

#[async_trait]
impl CompletionService for OpenAiClient {
    async fn stream(&self, request: CompletionRequest) -> Result<TextStream, CompletionError> {
        let api_key = self
            .api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                tracing::error!("OpenAI API key is not configured");
                CompletionError::MissingApiKey
            })?;

        let url = format!("{}/v1/chat/completions", self.api_hostname);
        let response = self
            .http
            .post(url)
            .bearer_auth(api_key)
            .header("Content-Type", "application/json")
            .timeout(Duration::from_secs(60 * 5))
            .json(&request.payload())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ProviderErrorEnvelope>(&body)
                .map(|envelope| envelope.error.message)
                .unwrap_or(body);
            tracing::error!("Completion request failed with {}: {}", status, message);
            return Err(CompletionError::Provider {
                status: Some(status.as_u16()),
                message,
            });
        }

        Ok(sse_text_stream(response))
    }
}

/// Find the next complete server-sent event. Returns where the event
/// ends and the length of the blank line that terminates it, events
/// may be framed with either `\n\n` or `\r\n\r\n`.
fn find_event_end(buffer: &[u8]) -> Option<(usize, usize)> {
    (0..buffer.len()).find_map(|idx| {
        let rest = &buffer[idx..];
        if rest.starts_with(b"\n\n") {
            Some((idx, 2))
        } else if rest.starts_with(b"\r\n\r\n") {
            Some((idx, 4))
        } else {
            None
        }
    })
}

fn sse_text_stream(response: reqwest::Response) -> TextStream {
    Box::pin(async_stream::stream! {
        let mut bytes = response.bytes_stream();
        // Events can be split across HTTP frames, and so can multi-byte
        // characters, so raw bytes are buffered until an event is whole.
        let mut buffer: Vec<u8> = Vec::new();
        let mut text = String::new();
        let mut usage = None;
        let mut done = false;

        'outer: while let Some(chunk) = bytes.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    yield Err(CompletionError::Transport(e));
                    return;
                }
            };
            buffer.extend_from_slice(&chunk);

            while let Some((event_end, delimiter_len)) = find_event_end(&buffer) {
                let event: Vec<u8> = buffer.drain(..event_end + delimiter_len).collect();
                let event = match std::str::from_utf8(&event[..event_end]) {
                    Ok(event) => event,
                    Err(e) => {
                        yield Err(CompletionError::Decode(e.to_string()));
                        return;
                    }
                };

                for line in event.lines() {
                    let Some(data) = line.strip_prefix("data:") else {
                        continue;
                    };
                    let data = data.trim();
                    if data.is_empty() {
                        continue;
                    }
                    if data == "[DONE]" {
                        done = true;
                        break 'outer;
                    }

                    match serde_json::from_str::<StreamPayload>(data) {
                        Ok(StreamPayload::Error(envelope)) => {
                            tracing::error!("Stream error: {}", envelope.error.message);
                            yield Err(if envelope.error.message.is_empty() {
                                CompletionError::Unknown
                            } else {
                                CompletionError::Provider {
                                    status: None,
                                    message: envelope.error.message,
                                }
                            });
                            return;
                        }
                        Ok(StreamPayload::Chunk(chunk)) => {
                            if let Some(chunk_usage) = chunk.usage {
                                usage = Some(chunk_usage);
                            }
                            let content = chunk
                                .choices
                                .into_iter()
                                .next()
                                .and_then(|choice| choice.delta.content);
                            if let Some(content) = content.filter(|c| !c.is_empty()) {
                                text.push_str(&content);
                                yield Ok(StreamEvent::Delta(content));
                            }
                        }
                        Err(e) => {
                            tracing::error!("Parsing completion chunk failed for {}\nError:{}", data, e);
                            yield Err(CompletionError::Decode(e.to_string()));
                            return;
                        }
                    }
                }
            }
        }

        // A reply is only complete once the provider says so
        if !done {
            tracing::error!(
                "Completion stream ended before completion with {} unparsed bytes",
                buffer.len()
            );
            yield Err(CompletionError::Decode("stream ended before completion".to_string()));
            return;
        }

        tracing::info!("AI Response: {}", text);
        tracing::info!("Usage: {:?}", usage);
        yield Ok(StreamEvent::Finished { text, usage });
    })
}
