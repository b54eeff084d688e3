//! Anthropic Messages API gateway.
//!
//! Buffered calls decode the JSON response body directly. Streaming calls
//! feed the server-sent event body through [`SseDecoder`] on a background
//! task and hand the caller an ordered channel of [`StreamEvent`]s.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use capplan_core::config::LlmConfig;
use futures_util::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use crate::llm::{
    parse_http_error, BlockKind, ContentBlock, EventStream, GatewayError, ModelGateway,
    ModelRequest, ModelResponse, StopReason, StreamEvent, Usage,
};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const MESSAGES_PATH: &str = "/v1/messages";
const STREAM_BUFFER: usize = 64;

pub struct AnthropicGateway {
    client: reqwest::Client,
    api_key: SecretString,
    endpoint: String,
    model: String,
    max_tokens: u32,
    timeout: Duration,
}

impl fmt::Debug for AnthropicGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnthropicGateway")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl AnthropicGateway {
    pub fn new(config: &LlmConfig) -> Result<Self, GatewayError> {
        if config.api_key.expose_secret().trim().is_empty() {
            return Err(GatewayError::MissingApiKey);
        }

        let timeout = Duration::from_secs(config.timeout_secs);
        // The whole-request timeout is applied per buffered call only; a
        // streamed answer may legitimately outlive it.
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|error| GatewayError::Transport(error.to_string()))?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            endpoint: format!("{}{MESSAGES_PATH}", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            timeout,
        })
    }

    fn request_body(&self, request: &ModelRequest, stream: bool) -> Value {
        let mut body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "system": request.system,
            "messages": request.messages,
            "stream": stream,
        });
        if !request.tools.is_empty() {
            body["tools"] = json!(request.tools);
        }
        body
    }

    fn post(&self, body: &Value) -> reqwest::RequestBuilder {
        self.client
            .post(&self.endpoint)
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(body)
    }
}

#[async_trait]
impl ModelGateway for AnthropicGateway {
    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &ModelRequest) -> Result<ModelResponse, GatewayError> {
        let body = self.request_body(request, false);
        let response = self
            .post(&body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|error| GatewayError::Transport(error.to_string()))?;

        let status = response.status().as_u16();
        let text =
            response.text().await.map_err(|error| GatewayError::Transport(error.to_string()))?;
        if status != 200 {
            return Err(parse_http_error(status, &text));
        }

        let wire: WireResponse = serde_json::from_str(&text)
            .map_err(|error| GatewayError::Decode(format!("messages response: {error}")))?;
        Ok(wire.into_model_response())
    }

    async fn generate_stream(&self, request: &ModelRequest) -> Result<EventStream, GatewayError> {
        let body = self.request_body(request, true);
        let response = self
            .post(&body)
            .send()
            .await
            .map_err(|error| GatewayError::Transport(error.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            let text = response
                .text()
                .await
                .map_err(|error| GatewayError::Transport(error.to_string()))?;
            return Err(parse_http_error(status, &text));
        }

        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let mut bytes = response.bytes_stream();

        tokio::spawn(async move {
            let mut decoder = SseDecoder::default();
            while let Some(chunk) = bytes.next().await {
                let decoded = match chunk {
                    Ok(chunk) => decoder.push(&chunk),
                    Err(error) => vec![Err(GatewayError::Transport(error.to_string()))],
                };
                for item in decoded {
                    let failed = item.is_err();
                    if tx.send(item).await.is_err() {
                        debug!(
                            event_name = "agent.gateway.stream_detached",
                            "stream consumer went away; dropping remaining model events"
                        );
                        return;
                    }
                    if failed {
                        return;
                    }
                }
            }
            for item in decoder.finish() {
                if tx.send(item).await.is_err() {
                    return;
                }
            }
        });

        Ok(ReceiverStream::new(rx).boxed())
    }
}

/// Splits a server-sent event byte stream into [`StreamEvent`]s. Bytes are
/// buffered until a full line arrives, so multi-byte characters split across
/// network chunks decode correctly.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<StreamEvent, GatewayError>> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(line_end) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=line_end).collect();
            let line = String::from_utf8_lossy(&line);
            if let Some(event) = decode_line(line.trim_end_matches(|c: char| c == '\r' || c == '\n')) {
                events.push(event);
            }
        }

        events
    }

    /// Flushes a trailing line that arrived without a newline.
    pub fn finish(&mut self) -> Vec<Result<StreamEvent, GatewayError>> {
        if self.buffer.is_empty() {
            return Vec::new();
        }
        let line = String::from_utf8_lossy(&self.buffer).into_owned();
        self.buffer.clear();
        decode_line(line.trim()).into_iter().collect()
    }
}

fn decode_line(line: &str) -> Option<Result<StreamEvent, GatewayError>> {
    // `event:` lines repeat the type already carried in the data payload.
    let payload = line.strip_prefix("data:")?.trim_start();
    if payload.is_empty() || payload == "[DONE]" {
        return None;
    }

    let wire = match serde_json::from_str::<WireStreamEvent>(payload) {
        Ok(wire) => wire,
        Err(error) => {
            warn!(
                event_name = "agent.gateway.undecodable_event",
                error = %error,
                "skipping undecodable stream event"
            );
            return None;
        }
    };

    match wire {
        WireStreamEvent::MessageStart { message } => {
            Some(Ok(StreamEvent::MessageStart { usage: message.usage.into() }))
        }
        WireStreamEvent::ContentBlockStart { index, content_block } => {
            let kind = match content_block {
                WireBlockStart::Text => BlockKind::Text,
                WireBlockStart::ToolUse { id, name } => BlockKind::ToolUse { id, name },
                WireBlockStart::Other => return None,
            };
            Some(Ok(StreamEvent::BlockStart { index, kind }))
        }
        WireStreamEvent::ContentBlockDelta { index, delta } => match delta {
            WireDelta::TextDelta { text } => Some(Ok(StreamEvent::TextDelta { index, text })),
            WireDelta::InputJsonDelta { partial_json } => {
                Some(Ok(StreamEvent::InputJsonDelta { index, partial_json }))
            }
            WireDelta::Other => None,
        },
        WireStreamEvent::ContentBlockStop { index } => Some(Ok(StreamEvent::BlockStop { index })),
        WireStreamEvent::MessageDelta { delta, usage } => Some(Ok(StreamEvent::MessageDelta {
            stop_reason: delta.stop_reason,
            usage: usage.map(Usage::from).unwrap_or_default(),
        })),
        WireStreamEvent::MessageStop => Some(Ok(StreamEvent::MessageStop)),
        WireStreamEvent::Ping => None,
        WireStreamEvent::Error { error } => {
            Some(Err(GatewayError::Provider { kind: error.kind, message: error.message }))
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    content: Vec<WireBlock>,
    stop_reason: Option<StopReason>,
    usage: WireUsage,
}

impl WireResponse {
    fn into_model_response(self) -> ModelResponse {
        let content = self
            .content
            .into_iter()
            .filter_map(|block| match block {
                WireBlock::Text { text } => Some(ContentBlock::Text { text }),
                WireBlock::ToolUse { id, name, input } => {
                    Some(ContentBlock::ToolUse { id, name, input })
                }
                WireBlock::Other => None,
            })
            .collect();

        ModelResponse {
            content,
            stop_reason: self.stop_reason.unwrap_or(StopReason::EndTurn),
            usage: self.usage.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Default, Deserialize)]
struct WireUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

impl From<WireUsage> for Usage {
    fn from(wire: WireUsage) -> Self {
        Self { input_tokens: wire.input_tokens, output_tokens: wire.output_tokens }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireStreamEvent {
    MessageStart { message: WireMessageStart },
    ContentBlockStart { index: usize, content_block: WireBlockStart },
    ContentBlockDelta { index: usize, delta: WireDelta },
    ContentBlockStop { index: usize },
    MessageDelta {
        delta: WireMessageDelta,
        #[serde(default)]
        usage: Option<WireUsage>,
    },
    MessageStop,
    Ping,
    Error { error: WireError },
}

#[derive(Debug, Deserialize)]
struct WireMessageStart {
    #[serde(default)]
    usage: WireUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireBlockStart {
    Text,
    ToolUse {
        id: String,
        name: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireDelta {
    TextDelta {
        text: String,
    },
    InputJsonDelta {
        partial_json: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct WireMessageDelta {
    #[serde(default)]
    stop_reason: Option<StopReason>,
}

#[derive(Debug, Deserialize)]
struct WireError {
    #[serde(rename = "type")]
    kind: String,
    message: String,
}
