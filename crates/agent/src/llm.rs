use std::ops::AddAssign;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl Message {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self { role: Role::User, content: vec![ContentBlock::text(text)] }
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: vec![ContentBlock::text(text)] }
    }

    /// Concatenated text blocks, ignoring tool traffic.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    StopSequence,
    #[serde(other)]
    Unknown,
}

impl StopReason {
    /// Anything other than a tool-use request ends the agent loop.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::ToolUse)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl AddAssign for Usage {
    fn add_assign(&mut self, other: Self) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ModelRequest {
    pub system: String,
    pub tools: Vec<ToolDefinition>,
    pub messages: Vec<Message>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ModelResponse {
    pub content: Vec<ContentBlock>,
    pub stop_reason: StopReason,
    pub usage: Usage,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BlockKind {
    Text,
    ToolUse { id: String, name: String },
}

/// Incremental events of one streamed model turn, in arrival order.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent {
    MessageStart { usage: Usage },
    BlockStart { index: usize, kind: BlockKind },
    TextDelta { index: usize, text: String },
    InputJsonDelta { index: usize, partial_json: String },
    BlockStop { index: usize },
    MessageDelta { stop_reason: Option<StopReason>, usage: Usage },
    MessageStop,
}

pub type EventStream = BoxStream<'static, Result<StreamEvent, GatewayError>>;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("model gateway has no api key configured")]
    MissingApiKey,
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("model api returned HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("could not decode model response: {0}")]
    Decode(String),
    #[error("model stream reported {kind}: {message}")]
    Provider { kind: String, message: String },
}

impl GatewayError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Http { status, .. } => *status == 429 || *status >= 500,
            Self::Provider { kind, .. } => kind == "overloaded_error",
            Self::MissingApiKey | Self::Decode(_) => false,
        }
    }
}

/// Maps a non-success HTTP response, preferring the provider's own error
/// message when the body carries one.
pub fn parse_http_error(status: u16, body: &str) -> GatewayError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| value["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string());
    GatewayError::Http { status, message }
}

#[async_trait]
pub trait ModelGateway: Send + Sync {
    fn model(&self) -> &str;

    async fn generate(&self, request: &ModelRequest) -> Result<ModelResponse, GatewayError>;

    async fn generate_stream(&self, request: &ModelRequest) -> Result<EventStream, GatewayError>;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{parse_http_error, ContentBlock, GatewayError, Message, StopReason, Usage};

    #[test]
    fn tool_use_is_the_only_non_terminal_stop_reason() {
        assert!(!StopReason::ToolUse.is_terminal());
        assert!(StopReason::EndTurn.is_terminal());
        assert!(StopReason::MaxTokens.is_terminal());
        assert!(StopReason::Unknown.is_terminal());
    }

    #[test]
    fn unknown_stop_reasons_deserialize() {
        let reason: StopReason = serde_json::from_value(json!("pause_turn")).expect("stop reason");
        assert_eq!(reason, StopReason::Unknown);
    }

    #[test]
    fn content_blocks_use_wire_tags() {
        let block = ContentBlock::ToolResult {
            tool_use_id: "toolu_1".to_string(),
            content: "{}".to_string(),
            is_error: false,
        };
        let value = serde_json::to_value(&block).expect("serialize");
        assert_eq!(value, json!({"type": "tool_result", "tool_use_id": "toolu_1", "content": "{}"}));
    }

    #[test]
    fn usage_accumulates() {
        let mut total = Usage::default();
        total += Usage { input_tokens: 10, output_tokens: 3 };
        total += Usage { input_tokens: 7, output_tokens: 4 };
        assert_eq!(total, Usage { input_tokens: 17, output_tokens: 7 });
    }

    #[test]
    fn message_text_skips_tool_blocks() {
        let message = Message {
            role: super::Role::Assistant,
            content: vec![
                ContentBlock::text("Checking "),
                ContentBlock::ToolUse { id: "t".into(), name: "get_teams".into(), input: json!({}) },
                ContentBlock::text("teams."),
            ],
        };
        assert_eq!(message.text(), "Checking teams.");
    }

    #[test]
    fn http_errors_prefer_provider_message() {
        let error = parse_http_error(
            401,
            r#"{"type":"error","error":{"type":"authentication_error","message":"invalid x-api-key"}}"#,
        );
        assert_eq!(error, GatewayError::Http { status: 401, message: "invalid x-api-key".into() });
        assert!(!error.is_retryable());

        let raw = parse_http_error(503, "upstream unavailable\n");
        assert_eq!(raw, GatewayError::Http { status: 503, message: "upstream unavailable".into() });
        assert!(raw.is_retryable());
    }
}
