//! Deterministic [`ModelGateway`] that replays queued model turns. Drives the
//! agent-loop tests here; other crates enable the `test-support` feature to
//! use it in their route and command tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use serde_json::Value;

use crate::llm::{
    BlockKind, ContentBlock, EventStream, GatewayError, ModelGateway, ModelRequest, ModelResponse,
    StopReason, StreamEvent, Usage,
};

pub const SCRIPTED_MODEL: &str = "scripted-model";

/// Usage reported by every scripted turn.
pub const TURN_USAGE: Usage = Usage { input_tokens: 12, output_tokens: 4 };

type StreamScript = Result<Vec<Result<StreamEvent, GatewayError>>, GatewayError>;

#[derive(Debug, Default)]
pub struct ScriptedGateway {
    responses: Mutex<VecDeque<Result<ModelResponse, GatewayError>>>,
    streams: Mutex<VecDeque<StreamScript>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(self, response: ModelResponse) -> Self {
        lock(&self.responses).push_back(Ok(response));
        self
    }

    pub fn with_error(self, error: GatewayError) -> Self {
        lock(&self.responses).push_back(Err(error));
        self
    }

    pub fn with_stream(self, events: Vec<StreamEvent>) -> Self {
        lock(&self.streams).push_back(Ok(events.into_iter().map(Ok).collect()));
        self
    }

    /// A stream whose items may fail mid-turn.
    pub fn with_stream_items(self, items: Vec<Result<StreamEvent, GatewayError>>) -> Self {
        lock(&self.streams).push_back(Ok(items));
        self
    }

    pub fn with_stream_error(self, error: GatewayError) -> Self {
        lock(&self.streams).push_back(Err(error));
        self
    }

    /// Every request received so far, buffered and streamed alike.
    pub fn requests(&self) -> Vec<ModelRequest> {
        lock(&self.requests).clone()
    }

    fn record(&self, request: &ModelRequest) {
        lock(&self.requests).push(request.clone());
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn exhausted() -> GatewayError {
    GatewayError::Transport("scripted gateway has no turns left".to_string())
}

#[async_trait]
impl ModelGateway for ScriptedGateway {
    fn model(&self) -> &str {
        SCRIPTED_MODEL
    }

    async fn generate(&self, request: &ModelRequest) -> Result<ModelResponse, GatewayError> {
        self.record(request);
        lock(&self.responses).pop_front().unwrap_or_else(|| Err(exhausted()))
    }

    async fn generate_stream(&self, request: &ModelRequest) -> Result<EventStream, GatewayError> {
        self.record(request);
        let items = lock(&self.streams).pop_front().unwrap_or_else(|| Err(exhausted()))?;
        Ok(stream::iter(items).boxed())
    }
}

pub fn text_turn(text: &str) -> ModelResponse {
    ModelResponse {
        content: vec![ContentBlock::text(text)],
        stop_reason: StopReason::EndTurn,
        usage: TURN_USAGE,
    }
}

/// A turn requesting `calls` as `(id, tool name, input)`, optionally led by text.
pub fn tool_turn(lead: Option<&str>, calls: &[(&str, &str, Value)]) -> ModelResponse {
    let mut content: Vec<ContentBlock> = lead.map(ContentBlock::text).into_iter().collect();
    content.extend(calls.iter().map(|(id, name, input)| ContentBlock::ToolUse {
        id: (*id).to_string(),
        name: (*name).to_string(),
        input: input.clone(),
    }));
    ModelResponse { content, stop_reason: StopReason::ToolUse, usage: TURN_USAGE }
}

/// A streamed text-only turn delivered as `chunks`.
pub fn streamed_text(chunks: &[&str]) -> Vec<StreamEvent> {
    let mut events = vec![
        StreamEvent::MessageStart { usage: Usage { output_tokens: 0, ..TURN_USAGE } },
        StreamEvent::BlockStart { index: 0, kind: BlockKind::Text },
    ];
    events.extend(
        chunks.iter().map(|chunk| StreamEvent::TextDelta { index: 0, text: (*chunk).to_string() }),
    );
    events.extend(finish(Some(0), StopReason::EndTurn));
    events
}

/// A streamed turn with one text block followed by tool-use blocks whose input
/// arrives as the given JSON fragments. Calls are `(id, tool name, fragments)`.
pub fn streamed_tool_turn(lead: &str, calls: &[(&str, &str, &[&str])]) -> Vec<StreamEvent> {
    let mut events = vec![
        StreamEvent::MessageStart { usage: Usage { output_tokens: 0, ..TURN_USAGE } },
        StreamEvent::BlockStart { index: 0, kind: BlockKind::Text },
        StreamEvent::TextDelta { index: 0, text: lead.to_string() },
        StreamEvent::BlockStop { index: 0 },
    ];

    for (offset, (id, name, fragments)) in calls.iter().enumerate() {
        let index = offset + 1;
        events.push(StreamEvent::BlockStart {
            index,
            kind: BlockKind::ToolUse { id: (*id).to_string(), name: (*name).to_string() },
        });
        events.extend(fragments.iter().map(|fragment| StreamEvent::InputJsonDelta {
            index,
            partial_json: (*fragment).to_string(),
        }));
        events.push(StreamEvent::BlockStop { index });
    }

    events.extend(finish(None, StopReason::ToolUse));
    events
}

fn finish(open_block: Option<usize>, stop_reason: StopReason) -> Vec<StreamEvent> {
    let mut events: Vec<StreamEvent> =
        open_block.map(|index| StreamEvent::BlockStop { index }).into_iter().collect();
    events.push(StreamEvent::MessageDelta {
        stop_reason: Some(stop_reason),
        usage: Usage { input_tokens: 0, output_tokens: TURN_USAGE.output_tokens },
    });
    events.push(StreamEvent::MessageStop);
    events
}
