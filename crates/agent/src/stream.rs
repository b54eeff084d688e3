//! Streaming agent loop.
//!
//! Same rounds as [`AgentRuntime::run`], but model output is forwarded as
//! [`AgentEvent`]s while it arrives. Events go through a bounded `mpsc`
//! channel in model order: text deltas in sequence, `tool_use_start` when a
//! tool block opens, `tool_result` after that tool finishes. Tool input JSON
//! is buffered per block and parsed once when the block closes.

use std::collections::BTreeMap;

use futures_util::StreamExt;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::guardrails::LoopDecision;
use crate::llm::{
    BlockKind, ContentBlock, GatewayError, Message, Role, StopReason, StreamEvent, Usage,
};
use crate::runtime::{tool_results_message, AgentError, AgentRuntime, PendingCall};

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    Text {
        content: String,
    },
    ToolUseStart {
        #[serde(rename = "toolName")]
        tool_name: String,
    },
    ToolResult {
        #[serde(rename = "toolName")]
        tool_name: String,
        #[serde(rename = "toolInput")]
        tool_input: Value,
        #[serde(rename = "toolResult")]
        tool_result: Value,
        success: bool,
    },
    /// A tool block whose buffered input was not valid JSON; the call is dropped.
    ParseError {
        #[serde(rename = "toolName")]
        tool_name: String,
        error: String,
    },
    Complete {
        #[serde(rename = "conversationId", skip_serializing_if = "Option::is_none")]
        conversation_id: Option<String>,
        usage: Usage,
    },
    Error {
        error: String,
    },
}

impl AgentEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Error { .. })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct StreamedReply {
    pub message: String,
    pub usage: Usage,
    pub rounds: u32,
}

enum PendingBlock {
    Text(String),
    Tool { id: String, name: String, input_json: String },
}

/// Reassembles one streamed model turn.
#[derive(Default)]
struct TurnAssembler {
    open: BTreeMap<usize, PendingBlock>,
    closed: BTreeMap<usize, ContentBlock>,
    calls: Vec<PendingCall>,
    stop_reason: Option<StopReason>,
}

enum Closed {
    Text,
    Call,
    Malformed { tool_name: String, error: String },
}

impl TurnAssembler {
    fn open(&mut self, index: usize, kind: BlockKind) {
        let block = match kind {
            BlockKind::Text => PendingBlock::Text(String::new()),
            BlockKind::ToolUse { id, name } => {
                PendingBlock::Tool { id, name, input_json: String::new() }
            }
        };
        self.open.insert(index, block);
    }

    fn push_text(&mut self, index: usize, text: &str) {
        if let Some(PendingBlock::Text(buffer)) = self.open.get_mut(&index) {
            buffer.push_str(text);
        }
    }

    fn push_input(&mut self, index: usize, fragment: &str) {
        if let Some(PendingBlock::Tool { input_json, .. }) = self.open.get_mut(&index) {
            input_json.push_str(fragment);
        }
    }

    fn close(&mut self, index: usize) -> Option<Closed> {
        match self.open.remove(&index)? {
            PendingBlock::Text(text) => {
                if !text.is_empty() {
                    self.closed.insert(index, ContentBlock::Text { text });
                }
                Some(Closed::Text)
            }
            PendingBlock::Tool { id, name, input_json } => {
                let raw = if input_json.trim().is_empty() { "{}" } else { input_json.as_str() };
                match serde_json::from_str::<Value>(raw) {
                    Ok(input) => {
                        self.closed.insert(
                            index,
                            ContentBlock::ToolUse {
                                id: id.clone(),
                                name: name.clone(),
                                input: input.clone(),
                            },
                        );
                        self.calls.push(PendingCall { id, name, input });
                        Some(Closed::Call)
                    }
                    Err(error) => {
                        Some(Closed::Malformed { tool_name: name, error: error.to_string() })
                    }
                }
            }
        }
    }

    /// Assistant turn to replay: closed text blocks and parsed tool calls, in
    /// block order.
    fn into_parts(self) -> (Message, Vec<PendingCall>, Option<StopReason>) {
        let content = self.closed.into_values().collect();
        (Message { role: Role::Assistant, content }, self.calls, self.stop_reason)
    }
}

impl AgentRuntime {
    /// Runs the loop, emitting events into `events`. Returns `Ok(None)` once
    /// the consumer has gone away; the caller emits the final `complete` or
    /// `error` event.
    pub async fn run_streaming(
        &self,
        system: &str,
        messages: Vec<Message>,
        correlation_id: &str,
        events: &mpsc::Sender<AgentEvent>,
    ) -> Result<Option<StreamedReply>, AgentError> {
        let mut guard = self.guard();
        let mut messages = messages;
        let mut text = String::new();
        let mut usage = Usage::default();

        loop {
            if let LoopDecision::Aborted { reason } = guard.begin_round() {
                warn!(
                    event_name = "agent.stream.aborted",
                    correlation_id = %correlation_id,
                    rounds = guard.rounds(),
                    reason = %reason,
                    "streaming loop hit its round cap"
                );
                return Err(AgentError::RoundLimitExceeded { rounds: guard.rounds(), reason });
            }
            info!(
                event_name = "agent.stream.round_started",
                correlation_id = %correlation_id,
                round = guard.rounds(),
                "requesting streamed model turn"
            );

            let request = self.request(system, messages);
            let mut stream = self.gateway().generate_stream(&request).await?;
            messages = request.messages;

            let mut turn = TurnAssembler::default();
            let mut finished = false;
            while let Some(event) = stream.next().await {
                let forwarded = match event? {
                    StreamEvent::MessageStart { usage: start } => {
                        usage += start;
                        None
                    }
                    StreamEvent::BlockStart { index, kind } => {
                        let started = match &kind {
                            BlockKind::ToolUse { name, .. } => {
                                Some(AgentEvent::ToolUseStart { tool_name: name.clone() })
                            }
                            BlockKind::Text => None,
                        };
                        turn.open(index, kind);
                        started
                    }
                    StreamEvent::TextDelta { index, text: delta } => {
                        turn.push_text(index, &delta);
                        text.push_str(&delta);
                        Some(AgentEvent::Text { content: delta })
                    }
                    StreamEvent::InputJsonDelta { index, partial_json } => {
                        turn.push_input(index, &partial_json);
                        None
                    }
                    StreamEvent::BlockStop { index } => match turn.close(index) {
                        Some(Closed::Malformed { tool_name, error }) => {
                            warn!(
                                event_name = "agent.stream.tool_input_invalid",
                                correlation_id = %correlation_id,
                                tool = %tool_name,
                                error = %error,
                                "dropping tool call with malformed input"
                            );
                            Some(AgentEvent::ParseError { tool_name, error })
                        }
                        Some(Closed::Text | Closed::Call) | None => None,
                    },
                    StreamEvent::MessageDelta { stop_reason, usage: delta } => {
                        usage += delta;
                        if stop_reason.is_some() {
                            turn.stop_reason = stop_reason;
                        }
                        None
                    }
                    StreamEvent::MessageStop => {
                        finished = true;
                        break;
                    }
                };

                if let Some(event) = forwarded {
                    if events.send(event).await.is_err() {
                        return Ok(detached(correlation_id));
                    }
                }
            }

            if !finished {
                warn!(
                    event_name = "agent.stream.truncated",
                    correlation_id = %correlation_id,
                    round = guard.rounds(),
                    "model stream closed before message_stop"
                );
                return Err(AgentError::Gateway(GatewayError::Transport(
                    "stream ended before message_stop".to_string(),
                )));
            }

            let (assistant, calls, stop_reason) = turn.into_parts();
            let stop_reason = stop_reason.unwrap_or(StopReason::Unknown);
            if guard.assess(&stop_reason, calls.len()) == LoopDecision::Done {
                info!(
                    event_name = "agent.stream.completed",
                    correlation_id = %correlation_id,
                    rounds = guard.rounds(),
                    input_tokens = usage.input_tokens,
                    output_tokens = usage.output_tokens,
                    "streaming loop finished"
                );
                return Ok(Some(StreamedReply { message: text, usage, rounds: guard.rounds() }));
            }
            messages.push(assistant);

            let mut outcomes = Vec::with_capacity(calls.len());
            for call in &calls {
                if events.is_closed() {
                    return Ok(detached(correlation_id));
                }
                let outcome = self.tools().execute(&call.name, call.input.clone()).await;
                let event = AgentEvent::ToolResult {
                    tool_name: call.name.clone(),
                    tool_input: call.input.clone(),
                    tool_result: outcome.payload(),
                    success: outcome.success,
                };
                if events.send(event).await.is_err() {
                    return Ok(detached(correlation_id));
                }
                outcomes.push(outcome);
            }
            messages.push(tool_results_message(&calls, &outcomes));
        }
    }
}

fn detached(correlation_id: &str) -> Option<StreamedReply> {
    info!(
        event_name = "agent.stream.detached",
        correlation_id = %correlation_id,
        "stream consumer went away; stopping"
    );
    None
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use capplan_core::InMemoryWorkspace;
    use serde_json::json;
    use tokio::sync::mpsc;

    use super::AgentEvent;
    use crate::llm::{BlockKind, ContentBlock, GatewayError, Message, StreamEvent};
    use crate::runtime::{AgentError, AgentRuntime};
    use crate::scripted::{streamed_text, streamed_tool_turn, ScriptedGateway, TURN_USAGE};
    use crate::tools::test_support::{registry, today};

    fn runtime(gateway: Arc<ScriptedGateway>) -> AgentRuntime {
        AgentRuntime::new(gateway, Arc::new(registry(InMemoryWorkspace::demo(today()))), 5)
    }

    async fn drain(mut rx: mpsc::Receiver<AgentEvent>) -> Vec<AgentEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn fragmented_tool_input_is_parsed_once_at_block_close() {
        let gateway = Arc::new(
            ScriptedGateway::new()
                .with_stream(streamed_tool_turn(
                    "Checking. ",
                    &[("toolu_1", "get_team_members", &["{\"team", "Id\": ", "2}"])],
                ))
                .with_stream(streamed_text(&["Data has ", "two members."])),
        );
        let runtime = runtime(gateway.clone());
        let (tx, rx) = mpsc::channel(32);

        let reply = runtime
            .run_streaming("system", vec![Message::user_text("Who is on Data?")], "conv-e", &tx)
            .await
            .expect("stream")
            .expect("consumer attached");
        drop(tx);
        let events = drain(rx).await;

        assert_eq!(reply.message, "Checking. Data has two members.");
        assert_eq!(reply.rounds, 2);
        assert_eq!(events.len(), 5);
        assert_eq!(events[0], AgentEvent::Text { content: "Checking. ".to_string() });
        assert_eq!(
            events[1],
            AgentEvent::ToolUseStart { tool_name: "get_team_members".to_string() }
        );
        assert!(matches!(
            &events[2],
            AgentEvent::ToolResult { success: true, tool_input, .. }
                if tool_input == &json!({"teamId": 2})
        ));
        assert_eq!(events[3], AgentEvent::Text { content: "Data has ".to_string() });
        assert_eq!(events[4], AgentEvent::Text { content: "two members.".to_string() });

        let replayed = &gateway.requests()[1].messages[1];
        let tool_uses = replayed
            .content
            .iter()
            .filter(|block| matches!(block, ContentBlock::ToolUse { .. }))
            .count();
        assert_eq!(tool_uses, 1);
        assert_eq!(reply.usage.input_tokens, TURN_USAGE.input_tokens * 2);
    }

    #[tokio::test]
    async fn malformed_tool_input_emits_parse_error_and_is_dropped() {
        let gateway = Arc::new(
            ScriptedGateway::new()
                .with_stream(streamed_tool_turn(
                    "Let me look. ",
                    &[
                        ("toolu_1", "get_team_members", &["{\"teamId\": "]),
                        ("toolu_2", "get_teams", &["{}"]),
                    ],
                ))
                .with_stream(streamed_text(&["Done."])),
        );
        let runtime = runtime(gateway.clone());
        let (tx, rx) = mpsc::channel(32);

        runtime
            .run_streaming("system", vec![Message::user_text("Teams?")], "conv-p", &tx)
            .await
            .expect("stream");
        drop(tx);
        let events = drain(rx).await;

        assert!(events.iter().any(|event| matches!(
            event,
            AgentEvent::ParseError { tool_name, .. } if tool_name == "get_team_members"
        )));
        let results: Vec<&AgentEvent> = events
            .iter()
            .filter(|event| matches!(event, AgentEvent::ToolResult { .. }))
            .collect();
        assert_eq!(results.len(), 1);
        assert!(matches!(
            results[0],
            AgentEvent::ToolResult { tool_name, .. } if tool_name == "get_teams"
        ));

        let tool_results = &gateway.requests()[1].messages[2].content;
        assert_eq!(tool_results.len(), 1);
    }

    #[tokio::test]
    async fn detached_consumer_stops_emission() {
        let gateway = Arc::new(
            ScriptedGateway::new()
                .with_stream(streamed_tool_turn("Working. ", &[("toolu_1", "get_teams", &["{}"])]))
                .with_stream(streamed_text(&["never sent"])),
        );
        let runtime = runtime(gateway.clone());
        let (tx, rx) = mpsc::channel(32);
        drop(rx);

        let outcome = runtime
            .run_streaming("system", vec![Message::user_text("Teams?")], "conv-d", &tx)
            .await
            .expect("no error");

        assert!(outcome.is_none());
        assert_eq!(gateway.requests().len(), 1);
    }

    #[tokio::test]
    async fn mid_stream_failure_is_an_error() {
        let gateway = Arc::new(ScriptedGateway::new().with_stream_items(vec![
            Ok(StreamEvent::MessageStart { usage: TURN_USAGE }),
            Err(GatewayError::Provider {
                kind: "overloaded_error".to_string(),
                message: "Overloaded".to_string(),
            }),
        ]));
        let runtime = runtime(gateway);
        let (tx, _rx) = mpsc::channel(32);

        let error = runtime
            .run_streaming("system", vec![Message::user_text("Teams?")], "conv-x", &tx)
            .await
            .expect_err("provider error");

        assert!(matches!(error, AgentError::Gateway(GatewayError::Provider { .. })));
    }

    #[tokio::test]
    async fn stream_closing_without_message_stop_is_an_error() {
        let gateway = Arc::new(ScriptedGateway::new().with_stream_items(vec![
            Ok(StreamEvent::MessageStart { usage: TURN_USAGE }),
            Ok(StreamEvent::BlockStart { index: 0, kind: BlockKind::Text }),
            Ok(StreamEvent::TextDelta { index: 0, text: "Ana is".to_string() }),
        ]));
        let runtime = runtime(gateway);
        let (tx, rx) = mpsc::channel(32);

        let error = runtime
            .run_streaming("system", vec![Message::user_text("Who is free?")], "conv-t", &tx)
            .await
            .expect_err("truncated stream");
        drop(tx);

        assert_eq!(
            error,
            AgentError::Gateway(GatewayError::Transport(
                "stream ended before message_stop".to_string()
            ))
        );
        assert_eq!(drain(rx).await, vec![AgentEvent::Text { content: "Ana is".to_string() }]);
    }

    #[test]
    fn events_serialize_with_wire_field_names() {
        let event = AgentEvent::ToolResult {
            tool_name: "get_teams".to_string(),
            tool_input: json!({}),
            tool_result: json!([]),
            success: true,
        };
        assert_eq!(
            serde_json::to_value(&event).expect("serialize"),
            json!({"type": "tool_result", "toolName": "get_teams", "toolInput": {}, "toolResult": [], "success": true})
        );

        let complete = AgentEvent::Complete {
            conversation_id: Some("conv-1".to_string()),
            usage: TURN_USAGE,
        };
        let value = serde_json::to_value(&complete).expect("serialize");
        assert_eq!(value["type"], "complete");
        assert_eq!(value["conversationId"], "conv-1");
        assert_eq!(value["usage"]["inputTokens"], 12);
    }
}
