//! Buffered agent loop: ask the model, run the tools it requests, feed the
//! results back, repeat until it answers without tools.

use std::sync::Arc;

use capplan_core::errors::ApplicationError;
use futures_util::future::join_all;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::guardrails::{LoopDecision, LoopGuard};
use crate::llm::{
    ContentBlock, GatewayError, Message, ModelGateway, ModelRequest, Role, Usage,
};
use crate::tools::{ToolOutcome, ToolRegistry};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AgentError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("agent loop aborted after {rounds} rounds: {reason}")]
    RoundLimitExceeded { rounds: u32, reason: String },
}

impl From<AgentError> for ApplicationError {
    fn from(error: AgentError) -> Self {
        match error {
            AgentError::Gateway(error) => Self::ModelGateway(error.to_string()),
            AgentError::RoundLimitExceeded { rounds, reason } => {
                Self::ResourceExhaustion { rounds, reason }
            }
        }
    }
}

/// One executed tool call, in request order.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallRecord {
    pub id: String,
    pub name: String,
    pub input: Value,
    pub result: ToolOutcome,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AgentReply {
    pub message: String,
    pub tool_calls: Vec<ToolCallRecord>,
    pub usage: Usage,
    pub rounds: u32,
}

pub(crate) struct PendingCall {
    pub id: String,
    pub name: String,
    pub input: Value,
}

pub struct AgentRuntime {
    gateway: Arc<dyn ModelGateway>,
    tools: Arc<ToolRegistry>,
    max_rounds: u32,
}

impl AgentRuntime {
    pub fn new(gateway: Arc<dyn ModelGateway>, tools: Arc<ToolRegistry>, max_rounds: u32) -> Self {
        Self { gateway, tools, max_rounds }
    }

    pub fn gateway(&self) -> &Arc<dyn ModelGateway> {
        &self.gateway
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    pub(crate) fn guard(&self) -> LoopGuard {
        LoopGuard::new(self.max_rounds)
    }

    pub(crate) fn request(&self, system: &str, messages: Vec<Message>) -> ModelRequest {
        ModelRequest { system: system.to_string(), tools: self.tools.definitions(), messages }
    }

    /// Runs the loop over `messages`, which must end with the user's query.
    /// Text from every round is concatenated into the reply.
    pub async fn run(
        &self,
        system: &str,
        messages: Vec<Message>,
        correlation_id: &str,
    ) -> Result<AgentReply, AgentError> {
        let mut guard = self.guard();
        let mut messages = messages;
        let mut text = String::new();
        let mut tool_calls = Vec::new();
        let mut usage = Usage::default();

        loop {
            if let LoopDecision::Aborted { reason } = guard.begin_round() {
                warn!(
                    event_name = "agent.loop.aborted",
                    correlation_id = %correlation_id,
                    rounds = guard.rounds(),
                    reason = %reason,
                    "agent loop hit its round cap"
                );
                return Err(AgentError::RoundLimitExceeded { rounds: guard.rounds(), reason });
            }
            info!(
                event_name = "agent.loop.round_started",
                correlation_id = %correlation_id,
                round = guard.rounds(),
                "requesting model turn"
            );

            let request = self.request(system, messages);
            let response = self.gateway.generate(&request).await.map_err(|error| {
                warn!(
                    event_name = "agent.model.failed",
                    correlation_id = %correlation_id,
                    error = %error,
                    "model request failed"
                );
                error
            })?;
            messages = request.messages;
            usage += response.usage;

            let mut calls = Vec::new();
            for block in &response.content {
                match block {
                    ContentBlock::Text { text: chunk } => text.push_str(chunk),
                    ContentBlock::ToolUse { id, name, input } => calls.push(PendingCall {
                        id: id.clone(),
                        name: name.clone(),
                        input: input.clone(),
                    }),
                    ContentBlock::ToolResult { .. } => {}
                }
            }

            if guard.assess(&response.stop_reason, calls.len()) == LoopDecision::Done {
                info!(
                    event_name = "agent.loop.completed",
                    correlation_id = %correlation_id,
                    rounds = guard.rounds(),
                    tool_calls = tool_calls.len(),
                    input_tokens = usage.input_tokens,
                    output_tokens = usage.output_tokens,
                    "agent loop finished"
                );
                return Ok(AgentReply { message: text, tool_calls, usage, rounds: guard.rounds() });
            }

            messages.push(Message { role: Role::Assistant, content: response.content });

            let outcomes = join_all(
                calls.iter().map(|call| self.tools.execute(&call.name, call.input.clone())),
            )
            .await;

            messages.push(tool_results_message(&calls, &outcomes));
            tool_calls.extend(calls.into_iter().zip(outcomes).map(|(call, result)| {
                ToolCallRecord { id: call.id, name: call.name, input: call.input, result }
            }));
        }
    }
}

/// The synthetic user turn carrying one `tool_result` block per call.
pub(crate) fn tool_results_message(calls: &[PendingCall], outcomes: &[ToolOutcome]) -> Message {
    let content = calls
        .iter()
        .zip(outcomes)
        .map(|(call, outcome)| ContentBlock::ToolResult {
            tool_use_id: call.id.clone(),
            content: outcome.model_content(),
            is_error: !outcome.success,
        })
        .collect();
    Message { role: Role::User, content }
}
