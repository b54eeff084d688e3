use std::io::{self, Write};
use std::sync::Arc;

use capplan_agent::anthropic::AnthropicGateway;
use capplan_agent::{AgentEvent, AssistantService, QueryContext, QueryRequest};
use capplan_core::config::{AppConfig, LoadOptions};
use capplan_core::SystemClock;
use futures_util::StreamExt;

use crate::commands::{build_service, CommandResult};

#[derive(Clone, Debug, Default)]
pub struct AskArgs {
    pub query: String,
    pub context: Option<String>,
    pub conversation_id: Option<String>,
}

pub fn run(args: AskArgs) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return CommandResult::failure("ask", "config_validation", error.to_string(), 2),
    };

    let mut request = QueryRequest::new(args.query);
    if let Some(context) = args.context.as_deref() {
        match context.parse::<QueryContext>() {
            Ok(context) => request = request.with_context(context),
            Err(error) => {
                return CommandResult::failure("ask", "invalid_argument", error.to_string(), 2)
            }
        }
    }
    if let Some(conversation_id) = args.conversation_id {
        request = request.in_conversation(conversation_id);
    }

    let gateway = match AnthropicGateway::new(&config.llm) {
        Ok(gateway) => gateway,
        Err(error) => return CommandResult::failure("ask", "model_gateway", error.to_string(), 3),
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => return CommandResult::failure("ask", "runtime", error.to_string(), 4),
    };

    let service = build_service(&config, Arc::new(gateway), Arc::new(SystemClock));
    let stdout = io::stdout();
    let mut out = stdout.lock();
    runtime.block_on(stream_answer(service, request, &mut out))
}

/// Writes the answer to `out` as it streams, with one line per tool call.
/// The returned result summarises the finished exchange.
pub async fn stream_answer(
    service: Arc<AssistantService>,
    request: QueryRequest,
    out: &mut impl Write,
) -> CommandResult {
    let mut events = service.process_query_stream(request);

    while let Some(event) = events.next().await {
        let written = match &event {
            AgentEvent::Text { content } => write!(out, "{content}").and_then(|()| out.flush()),
            AgentEvent::ToolUseStart { tool_name } => writeln!(out, "\n[tool] {tool_name}"),
            AgentEvent::ToolResult { tool_name, success, .. } => {
                let status = if *success { "ok" } else { "failed" };
                writeln!(out, "[tool] {tool_name}: {status}")
            }
            AgentEvent::ParseError { tool_name, error } => {
                writeln!(out, "[tool] {tool_name}: input rejected ({error})")
            }
            AgentEvent::Complete { .. } | AgentEvent::Error { .. } => writeln!(out),
        };
        if let Err(error) = written {
            return CommandResult::failure("ask", "io", error.to_string(), 4);
        }

        match event {
            AgentEvent::Complete { conversation_id, usage } => {
                let conversation_id = conversation_id.unwrap_or_else(|| "unknown".to_string());
                return CommandResult::success(
                    "ask",
                    format!(
                        "conversation {conversation_id}: {} input / {} output tokens",
                        usage.input_tokens, usage.output_tokens
                    ),
                );
            }
            AgentEvent::Error { error } => {
                return CommandResult::failure("ask", "query_failed", error, 3);
            }
            _ => {}
        }
    }

    CommandResult::failure("ask", "stream_interrupted", "stream ended without a final event", 5)
}
