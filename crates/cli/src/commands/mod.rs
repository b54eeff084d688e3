pub mod ask;
pub mod config;
pub mod doctor;
pub mod tools;

use std::sync::Arc;

use capplan_agent::{
    standard_registry, AgentRuntime, AssistantService, InMemoryConversationStore, ModelGateway,
    ToolContext, ToolRegistry, TtlInsightCache,
};
use capplan_core::config::AppConfig;
use capplan_core::{Clock, InMemoryWorkspace};
use serde::Serialize;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

/// Registry over the seeded in-memory collaborators, dated from `clock`.
pub fn demo_registry(config: &AppConfig, clock: Arc<dyn Clock>) -> ToolRegistry {
    let workspace = InMemoryWorkspace::demo(clock.today());
    let context = ToolContext::from_workspace(workspace, clock, config.agent.hours_per_day);
    standard_registry(Arc::new(context))
}

pub fn build_service(
    config: &AppConfig,
    gateway: Arc<dyn ModelGateway>,
    clock: Arc<dyn Clock>,
) -> Arc<AssistantService> {
    let tools = Arc::new(demo_registry(config, clock.clone()));
    let runtime = AgentRuntime::new(gateway, tools, config.agent.max_rounds);
    Arc::new(AssistantService::new(
        runtime,
        Arc::new(InMemoryConversationStore::new(config.agent.max_history_turns)),
        Arc::new(TtlInsightCache::new(config.agent.insight_cache_ttl_secs, clock.clone())),
        clock,
        config.agent.hours_per_day,
    ))
}
