use std::sync::Arc;

use capplan_agent::anthropic::AnthropicGateway;
use capplan_agent::llm::GatewayError;
use capplan_agent::{
    standard_registry, AgentRuntime, AssistantService, InMemoryConversationStore, ModelGateway,
    ToolContext, TtlInsightCache,
};
use capplan_core::config::AppConfig;
use capplan_core::{Clock, InMemoryWorkspace, SystemClock};
use thiserror::Error;
use tracing::info;

use crate::api::AppState;

pub struct Application {
    pub config: AppConfig,
    pub state: AppState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("model gateway setup failed: {0}")]
    Gateway(#[from] GatewayError),
}

pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        model = %config.llm.model,
        "starting application bootstrap"
    );

    let gateway = Arc::new(AnthropicGateway::new(&config.llm)?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let workspace = InMemoryWorkspace::demo(clock.today());
    info!(
        event_name = "system.bootstrap.collaborators_seeded",
        correlation_id = "bootstrap",
        "in-memory team, worklog and project collaborators ready"
    );

    Ok(assemble(config, gateway, workspace, clock))
}

/// Wires the tool registry, agent loop, stores and service around the given
/// collaborators.
pub fn assemble(
    config: AppConfig,
    gateway: Arc<dyn ModelGateway>,
    workspace: InMemoryWorkspace,
    clock: Arc<dyn Clock>,
) -> Application {
    let hours_per_day = config.agent.hours_per_day;
    let context = ToolContext::from_workspace(workspace, clock.clone(), hours_per_day);
    let tools = Arc::new(standard_registry(Arc::new(context)));
    let tool_count = tools.len();

    let runtime = AgentRuntime::new(gateway, tools, config.agent.max_rounds);
    let service = AssistantService::new(
        runtime,
        Arc::new(InMemoryConversationStore::new(config.agent.max_history_turns)),
        Arc::new(TtlInsightCache::new(config.agent.insight_cache_ttl_secs, clock.clone())),
        clock,
        hours_per_day,
    );

    info!(
        event_name = "system.bootstrap.ready",
        correlation_id = "bootstrap",
        tools = tool_count,
        max_rounds = config.agent.max_rounds,
        "assistant service assembled"
    );

    Application { config, state: AppState::new(Arc::new(service)) }
}

#[cfg(test)]
mod tests {
    use capplan_core::config::AppConfig;
    use secrecy::SecretString;

    use crate::bootstrap::{bootstrap_with_config, BootstrapError};

    #[test]
    fn bootstrap_fails_fast_without_an_api_key() {
        let result = bootstrap_with_config(AppConfig::default());

        assert!(matches!(result, Err(BootstrapError::Gateway(_))));
    }

    #[test]
    fn bootstrap_registers_every_tool() {
        let mut config = AppConfig::default();
        config.llm.api_key = SecretString::from("sk-ant-test".to_string());
        config.llm.model = "claude-test".to_string();

        let app = bootstrap_with_config(config).expect("bootstrap should succeed with an api key");

        assert_eq!(app.state.tool_count(), 14);
        assert_eq!(app.state.model(), "claude-test");
        assert_eq!(app.config.server_address(), "127.0.0.1:8080");
    }
}
