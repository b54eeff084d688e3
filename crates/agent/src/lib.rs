//! Agent runtime for the capacity-planning assistant.
//!
//! - `llm` and `anthropic`: the model gateway contract and its Anthropic
//!   Messages implementation, buffered and streamed.
//! - `tools`: schema-described tools over the team, worklog and project
//!   collaborators, dispatched through a registry that never fails across
//!   its boundary.
//! - `runtime` and `stream`: the agent loop, bounded by `guardrails`.
//! - `conversation` and `insights`: bounded per-conversation history and the
//!   TTL-cached dashboard insights.
//! - `service`: the entrypoints the server and CLI call.
//!
//! The model only chooses which tools to call and phrases the answer. Every
//! number it reports comes from `capplan_core::analytics`.

pub mod anthropic;
pub mod conversation;
pub mod guardrails;
pub mod insights;
pub mod llm;
pub mod prompt;
pub mod runtime;
#[cfg(any(test, feature = "test-support"))]
pub mod scripted;
pub mod service;
pub mod stream;
pub mod tools;

pub use conversation::{ConversationStore, InMemoryConversationStore};
pub use insights::{InsightCache, InsightGenerator, TtlInsightCache};
pub use llm::ModelGateway;
pub use runtime::AgentRuntime;
pub use service::{AssistantService, QueryContext, QueryRequest, QueryResponse};
pub use stream::AgentEvent;
pub use tools::{standard_registry, ToolContext, ToolRegistry};
