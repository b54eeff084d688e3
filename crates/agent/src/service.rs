//! Orchestration entrypoints: buffered and streamed queries with
//! conversation memory, cached dashboard insights, conversation reset.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use capplan_core::errors::ApplicationError;
use capplan_core::{Clock, DashboardInsights};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::conversation::ConversationStore;
use crate::insights::{InsightCache, InsightGenerator};
use crate::llm::{Message, Usage};
use crate::prompt::system_prompt;
use crate::runtime::{AgentReply, AgentRuntime};
use crate::stream::AgentEvent;

pub const MAX_QUERY_CHARS: usize = 2000;

/// Capacity of the per-query event channel.
pub const STREAM_BUFFER: usize = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryContext {
    Dashboard,
    Capacity,
    Resources,
    Projects,
    Timeline,
}

impl QueryContext {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dashboard => "dashboard",
            Self::Capacity => "capacity",
            Self::Resources => "resources",
            Self::Projects => "projects",
            Self::Timeline => "timeline",
        }
    }
}

impl fmt::Display for QueryContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryContext {
    type Err = ApplicationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "dashboard" => Ok(Self::Dashboard),
            "capacity" => Ok(Self::Capacity),
            "resources" => Ok(Self::Resources),
            "projects" => Ok(Self::Projects),
            "timeline" => Ok(Self::Timeline),
            other => Err(ApplicationError::Validation(format!(
                "unknown context `{other}` (expected dashboard|capacity|resources|projects|timeline)"
            ))),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub query: String,
    #[serde(default)]
    pub context: Option<QueryContext>,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self { query: query.into(), ..Self::default() }
    }

    pub fn with_context(mut self, context: QueryContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn in_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    pub fn validate(&self) -> Result<(), ApplicationError> {
        let query = self.query.trim();
        if query.is_empty() {
            return Err(ApplicationError::Validation("query must not be empty".to_string()));
        }
        if query.chars().count() > MAX_QUERY_CHARS {
            return Err(ApplicationError::Validation(format!(
                "query must be at most {MAX_QUERY_CHARS} characters"
            )));
        }
        Ok(())
    }

    /// The caller's conversation id, or a fresh one.
    fn resolve_conversation_id(&self) -> String {
        self.conversation_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolCallSummary {
    pub name: String,
    pub input: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseData {
    pub raw_data: Vec<Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub success: bool,
    pub message: String,
    pub conversation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallSummary>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ResponseData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl QueryResponse {
    fn answered(conversation_id: String, reply: AgentReply) -> Self {
        let (tool_calls, data) = if reply.tool_calls.is_empty() {
            (None, None)
        } else {
            let raw_data = reply.tool_calls.iter().map(|call| call.result.payload()).collect();
            let summaries = reply
                .tool_calls
                .into_iter()
                .map(|call| ToolCallSummary { name: call.name, input: call.input })
                .collect();
            (Some(summaries), Some(ResponseData { raw_data }))
        };

        Self {
            success: true,
            message: reply.message,
            conversation_id,
            tool_calls,
            data,
            usage: Some(reply.usage),
        }
    }

    fn failed(conversation_id: String, error: &ApplicationError) -> Self {
        Self {
            success: false,
            message: format!("I encountered an error processing your request: {error}"),
            conversation_id,
            tool_calls: None,
            data: None,
            usage: None,
        }
    }
}

pub struct AssistantService {
    runtime: AgentRuntime,
    conversations: Arc<dyn ConversationStore>,
    insight_cache: Arc<dyn InsightCache>,
    generator: InsightGenerator,
    clock: Arc<dyn Clock>,
    hours_per_day: f64,
}

impl AssistantService {
    pub fn new(
        runtime: AgentRuntime,
        conversations: Arc<dyn ConversationStore>,
        insight_cache: Arc<dyn InsightCache>,
        clock: Arc<dyn Clock>,
        hours_per_day: f64,
    ) -> Self {
        let generator = InsightGenerator::new(runtime.tools().clone(), clock.clone());
        Self { runtime, conversations, insight_cache, generator, clock, hours_per_day }
    }

    pub fn runtime(&self) -> &AgentRuntime {
        &self.runtime
    }

    pub async fn process_query(&self, request: QueryRequest) -> QueryResponse {
        let conversation_id = request.resolve_conversation_id();
        info!(
            event_name = "assistant.query.received",
            correlation_id = %conversation_id,
            context = request.context.map(|context| context.as_str()).unwrap_or("none"),
            "processing query"
        );

        if let Err(error) = request.validate() {
            warn!(
                event_name = "assistant.query.rejected",
                correlation_id = %conversation_id,
                error = %error,
                "query failed validation"
            );
            return QueryResponse::failed(conversation_id, &error);
        }

        let query = request.query.trim();
        let messages = self.messages_for(&conversation_id, query).await;
        let system = self.system_prompt(request.context);

        match self.runtime.run(&system, messages, &conversation_id).await {
            Ok(reply) => {
                self.remember(&conversation_id, query, &reply.message).await;
                QueryResponse::answered(conversation_id, reply)
            }
            Err(error) => {
                let error = ApplicationError::from(error);
                warn!(
                    event_name = "assistant.query.failed",
                    correlation_id = %conversation_id,
                    error = %error,
                    "query failed"
                );
                QueryResponse::failed(conversation_id, &error)
            }
        }
    }

    /// Streams the answer as [`AgentEvent`]s. The sequence always ends with
    /// `complete` or `error` unless the consumer drops the stream first.
    pub fn process_query_stream(self: &Arc<Self>, request: QueryRequest) -> ReceiverStream<AgentEvent> {
        let (sender, receiver) = mpsc::channel(STREAM_BUFFER);
        let service = Arc::clone(self);
        tokio::spawn(async move { service.drive_stream(request, sender).await });
        ReceiverStream::new(receiver)
    }

    async fn drive_stream(&self, request: QueryRequest, events: mpsc::Sender<AgentEvent>) {
        let conversation_id = request.resolve_conversation_id();
        info!(
            event_name = "assistant.stream.received",
            correlation_id = %conversation_id,
            "processing streamed query"
        );

        if let Err(error) = request.validate() {
            emit(&events, &conversation_id, AgentEvent::Error { error: error.to_string() }).await;
            return;
        }

        let query = request.query.trim();
        let messages = self.messages_for(&conversation_id, query).await;
        let system = self.system_prompt(request.context);

        match self.runtime.run_streaming(&system, messages, &conversation_id, &events).await {
            Ok(Some(reply)) => {
                self.remember(&conversation_id, query, &reply.message).await;
                let complete = AgentEvent::Complete {
                    conversation_id: Some(conversation_id.clone()),
                    usage: reply.usage,
                };
                emit(&events, &conversation_id, complete).await;
            }
            Ok(None) => info!(
                event_name = "assistant.stream.detached",
                correlation_id = %conversation_id,
                "consumer went away; answer not recorded"
            ),
            Err(error) => {
                warn!(
                    event_name = "assistant.stream.failed",
                    correlation_id = %conversation_id,
                    error = %error,
                    "streamed query failed"
                );
                emit(&events, &conversation_id, AgentEvent::Error { error: error.to_string() })
                    .await;
            }
        }
    }

    /// Cached per context for one TTL; a hit keeps its original
    /// `generatedAt`.
    pub async fn dashboard_insights(&self, context: Option<QueryContext>) -> Arc<DashboardInsights> {
        let key = insight_cache_key(context);
        if let Some(cached) = self.insight_cache.get(&key).await {
            debug!(event_name = "insights.cache.hit", key = %key, "serving cached insights");
            return cached;
        }

        info!(event_name = "insights.cache.miss", key = %key, "generating dashboard insights");
        let insights = Arc::new(self.generator.generate().await);
        self.insight_cache.put(&key, insights.clone()).await;
        insights
    }

    pub async fn clear_conversation(&self, conversation_id: &str) -> Result<(), ApplicationError> {
        self.conversations.clear(conversation_id).await?;
        info!(
            event_name = "assistant.conversation.cleared",
            correlation_id = %conversation_id,
            "conversation cleared"
        );
        Ok(())
    }

    fn system_prompt(&self, context: Option<QueryContext>) -> String {
        system_prompt(self.clock.today(), context, self.hours_per_day)
    }

    /// Stored history followed by the new query. An unreadable history
    /// degrades to a fresh conversation.
    async fn messages_for(&self, conversation_id: &str, query: &str) -> Vec<Message> {
        let history = match self.conversations.history(conversation_id).await {
            Ok(turns) => turns,
            Err(error) => {
                warn!(
                    event_name = "assistant.history.unavailable",
                    correlation_id = %conversation_id,
                    error = %error,
                    "continuing without history"
                );
                Vec::new()
            }
        };

        let mut messages: Vec<Message> = history.iter().map(|turn| turn.to_message()).collect();
        messages.push(Message::user_text(query));
        messages
    }

    /// Answers without text are not kept: replaying them would send an empty
    /// text block, which the model api rejects.
    async fn remember(&self, conversation_id: &str, query: &str, answer: &str) {
        if answer.trim().is_empty() {
            debug!(
                event_name = "assistant.history.skipped",
                correlation_id = %conversation_id,
                "answer had no text; exchange not recorded"
            );
            return;
        }
        if let Err(error) = self.conversations.record_exchange(conversation_id, query, answer).await {
            warn!(
                event_name = "assistant.history.record_failed",
                correlation_id = %conversation_id,
                error = %error,
                "answer delivered but not recorded"
            );
        }
    }
}

pub fn insight_cache_key(context: Option<QueryContext>) -> String {
    format!("dashboard-{}", context.map(|context| context.as_str()).unwrap_or("all"))
}

async fn emit(events: &mpsc::Sender<AgentEvent>, conversation_id: &str, event: AgentEvent) {
    if events.send(event).await.is_err() {
        debug!(
            event_name = "assistant.stream.dropped",
            correlation_id = %conversation_id,
            "final event dropped; consumer detached"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use capplan_core::chrono::{Duration, TimeZone, Utc};
    use capplan_core::{FixedClock, InMemoryWorkspace};
    use futures_util::StreamExt;
    use serde_json::json;

    use super::{insight_cache_key, AssistantService, QueryContext, QueryRequest, MAX_QUERY_CHARS};
    use crate::conversation::{ConversationStore, InMemoryConversationStore};
    use crate::insights::TtlInsightCache;
    use crate::llm::{ContentBlock, GatewayError, ModelResponse, Role, StopReason};
    use crate::runtime::AgentRuntime;
    use crate::scripted::{streamed_text, text_turn, tool_turn, ScriptedGateway, TURN_USAGE};
    use crate::stream::AgentEvent;
    use crate::tools::test_support::{registry, today};

    struct Harness {
        service: Arc<AssistantService>,
        gateway: Arc<ScriptedGateway>,
        store: Arc<InMemoryConversationStore>,
        clock: Arc<FixedClock>,
    }

    fn harness(gateway: ScriptedGateway) -> Harness {
        let gateway = Arc::new(gateway);
        let store = Arc::new(InMemoryConversationStore::default());
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2025, 3, 5, 9, 0, 0).single().expect("valid timestamp"),
        ));
        let runtime = AgentRuntime::new(
            gateway.clone(),
            Arc::new(registry(InMemoryWorkspace::demo(today()))),
            10,
        );
        let service = Arc::new(AssistantService::new(
            runtime,
            store.clone(),
            Arc::new(TtlInsightCache::new(3600, clock.clone())),
            clock.clone(),
            8.0,
        ));
        Harness { service, gateway, store, clock }
    }

    #[tokio::test]
    async fn twenty_two_queries_keep_the_twenty_most_recent_turns() {
        let mut gateway = ScriptedGateway::new();
        for index in 0..22 {
            gateway = gateway.with_response(text_turn(&format!("a{index}")));
        }
        let harness = harness(gateway);

        for index in 0..22 {
            let response = harness
                .service
                .process_query(QueryRequest::new(format!("q{index}")).in_conversation("conv-a"))
                .await;
            assert!(response.success);
        }

        let history = harness.store.history("conv-a").await.expect("history");
        assert_eq!(history.len(), 20);
        assert_eq!(history[0].text, "q12");
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[19].text, "a21");
    }

    #[tokio::test]
    async fn history_precedes_the_new_query() {
        let harness = harness(
            ScriptedGateway::new().with_response(text_turn("first")).with_response(text_turn("second")),
        );
        let first = harness.service.process_query(QueryRequest::new("Who is busy?")).await;
        let conversation_id = first.conversation_id.clone();
        assert!(uuid::Uuid::parse_str(&conversation_id).is_ok());

        harness
            .service
            .process_query(QueryRequest::new("And next week?").in_conversation(&conversation_id))
            .await;

        let requests = harness.gateway.requests();
        let texts: Vec<String> = requests[1].messages.iter().map(|message| message.text()).collect();
        assert_eq!(texts, vec!["Who is busy?", "first", "And next week?"]);
    }

    #[tokio::test]
    async fn answers_without_text_are_not_replayed() {
        let empty = ModelResponse {
            content: Vec::new(),
            stop_reason: StopReason::MaxTokens,
            usage: TURN_USAGE,
        };
        let harness = harness(
            ScriptedGateway::new().with_response(empty).with_response(text_turn("Ana is free.")),
        );

        let first = harness
            .service
            .process_query(QueryRequest::new("Who is free?").in_conversation("conv-m"))
            .await;
        assert!(first.success);
        assert!(harness.store.history("conv-m").await.expect("history").is_empty());

        harness
            .service
            .process_query(QueryRequest::new("Anyone else?").in_conversation("conv-m"))
            .await;

        let follow_up = &harness.gateway.requests()[1];
        assert_eq!(follow_up.messages.len(), 1);
        assert!(follow_up.messages.iter().flat_map(|message| &message.content).all(|block| {
            !matches!(block, ContentBlock::Text { text } if text.is_empty())
        }));
    }

    #[tokio::test]
    async fn invalid_queries_fail_without_calling_the_model() {
        let harness = harness(ScriptedGateway::new());

        let empty = harness.service.process_query(QueryRequest::new("   ")).await;
        let long = harness.service.process_query(QueryRequest::new("x".repeat(MAX_QUERY_CHARS + 1))).await;

        assert!(!empty.success);
        assert_eq!(
            empty.message,
            "I encountered an error processing your request: validation failed: query must not be empty"
        );
        assert!(!long.success);
        assert!(harness.gateway.requests().is_empty());

        // At the limit the query reaches the model, whose script is empty here.
        harness.service.process_query(QueryRequest::new("x".repeat(MAX_QUERY_CHARS))).await;
        assert_eq!(harness.gateway.requests().len(), 1);
    }

    #[tokio::test]
    async fn gateway_failure_is_reported_and_not_recorded() {
        let harness = harness(ScriptedGateway::new().with_error(GatewayError::Http {
            status: 500,
            message: "boom".to_string(),
        }));

        let response =
            harness.service.process_query(QueryRequest::new("Teams?").in_conversation("conv-e")).await;

        assert!(!response.success);
        assert_eq!(response.conversation_id, "conv-e");
        assert!(response.message.starts_with("I encountered an error processing your request:"));
        assert!(harness.store.history("conv-e").await.expect("history").is_empty());
    }

    #[tokio::test]
    async fn tool_trace_and_raw_data_are_returned() {
        let harness = harness(
            ScriptedGateway::new()
                .with_response(tool_turn(None, &[("toolu_1", "get_teams", json!({}))]))
                .with_response(text_turn("There are three teams.")),
        );

        let response = harness
            .service
            .process_query(QueryRequest::new("List teams").with_context(QueryContext::Resources))
            .await;

        assert!(response.success);
        let calls = response.tool_calls.as_ref().expect("tool calls");
        assert_eq!(calls[0].name, "get_teams");
        let raw = &response.data.as_ref().expect("data").raw_data;
        assert_eq!(raw[0].as_array().map(Vec::len), Some(3));

        let body = serde_json::to_value(&response).expect("serialize");
        assert_eq!(body["toolCalls"][0]["input"], json!({}));
        assert_eq!(body["usage"]["inputTokens"], 24);
        assert!(harness.gateway.requests()[0].system.contains("resources view"));
    }

    #[tokio::test]
    async fn streamed_query_ends_with_complete_and_records_history() {
        let harness = harness(ScriptedGateway::new().with_stream(streamed_text(&["Ana is ", "free."])));

        let events: Vec<AgentEvent> = harness
            .service
            .process_query_stream(QueryRequest::new("Who is free?").in_conversation("conv-s"))
            .collect()
            .await;

        assert_eq!(events.len(), 3);
        assert_eq!(events[0], AgentEvent::Text { content: "Ana is ".to_string() });
        assert!(matches!(
            &events[2],
            AgentEvent::Complete { conversation_id: Some(id), .. } if id == "conv-s"
        ));
        let history = harness.store.history("conv-s").await.expect("history");
        assert_eq!(history[1].text, "Ana is free.");
    }

    #[tokio::test]
    async fn streamed_validation_failure_is_a_single_error_event() {
        let harness = harness(ScriptedGateway::new());
        let events: Vec<AgentEvent> =
            harness.service.process_query_stream(QueryRequest::new("")).collect().await;

        assert_eq!(
            events,
            vec![AgentEvent::Error { error: "validation failed: query must not be empty".to_string() }]
        );
    }

    #[tokio::test]
    async fn dashboard_insights_are_cached_per_context() {
        let harness = harness(ScriptedGateway::new());

        let first = harness.service.dashboard_insights(None).await;
        harness.clock.advance(Duration::minutes(30));
        let second = harness.service.dashboard_insights(None).await;
        let capacity = harness.service.dashboard_insights(Some(QueryContext::Capacity)).await;

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.generated_at, first.generated_at);
        assert!(capacity.generated_at > first.generated_at);
        assert_eq!(insight_cache_key(Some(QueryContext::Capacity)), "dashboard-capacity");

        harness.clock.advance(Duration::hours(1));
        let refreshed = harness.service.dashboard_insights(None).await;
        assert!(!Arc::ptr_eq(&first, &refreshed));
    }

    #[tokio::test]
    async fn clearing_a_conversation_forgets_it() {
        let harness = harness(ScriptedGateway::new().with_response(text_turn("hi")));
        harness.service.process_query(QueryRequest::new("hello").in_conversation("conv-c")).await;

        harness.service.clear_conversation("conv-c").await.expect("clear");
        harness.service.clear_conversation("conv-c").await.expect("clear again");

        assert!(harness.store.history("conv-c").await.expect("history").is_empty());
    }

    #[test]
    fn contexts_parse_case_insensitively() {
        assert_eq!("Timeline".parse::<QueryContext>().ok(), Some(QueryContext::Timeline));
        assert!("roadmap".parse::<QueryContext>().is_err());
    }
}
