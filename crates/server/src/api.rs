//! HTTP surface of the assistant.
//!
//! Streaming answers are server-sent events, one JSON-encoded [`AgentEvent`]
//! per `data:` frame; the response ends after the `complete` or `error` frame.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::header::HeaderName;
use axum::http::{HeaderValue, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use capplan_agent::{AgentEvent, AssistantService, QueryContext, QueryRequest, QueryResponse};
use capplan_core::errors::{ApplicationError, InterfaceError};
use capplan_core::DashboardInsights;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

use crate::health;

#[derive(Clone)]
pub struct AppState {
    service: Arc<AssistantService>,
}

impl AppState {
    pub fn new(service: Arc<AssistantService>) -> Self {
        Self { service }
    }

    pub fn model(&self) -> &str {
        self.service.runtime().gateway().model()
    }

    pub fn tool_count(&self) -> usize {
        self.service.runtime().tools().len()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: &'static str,
    pub detail: String,
    pub correlation_id: String,
}

#[derive(Debug)]
pub struct ApiError(InterfaceError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        warn!(
            event_name = "http.request.failed",
            correlation_id = %self.0.correlation_id(),
            status = status.as_u16(),
            error = %self.0,
            "request failed"
        );
        let body = ErrorBody {
            error: self.0.user_message(),
            detail: self.0.to_string(),
            correlation_id: self.0.correlation_id().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

fn api_error(error: ApplicationError, correlation_id: impl Into<String>) -> ApiError {
    ApiError(error.into_interface(correlation_id))
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct InsightsParams {
    pub context: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ClearResponse {
    pub success: bool,
    pub message: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ai/query", post(query))
        .route("/ai/query/stream", post(query_stream))
        .route("/ai/insights/dashboard", get(dashboard_insights))
        .route("/ai/conversations/{conversation_id}", delete(clear_conversation))
        .route("/ai/health", get(health::health))
        .route("/health", get(health::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Rejects malformed queries before any model work starts.
fn check_query(request: &QueryRequest) -> Result<(), ApiError> {
    request.validate().map_err(|error| {
        let correlation_id =
            request.conversation_id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());
        api_error(error, correlation_id)
    })
}

async fn query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    check_query(&request)?;
    info!(
        event_name = "http.query.received",
        query_chars = request.query.chars().count(),
        "query received"
    );
    Ok(Json(state.service.process_query(request).await))
}

async fn query_stream(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    check_query(&request)?;
    info!(
        event_name = "http.query_stream.received",
        query_chars = request.query.chars().count(),
        "streaming query received"
    );

    let frames = state
        .service
        .process_query_stream(request)
        .map(|event| Ok::<Event, Infallible>(sse_frame(&event)));
    let no_proxy_buffering =
        [(HeaderName::from_static("x-accel-buffering"), HeaderValue::from_static("no"))];
    Ok((no_proxy_buffering, Sse::new(frames)))
}

fn sse_frame(event: &AgentEvent) -> Event {
    let payload = serde_json::to_string(event).unwrap_or_else(|error| {
        json!({ "type": "error", "error": format!("could not encode event: {error}") }).to_string()
    });
    Event::default().data(payload)
}

async fn dashboard_insights(
    State(state): State<AppState>,
    Query(params): Query<InsightsParams>,
) -> Result<Json<DashboardInsights>, ApiError> {
    let context = params
        .context
        .as_deref()
        .map(str::trim)
        .filter(|context| !context.is_empty() && !context.eq_ignore_ascii_case("all"))
        .map(str::parse::<QueryContext>)
        .transpose()
        .map_err(|error| api_error(error, Uuid::new_v4().to_string()))?;

    let insights = state.service.dashboard_insights(context).await;
    Ok(Json(insights.as_ref().clone()))
}

async fn clear_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> Result<Json<ClearResponse>, ApiError> {
    state
        .service
        .clear_conversation(&conversation_id)
        .await
        .map_err(|error| api_error(error, conversation_id.clone()))?;

    Ok(Json(ClearResponse {
        success: true,
        message: format!("Conversation {conversation_id} cleared"),
    }))
}
