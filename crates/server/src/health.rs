use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde::Serialize;

use crate::api::AppState;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub model: String,
    pub tools: usize,
    pub checked_at: String,
}

/// Ready once the tool registry is populated; the model is not probed.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let tools = state.tool_count();
    let ready = tools > 0;

    let payload = HealthResponse {
        status: if ready { "ok" } else { "degraded" },
        model: state.model().to_string(),
        tools,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

#[cfg(test)]
mod tests {
    use axum::{extract::State, http::StatusCode, Json};
    use capplan_agent::scripted::{ScriptedGateway, SCRIPTED_MODEL};

    use crate::api::test_support::state;
    use crate::health::health;

    #[tokio::test]
    async fn health_reports_model_and_tool_count() {
        let (status, Json(payload)) = health(State(state(ScriptedGateway::new()))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "ok");
        assert_eq!(payload.model, SCRIPTED_MODEL);
        assert_eq!(payload.tools, 14);
    }
}
