use std::sync::Arc;

use capplan_agent::anthropic::AnthropicGateway;
use capplan_agent::ModelGateway;
use capplan_core::config::{AppConfig, LoadOptions};
use capplan_core::SystemClock;
use serde::Serialize;
use serde_json::json;

use crate::commands::demo_registry;

/// Tools every deployment must advertise to the model.
const EXPECTED_TOOLS: usize = 14;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            json!({
                "overall_status": "fail",
                "summary": "doctor serialization failed",
                "error": error.to_string(),
            })
            .to_string()
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_model_gateway(&config));
            checks.push(check_tool_registry(&config));
            checks.push(check_collaborators(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["model_gateway", "tool_registry", "collaborators"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

/// Builds the HTTP client only; no request is sent.
fn check_model_gateway(config: &AppConfig) -> DoctorCheck {
    match AnthropicGateway::new(&config.llm) {
        Ok(gateway) => DoctorCheck {
            name: "model_gateway",
            status: CheckStatus::Pass,
            details: format!("model `{}` via {}", gateway.model(), config.llm.base_url),
        },
        Err(error) => DoctorCheck {
            name: "model_gateway",
            status: CheckStatus::Fail,
            details: error.to_string(),
        },
    }
}

fn check_tool_registry(config: &AppConfig) -> DoctorCheck {
    let registry = demo_registry(config, Arc::new(SystemClock));
    let count = registry.len();
    DoctorCheck {
        name: "tool_registry",
        status: if count == EXPECTED_TOOLS { CheckStatus::Pass } else { CheckStatus::Fail },
        details: format!("{count} of {EXPECTED_TOOLS} tools registered"),
    }
}

fn check_collaborators(config: &AppConfig) -> DoctorCheck {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: "collaborators",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    let registry = demo_registry(config, Arc::new(SystemClock));
    let outcome = runtime.block_on(registry.execute("get_teams", json!({})));

    if outcome.success {
        let teams = outcome.data.as_ref().and_then(|data| data.as_array()).map_or(0, Vec::len);
        DoctorCheck {
            name: "collaborators",
            status: CheckStatus::Pass,
            details: format!("team directory answered with {teams} teams"),
        }
    } else {
        DoctorCheck {
            name: "collaborators",
            status: CheckStatus::Fail,
            details: outcome.error.unwrap_or_else(|| "team lookup failed".to_string()),
        }
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}
