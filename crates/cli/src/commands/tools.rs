use std::sync::Arc;

use capplan_core::config::AppConfig;
use capplan_core::SystemClock;

use crate::commands::{demo_registry, CommandResult};

/// Definitions do not depend on credentials, so defaults are enough.
pub fn run() -> CommandResult {
    let registry = demo_registry(&AppConfig::default(), Arc::new(SystemClock));

    match serde_json::to_string_pretty(&registry.definitions()) {
        Ok(output) => CommandResult { exit_code: 0, output },
        Err(error) => CommandResult::failure("tools", "serialization", error.to_string(), 1),
    }
}
