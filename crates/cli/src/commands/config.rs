use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use capplan_core::config::{AppConfig, LoadOptions, DEFAULT_CONFIG_FILE};
use secrecy::ExposeSecret;
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let entries = [
        entry("llm.api_key", redact_token(config.llm.api_key.expose_secret()), &["CAPPLAN_LLM_API_KEY"]),
        entry("llm.base_url", config.llm.base_url.clone(), &["CAPPLAN_LLM_BASE_URL"]),
        entry("llm.model", config.llm.model.clone(), &["CAPPLAN_LLM_MODEL"]),
        entry("llm.max_tokens", config.llm.max_tokens.to_string(), &["CAPPLAN_LLM_MAX_TOKENS"]),
        entry("llm.timeout_secs", config.llm.timeout_secs.to_string(), &["CAPPLAN_LLM_TIMEOUT_SECS"]),
        entry("agent.max_rounds", config.agent.max_rounds.to_string(), &["CAPPLAN_AGENT_MAX_ROUNDS"]),
        entry(
            "agent.max_history_turns",
            config.agent.max_history_turns.to_string(),
            &["CAPPLAN_AGENT_MAX_HISTORY_TURNS"],
        ),
        entry(
            "agent.insight_cache_ttl_secs",
            config.agent.insight_cache_ttl_secs.to_string(),
            &["CAPPLAN_AGENT_INSIGHT_CACHE_TTL_SECS"],
        ),
        entry(
            "agent.hours_per_day",
            config.agent.hours_per_day.to_string(),
            &["CAPPLAN_AGENT_HOURS_PER_DAY"],
        ),
        entry(
            "server.bind_address",
            config.server.bind_address.clone(),
            &["CAPPLAN_SERVER_BIND_ADDRESS"],
        ),
        entry("server.port", config.server.port.to_string(), &["CAPPLAN_SERVER_PORT"]),
        entry(
            "logging.level",
            config.logging.level.clone(),
            &["CAPPLAN_LOGGING_LEVEL", "CAPPLAN_LOG_LEVEL"],
        ),
        entry(
            "logging.format",
            format!("{:?}", config.logging.format).to_ascii_lowercase(),
            &["CAPPLAN_LOGGING_FORMAT", "CAPPLAN_LOG_FORMAT"],
        ),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    lines.extend(entries.into_iter().map(|entry| {
        let source = field_source(
            entry.key,
            entry.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        render_line(entry.key, &entry.value, source)
    }));

    lines.join("\n")
}

/// A reported key, its effective value and the env vars that can set it.
struct Entry {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

fn entry(key: &'static str, value: String, env_keys: &'static [&'static str]) -> Entry {
    Entry { key, value, env_keys }
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from(DEFAULT_CONFIG_FILE), Path::new("config").join(DEFAULT_CONFIG_FILE)]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Keeps the vendor prefix (`sk-ant-…` shows as `sk-***`) and hides the rest.
fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}

#[cfg(test)]
mod tests {
    use super::{contains_path, redact_token};

    #[test]
    fn redaction_keeps_only_the_prefix() {
        assert_eq!(redact_token("sk-ant-api03-secret"), "sk-***");
        assert_eq!(redact_token("opaque"), "<redacted>");
        assert_eq!(redact_token("  "), "<empty>");
    }

    #[test]
    fn dotted_paths_resolve_through_tables() {
        let doc: toml::Value = "[agent]\nmax_rounds = 4\n".parse().expect("toml");
        assert!(contains_path(&doc, "agent.max_rounds"));
        assert!(!contains_path(&doc, "agent.hours_per_day"));
    }
}
