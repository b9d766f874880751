use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::ExposeSecret;
use toml::Value;
use tutor_core::config::{AppConfig, LoadOptions, OPENAI_API_KEY_ENV};

/// One rendered field: dotted key, display value, and the env variables
/// that can set it, most specific first.
struct Field {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in fields(&config) {
        let source = field_source(
            field.key,
            field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key, &field.value, source));
    }

    lines.join("\n")
}

fn fields(config: &AppConfig) -> Vec<Field> {
    let api_key = config
        .openai
        .api_key
        .as_ref()
        .map(|key| redact_token(key.expose_secret()))
        .unwrap_or_else(|| "<unset>".to_string());

    vec![
        Field {
            key: "openai.api_key",
            value: api_key,
            env_keys: &["TUTOR_OPENAI_API_KEY", OPENAI_API_KEY_ENV],
        },
        Field {
            key: "openai.base_url",
            value: config.openai.base_url.clone(),
            env_keys: &["TUTOR_OPENAI_BASE_URL"],
        },
        Field {
            key: "openai.timeout_secs",
            value: config.openai.timeout_secs.to_string(),
            env_keys: &["TUTOR_OPENAI_TIMEOUT_SECS"],
        },
        Field { key: "agent.name", value: config.agent.name.clone(), env_keys: &["TUTOR_AGENT_NAME"] },
        Field {
            key: "agent.model",
            value: config.agent.model.clone(),
            env_keys: &["TUTOR_AGENT_MODEL"],
        },
        Field {
            key: "agent.reasoning_effort",
            value: config.agent.reasoning_effort.as_str().to_string(),
            env_keys: &["TUTOR_AGENT_REASONING_EFFORT"],
        },
        Field {
            key: "agent.reasoning_summary",
            value: config.agent.reasoning_summary.as_str().to_string(),
            env_keys: &["TUTOR_AGENT_REASONING_SUMMARY"],
        },
        Field {
            key: "agent.store",
            value: config.agent.store.to_string(),
            env_keys: &["TUTOR_AGENT_STORE"],
        },
        Field {
            key: "agent.search_context_size",
            value: config.agent.search_context_size.as_str().to_string(),
            env_keys: &["TUTOR_AGENT_SEARCH_CONTEXT_SIZE"],
        },
        Field {
            key: "guardrails.model",
            value: config.guardrails.model.clone(),
            env_keys: &["TUTOR_GUARDRAILS_MODEL"],
        },
        Field {
            key: "guardrails.confidence_threshold",
            value: config.guardrails.confidence_threshold.to_string(),
            env_keys: &["TUTOR_GUARDRAILS_CONFIDENCE_THRESHOLD"],
        },
        Field {
            key: "guardrails.pii_block",
            value: config.guardrails.pii_block.to_string(),
            env_keys: &["TUTOR_GUARDRAILS_PII_BLOCK"],
        },
        Field {
            key: "server.bind_address",
            value: config.server.bind_address.clone(),
            env_keys: &["TUTOR_SERVER_BIND_ADDRESS"],
        },
        Field {
            key: "server.port",
            value: config.server.port.to_string(),
            env_keys: &["TUTOR_SERVER_PORT", "PORT"],
        },
        Field {
            key: "server.public_dir",
            value: config.server.public_dir.display().to_string(),
            env_keys: &["TUTOR_SERVER_PUBLIC_DIR"],
        },
        Field {
            key: "server.graceful_shutdown_secs",
            value: config.server.graceful_shutdown_secs.to_string(),
            env_keys: &["TUTOR_SERVER_GRACEFUL_SHUTDOWN_SECS"],
        },
        Field {
            key: "trace.source",
            value: config.trace.source.clone(),
            env_keys: &["TUTOR_TRACE_SOURCE"],
        },
        Field {
            key: "trace.workflow_id",
            value: config.trace.workflow_id.clone(),
            env_keys: &["TUTOR_TRACE_WORKFLOW_ID"],
        },
        Field {
            key: "logging.level",
            value: config.logging.level.clone(),
            env_keys: &["TUTOR_LOGGING_LEVEL", "TUTOR_LOG_LEVEL"],
        },
        Field {
            key: "logging.format",
            value: format!("{:?}", config.logging.format).to_lowercase(),
            env_keys: &["TUTOR_LOGGING_FORMAT", "TUTOR_LOG_FORMAT"],
        },
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("tutor.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/tutor.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
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
    use toml::Value;

    use super::{contains_path, redact_token};

    #[test]
    fn redaction_keeps_only_key_prefix() {
        assert_eq!(redact_token("sk-proj-abcdef"), "sk-***");
        assert_eq!(redact_token("opaque"), "<redacted>");
        assert_eq!(redact_token("  "), "<empty>");
    }

    #[test]
    fn nested_keys_are_found_in_file_doc() {
        let doc: Value = "[guardrails]\npii_block = true\n".parse().expect("toml");
        assert!(contains_path(&doc, "guardrails.pii_block"));
        assert!(!contains_path(&doc, "guardrails.model"));
    }
}
