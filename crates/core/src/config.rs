use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::errors::WorkflowError;

/// Process-wide credential variable consulted when no tutor-specific key is set.
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub openai: OpenAiConfig,
    pub agent: AgentConfig,
    pub guardrails: GuardrailSettings,
    pub server: ServerConfig,
    pub trace: TraceConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct OpenAiConfig {
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub name: String,
    pub model: String,
    pub reasoning_effort: ReasoningEffort,
    pub reasoning_summary: ReasoningSummary,
    pub store: bool,
    pub search_context_size: SearchContextSize,
}

#[derive(Clone, Debug)]
pub struct GuardrailSettings {
    pub model: String,
    pub confidence_threshold: f64,
    pub pii_block: bool,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub public_dir: PathBuf,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct TraceConfig {
    pub source: String,
    pub workflow_id: String,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningEffort {
    Minimal,
    Low,
    Medium,
    High,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningSummary {
    Auto,
    Concise,
    Detailed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchContextSize {
    Low,
    Medium,
    High,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub openai_api_key: Option<String>,
    pub openai_base_url: Option<String>,
    pub agent_model: Option<String>,
    pub guardrails_model: Option<String>,
    pub server_port: Option<u16>,
    pub public_dir: Option<PathBuf>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            openai: OpenAiConfig {
                api_key: None,
                base_url: "https://api.openai.com/v1".to_string(),
                timeout_secs: 120,
            },
            agent: AgentConfig {
                name: "My Personal Tutor".to_string(),
                model: "gpt-5.2".to_string(),
                reasoning_effort: ReasoningEffort::Low,
                reasoning_summary: ReasoningSummary::Auto,
                store: true,
                search_context_size: SearchContextSize::Medium,
            },
            guardrails: GuardrailSettings {
                model: "gpt-4.1-mini".to_string(),
                confidence_threshold: 0.7,
                pii_block: false,
            },
            server: ServerConfig {
                bind_address: "0.0.0.0".to_string(),
                port: 3000,
                public_dir: PathBuf::from("public"),
                graceful_shutdown_secs: 15,
            },
            trace: TraceConfig {
                source: "agent-builder".to_string(),
                workflow_id: "wf_6958981e6614819081ee61d758a96d730d95d548d7a74d9b".to_string(),
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

macro_rules! impl_lowercase_from_str {
    ($ty:ty, $label:literal, $expected:literal, { $($raw:literal => $variant:expr),+ $(,)? }) => {
        impl std::str::FromStr for $ty {
            type Err = ConfigError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value.trim().to_ascii_lowercase().as_str() {
                    $($raw => Ok($variant),)+
                    other => Err(ConfigError::Validation(format!(
                        concat!("unsupported ", $label, " `{}` (expected ", $expected, ")"),
                        other
                    ))),
                }
            }
        }
    };
}

impl_lowercase_from_str!(ReasoningEffort, "reasoning effort", "minimal|low|medium|high", {
    "minimal" => ReasoningEffort::Minimal,
    "low" => ReasoningEffort::Low,
    "medium" => ReasoningEffort::Medium,
    "high" => ReasoningEffort::High,
});

impl_lowercase_from_str!(ReasoningSummary, "reasoning summary", "auto|concise|detailed", {
    "auto" => ReasoningSummary::Auto,
    "concise" => ReasoningSummary::Concise,
    "detailed" => ReasoningSummary::Detailed,
});

impl_lowercase_from_str!(SearchContextSize, "search context size", "low|medium|high", {
    "low" => SearchContextSize::Low,
    "medium" => SearchContextSize::Medium,
    "high" => SearchContextSize::High,
});

impl_lowercase_from_str!(LogFormat, "log format", "compact|pretty|json", {
    "compact" => LogFormat::Compact,
    "pretty" => LogFormat::Pretty,
    "json" => LogFormat::Json,
});

impl ReasoningEffort {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Minimal => "minimal",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl ReasoningSummary {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Concise => "concise",
            Self::Detailed => "detailed",
        }
    }
}

impl SearchContextSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("tutor.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    /// Picks the credential for one workflow run.
    ///
    /// A non-blank request key wins over the configured key. The result is
    /// scoped to the caller; configuration is never mutated.
    pub fn resolve_api_key(&self, request_key: Option<&str>) -> Result<SecretString, WorkflowError> {
        if let Some(key) = request_key.map(str::trim).filter(|key| !key.is_empty()) {
            return Ok(secret_value(key.to_string()));
        }

        self.openai
            .api_key
            .as_ref()
            .filter(|key| !key.expose_secret().trim().is_empty())
            .cloned()
            .ok_or_else(|| {
                WorkflowError::Configuration(
                    "OpenAI API key is required. Please provide it in the request or set OPENAI_API_KEY environment variable."
                        .to_string(),
                )
            })
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(openai) = patch.openai {
            if let Some(openai_api_key_value) = openai.api_key {
                self.openai.api_key = Some(secret_value(openai_api_key_value));
            }
            if let Some(base_url) = openai.base_url {
                self.openai.base_url = base_url;
            }
            if let Some(timeout_secs) = openai.timeout_secs {
                self.openai.timeout_secs = timeout_secs;
            }
        }

        if let Some(agent) = patch.agent {
            if let Some(name) = agent.name {
                self.agent.name = name;
            }
            if let Some(model) = agent.model {
                self.agent.model = model;
            }
            if let Some(reasoning_effort) = agent.reasoning_effort {
                self.agent.reasoning_effort = reasoning_effort;
            }
            if let Some(reasoning_summary) = agent.reasoning_summary {
                self.agent.reasoning_summary = reasoning_summary;
            }
            if let Some(store) = agent.store {
                self.agent.store = store;
            }
            if let Some(search_context_size) = agent.search_context_size {
                self.agent.search_context_size = search_context_size;
            }
        }

        if let Some(guardrails) = patch.guardrails {
            if let Some(model) = guardrails.model {
                self.guardrails.model = model;
            }
            if let Some(confidence_threshold) = guardrails.confidence_threshold {
                self.guardrails.confidence_threshold = confidence_threshold;
            }
            if let Some(pii_block) = guardrails.pii_block {
                self.guardrails.pii_block = pii_block;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(public_dir) = server.public_dir {
                self.server.public_dir = public_dir;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(trace) = patch.trace {
            if let Some(source) = trace.source {
                self.trace.source = source;
            }
            if let Some(workflow_id) = trace.workflow_id {
                self.trace.workflow_id = workflow_id;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        let api_key =
            read_env("TUTOR_OPENAI_API_KEY").or_else(|| read_env(OPENAI_API_KEY_ENV));
        if let Some(value) = api_key {
            self.openai.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("TUTOR_OPENAI_BASE_URL") {
            self.openai.base_url = value;
        }
        if let Some(value) = read_env("TUTOR_OPENAI_TIMEOUT_SECS") {
            self.openai.timeout_secs = parse_u64("TUTOR_OPENAI_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("TUTOR_AGENT_NAME") {
            self.agent.name = value;
        }
        if let Some(value) = read_env("TUTOR_AGENT_MODEL") {
            self.agent.model = value;
        }
        if let Some(value) = read_env("TUTOR_AGENT_REASONING_EFFORT") {
            self.agent.reasoning_effort = value.parse()?;
        }
        if let Some(value) = read_env("TUTOR_AGENT_REASONING_SUMMARY") {
            self.agent.reasoning_summary = value.parse()?;
        }
        if let Some(value) = read_env("TUTOR_AGENT_STORE") {
            self.agent.store = parse_bool("TUTOR_AGENT_STORE", &value)?;
        }
        if let Some(value) = read_env("TUTOR_AGENT_SEARCH_CONTEXT_SIZE") {
            self.agent.search_context_size = value.parse()?;
        }

        if let Some(value) = read_env("TUTOR_GUARDRAILS_MODEL") {
            self.guardrails.model = value;
        }
        if let Some(value) = read_env("TUTOR_GUARDRAILS_CONFIDENCE_THRESHOLD") {
            self.guardrails.confidence_threshold =
                parse_f64("TUTOR_GUARDRAILS_CONFIDENCE_THRESHOLD", &value)?;
        }
        if let Some(value) = read_env("TUTOR_GUARDRAILS_PII_BLOCK") {
            self.guardrails.pii_block = parse_bool("TUTOR_GUARDRAILS_PII_BLOCK", &value)?;
        }

        if let Some(value) = read_env("TUTOR_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        let port = read_env("TUTOR_SERVER_PORT")
            .map(|value| ("TUTOR_SERVER_PORT", value))
            .or_else(|| read_env("PORT").map(|value| ("PORT", value)));
        if let Some((key, value)) = port {
            self.server.port = parse_u16(key, &value)?;
        }
        if let Some(value) = read_env("TUTOR_SERVER_PUBLIC_DIR") {
            self.server.public_dir = PathBuf::from(value);
        }
        if let Some(value) = read_env("TUTOR_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("TUTOR_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("TUTOR_TRACE_SOURCE") {
            self.trace.source = value;
        }
        if let Some(value) = read_env("TUTOR_TRACE_WORKFLOW_ID") {
            self.trace.workflow_id = value;
        }

        let log_level = read_env("TUTOR_LOGGING_LEVEL").or_else(|| read_env("TUTOR_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("TUTOR_LOGGING_FORMAT").or_else(|| read_env("TUTOR_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(api_key) = overrides.openai_api_key {
            self.openai.api_key = Some(secret_value(api_key));
        }
        if let Some(base_url) = overrides.openai_base_url {
            self.openai.base_url = base_url;
        }
        if let Some(agent_model) = overrides.agent_model {
            self.agent.model = agent_model;
        }
        if let Some(guardrails_model) = overrides.guardrails_model {
            self.guardrails.model = guardrails_model;
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
        if let Some(public_dir) = overrides.public_dir {
            self.server.public_dir = public_dir;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_openai(&self.openai)?;
        validate_agent(&self.agent)?;
        validate_guardrails(&self.guardrails)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("tutor.toml"), PathBuf::from("config/tutor.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_openai(openai: &OpenAiConfig) -> Result<(), ConfigError> {
    let base_url = openai.base_url.trim();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "openai.base_url must start with http:// or https://".to_string(),
        ));
    }

    if openai.timeout_secs == 0 || openai.timeout_secs > 600 {
        return Err(ConfigError::Validation(
            "openai.timeout_secs must be in range 1..=600".to_string(),
        ));
    }

    Ok(())
}

fn validate_agent(agent: &AgentConfig) -> Result<(), ConfigError> {
    if agent.name.trim().is_empty() {
        return Err(ConfigError::Validation("agent.name must not be empty".to_string()));
    }
    if agent.model.trim().is_empty() {
        return Err(ConfigError::Validation("agent.model must not be empty".to_string()));
    }
    Ok(())
}

fn validate_guardrails(guardrails: &GuardrailSettings) -> Result<(), ConfigError> {
    if guardrails.model.trim().is_empty() {
        return Err(ConfigError::Validation("guardrails.model must not be empty".to_string()));
    }

    if !(0.0..=1.0).contains(&guardrails.confidence_threshold) {
        return Err(ConfigError::Validation(
            "guardrails.confidence_threshold must be in range 0.0..=1.0".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_f64(key: &str, value: &str) -> Result<f64, ConfigError> {
    value.parse::<f64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    openai: Option<OpenAiPatch>,
    agent: Option<AgentPatch>,
    guardrails: Option<GuardrailsPatch>,
    server: Option<ServerPatch>,
    trace: Option<TracePatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAiPatch {
    api_key: Option<String>,
    base_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct AgentPatch {
    name: Option<String>,
    model: Option<String>,
    reasoning_effort: Option<ReasoningEffort>,
    reasoning_summary: Option<ReasoningSummary>,
    store: Option<bool>,
    search_context_size: Option<SearchContextSize>,
}

#[derive(Debug, Default, Deserialize)]
struct GuardrailsPatch {
    model: Option<String>,
    confidence_threshold: Option<f64>,
    pii_block: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    public_dir: Option<PathBuf>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct TracePatch {
    source: Option<String>,
    workflow_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
