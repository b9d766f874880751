//! Guardrail model: which checks exist, how they are configured, what they
//! return, and the service seam that evaluates them.

mod hosted;
mod pii;
mod report;
mod url_filter;

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tutor_core::config::GuardrailSettings;

use crate::llm::{LlmClient, ModerationClient};

pub use hosted::HostedGuardrailService;
pub use report::{
    CheckReport, GuardrailFailReport, HallucinationReport, ModerationReport, PassOutput, PiiReport,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum GuardrailKind {
    #[serde(rename = "Contains PII")]
    Pii,
    #[serde(rename = "Moderation")]
    Moderation,
    #[serde(rename = "Jailbreak")]
    Jailbreak,
    #[serde(rename = "Hallucination Detection")]
    HallucinationDetection,
    #[serde(rename = "NSFW Text")]
    Nsfw,
    #[serde(rename = "URL Filter")]
    UrlFilter,
    #[serde(rename = "Custom Prompt Check")]
    CustomPromptCheck,
    #[serde(rename = "Prompt Injection Detection")]
    PromptInjection,
}

impl GuardrailKind {
    pub const ALL: [Self; 8] = [
        Self::Pii,
        Self::Moderation,
        Self::Jailbreak,
        Self::HallucinationDetection,
        Self::Nsfw,
        Self::UrlFilter,
        Self::CustomPromptCheck,
        Self::PromptInjection,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Pii => "Contains PII",
            Self::Moderation => "Moderation",
            Self::Jailbreak => "Jailbreak",
            Self::HallucinationDetection => "Hallucination Detection",
            Self::Nsfw => "NSFW Text",
            Self::UrlFilter => "URL Filter",
            Self::CustomPromptCheck => "Custom Prompt Check",
            Self::PromptInjection => "Prompt Injection Detection",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

impl std::fmt::Display for GuardrailKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PiiEntity {
    CreditCard,
    UsSsn,
    UsPassport,
    UsBankNumber,
    EmailAddress,
    PhoneNumber,
}

impl PiiEntity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreditCard => "CREDIT_CARD",
            Self::UsSsn => "US_SSN",
            Self::UsPassport => "US_PASSPORT",
            Self::UsBankNumber => "US_BANK_NUMBER",
            Self::EmailAddress => "EMAIL_ADDRESS",
            Self::PhoneNumber => "PHONE_NUMBER",
        }
    }

    /// Placeholder written into anonymized text.
    pub fn placeholder(&self) -> String {
        format!("<{}>", self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PiiConfig {
    pub block: bool,
    #[serde(default)]
    pub detect_encoded_pii: bool,
    pub entities: Vec<PiiEntity>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModerationConfig {
    pub categories: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LlmCheckConfig {
    pub model: String,
    pub confidence_threshold: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CustomPromptConfig {
    pub system_prompt_details: String,
    pub model: String,
    pub confidence_threshold: f64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlFilterConfig {
    #[serde(default)]
    pub url_allow_list: Vec<String>,
    pub allowed_schemes: Vec<String>,
    pub block_userinfo: bool,
    pub allow_subdomains: bool,
}

/// One configured check, tagged by its canonical name.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", content = "config")]
pub enum GuardrailDefinition {
    #[serde(rename = "Contains PII")]
    Pii(PiiConfig),
    #[serde(rename = "Moderation")]
    Moderation(ModerationConfig),
    #[serde(rename = "Jailbreak")]
    Jailbreak(LlmCheckConfig),
    #[serde(rename = "Hallucination Detection")]
    HallucinationDetection(LlmCheckConfig),
    #[serde(rename = "NSFW Text")]
    Nsfw(LlmCheckConfig),
    #[serde(rename = "URL Filter")]
    UrlFilter(UrlFilterConfig),
    #[serde(rename = "Custom Prompt Check")]
    CustomPromptCheck(CustomPromptConfig),
    #[serde(rename = "Prompt Injection Detection")]
    PromptInjection(LlmCheckConfig),
}

impl GuardrailDefinition {
    pub fn kind(&self) -> GuardrailKind {
        match self {
            Self::Pii(_) => GuardrailKind::Pii,
            Self::Moderation(_) => GuardrailKind::Moderation,
            Self::Jailbreak(_) => GuardrailKind::Jailbreak,
            Self::HallucinationDetection(_) => GuardrailKind::HallucinationDetection,
            Self::Nsfw(_) => GuardrailKind::Nsfw,
            Self::UrlFilter(_) => GuardrailKind::UrlFilter,
            Self::CustomPromptCheck(_) => GuardrailKind::CustomPromptCheck,
            Self::PromptInjection(_) => GuardrailKind::PromptInjection,
        }
    }
}

/// Immutable, process-wide set of checks.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GuardrailConfig {
    pub guardrails: Vec<GuardrailDefinition>,
}

const TUTOR_MODERATION_CATEGORIES: [&str; 6] = [
    "sexual/minors",
    "hate/threatening",
    "harassment/threatening",
    "self-harm/instructions",
    "violence/graphic",
    "illicit/violent",
];

const TUTOR_TOPIC_POLICY: &str = "You are a personal learning tutor. Raise the guardrail if requests aren't focused on learning a topic, planning study time, or questions about material being taught.";

impl GuardrailConfig {
    pub fn new(guardrails: Vec<GuardrailDefinition>) -> Self {
        Self { guardrails }
    }

    /// The check set the tutor ships with.
    pub fn tutor_default(settings: &GuardrailSettings) -> Self {
        let llm_check = || LlmCheckConfig {
            model: settings.model.clone(),
            confidence_threshold: settings.confidence_threshold,
        };

        Self::new(vec![
            GuardrailDefinition::Pii(PiiConfig {
                block: settings.pii_block,
                detect_encoded_pii: true,
                entities: vec![
                    PiiEntity::CreditCard,
                    PiiEntity::UsBankNumber,
                    PiiEntity::UsPassport,
                    PiiEntity::UsSsn,
                ],
            }),
            GuardrailDefinition::Moderation(ModerationConfig {
                categories: TUTOR_MODERATION_CATEGORIES.iter().map(ToString::to_string).collect(),
            }),
            GuardrailDefinition::Jailbreak(llm_check()),
            GuardrailDefinition::UrlFilter(UrlFilterConfig {
                url_allow_list: Vec::new(),
                allowed_schemes: vec!["https".to_string()],
                block_userinfo: true,
                allow_subdomains: false,
            }),
            GuardrailDefinition::PromptInjection(llm_check()),
            GuardrailDefinition::CustomPromptCheck(CustomPromptConfig {
                system_prompt_details: TUTOR_TOPIC_POLICY.to_string(),
                model: settings.model.clone(),
                confidence_threshold: settings.confidence_threshold,
            }),
        ])
    }

    pub fn find(&self, kind: GuardrailKind) -> Option<&GuardrailDefinition> {
        self.guardrails.iter().find(|definition| definition.kind() == kind)
    }

    /// A config holding only the PII check, when that check is configured to
    /// mask rather than block.
    pub fn pii_masking(&self) -> Option<GuardrailConfig> {
        self.guardrails
            .iter()
            .find(|definition| matches!(definition, GuardrailDefinition::Pii(config) if !config.block))
            .map(|definition| GuardrailConfig::new(vec![definition.clone()]))
    }
}

/// Check-specific details attached to a result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GuardrailInfo {
    Pii {
        detected_entities: BTreeMap<PiiEntity, Vec<String>>,
        anonymized_text: String,
    },
    Moderation {
        flagged_categories: Vec<String>,
    },
    Classifier {
        kind: GuardrailKind,
        flagged: bool,
        confidence: f64,
    },
    Hallucination {
        flagged: bool,
        confidence: f64,
        reasoning: String,
        hallucination_type: Option<String>,
        hallucinated_statements: Vec<String>,
        verified_statements: Vec<String>,
    },
    UrlFilter {
        detected: Vec<String>,
        allowed: Vec<String>,
        blocked: Vec<String>,
        blocked_reasons: Vec<String>,
    },
    Errored {
        kind: GuardrailKind,
        message: String,
    },
}

impl GuardrailInfo {
    pub fn kind(&self) -> GuardrailKind {
        match self {
            Self::Pii { .. } => GuardrailKind::Pii,
            Self::Moderation { .. } => GuardrailKind::Moderation,
            Self::Hallucination { .. } => GuardrailKind::HallucinationDetection,
            Self::UrlFilter { .. } => GuardrailKind::UrlFilter,
            Self::Classifier { kind, .. } | Self::Errored { kind, .. } => *kind,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GuardrailResult {
    pub tripwire_triggered: bool,
    pub info: GuardrailInfo,
}

impl GuardrailResult {
    pub fn new(tripwire_triggered: bool, info: GuardrailInfo) -> Self {
        Self { tripwire_triggered, info }
    }

    pub fn errored(kind: GuardrailKind, message: impl Into<String>) -> Self {
        Self::new(false, GuardrailInfo::Errored { kind, message: message.into() })
    }

    pub fn kind(&self) -> GuardrailKind {
        self.info.kind()
    }

    pub fn anonymized_text(&self) -> Option<&str> {
        match &self.info {
            GuardrailInfo::Pii { anonymized_text, .. } => Some(anonymized_text),
            _ => None,
        }
    }
}

/// Lookup from check kind to its result. The first result per kind wins.
#[derive(Clone, Debug, Default)]
pub struct GuardrailResults<'a> {
    by_kind: BTreeMap<GuardrailKind, &'a GuardrailResult>,
}

impl<'a> GuardrailResults<'a> {
    pub fn index(results: &'a [GuardrailResult]) -> Self {
        let mut by_kind = BTreeMap::new();
        for result in results {
            by_kind.entry(result.kind()).or_insert(result);
        }
        Self { by_kind }
    }

    pub fn get(&self, kind: GuardrailKind) -> Option<&'a GuardrailResult> {
        self.by_kind.get(&kind).copied()
    }
}

pub fn has_tripwire(results: &[GuardrailResult]) -> bool {
    results.iter().any(|result| result.tripwire_triggered)
}

/// The anonymized text of the first PII result, or `fallback`.
pub fn safe_text(results: &[GuardrailResult], fallback: &str) -> String {
    results
        .iter()
        .find_map(GuardrailResult::anonymized_text)
        .unwrap_or(fallback)
        .to_string()
}

/// How a service treats a check that fails to execute.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorMode {
    /// Pre-invocation semantics: the whole evaluation fails.
    Raise,
    /// The check is reported as `Errored` and does not trip.
    Record,
}

/// Shared evaluation context handed to every check.
#[derive(Clone)]
pub struct GuardrailContext {
    pub guardrail_llm: Arc<dyn LlmClient>,
    pub moderation: Arc<dyn ModerationClient>,
}

#[async_trait]
pub trait GuardrailService: Send + Sync {
    /// Evaluates every check in `config` against `text`, in configuration order.
    async fn run(
        &self,
        text: &str,
        config: &GuardrailConfig,
        context: &GuardrailContext,
        mode: ErrorMode,
    ) -> Result<Vec<GuardrailResult>>;
}

/// Derived per-request view over one full guardrail pass.
#[derive(Clone, Debug, PartialEq)]
pub struct GuardrailOutcome {
    pub results: Vec<GuardrailResult>,
    pub has_tripwire: bool,
    pub safe_text: String,
    pub fail_output: GuardrailFailReport,
    pub pass_output: PassOutput,
}

impl GuardrailOutcome {
    pub fn from_results(results: Vec<GuardrailResult>, input_text: &str) -> Self {
        let has_tripwire = has_tripwire(&results);
        let safe_text = safe_text(&results, input_text);
        let fail_output = GuardrailFailReport::build(&results);
        let pass_output = PassOutput { safe_text: safe_text.clone() };
        Self { results, has_tripwire, safe_text, fail_output, pass_output }
    }
}
