use serde::{Deserialize, Serialize};

use super::{GuardrailInfo, GuardrailKind, GuardrailResult, GuardrailResults};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PiiReport {
    pub failed: bool,
    pub detected_counts: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModerationReport {
    pub failed: bool,
    pub flagged_categories: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckReport {
    pub failed: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HallucinationReport {
    pub failed: bool,
    pub reasoning: Option<String>,
    pub hallucination_type: Option<String>,
    pub hallucinated_statements: Vec<String>,
    pub verified_statements: Vec<String>,
}

/// Blocked-output payload. Every check has an entry; checks that did not
/// run report the neutral `failed: false` record.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardrailFailReport {
    pub pii: PiiReport,
    pub moderation: ModerationReport,
    pub jailbreak: CheckReport,
    pub hallucination: HallucinationReport,
    pub nsfw: CheckReport,
    pub url_filter: CheckReport,
    pub custom_prompt_check: CheckReport,
    pub prompt_injection: CheckReport,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassOutput {
    pub safe_text: String,
}

impl GuardrailFailReport {
    pub fn build(results: &[GuardrailResult]) -> Self {
        let index = GuardrailResults::index(results);
        let tripped = |kind| CheckReport {
            failed: index.get(kind).is_some_and(|result| result.tripwire_triggered),
        };

        Self {
            pii: pii_report(index.get(GuardrailKind::Pii)),
            moderation: moderation_report(index.get(GuardrailKind::Moderation)),
            jailbreak: tripped(GuardrailKind::Jailbreak),
            hallucination: hallucination_report(index.get(GuardrailKind::HallucinationDetection)),
            nsfw: tripped(GuardrailKind::Nsfw),
            url_filter: tripped(GuardrailKind::UrlFilter),
            custom_prompt_check: tripped(GuardrailKind::CustomPromptCheck),
            prompt_injection: tripped(GuardrailKind::PromptInjection),
        }
    }
}

fn pii_report(result: Option<&GuardrailResult>) -> PiiReport {
    let Some(result) = result else {
        return PiiReport::default();
    };

    let detected_counts: Vec<String> = match &result.info {
        GuardrailInfo::Pii { detected_entities, .. } => detected_entities
            .iter()
            .filter(|(_, hits)| !hits.is_empty())
            .map(|(entity, hits)| format!("{}:{}", entity.as_str(), hits.len()))
            .collect(),
        _ => Vec::new(),
    };

    PiiReport { failed: !detected_counts.is_empty() || result.tripwire_triggered, detected_counts }
}

fn moderation_report(result: Option<&GuardrailResult>) -> ModerationReport {
    let Some(result) = result else {
        return ModerationReport::default();
    };

    let flagged_categories = match &result.info {
        GuardrailInfo::Moderation { flagged_categories } => flagged_categories.clone(),
        _ => Vec::new(),
    };

    ModerationReport {
        failed: result.tripwire_triggered || !flagged_categories.is_empty(),
        flagged_categories,
    }
}

fn hallucination_report(result: Option<&GuardrailResult>) -> HallucinationReport {
    let Some(result) = result else {
        return HallucinationReport::default();
    };

    match &result.info {
        GuardrailInfo::Hallucination {
            reasoning,
            hallucination_type,
            hallucinated_statements,
            verified_statements,
            ..
        } => HallucinationReport {
            failed: result.tripwire_triggered,
            reasoning: Some(reasoning.clone()),
            hallucination_type: hallucination_type.clone(),
            hallucinated_statements: hallucinated_statements.clone(),
            verified_statements: verified_statements.clone(),
        },
        _ => HallucinationReport { failed: result.tripwire_triggered, ..HallucinationReport::default() },
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::json;

    use super::GuardrailFailReport;
    use crate::guardrails::{GuardrailInfo, GuardrailKind, GuardrailResult, PiiEntity};

    fn classifier(kind: GuardrailKind, tripped: bool) -> GuardrailResult {
        GuardrailResult::new(
            tripped,
            GuardrailInfo::Classifier { kind, flagged: tripped, confidence: 0.9 },
        )
    }

    #[test]
    fn empty_results_yield_neutral_report_with_every_field() {
        let report = GuardrailFailReport::build(&[]);
        let value = serde_json::to_value(&report).expect("serialize report");

        assert_eq!(
            value,
            json!({
                "pii": { "failed": false, "detected_counts": [] },
                "moderation": { "failed": false, "flagged_categories": [] },
                "jailbreak": { "failed": false },
                "hallucination": {
                    "failed": false,
                    "reasoning": null,
                    "hallucination_type": null,
                    "hallucinated_statements": [],
                    "verified_statements": []
                },
                "nsfw": { "failed": false },
                "url_filter": { "failed": false },
                "custom_prompt_check": { "failed": false },
                "prompt_injection": { "failed": false }
            })
        );
    }

    #[test]
    fn moderation_trip_reports_flagged_categories() {
        let results = vec![
            GuardrailResult::new(
                false,
                GuardrailInfo::Pii {
                    detected_entities: BTreeMap::new(),
                    anonymized_text: "text".to_string(),
                },
            ),
            GuardrailResult::new(
                true,
                GuardrailInfo::Moderation { flagged_categories: vec!["violence/graphic".to_string()] },
            ),
            classifier(GuardrailKind::Jailbreak, false),
        ];

        let report = GuardrailFailReport::build(&results);

        assert!(report.moderation.failed);
        assert_eq!(report.moderation.flagged_categories, vec!["violence/graphic"]);
        assert!(!report.pii.failed);
        assert!(report.pii.detected_counts.is_empty());
        assert!(!report.jailbreak.failed);
    }

    #[test]
    fn pii_counts_only_entities_with_hits() {
        let mut detected_entities = BTreeMap::new();
        detected_entities.insert(
            PiiEntity::UsSsn,
            vec!["123-45-6789".to_string(), "987-65-4321".to_string()],
        );
        detected_entities.insert(PiiEntity::CreditCard, Vec::new());
        let results = vec![GuardrailResult::new(
            false,
            GuardrailInfo::Pii { detected_entities, anonymized_text: String::new() },
        )];

        let report = GuardrailFailReport::build(&results);

        assert!(report.pii.failed);
        assert_eq!(report.pii.detected_counts, vec!["US_SSN:2"]);
    }

    #[test]
    fn tripwire_only_checks_follow_their_flag() {
        let results = vec![
            classifier(GuardrailKind::PromptInjection, true),
            classifier(GuardrailKind::CustomPromptCheck, false),
            GuardrailResult::new(
                true,
                GuardrailInfo::UrlFilter {
                    detected: vec!["http://example.com".to_string()],
                    allowed: Vec::new(),
                    blocked: vec!["http://example.com".to_string()],
                    blocked_reasons: vec!["scheme `http` is not allowed".to_string()],
                },
            ),
        ];

        let report = GuardrailFailReport::build(&results);

        assert!(report.prompt_injection.failed);
        assert!(report.url_filter.failed);
        assert!(!report.custom_prompt_check.failed);
        assert!(!report.nsfw.failed);
    }

    #[test]
    fn hallucination_details_are_carried_over() {
        let results = vec![GuardrailResult::new(
            true,
            GuardrailInfo::Hallucination {
                flagged: true,
                confidence: 0.88,
                reasoning: "claims a wrong date".to_string(),
                hallucination_type: Some("factual_error".to_string()),
                hallucinated_statements: vec!["The war ended in 1950".to_string()],
                verified_statements: vec!["It started in 1939".to_string()],
            },
        )];

        let report = GuardrailFailReport::build(&results);

        assert!(report.hallucination.failed);
        assert_eq!(report.hallucination.reasoning.as_deref(), Some("claims a wrong date"));
        assert_eq!(report.hallucination.hallucination_type.as_deref(), Some("factual_error"));
        assert_eq!(report.hallucination.hallucinated_statements.len(), 1);
        assert_eq!(report.hallucination.verified_statements.len(), 1);
    }

    #[test]
    fn errored_check_does_not_fail_report() {
        let results = vec![GuardrailResult::errored(GuardrailKind::Moderation, "503 from upstream")];
        let report = GuardrailFailReport::build(&results);
        assert!(!report.moderation.failed);
    }
}
