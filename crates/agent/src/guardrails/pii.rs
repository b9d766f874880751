use std::collections::BTreeMap;
use std::sync::LazyLock;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use regex::Regex;

use super::{GuardrailInfo, GuardrailResult, PiiConfig, PiiEntity};

static RE_CREDIT_CARD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\d{4}[-\s]?\d{4}[-\s]?\d{4}[-\s]?\d{4}\b").expect("credit card pattern")
});
static RE_SSN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").expect("ssn pattern"));
static RE_PASSPORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z]\d{8}\b").expect("passport pattern"));
static RE_BANK_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{8,17}\b").expect("bank number pattern"));
static RE_EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}").expect("email pattern")
});
static RE_PHONE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:\+?1[-.\s]?)?\(?\d{3}\)?[-.\s]\d{3}[-.\s]\d{4}\b").expect("phone pattern")
});
static RE_BASE64_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9+/]{12,}={0,2}").expect("base64 token pattern"));

/// Detection order. Earlier entities claim overlapping spans, so a card
/// number is never also counted as a bank number.
const PRIORITY: [PiiEntity; 6] = [
    PiiEntity::CreditCard,
    PiiEntity::UsSsn,
    PiiEntity::UsPassport,
    PiiEntity::UsBankNumber,
    PiiEntity::EmailAddress,
    PiiEntity::PhoneNumber,
];

fn pattern(entity: PiiEntity) -> &'static Regex {
    match entity {
        PiiEntity::CreditCard => &RE_CREDIT_CARD,
        PiiEntity::UsSsn => &RE_SSN,
        PiiEntity::UsPassport => &RE_PASSPORT,
        PiiEntity::UsBankNumber => &RE_BANK_NUMBER,
        PiiEntity::EmailAddress => &RE_EMAIL,
        PiiEntity::PhoneNumber => &RE_PHONE,
    }
}

pub(super) fn check(text: &str, config: &PiiConfig) -> GuardrailResult {
    let mut detected_entities: BTreeMap<PiiEntity, Vec<String>> = BTreeMap::new();
    let mut anonymized = mask_plain(text, &config.entities, &mut detected_entities);

    if config.detect_encoded_pii {
        anonymized = mask_encoded(&anonymized, &config.entities, &mut detected_entities);
    }

    let any_hit = detected_entities.values().any(|hits| !hits.is_empty());
    GuardrailResult::new(
        config.block && any_hit,
        GuardrailInfo::Pii { detected_entities, anonymized_text: anonymized },
    )
}

fn mask_plain(
    text: &str,
    entities: &[PiiEntity],
    detected: &mut BTreeMap<PiiEntity, Vec<String>>,
) -> String {
    let mut working = text.to_string();

    for entity in PRIORITY.into_iter().filter(|entity| entities.contains(entity)) {
        let regex = pattern(entity);
        let hits: Vec<String> =
            regex.find_iter(&working).map(|found| found.as_str().to_string()).collect();
        if hits.is_empty() {
            continue;
        }

        working = regex.replace_all(&working, entity.placeholder().as_str()).into_owned();
        detected.entry(entity).or_default().extend(hits);
    }

    working
}

/// Replaces base64 tokens whose decoded form contains a configured entity.
fn mask_encoded(
    text: &str,
    entities: &[PiiEntity],
    detected: &mut BTreeMap<PiiEntity, Vec<String>>,
) -> String {
    RE_BASE64_TOKEN
        .replace_all(text, |captures: &regex::Captures<'_>| {
            let token = &captures[0];
            let decoded = STANDARD
                .decode(token)
                .ok()
                .and_then(|bytes| String::from_utf8(bytes).ok());
            let Some(decoded) = decoded else {
                return token.to_string();
            };

            let mut nested = BTreeMap::new();
            mask_plain(&decoded, entities, &mut nested);
            let Some(first) = nested.keys().next().copied() else {
                return token.to_string();
            };

            for (entity, hits) in nested {
                detected.entry(entity).or_default().extend(hits);
            }
            first.placeholder()
        })
        .into_owned()
}
