use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use super::{GuardrailInfo, GuardrailResult, UrlFilterConfig};

static RE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(?:[a-z][a-z0-9+.\-]*://[^\s<>"']+|www\.[^\s<>"']+)"#)
        .expect("url pattern")
});

const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?', ')', ']', '}', '\'', '"'];

pub(super) fn check(text: &str, config: &UrlFilterConfig) -> GuardrailResult {
    let allow_list: Vec<String> =
        config.url_allow_list.iter().filter_map(|entry| allow_list_host(entry)).collect();

    let mut detected = Vec::new();
    let mut allowed = Vec::new();
    let mut blocked = Vec::new();
    let mut blocked_reasons = Vec::new();

    for found in RE_URL.find_iter(text) {
        let candidate = found.as_str().trim_end_matches(TRAILING_PUNCTUATION);
        if candidate.is_empty() || detected.iter().any(|seen| seen == candidate) {
            continue;
        }
        detected.push(candidate.to_string());

        match verdict(candidate, config, &allow_list) {
            None => allowed.push(candidate.to_string()),
            Some(reason) => {
                blocked.push(candidate.to_string());
                blocked_reasons.push(format!("{candidate}: {reason}"));
            }
        }
    }

    GuardrailResult::new(
        !blocked.is_empty(),
        GuardrailInfo::UrlFilter { detected, allowed, blocked, blocked_reasons },
    )
}

/// Returns the reason a URL is blocked, or `None` when it passes.
fn verdict(candidate: &str, config: &UrlFilterConfig, allow_list: &[String]) -> Option<String> {
    let normalized = if candidate.to_ascii_lowercase().starts_with("www.") {
        format!("https://{candidate}")
    } else {
        candidate.to_string()
    };

    let Ok(url) = Url::parse(&normalized) else {
        return Some("not a valid URL".to_string());
    };

    let scheme = url.scheme();
    if !config.allowed_schemes.iter().any(|allowed| allowed.eq_ignore_ascii_case(scheme)) {
        return Some(format!("scheme `{scheme}` is not allowed"));
    }

    if config.block_userinfo && (!url.username().is_empty() || url.password().is_some()) {
        return Some("embedded credentials are not allowed".to_string());
    }

    let Some(host) = url.host_str().map(str::to_ascii_lowercase) else {
        return Some("URL has no host".to_string());
    };

    let permitted = allow_list.iter().any(|entry| {
        host == *entry || (config.allow_subdomains && host.ends_with(&format!(".{entry}")))
    });
    if permitted {
        None
    } else {
        Some(format!("host `{host}` is not in the allow list"))
    }
}

/// Allow-list entries may be bare domains or full URLs.
fn allow_list_host(entry: &str) -> Option<String> {
    let entry = entry.trim();
    if entry.is_empty() {
        return None;
    }

    if entry.contains("://") {
        return Url::parse(entry).ok()?.host_str().map(str::to_ascii_lowercase);
    }

    let host = entry.split(['/', '?', '#']).next().unwrap_or(entry);
    let host = host.split(':').next().unwrap_or(host);
    Some(host.to_ascii_lowercase())
}
