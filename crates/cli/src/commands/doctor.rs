use serde::Serialize;
use tutor_agent::guardrails::GuardrailConfig;
use tutor_core::config::{AppConfig, LoadOptions};

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
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
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
            checks.push(check_credential(&config));
            checks.push(check_guardrails(&config));
            checks.push(check_public_dir(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["credential_readiness", "guardrail_config", "public_dir"] {
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

fn check_credential(config: &AppConfig) -> DoctorCheck {
    match config.resolve_api_key(None) {
        Ok(_) => DoctorCheck {
            name: "credential_readiness",
            status: CheckStatus::Pass,
            details: "OpenAI API key configured".to_string(),
        },
        Err(error) => DoctorCheck {
            name: "credential_readiness",
            status: CheckStatus::Fail,
            details: format!("{error} Requests may still supply apiKey."),
        },
    }
}

fn check_guardrails(config: &AppConfig) -> DoctorCheck {
    let guardrails = GuardrailConfig::tutor_default(&config.guardrails);
    let names: Vec<&str> =
        guardrails.guardrails.iter().map(|definition| definition.kind().name()).collect();
    let pii_mode = if guardrails.pii_masking().is_some() { "mask" } else { "block" };

    DoctorCheck {
        name: "guardrail_config",
        status: CheckStatus::Pass,
        details: format!(
            "{} checks ({}); pii mode {pii_mode}; model `{}` at threshold {}",
            names.len(),
            names.join(", "),
            config.guardrails.model,
            config.guardrails.confidence_threshold
        ),
    }
}

fn check_public_dir(config: &AppConfig) -> DoctorCheck {
    let dir = &config.server.public_dir;
    if dir.is_dir() {
        DoctorCheck {
            name: "public_dir",
            status: CheckStatus::Pass,
            details: format!("serving static files from `{}`", dir.display()),
        }
    } else {
        DoctorCheck {
            name: "public_dir",
            status: CheckStatus::Fail,
            details: format!("`{}` is not a directory; web interface will 404", dir.display()),
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

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
