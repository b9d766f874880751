use std::sync::Arc;

use secrecy::SecretString;
use tutor_core::config::OpenAiConfig;
use tutor_core::WorkflowError;

use crate::guardrails::{GuardrailContext, HostedGuardrailService};
use crate::openai::OpenAiClient;
use crate::workflow::WorkflowDeps;

/// Builds the collaborators for one workflow run from a resolved credential.
pub trait BackendFactory: Send + Sync {
    fn connect(&self, api_key: &SecretString) -> Result<WorkflowDeps, WorkflowError>;
}

#[derive(Clone, Debug)]
pub struct OpenAiBackend {
    config: OpenAiConfig,
}

impl OpenAiBackend {
    pub fn new(config: OpenAiConfig) -> Self {
        Self { config }
    }
}

impl BackendFactory for OpenAiBackend {
    fn connect(&self, api_key: &SecretString) -> Result<WorkflowDeps, WorkflowError> {
        let client = Arc::new(
            OpenAiClient::new(&self.config, api_key.clone()).map_err(WorkflowError::upstream)?,
        );

        Ok(WorkflowDeps {
            guardrails: Arc::new(HostedGuardrailService::new()),
            agent_runtime: client.clone(),
            context: GuardrailContext { guardrail_llm: client.clone(), moderation: client },
        })
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;
    use tutor_core::config::AppConfig;

    use super::{BackendFactory, OpenAiBackend};

    #[test]
    fn openai_backend_connects_without_network() {
        let backend = OpenAiBackend::new(AppConfig::default().openai);
        let deps = backend.connect(&SecretString::from("sk-test".to_string()));
        assert!(deps.is_ok());
    }
}
