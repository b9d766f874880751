use thiserror::Error;

/// Failures a workflow run can end in. A guardrail trip is not one of them.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Configuration(String),
    #[error("agent result error: {0}")]
    AgentResult(String),
    #[error("upstream failure: {0}")]
    Upstream(String),
}

impl WorkflowError {
    pub fn upstream(error: impl std::fmt::Display) -> Self {
        Self::Upstream(format!("{error:#}"))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Configuration(_) => "configuration",
            Self::AgentResult(_) => "agent_result",
            Self::Upstream(_) => "upstream",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("internal error: {details}")]
    Internal { details: String, correlation_id: String },
}

impl InterfaceError {
    /// Text for the `error` field of the response body.
    pub fn user_message(&self) -> &str {
        match self {
            Self::BadRequest { message, .. } => message,
            Self::Internal { .. } => "Failed to process your request",
        }
    }

    pub fn details(&self) -> Option<&str> {
        match self {
            Self::BadRequest { .. } => None,
            Self::Internal { details, .. } => Some(details),
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. } | Self::Internal { correlation_id, .. } => {
                correlation_id
            }
        }
    }
}

impl WorkflowError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<WorkflowError> for InterfaceError {
    fn from(value: WorkflowError) -> Self {
        match value {
            WorkflowError::Validation(message) | WorkflowError::Configuration(message) => {
                Self::BadRequest { message, correlation_id: "unassigned".to_owned() }
            }
            error @ (WorkflowError::AgentResult(_) | WorkflowError::Upstream(_)) => {
                Self::Internal { details: error.to_string(), correlation_id: "unassigned".to_owned() }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::{InterfaceError, WorkflowError};

    #[test]
    fn validation_error_maps_to_bad_request_with_its_message() {
        let interface =
            WorkflowError::Validation("Message is required".to_owned()).into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest { ref correlation_id, .. } if correlation_id == "req-1"
        ));
        assert_eq!(interface.user_message(), "Message is required");
        assert_eq!(interface.details(), None);
    }

    #[test]
    fn configuration_error_maps_to_bad_request() {
        let interface =
            WorkflowError::Configuration("api key missing".to_owned()).into_interface("req-2");

        assert!(matches!(interface, InterfaceError::BadRequest { .. }));
        assert_eq!(interface.user_message(), "api key missing");
    }

    #[test]
    fn agent_result_error_maps_to_internal_with_details() {
        let interface = WorkflowError::AgentResult("Agent result is undefined".to_owned())
            .into_interface("req-3");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert_eq!(interface.user_message(), "Failed to process your request");
        assert_eq!(interface.details(), Some("agent result error: Agent result is undefined"));
        assert_eq!(interface.correlation_id(), "req-3");
    }

    #[test]
    fn upstream_error_keeps_context_chain() {
        let source = std::io::Error::new(std::io::ErrorKind::TimedOut, "guardrail call timed out");
        let error = WorkflowError::upstream(source);

        assert_eq!(error.kind(), "upstream");
        assert!(error.to_string().contains("guardrail call timed out"));
    }
}
