use serde::{Deserialize, Serialize};

/// Input handed to one workflow run.
///
/// `input_as_text` drives the run. `input_text` is an optional secondary
/// field that is scrubbed alongside it when present and skipped otherwise.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowInput {
    pub input_as_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_text: Option<String>,
}

impl WorkflowInput {
    pub fn new(input_as_text: impl Into<String>) -> Self {
        Self { input_as_text: input_as_text.into(), input_text: None }
    }

    /// The declared text fields subject to PII scrubbing, in declaration order.
    pub fn text_fields_mut(&mut self) -> impl Iterator<Item = &mut String> {
        std::iter::once(&mut self.input_as_text).chain(self.input_text.as_mut())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub output_text: String,
}

#[cfg(test)]
mod tests {
    use super::WorkflowInput;

    #[test]
    fn absent_secondary_field_is_not_visited() {
        let mut input = WorkflowInput::new("hello");
        assert_eq!(input.text_fields_mut().count(), 1);

        input.input_text = Some("secondary".to_string());
        let fields: Vec<String> = input.text_fields_mut().map(|field| field.clone()).collect();
        assert_eq!(fields, vec!["hello", "secondary"]);
    }
}
