use serde::Serialize;
use serde_json::Value;
use tutor_core::config::SearchContextSize;

/// Coarse location hint for web search. Every field is optional.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct UserLocation {
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

impl UserLocation {
    pub fn approximate() -> Self {
        Self { kind: "approximate", ..Self::default() }
    }
}

/// Tools executed by the model provider rather than locally.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostedTool {
    WebSearchPreview { user_location: UserLocation, search_context_size: SearchContextSize },
}

impl HostedTool {
    pub fn web_search(search_context_size: SearchContextSize) -> Self {
        Self::WebSearchPreview { user_location: UserLocation::approximate(), search_context_size }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::WebSearchPreview { .. } => "web_search_preview",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ToolSet {
    tools: Vec<HostedTool>,
}

impl ToolSet {
    /// Adds a tool. A tool with the same name replaces the earlier one.
    pub fn register(&mut self, tool: HostedTool) {
        self.tools.retain(|existing| existing.name() != tool.name());
        self.tools.push(tool);
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HostedTool> {
        self.tools.iter()
    }

    /// The `tools` array of a Responses API request.
    pub fn to_request_json(&self) -> Value {
        Value::Array(
            self.tools.iter().filter_map(|tool| serde_json::to_value(tool).ok()).collect(),
        )
    }
}
