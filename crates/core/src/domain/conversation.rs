use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    InputText { text: String },
    OutputText { text: String },
}

impl ContentPart {
    pub fn text(&self) -> &str {
        match self {
            Self::InputText { text } | Self::OutputText { text } => text,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageItem {
    pub role: Role,
    pub content: Vec<ContentPart>,
}

impl MessageItem {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self { role: Role::User, content: vec![ContentPart::InputText { text: text.into() }] }
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: vec![ContentPart::OutputText { text: text.into() }] }
    }

    /// All text parts joined with newlines.
    pub fn text(&self) -> String {
        self.content.iter().map(ContentPart::text).collect::<Vec<_>>().join("\n")
    }
}

/// Ordered message items for one run. Items are only ever appended, and
/// `input_text` parts may be rewritten in place by PII scrubbing.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationHistory(Vec<MessageItem>);

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_user_text(text: impl Into<String>) -> Self {
        Self(vec![MessageItem::user_text(text)])
    }

    pub fn push(&mut self, item: MessageItem) {
        self.0.push(item);
    }

    pub fn extend(&mut self, items: impl IntoIterator<Item = MessageItem>) {
        self.0.extend(items);
    }

    /// Drops every item after the first `len`.
    pub fn truncate(&mut self, len: usize) {
        self.0.truncate(len);
    }

    pub fn items(&self) -> &[MessageItem] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Mutable handles to every `input_text` part, in history order.
    pub fn input_texts_mut(&mut self) -> impl Iterator<Item = &mut String> {
        self.0.iter_mut().flat_map(|item| item.content.iter_mut()).filter_map(|part| match part {
            ContentPart::InputText { text } => Some(text),
            ContentPart::OutputText { .. } => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{ContentPart, ConversationHistory, MessageItem, Role};

    #[test]
    fn history_serializes_in_responses_input_shape() {
        let history = ConversationHistory::from_user_text("teach me chess");

        let value = serde_json::to_value(&history).expect("serialize history");

        assert_eq!(
            value,
            json!([{ "role": "user", "content": [{ "type": "input_text", "text": "teach me chess" }] }])
        );
    }

    #[test]
    fn input_texts_mut_skips_assistant_output() {
        let mut history = ConversationHistory::from_user_text("first");
        history.push(MessageItem::assistant_text("reply"));
        history.push(MessageItem {
            role: Role::User,
            content: vec![
                ContentPart::InputText { text: "second".to_string() },
                ContentPart::InputText { text: "third".to_string() },
            ],
        });

        for text in history.input_texts_mut() {
            text.make_ascii_uppercase();
        }

        let texts: Vec<String> = history.items().iter().map(MessageItem::text).collect();
        assert_eq!(texts, vec!["FIRST", "reply", "SECOND\nTHIRD"]);
    }
}
