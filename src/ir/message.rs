//! Messages and content blocks.

use serde::{Deserialize, Serialize};

/// Role of a message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

impl Message {
    /// Plain-text message with the given role.
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: MessageContent::Text(text.into()),
        }
    }

    /// Concatenated text of all textual content in this message.
    pub fn text_content(&self) -> String {
        match &self.content {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(""),
        }
    }
}

/// Message content: either a plain string or an ordered sequence of typed
/// blocks. Multimodal and tool-augmented conversations use the block form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

/// A typed content block within a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Image {
        source: ImageSource,
    },
    ToolCall {
        id: String,
        name: String,
        arguments: serde_json::Value,
    },
    ToolResult {
        tool_call_id: String,
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
}

/// Image payload: a URL or inline base64 data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ImageSource {
    Url { url: String },
    Base64 { media_type: String, data: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_content_from_plain_string() {
        let msg = Message::text(Role::User, "hello");
        assert_eq!(msg.text_content(), "hello");
    }

    #[test]
    fn text_content_joins_text_blocks_and_skips_others() {
        let msg = Message {
            role: Role::Assistant,
            content: MessageContent::Blocks(vec![
                ContentBlock::Text {
                    text: "a".to_string(),
                },
                ContentBlock::ToolCall {
                    id: "call_1".to_string(),
                    name: "lookup".to_string(),
                    arguments: serde_json::json!({}),
                },
                ContentBlock::Text {
                    text: "b".to_string(),
                },
            ]),
        };
        assert_eq!(msg.text_content(), "ab");
    }

    #[test]
    fn content_serializes_untagged() {
        let plain = serde_json::to_value(MessageContent::Text("hi".to_string())).unwrap();
        assert_eq!(plain, serde_json::json!("hi"));

        let blocks = serde_json::to_value(MessageContent::Blocks(vec![ContentBlock::Text {
            text: "hi".to_string(),
        }]))
        .unwrap();
        assert_eq!(blocks, serde_json::json!([{"type": "text", "text": "hi"}]));
    }
}
