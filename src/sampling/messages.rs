//! Conversation types exchanged with the sampling loop
//!
//! Messages follow the Messages API wire shape: a role plus either a plain
//! string or a list of typed content blocks.

use serde::{Deserialize, Serialize};

/// Who authored a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A single conversation turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(content.into()),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Text(content.into()),
        }
    }

    pub fn assistant_blocks(blocks: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Blocks(blocks),
        }
    }

    /// Tool results travel back to the model as a user turn
    pub fn tool_results(blocks: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Blocks(blocks),
        }
    }

    /// Concatenated text of the turn, ignoring non-text blocks
    pub fn text(&self) -> String {
        match &self.content {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// Tool invocations requested in this turn as `(id, name, input)`
    pub fn tool_uses(&self) -> Vec<(String, String, serde_json::Value)> {
        match &self.content {
            MessageContent::Text(_) => Vec::new(),
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::ToolUse { id, name, input } => {
                        Some((id.clone(), name.clone(), input.clone()))
                    }
                    _ => None,
                })
                .collect(),
        }
    }
}

/// Message body: a bare string or structured blocks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Image {
        source: ImageSource,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        #[serde(default)]
        content: Vec<ContentBlock>,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
    /// Block type this client does not model (e.g. `thinking`)
    #[serde(other)]
    Unknown,
}

impl ContentBlock {
    pub fn is_unknown(&self) -> bool {
        matches!(self, ContentBlock::Unknown)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSource {
    #[serde(rename = "type")]
    pub source_type: String, // Always "base64"
    pub media_type: String,
    pub data: String,
}

impl ImageSource {
    pub fn png_base64(data: impl Into<String>) -> Self {
        Self {
            source_type: "base64".to_string(),
            media_type: "image/png".to_string(),
            data: data.into(),
        }
    }
}

/// Result payload of one tool invocation, as stored in the tool ledger
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base64_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
}

impl ToolOutput {
    pub fn output(text: impl Into<String>) -> Self {
        Self {
            output: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            error: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.as_deref().is_some_and(|e| !e.is_empty())
    }

    /// Convert into the `tool_result` block returned to the model
    pub fn to_result_block(&self, tool_use_id: &str) -> ContentBlock {
        let mut content = Vec::new();
        if self.is_error() {
            let error = self.error.clone().unwrap_or_default();
            content.push(ContentBlock::Text {
                text: self.with_system_prefix(error),
            });
        } else {
            if let Some(output) = self.output.as_ref().filter(|o| !o.is_empty()) {
                content.push(ContentBlock::Text {
                    text: self.with_system_prefix(output.clone()),
                });
            }
            if let Some(image) = &self.base64_image {
                content.push(ContentBlock::Image {
                    source: ImageSource::png_base64(image.clone()),
                });
            }
        }
        ContentBlock::ToolResult {
            tool_use_id: tool_use_id.to_string(),
            content,
            is_error: self.is_error(),
        }
    }

    fn with_system_prefix(&self, text: String) -> String {
        match &self.system {
            Some(system) => format!("<system>{}</system>\n{}", system, text),
            None => text,
        }
    }
}

/// Strip all but the `keep` most recent images from tool results, oldest first
pub fn retain_recent_images(messages: &mut [Message], keep: usize) {
    let total: usize = messages.iter().map(tool_result_image_count).sum();
    let mut to_remove = total.saturating_sub(keep);
    if to_remove == 0 {
        return;
    }

    for message in messages.iter_mut() {
        let MessageContent::Blocks(blocks) = &mut message.content else {
            continue;
        };
        for block in blocks.iter_mut() {
            let ContentBlock::ToolResult { content, .. } = block else {
                continue;
            };
            content.retain(|inner| {
                if to_remove > 0 && matches!(inner, ContentBlock::Image { .. }) {
                    to_remove -= 1;
                    false
                } else {
                    true
                }
            });
        }
        if to_remove == 0 {
            break;
        }
    }
}

fn tool_result_image_count(message: &Message) -> usize {
    let MessageContent::Blocks(blocks) = &message.content else {
        return 0;
    };
    blocks
        .iter()
        .map(|block| match block {
            ContentBlock::ToolResult { content, .. } => content
                .iter()
                .filter(|inner| matches!(inner, ContentBlock::Image { .. }))
                .count(),
            _ => 0,
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn screenshot_result(id: &str) -> Message {
        Message::tool_results(vec![ToolOutput {
            output: Some("took screenshot".to_string()),
            base64_image: Some(format!("img-{}", id)),
            ..ToolOutput::default()
        }
        .to_result_block(id)])
    }

    fn image_ids(messages: &[Message]) -> Vec<String> {
        let mut ids = Vec::new();
        for message in messages {
            if let MessageContent::Blocks(blocks) = &message.content {
                for block in blocks {
                    if let ContentBlock::ToolResult { content, .. } = block {
                        for inner in content {
                            if let ContentBlock::Image { source } = inner {
                                ids.push(source.data.clone());
                            }
                        }
                    }
                }
            }
        }
        ids
    }

    #[test]
    fn test_unmodelled_block_types_parse() {
        let blocks: Vec<ContentBlock> = serde_json::from_value(serde_json::json!([
            {"type": "thinking", "thinking": "hmm", "signature": "sig"},
            {"type": "text", "text": "done"}
        ]))
        .unwrap();

        assert!(blocks[0].is_unknown());
        assert_eq!(blocks[1], ContentBlock::Text { text: "done".to_string() });
    }

    #[test]
    fn test_user_message_serializes_as_plain_string() {
        let json = serde_json::to_value(Message::user("hello")).unwrap();
        assert_eq!(json, serde_json::json!({"role": "user", "content": "hello"}));
    }

    #[test]
    fn test_block_content_parses_tool_use() {
        let message: Message = serde_json::from_value(serde_json::json!({
            "role": "assistant",
            "content": [
                {"type": "text", "text": "Let me check."},
                {"type": "tool_use", "id": "toolu_1", "name": "bash", "input": {"command": "ls"}}
            ]
        }))
        .unwrap();

        assert_eq!(message.text(), "Let me check.");
        let uses = message.tool_uses();
        assert_eq!(uses.len(), 1);
        assert_eq!(uses[0].0, "toolu_1");
        assert_eq!(uses[0].2["command"], "ls");
    }

    #[test]
    fn test_error_result_block_is_flagged() {
        let block = ToolOutput::error("command not found").to_result_block("toolu_9");
        match block {
            ContentBlock::ToolResult { tool_use_id, content, is_error } => {
                assert_eq!(tool_use_id, "toolu_9");
                assert!(is_error);
                assert_eq!(
                    content,
                    vec![ContentBlock::Text { text: "command not found".to_string() }]
                );
            }
            other => panic!("unexpected block: {:?}", other),
        }
    }

    #[test]
    fn test_system_note_prefixes_output() {
        let output = ToolOutput {
            output: Some("done".to_string()),
            system: Some("tool restarted".to_string()),
            ..ToolOutput::default()
        };
        let ContentBlock::ToolResult { content, .. } = output.to_result_block("t") else {
            panic!("expected tool result");
        };
        assert_eq!(
            content[0],
            ContentBlock::Text { text: "<system>tool restarted</system>\ndone".to_string() }
        );
    }

    #[test]
    fn test_retain_recent_images_drops_oldest() {
        let mut messages = vec![
            Message::user("go"),
            screenshot_result("a"),
            screenshot_result("b"),
            screenshot_result("c"),
        ];

        retain_recent_images(&mut messages, 2);

        assert_eq!(image_ids(&messages), vec!["img-b", "img-c"]);
        // Text beside the dropped image survives
        let MessageContent::Blocks(blocks) = &messages[1].content else {
            panic!("expected blocks");
        };
        let ContentBlock::ToolResult { content, .. } = &blocks[0] else {
            panic!("expected tool result");
        };
        assert_eq!(content.len(), 1);
    }

    #[test]
    fn test_retain_recent_images_noop_under_limit() {
        let mut messages = vec![screenshot_result("a")];
        let before = messages.clone();
        retain_recent_images(&mut messages, 3);
        assert_eq!(messages, before);
    }
}
