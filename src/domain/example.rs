// ============================================================
// Layer 3 — Chat-Style Example Types
// ============================================================
// A FormattedExample is one image plus the conversation the
// model is trained on:
//
//   user:      [image] + classification prompt
//   assistant: target answer              (training only)
//
// The structure mirrors the multimodal "messages" layout that
// chat templates iterate over, so it can be handed to the
// template engine as-is after serialisation.
//
// Reference: Rust Book §6 (Enums), serde documentation

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One piece of a turn's content.
/// Serialised with a `type` tag: `{"type": "image"}` or
/// `{"type": "text", "text": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentPart {
    /// Placeholder marking where the image goes in the prompt
    Image,
    Text { text: String },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role:    Role,
    pub content: Vec<ContentPart>,
}

impl ChatTurn {
    pub fn user(content: Vec<ContentPart>) -> Self {
        Self { role: Role::User, content }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role:    Role::Assistant,
            content: vec![ContentPart::text(text)],
        }
    }
}

/// A record converted into a chat-style example.
/// Label indices are kept alongside the messages so evaluation
/// code can compare predictions without re-parsing the target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormattedExample {
    pub image_path: PathBuf,
    pub focus_idx:  usize,
    pub zoom_idx:   usize,
    pub type_idx:   usize,
    pub messages:   Vec<ChatTurn>,
}

impl FormattedExample {
    /// True when the example carries an assistant target
    pub fn has_target(&self) -> bool {
        self.messages.iter().any(|m| m.role == Role::Assistant)
    }

    /// Text of the assistant turn, if any
    pub fn target_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|m| m.role == Role::Assistant)
            .and_then(|m| {
                m.content.iter().find_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::Image => None,
                })
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_part_serialisation() {
        let parts = vec![ContentPart::Image, ContentPart::text("hi")];
        let json = serde_json::to_string(&parts).unwrap();
        assert_eq!(json, r#"[{"type":"image"},{"type":"text","text":"hi"}]"#);
    }

    #[test]
    fn test_target_text() {
        let ex = FormattedExample {
            image_path: PathBuf::from("a.jpg"),
            focus_idx:  0,
            zoom_idx:   0,
            type_idx:   0,
            messages:   vec![
                ChatTurn::user(vec![ContentPart::Image, ContentPart::text("prompt")]),
                ChatTurn::assistant("answer"),
            ],
        };
        assert!(ex.has_target());
        assert_eq!(ex.target_text(), Some("answer"));
    }
}
