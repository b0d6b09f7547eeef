use serde::{Deserialize, Serialize};

pub const PNG_MIME: &str = "image/png";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Base64-encoded image attached to a turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePart {
    pub data: String,
    pub mime: String,
}

impl ImagePart {
    pub fn png(data: String) -> Self {
        Self {
            data,
            mime: PNG_MIME.to_string(),
        }
    }

    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime, self.data)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChatMessagePart {
    Text { text: String },
    Image(ImagePart),
}

impl ChatMessagePart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            Self::Image(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub parts: Vec<ChatMessagePart>,
}

impl ChatMessage {
    pub fn user(parts: Vec<ChatMessagePart>) -> Self {
        Self {
            role: Role::User,
            parts,
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            parts: vec![ChatMessagePart::text(text)],
        }
    }

    /// Text parts joined by newlines.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(ChatMessagePart::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn image_count(&self) -> usize {
        self.parts
            .iter()
            .filter(|part| matches!(part, ChatMessagePart::Image(_)))
            .count()
    }
}
