use crate::chat::message::{ChatMessage, ChatMessagePart, ImagePart, Role};

/// One line of the visible conversation. Kept apart from the request history
/// so that partial replies and failure notices never reach the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEntry {
    User { text: String, images: usize },
    Assistant { text: String, streaming: bool },
    Error { message: String },
    Notice { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    NewMessage,
    Merged,
    Empty,
}

/// Ordered multimodal history plus the conversation log shown to the user.
#[derive(Debug, Clone, Default)]
pub struct ChatSession {
    history: Vec<ChatMessage>,
    log: Vec<LogEntry>,
}

impl ChatSession {
    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn log(&self) -> &[LogEntry] {
        &self.log
    }

    /// Adds a user turn. Consecutive user sends with no reply in between are
    /// merged into one message.
    pub fn compose_turn(&mut self, text: Option<&str>, image: Option<ImagePart>) -> TurnOutcome {
        let text = text.filter(|t| !t.is_empty());
        let images = usize::from(image.is_some());
        let mut parts = Vec::with_capacity(2);
        if let Some(text) = text {
            parts.push(ChatMessagePart::text(text));
        }
        if let Some(image) = image {
            parts.push(ChatMessagePart::Image(image));
        }
        if parts.is_empty() {
            return TurnOutcome::Empty;
        }

        self.log.push(LogEntry::User {
            text: text.unwrap_or_default().to_string(),
            images,
        });

        match self.history.last_mut() {
            Some(last) if last.role == Role::User => {
                last.parts.extend(parts);
                TurnOutcome::Merged
            }
            _ => {
                self.history.push(ChatMessage::user(parts));
                TurnOutcome::NewMessage
            }
        }
    }

    pub fn commit_assistant(&mut self, full_text: &str) {
        self.history.push(ChatMessage::assistant(full_text));
        match self.log.last_mut() {
            Some(LogEntry::Assistant { text, streaming }) if *streaming => {
                *text = full_text.to_string();
                *streaming = false;
            }
            _ => self.log.push(LogEntry::Assistant {
                text: full_text.to_string(),
                streaming: false,
            }),
        }
    }

    /// Appends a chunk to the reply being displayed. The text is rendered
    /// raw; a markdown construct split across chunks shows unformatted until
    /// the full text lands.
    pub fn append_chunk(&mut self, chunk: &str) {
        match self.log.last_mut() {
            Some(LogEntry::Assistant { text, streaming }) if *streaming => text.push_str(chunk),
            _ => self.log.push(LogEntry::Assistant {
                text: chunk.to_string(),
                streaming: true,
            }),
        }
    }

    /// Keeps whatever partial reply was shown, stops it streaming, and logs
    /// the failure. The history gets no assistant entry, so the next user
    /// send merges into the unanswered turn and retries it.
    pub fn record_failure(&mut self, error: &str) {
        if let Some(LogEntry::Assistant { streaming, .. }) = self.log.last_mut() {
            *streaming = false;
        }
        self.log.push(LogEntry::Error {
            message: error.to_string(),
        });
    }

    pub fn note(&mut self, message: impl Into<String>) {
        self.log.push(LogEntry::Notice {
            message: message.into(),
        });
    }

    pub fn awaiting_reply(&self) -> bool {
        self.history
            .last()
            .is_some_and(|message| message.role == Role::User)
    }
}
