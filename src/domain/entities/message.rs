use chrono::{DateTime, Utc};

use super::Sender;

/// Message content
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    Command { name: String, args: Vec<String> },
    /// Inline keyboard button press
    Callback(String),
    Text(String),
}

impl Content {
    pub fn text(&self) -> Option<&str> {
        match self {
            Content::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_command(&self) -> bool {
        matches!(self, Content::Command { .. })
    }
}

/// Platform-neutral incoming event
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub chat_id: i64,
    /// Message the event refers to; the one to edit for callbacks
    pub message_id: Option<i64>,
    /// Set for callback queries, which must be answered
    pub callback_id: Option<String>,
    pub sender: Sender,
    pub content: Content,
    pub timestamp: DateTime<Utc>,
}

impl IncomingMessage {
    pub fn new(chat_id: i64, sender: Sender, content: Content) -> Self {
        Self {
            chat_id,
            message_id: None,
            callback_id: None,
            sender,
            content,
            timestamp: Utc::now(),
        }
    }

    pub fn with_message_id(mut self, id: i64) -> Self {
        self.message_id = Some(id);
        self
    }

    pub fn with_callback_id(mut self, id: impl Into<String>) -> Self {
        self.callback_id = Some(id.into());
        self
    }

    pub fn is_callback(&self) -> bool {
        self.callback_id.is_some()
    }
}
