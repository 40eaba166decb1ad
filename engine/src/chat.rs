//! Chat transcript messages.

use crate::{DataKind, SyncRecord, Timestamp};
use serde::{Deserialize, Serialize};

/// Id of the greeting the assistant opens every transcript with.
pub const WELCOME_GREETING_ID: &str = "greeting-initial-bot-message";

/// Text of the opening greeting.
pub const WELCOME_GREETING: &str = "Welcome to FitnessCoach! How can I help you today?";

/// Marker used to recognise a greeting regardless of its id.
const WELCOME_MARKER: &str = "Welcome to FitnessCoach";

/// Who wrote a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub text: String,
    pub sender: Sender,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Timestamp>,
}

impl ChatMessage {
    pub fn new(id: impl Into<String>, text: impl Into<String>, sender: Sender) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            sender,
            created_at: None,
        }
    }

    /// The fixed opening greeting.
    pub fn welcome() -> Self {
        Self::new(WELCOME_GREETING_ID, WELCOME_GREETING, Sender::Bot)
    }

    pub fn stamped(mut self, now: Timestamp) -> Self {
        self.created_at.get_or_insert(now);
        self
    }

    pub fn is_welcome(&self) -> bool {
        self.sender == Sender::Bot && self.text.contains(WELCOME_MARKER)
    }

    /// Role name used by chat-completion APIs.
    pub fn role(&self) -> &'static str {
        match self.sender {
            Sender::User => "user",
            Sender::Bot => "assistant",
        }
    }
}

impl SyncRecord for ChatMessage {
    const KIND: DataKind = DataKind::ChatLogs;
    type Key = String;

    fn identity_key(&self) -> String {
        self.id.clone()
    }

    /// Same id, or same text from the same sender, or two greetings.
    fn is_equivalent(&self, other: &Self) -> bool {
        self.id == other.id
            || (self.text == other.text && self.sender == other.sender)
            || (self.is_welcome() && other.is_welcome())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equivalent_by_id() {
        let a = ChatMessage::new("1", "hi", Sender::User);
        let b = ChatMessage::new("1", "edited", Sender::User);
        assert!(a.is_equivalent(&b));
    }

    #[test]
    fn equivalent_by_text_and_sender() {
        let a = ChatMessage::new("1", "How many sets?", Sender::User);
        let b = ChatMessage::new("2", "How many sets?", Sender::User);
        assert!(a.is_equivalent(&b));

        let c = ChatMessage::new("3", "How many sets?", Sender::Bot);
        assert!(!a.is_equivalent(&c));
    }

    #[test]
    fn greetings_with_different_ids_are_equivalent() {
        let local = ChatMessage::welcome();
        let remote = ChatMessage::new(
            "1706745600000",
            "Welcome to FitnessCoach! Ready to train?",
            Sender::Bot,
        );
        assert!(local.is_equivalent(&remote));
    }

    #[test]
    fn greeting_does_not_match_other_bot_messages() {
        let greeting = ChatMessage::welcome();
        let other = ChatMessage::new("7", "Try three sets of ten.", Sender::Bot);
        assert!(!greeting.is_equivalent(&other));
    }

    #[test]
    fn user_text_mentioning_greeting_is_not_a_greeting() {
        let msg = ChatMessage::new("9", "Welcome to FitnessCoach", Sender::User);
        assert!(!msg.is_welcome());
    }

    #[test]
    fn roles() {
        assert_eq!(ChatMessage::new("1", "a", Sender::User).role(), "user");
        assert_eq!(ChatMessage::welcome().role(), "assistant");
    }
}
