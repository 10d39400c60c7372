//! In-memory conversation log
//!
//! Append-only, process-lifetime only. Shared between the voice loop and the
//! text-submit path; rendering is the embedding application's concern.

use std::sync::{Arc, Mutex};

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sender {
    User,
    Bot,
}

/// One entry in the conversation log
#[derive(Debug, Clone)]
pub struct ConversationMessage {
    pub sender: Sender,
    pub text: String,
}

/// Append-only ordered conversation log
#[derive(Debug, Default)]
pub struct Transcript {
    messages: Vec<ConversationMessage>,
}

/// Transcript handle shared between the voice loop and the text path
pub type SharedTranscript = Arc<Mutex<Transcript>>;

impl Transcript {
    /// Create an empty transcript
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a shareable empty transcript
    #[must_use]
    pub fn shared() -> SharedTranscript {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Append a user message
    pub fn push_user(&mut self, text: impl Into<String>) {
        self.messages.push(ConversationMessage {
            sender: Sender::User,
            text: text.into(),
        });
    }

    /// Append a bot message
    pub fn push_bot(&mut self, text: impl Into<String>) {
        self.messages.push(ConversationMessage {
            sender: Sender::Bot,
            text: text.into(),
        });
    }

    /// Append to the text of the most recent bot message, or start one if the
    /// log is empty or ends with a user message. Used by the streaming text
    /// path to grow a single reply in place.
    pub fn append_bot(&mut self, chunk: &str) {
        match self.messages.last_mut() {
            Some(msg) if msg.sender == Sender::Bot => msg.text.push_str(chunk),
            _ => self.push_bot(chunk),
        }
    }

    /// All messages, oldest first
    #[must_use]
    pub fn messages(&self) -> &[ConversationMessage] {
        &self.messages
    }

    /// Number of messages
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the log is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_is_ordered() {
        let mut transcript = Transcript::new();
        transcript.push_user("hello");
        transcript.push_bot("hi there");

        let messages = transcript.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].sender, Sender::User);
        assert_eq!(messages[1].sender, Sender::Bot);
        assert_eq!(messages[1].text, "hi there");
    }

    #[test]
    fn append_bot_grows_last_reply() {
        let mut transcript = Transcript::new();
        transcript.push_user("question");
        transcript.append_bot("first ");
        transcript.append_bot("second");

        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript.messages()[1].text, "first second");
    }

    #[test]
    fn append_bot_starts_fresh_after_user() {
        let mut transcript = Transcript::new();
        transcript.append_bot("a");
        transcript.push_user("b");
        transcript.append_bot("c");

        assert_eq!(transcript.len(), 3);
    }
}
