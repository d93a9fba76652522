//! Append-only conversation log.
//!
//! Insertion order is chronological and significant: the current
//! highlight is always derived from the most recent assistant turn.

use serde::Serialize;

use crate::models::{AnswerResult, Message};

/// Ordered, append-only sequence of [`Message`]s.
///
/// `append` is the only mutator. The index of the newest assistant turn is
/// cached on append so [`History::last_assistant_message`] does not rescan.
#[derive(Debug, Clone, Default, Serialize)]
pub struct History {
    messages: Vec<Message>,
    #[serde(skip)]
    last_assistant: Option<usize>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, message: Message) {
        if matches!(message, Message::Assistant { .. }) {
            self.last_assistant = Some(self.messages.len());
        }
        self.messages.push(message);
    }

    /// The newest assistant answer, if any turn has been answered yet.
    pub fn last_assistant_message(&self) -> Option<&AnswerResult> {
        self.last_assistant
            .and_then(|idx| self.messages.get(idx))
            .and_then(Message::as_assistant)
    }

    /// Backward linear scan; same answer as
    /// [`last_assistant_message`](Self::last_assistant_message) without the cache.
    pub fn scan_last_assistant(&self) -> Option<&AnswerResult> {
        self.messages.iter().rev().find_map(Message::as_assistant)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl<'a> IntoIterator for &'a History {
    type Item = &'a Message;
    type IntoIter = std::slice::Iter<'a, Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.iter()
    }
}
