use hrconnect_core::{now_display, Message};

/// Ordered transcript of the active conversation.
///
/// Holds at most one typing placeholder, always as the last entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageStore {
    messages: Vec<Message>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from persisted or fetched messages, dropping stale placeholders.
    pub fn from_messages(messages: Vec<Message>) -> Self {
        let mut store = Self::new();
        store.replace_all(messages);
        store
    }

    pub fn append(&mut self, message: Message) {
        if message.is_typing() {
            self.push_typing();
            return;
        }

        // Keep the placeholder last while it is shown.
        match self.typing_index() {
            Some(idx) => self.messages.insert(idx, message),
            None => self.messages.push(message),
        }
    }

    /// Show the typing placeholder. Returns false if one is already shown.
    pub fn push_typing(&mut self) -> bool {
        if self.is_typing() {
            return false;
        }
        self.messages.push(Message::typing(now_display()));
        true
    }

    /// Remove the typing placeholder, if present.
    pub fn remove_typing(&mut self) -> bool {
        let before = self.messages.len();
        self.messages.retain(|m| !m.is_typing());
        self.messages.len() != before
    }

    /// Replace the transcript wholesale. Placeholders in `messages` are dropped.
    pub fn replace_all(&mut self, messages: Vec<Message>) {
        self.messages = messages.into_iter().filter(|m| !m.is_typing()).collect();
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn is_typing(&self) -> bool {
        self.typing_index().is_some()
    }

    fn typing_index(&self) -> Option<usize> {
        self.messages.iter().position(Message::is_typing)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn as_slice(&self) -> &[Message] {
        &self.messages
    }

    pub fn to_vec(&self) -> Vec<Message> {
        self.messages.clone()
    }
}
