use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    Message(ChatMessage),
    Loading { token: u64, text: String },
}

/// Append-only list of what the chat window shows. Loading placeholders are
/// the only entries that ever leave it.
#[derive(Debug, Default)]
pub struct Transcript {
    entries: Vec<Entry>,
    next_token: u64,
}

impl Transcript {
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.entries.push(Entry::Message(message));
    }

    pub fn begin_loading(&mut self, text: impl Into<String>) -> u64 {
        self.next_token += 1;
        let token = self.next_token;
        self.entries.push(Entry::Loading {
            token,
            text: text.into(),
        });
        token
    }

    pub fn end_loading(&mut self, token: u64) {
        self.entries
            .retain(|e| !matches!(e, Entry::Loading { token: t, .. } if *t == token));
    }

    pub fn is_loading(&self) -> bool {
        self.entries.iter().any(|e| matches!(e, Entry::Loading { .. }))
    }
}
