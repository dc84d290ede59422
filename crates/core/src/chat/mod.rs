use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::{MindbeatError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Rolling window over the most recent user/assistant exchanges. The oldest
/// exchange is evicted once the window is full.
#[derive(Debug, Clone)]
pub struct ConversationState {
    max_exchanges: usize,
    exchanges: VecDeque<(ChatMessage, ChatMessage)>,
}

impl ConversationState {
    pub fn new(max_exchanges: usize) -> Self {
        Self {
            max_exchanges: max_exchanges.max(1),
            exchanges: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }

    /// History followed by the new user turn, ready to send.
    pub fn request_messages(&self, user_input: &str) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(self.exchanges.len() * 2 + 1);
        for (user, assistant) in &self.exchanges {
            messages.push(user.clone());
            messages.push(assistant.clone());
        }
        messages.push(ChatMessage::user(user_input));
        messages
    }

    pub fn record(&mut self, user_input: &str, reply: &str) {
        self.exchanges
            .push_back((ChatMessage::user(user_input), ChatMessage::assistant(reply)));
        while self.exchanges.len() > self.max_exchanges {
            self.exchanges.pop_front();
        }
    }
}

/// Chat-completion service.
pub trait ChatBackend {
    fn complete(&mut self, messages: &[ChatMessage]) -> Result<String>;
}

/// Pairs a backend with its conversation state.
pub struct ChatSession<B> {
    backend: B,
    state: ConversationState,
}

impl<B: ChatBackend> ChatSession<B> {
    pub fn new(backend: B, state: ConversationState) -> Self {
        Self { backend, state }
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    /// Sends one user turn. The exchange is remembered only if the backend
    /// answers.
    pub fn send(&mut self, user_input: &str) -> Result<String> {
        let input = user_input.trim();
        if input.is_empty() {
            return Err(MindbeatError::InvalidInput("message must not be empty"));
        }

        let messages = self.state.request_messages(input);
        let reply = self.backend.complete(&messages)?;
        self.state.record(input, &reply);
        tracing::debug!(history = self.state.len(), "chat exchange recorded");
        Ok(reply)
    }
}

pub fn is_exit_command(input: &str) -> bool {
    matches!(input.trim().to_ascii_lowercase().as_str(), "quit" | "exit")
}
