//! Chat model abstraction and the Gemini implementation.

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

pub(crate) mod gemini;

pub use gemini::GeminiChat;

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions that frame the whole conversation.
    System,
    /// Human turn.
    User,
    /// Model turn.
    Assistant,
}

/// One message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Message author.
    pub role: Role,
    /// Message text.
    pub content: String,
}

impl ChatMessage {
    /// Builds a message for `role`.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// System message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// User message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Request envelope shared by chat model implementations.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    /// Conversation to complete, in order.
    pub messages: Vec<ChatMessage>,
    /// Sampling temperature.
    pub temperature: f32,
    /// Optional response schema; when present the reply must be JSON matching it.
    pub response_schema: Option<serde_json::Value>,
}

impl ChatRequest {
    /// Free-text request.
    pub fn new(messages: Vec<ChatMessage>, temperature: f32) -> Self {
        Self {
            messages,
            temperature,
            response_schema: None,
        }
    }

    /// Constrains the reply to JSON matching `schema`.
    pub fn with_schema(mut self, schema: serde_json::Value) -> Self {
        self.response_schema = Some(schema);
        self
    }

    /// Text of the last user message, if any.
    pub fn last_user_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|message| message.role == Role::User)
            .map(|message| message.content.as_str())
    }
}

/// Trait implemented by concrete chat models.
pub trait ChatModel {
    /// Sends the request and returns the reply text.
    fn generate(&self, request: &ChatRequest) -> Result<String, ModelError>;
}

impl<M: ChatModel + ?Sized> ChatModel for &M {
    fn generate(&self, request: &ChatRequest) -> Result<String, ModelError> {
        (**self).generate(request)
    }
}

/// Sends a single user prompt and returns the reply text.
pub fn invoke_text<M: ChatModel + ?Sized>(
    model: &M,
    prompt: &str,
    temperature: f32,
) -> Result<String, ModelError> {
    let request = ChatRequest::new(vec![ChatMessage::user(prompt)], temperature);
    model.generate(&request)
}
