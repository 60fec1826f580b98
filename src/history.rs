//! Conversation memory keyed by session id.

use std::collections::HashMap;

use thiserror::Error;
use tracing::debug;

use crate::error::{ModelError, PromptError};
use crate::llm::{ChatMessage, ChatModel, ChatRequest};
use crate::parser::StrOutputParser;
use crate::prompt::{ChatPromptTemplate, Vars};

/// System prompt used by the travel guide persona.
pub const GUIDE_SYSTEM_PROMPT: &str =
    "Você é um guia de viagem especializado em destinos brasileiros. Apresente-se como Sr. Passeios";

/// Ordered messages exchanged in one session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatHistory {
    messages: Vec<ChatMessage>,
}

impl ChatHistory {
    /// Empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a user turn.
    pub fn add_user(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage::user(content));
    }

    /// Records a model turn.
    pub fn add_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage::assistant(content));
    }

    /// Messages in the order they were recorded.
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Number of recorded messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// True when nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Forgets every message.
    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

/// In-memory histories keyed by session id. Entries are never evicted.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: HashMap<String, ChatHistory>,
}

impl SessionStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// History for `session_id`, created empty on first use.
    pub fn history(&mut self, session_id: &str) -> &mut ChatHistory {
        self.sessions.entry(session_id.to_string()).or_default()
    }

    /// History for `session_id` if the session exists.
    pub fn get(&self, session_id: &str) -> Option<&ChatHistory> {
        self.sessions.get(session_id)
    }

    /// Number of known sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// True when no session has been created yet.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Failures raised while answering a chat turn.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Template rendering failed.
    #[error(transparent)]
    Prompt(#[from] PromptError),
    /// The remote call failed.
    #[error(transparent)]
    Model(#[from] ModelError),
}

impl ChatError {
    /// Returns the model error when the failure came from the remote call.
    pub fn model_error(&self) -> Option<&ModelError> {
        match self {
            Self::Model(err) => Some(err),
            Self::Prompt(_) => None,
        }
    }
}

/// Chat prompt plus model, with memory supplied by a [`SessionStore`].
pub struct Conversation<'a, M: ?Sized> {
    model: &'a M,
    store: &'a mut SessionStore,
    template: ChatPromptTemplate,
    temperature: f32,
}

impl<'a, M: ChatModel + ?Sized> Conversation<'a, M> {
    /// Conversation with the travel guide persona.
    pub fn travel_guide(
        model: &'a M,
        store: &'a mut SessionStore,
        temperature: f32,
    ) -> Result<Self, PromptError> {
        let template = ChatPromptTemplate::new()
            .system(GUIDE_SYSTEM_PROMPT)?
            .history()
            .user("{query}")?;
        Ok(Self::new(model, store, template, temperature))
    }

    /// Conversation with a caller-supplied template. The template should bind `{query}`.
    pub fn new(
        model: &'a M,
        store: &'a mut SessionStore,
        template: ChatPromptTemplate,
        temperature: f32,
    ) -> Self {
        Self {
            model,
            store,
            template,
            temperature,
        }
    }

    /// Answers `query` within `session_id`, recording both turns on success.
    pub fn ask(&mut self, session_id: &str, query: &str) -> Result<String, ChatError> {
        let history = self.store.history(session_id);
        let messages = self
            .template
            .format_messages(&Vars::new().set("query", query), history.messages())?;
        debug!(session = session_id, turns = history.len(), "sending chat turn");
        let request = ChatRequest::new(messages, self.temperature);
        let reply = StrOutputParser.parse(&self.model.generate(&request)?);
        history.add_user(query);
        history.add_assistant(reply.clone());
        Ok(reply)
    }

    /// Read access to the backing store.
    pub fn store(&self) -> &SessionStore {
        self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Role;
    use std::cell::RefCell;

    struct EchoModel {
        seen: RefCell<Vec<ChatRequest>>,
        fail: bool,
    }

    impl ChatModel for EchoModel {
        fn generate(&self, request: &ChatRequest) -> Result<String, ModelError> {
            self.seen.borrow_mut().push(request.clone());
            if self.fail {
                return Err(ModelError::Overloaded {
                    message: "503".into(),
                });
            }
            Ok(format!("resposta {}", self.seen.borrow().len()))
        }
    }

    #[test]
    fn store_creates_sessions_on_first_use() {
        let mut store = SessionStore::new();
        assert!(store.get("a").is_none());
        store.history("a").add_user("oi");
        store.history("a").add_assistant("olá");
        store.history("b");
        assert_eq!(store.len(), 2);
        assert_eq!(store.get("a").map(ChatHistory::len), Some(2));
        assert!(store.get("b").unwrap().is_empty());
    }

    #[test]
    fn second_turn_sees_first_turn() {
        let model = EchoModel {
            seen: RefCell::new(Vec::new()),
            fail: false,
        };
        let mut store = SessionStore::new();
        let mut chat = Conversation::travel_guide(&model, &mut store, 0.5).unwrap();
        chat.ask("aula", "Quero visitar praias").unwrap();
        let second = chat.ask("aula", "Qual a melhor época?").unwrap();
        assert_eq!(second, "resposta 2");

        let seen = model.seen.borrow();
        let roles: Vec<Role> = seen[1].messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::User]
        );
        assert_eq!(seen[1].messages[2].content, "resposta 1");
        assert_eq!(store.get("aula").unwrap().len(), 4);
    }

    #[test]
    fn sessions_do_not_share_history() {
        let model = EchoModel {
            seen: RefCell::new(Vec::new()),
            fail: false,
        };
        let mut store = SessionStore::new();
        let mut chat = Conversation::travel_guide(&model, &mut store, 0.5).unwrap();
        chat.ask("a", "primeira").unwrap();
        chat.ask("b", "segunda").unwrap();
        assert_eq!(model.seen.borrow()[1].messages.len(), 2);
    }

    #[test]
    fn failed_turn_leaves_history_untouched() {
        let model = EchoModel {
            seen: RefCell::new(Vec::new()),
            fail: true,
        };
        let mut store = SessionStore::new();
        let mut chat = Conversation::travel_guide(&model, &mut store, 0.5).unwrap();
        let err = chat.ask("a", "oi").unwrap_err();
        assert!(matches!(err, ChatError::Model(ref e) if e.is_overloaded()));
        assert!(chat.store().get("a").unwrap().is_empty());
    }
}
