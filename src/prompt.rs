//! Prompt templates with `{name}` placeholders.

use std::collections::BTreeMap;

use crate::error::PromptError;
use crate::llm::{ChatMessage, Role};

/// Variable bindings supplied when formatting a template.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Vars {
    values: BTreeMap<String, String>,
}

impl Vars {
    /// Empty binding set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `name` to `value`, replacing any previous binding.
    pub fn set(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.values.insert(name.into(), value.to_string());
        self
    }

    /// Looks up a binding.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// Single string template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
    segments: Vec<Segment>,
    partials: Vars,
}

impl PromptTemplate {
    /// Parses a template. `{{` and `}}` render literal braces.
    pub fn new(template: impl Into<String>) -> Result<Self, PromptError> {
        let template = template.into();
        let segments = parse_segments(&template)?;
        Ok(Self {
            template,
            segments,
            partials: Vars::new(),
        })
    }

    /// Fixes a variable at construction time.
    pub fn with_partial(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.partials = self.partials.set(name, value);
        self
    }

    /// Raw template text.
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Placeholders the caller still has to bind, in order of first appearance.
    pub fn input_variables(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for segment in &self.segments {
            if let Segment::Placeholder(name) = segment {
                if self.partials.get(name).is_none() && !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
        }
        names
    }

    /// Renders the template. Caller bindings take precedence over partials.
    pub fn format(&self, vars: &Vars) -> Result<String, PromptError> {
        let mut out = String::with_capacity(self.template.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(name) => {
                    let value = vars
                        .get(name)
                        .or_else(|| self.partials.get(name))
                        .ok_or_else(|| PromptError::MissingVariable(name.clone()))?;
                    out.push_str(value);
                }
            }
        }
        Ok(out)
    }
}

fn parse_segments(template: &str) -> Result<Vec<Segment>, PromptError> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = template.char_indices().peekable();
    while let Some((idx, ch)) = chars.next() {
        match ch {
            '{' if chars.peek().map(|(_, next)| *next) == Some('{') => {
                chars.next();
                literal.push('{');
            }
            '}' if chars.peek().map(|(_, next)| *next) == Some('}') => {
                chars.next();
                literal.push('}');
            }
            '{' => {
                let mut name = String::new();
                let mut closed = false;
                for (_, inner) in chars.by_ref() {
                    if inner == '}' {
                        closed = true;
                        break;
                    }
                    name.push(inner);
                }
                if !closed {
                    return Err(PromptError::UnclosedPlaceholder(idx));
                }
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Placeholder(name.trim().to_string()));
            }
            other => literal.push(other),
        }
    }
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Slot {
    Message(Role, PromptTemplate),
    History,
}

/// Ordered chat messages, optionally with a slot where prior history is spliced in.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChatPromptTemplate {
    slots: Vec<Slot>,
}

impl ChatPromptTemplate {
    /// Empty chat template.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a system message template.
    pub fn system(self, template: &str) -> Result<Self, PromptError> {
        self.message(Role::System, template)
    }

    /// Appends a user message template.
    pub fn user(self, template: &str) -> Result<Self, PromptError> {
        self.message(Role::User, template)
    }

    /// Appends a message template for `role`.
    pub fn message(mut self, role: Role, template: &str) -> Result<Self, PromptError> {
        self.slots
            .push(Slot::Message(role, PromptTemplate::new(template)?));
        Ok(self)
    }

    /// Marks where conversation history goes. Only the first marker is kept.
    pub fn history(mut self) -> Self {
        if !self.has_history_slot() {
            self.slots.push(Slot::History);
        }
        self
    }

    /// True when the template carries a history slot.
    pub fn has_history_slot(&self) -> bool {
        self.slots.iter().any(|slot| matches!(slot, Slot::History))
    }

    /// Renders every message, splicing `history` at the history slot.
    pub fn format_messages(
        &self,
        vars: &Vars,
        history: &[ChatMessage],
    ) -> Result<Vec<ChatMessage>, PromptError> {
        let mut messages = Vec::with_capacity(self.slots.len() + history.len());
        for slot in &self.slots {
            match slot {
                Slot::Message(role, template) => {
                    messages.push(ChatMessage::new(*role, template.format(vars)?));
                }
                Slot::History => messages.extend(history.iter().cloned()),
            }
        }
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn formats_itinerary_style_template() {
        let template =
            PromptTemplate::new("Roteiro de {dias} dias para {numero_criancas} crianças").unwrap();
        let vars = Vars::new().set("dias", 7).set("numero_criancas", 2);
        assert_eq!(
            template.format(&vars).unwrap(),
            "Roteiro de 7 dias para 2 crianças"
        );
    }

    #[test]
    fn partials_fill_and_hide_variables() {
        let template = PromptTemplate::new("Sugira uma cidade para {interesse},\n{formato}")
            .unwrap()
            .with_partial("formato", "{\"cidade\": \"...\"}");
        assert_eq!(template.input_variables(), vec!["interesse"]);
        let rendered = template
            .format(&Vars::new().set("interesse", "praias"))
            .unwrap();
        assert!(rendered.ends_with("{\"cidade\": \"...\"}"));
    }

    #[test]
    fn missing_variable_is_reported() {
        let template = PromptTemplate::new("atividades em {cidade}").unwrap();
        assert_eq!(
            template.format(&Vars::new()),
            Err(PromptError::MissingVariable("cidade".into()))
        );
    }

    #[test]
    fn doubled_braces_are_literal() {
        let template = PromptTemplate::new("{{\"k\": \"{v}\"}}").unwrap();
        assert!(template.input_variables() == vec!["v"]);
        assert_eq!(
            template.format(&Vars::new().set("v", 1)).unwrap(),
            "{\"k\": \"1\"}"
        );
    }

    #[test]
    fn unclosed_placeholder_fails_to_parse() {
        assert_eq!(
            PromptTemplate::new("oops {name"),
            Err(PromptError::UnclosedPlaceholder(5))
        );
    }

    #[test]
    fn repeated_placeholders_listed_once() {
        let template = PromptTemplate::new("{a} {b} {a}").unwrap();
        assert_eq!(template.input_variables(), vec!["a", "b"]);
    }

    #[test]
    fn chat_template_splices_history() {
        let template = ChatPromptTemplate::new()
            .system("Você é um guia")
            .unwrap()
            .history()
            .user("{query}")
            .unwrap();
        let history = vec![ChatMessage::user("oi"), ChatMessage::assistant("olá")];
        let messages = template
            .format_messages(&Vars::new().set("query", "e agora?"), &history)
            .unwrap();
        let roles: Vec<Role> = messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::User]
        );
        assert_eq!(messages[3].content, "e agora?");
    }
}
