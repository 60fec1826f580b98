//! Beach/mountain router: classify a query, then run exactly one expert.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::error::{ModelError, PromptError};
use crate::llm::{ChatMessage, ChatModel, ChatRequest};
use crate::parser::{FieldSpec, JsonOutputParser, StrOutputParser};
use crate::prompt::{ChatPromptTemplate, Vars};

/// Prompt of the single-node travel consultant.
pub const CONSULTANT_SYSTEM_PROMPT: &str = "Você é um consultor de viagens especialista em Brasil.";
/// Beach expert persona.
pub const BEACH_SYSTEM_PROMPT: &str = "Você é um especialista em viagens de praia. \
     Recomende destinos de litoral no Brasil de forma breve e entusiasmada.";
/// Mountain expert persona.
pub const MOUNTAIN_SYSTEM_PROMPT: &str = "Você é um especialista em viagens de montanha e aventura. \
     Recomende destinos de serra, trilhas e escalada no Brasil de forma breve e entusiasmada.";
const CLASSIFIER_SYSTEM_PROMPT: &str = "Classifique a consulta do usuário. \
     Responda 'praia' para viagens de praia e litoral, \
     ou 'montanha' para viagens de montanha, trilhas ou escalada.";

/// Travel category a query is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    /// Beach and coastline trips.
    #[serde(rename = "praia")]
    Beach,
    /// Mountain, hiking and climbing trips.
    #[serde(rename = "montanha")]
    Mountain,
}

impl Category {
    /// Category used when classification yields nothing usable.
    pub const DEFAULT: Category = Category::Beach;

    /// Wire label used in prompts and structured output.
    pub fn label(self) -> &'static str {
        match self {
            Self::Beach => "praia",
            Self::Mountain => "montanha",
        }
    }

    /// Parses a wire label, ignoring case and surrounding whitespace.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "praia" => Some(Self::Beach),
            "montanha" => Some(Self::Mountain),
            _ => None,
        }
    }

    /// Graph node that handles this category.
    pub fn node(self) -> Node {
        match self {
            Self::Beach => Node::Beach,
            Self::Mountain => Node::Mountain,
        }
    }
}

/// Decides which category a query belongs to.
pub trait Classifier {
    /// Classifies `query`. Never fails; falls back to [`Category::DEFAULT`].
    fn classify(&self, query: &str) -> Category;
}

/// Stems that settle the route on their own.
const MOUNTAIN_INTENT_STEMS: &[&str] = &["escal", "alpin"];
const MOUNTAIN_STEMS: &[&str] = &[
    "montanh", "trilh", "serra", "neve", "acampa", "cachoeir", "pico",
];
const BEACH_STEMS: &[&str] = &[
    "praia", "litoral", "ilha", "surf", "mergulh", "areia", "coqueir",
];
const BEACH_WORDS: &[&str] = &["mar"];

/// Deterministic classifier that counts category keywords.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordClassifier;

#[derive(Debug, Default, PartialEq, Eq)]
struct KeywordHits {
    beach: usize,
    mountain: usize,
    mountain_intent: bool,
}

impl KeywordClassifier {
    fn hits(query: &str) -> KeywordHits {
        let folded = fold_accents(query);
        let mut hits = KeywordHits::default();
        for token in folded.split(|ch: char| !ch.is_alphanumeric()) {
            if token.is_empty() {
                continue;
            }
            if MOUNTAIN_INTENT_STEMS.iter().any(|stem| token.starts_with(stem)) {
                hits.mountain_intent = true;
                hits.mountain += 1;
            } else if MOUNTAIN_STEMS.iter().any(|stem| token.starts_with(stem)) {
                hits.mountain += 1;
            } else if BEACH_STEMS.iter().any(|stem| token.starts_with(stem))
                || BEACH_WORDS.contains(&token)
            {
                hits.beach += 1;
            }
        }
        hits
    }
}

impl Classifier for KeywordClassifier {
    fn classify(&self, query: &str) -> Category {
        let hits = Self::hits(query);
        if hits.mountain_intent || (hits.mountain > 0 && hits.mountain >= hits.beach) {
            Category::Mountain
        } else if hits.beach > 0 {
            Category::Beach
        } else {
            Category::DEFAULT
        }
    }
}

/// Lowercases and strips diacritics: NFD, then drop combining marks.
fn fold_accents(input: &str) -> String {
    input
        .nfd()
        .filter(|ch| !is_combining_mark(*ch))
        .flat_map(char::to_lowercase)
        .collect()
}

#[derive(Debug, Deserialize)]
struct RouteChoice {
    destino: Option<String>,
}

/// Classifier backed by one schema-constrained model call.
pub struct LlmClassifier<'m, M: ?Sized> {
    model: &'m M,
    parser: JsonOutputParser<RouteChoice>,
}

impl<'m, M: ChatModel + ?Sized> LlmClassifier<'m, M> {
    /// Wraps `model`.
    pub fn new(model: &'m M) -> Self {
        Self {
            model,
            parser: JsonOutputParser::new(&[FieldSpec::new(
                "destino",
                "praia ou montanha",
            )]),
        }
    }

    /// Response schema restricting the answer to the two category labels.
    pub fn response_schema() -> serde_json::Value {
        serde_json::json!({
            "type": "OBJECT",
            "properties": {
                "destino": {
                    "type": "STRING",
                    "enum": [Category::Beach.label(), Category::Mountain.label()],
                }
            },
            "required": ["destino"],
        })
    }

    fn request_category(&self, query: &str) -> Result<Option<Category>, ModelError> {
        let request = ChatRequest::new(
            vec![
                ChatMessage::system(CLASSIFIER_SYSTEM_PROMPT),
                ChatMessage::user(query),
            ],
            0.0,
        )
        .with_schema(Self::response_schema());
        let reply = self.model.generate(&request)?;
        let category = match self.parser.parse(&reply) {
            Ok(choice) => choice.destino.as_deref().and_then(Category::from_label),
            Err(err) => {
                warn!(error = %err, "classifier reply was not valid JSON");
                None
            }
        };
        Ok(category)
    }
}

impl<M: ChatModel + ?Sized> Classifier for LlmClassifier<'_, M> {
    fn classify(&self, query: &str) -> Category {
        match self.request_category(query) {
            Ok(Some(category)) => category,
            Ok(None) => {
                warn!(
                    fallback = Category::DEFAULT.label(),
                    "classifier returned no valid category"
                );
                Category::DEFAULT
            }
            Err(err) => {
                warn!(error = %err, fallback = Category::DEFAULT.label(), "classifier call failed");
                Category::DEFAULT
            }
        }
    }
}

/// Failures raised while routing a query or answering it.
#[derive(Debug, Error)]
pub enum RouterError {
    /// Template rendering failed.
    #[error(transparent)]
    Prompt(#[from] PromptError),
    /// The expert's remote call failed.
    #[error(transparent)]
    Model(#[from] ModelError),
}

impl RouterError {
    /// Returns the model error when the failure came from the remote call.
    pub fn model_error(&self) -> Option<&ModelError> {
        match self {
            Self::Model(err) => Some(err),
            Self::Prompt(_) => None,
        }
    }
}

/// Named expert: a system persona answering the user's query.
pub struct Responder<'m, M: ?Sized> {
    name: &'static str,
    model: &'m M,
    template: ChatPromptTemplate,
    temperature: f32,
}

impl<'m, M: ChatModel + ?Sized> Responder<'m, M> {
    /// Builds a responder with `system_prompt` and a `{query}` user message.
    pub fn new(
        name: &'static str,
        model: &'m M,
        system_prompt: &str,
        temperature: f32,
    ) -> Result<Self, PromptError> {
        let template = ChatPromptTemplate::new()
            .system(system_prompt)?
            .user("{query}")?;
        Ok(Self::from_template(name, model, template, temperature))
    }

    /// Builds a responder from a ready template binding `{query}`.
    pub fn from_template(
        name: &'static str,
        model: &'m M,
        template: ChatPromptTemplate,
        temperature: f32,
    ) -> Self {
        Self {
            name,
            model,
            template,
            temperature,
        }
    }

    /// Responder name used in logs.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Answers `query`.
    pub fn respond(&self, query: &str) -> Result<String, RouterError> {
        let messages = self
            .template
            .format_messages(&Vars::new().set("query", query), &[])?;
        let reply = self
            .model
            .generate(&ChatRequest::new(messages, self.temperature))?;
        Ok(StrOutputParser.parse(&reply))
    }
}

/// Nodes of the routing graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Node {
    /// Classification step.
    Classify,
    /// Beach expert.
    Beach,
    /// Mountain expert.
    Mountain,
    /// Terminal marker.
    End,
}

/// Result of one pass through the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteOutcome {
    /// Category chosen by the classifier.
    pub category: Category,
    /// Answer produced by the selected expert.
    pub answer: String,
    /// Nodes executed, in order.
    pub visited: Vec<Node>,
}

/// `classify → (beach | mountain) → end`.
pub struct RouterGraph<'m, C, M: ?Sized> {
    classifier: C,
    beach: Responder<'m, M>,
    mountain: Responder<'m, M>,
}

impl<'m, C: Classifier, M: ChatModel + ?Sized> RouterGraph<'m, C, M> {
    /// Graph with caller-supplied experts.
    pub fn new(classifier: C, beach: Responder<'m, M>, mountain: Responder<'m, M>) -> Self {
        Self {
            classifier,
            beach,
            mountain,
        }
    }

    /// Graph with the default beach and mountain personas.
    pub fn with_default_experts(
        classifier: C,
        model: &'m M,
        temperature: f32,
    ) -> Result<Self, PromptError> {
        Ok(Self::new(
            classifier,
            Responder::new("beach", model, BEACH_SYSTEM_PROMPT, temperature)?,
            Responder::new("mountain", model, MOUNTAIN_SYSTEM_PROMPT, temperature)?,
        ))
    }

    /// Runs the graph for `query`.
    pub fn invoke(&self, query: &str) -> Result<RouteOutcome, RouterError> {
        let mut visited = Vec::with_capacity(2);
        let mut category = Category::DEFAULT;
        let mut answer = String::new();
        let mut node = Node::Classify;
        while node != Node::End {
            visited.push(node);
            node = match node {
                Node::Classify => {
                    category = self.classifier.classify(query);
                    debug!(category = category.label(), "query classified");
                    category.node()
                }
                Node::Beach => {
                    answer = self.run_expert(&self.beach, query)?;
                    Node::End
                }
                Node::Mountain => {
                    answer = self.run_expert(&self.mountain, query)?;
                    Node::End
                }
                Node::End => Node::End,
            };
        }
        Ok(RouteOutcome {
            category,
            answer,
            visited,
        })
    }

    fn run_expert(&self, expert: &Responder<'m, M>, query: &str) -> Result<String, RouterError> {
        debug!(expert = expert.name(), "running expert");
        expert.respond(query)
    }
}

/// Single-node consultant prompt.
pub fn consultant_prompt() -> Result<ChatPromptTemplate, PromptError> {
    ChatPromptTemplate::new()
        .system(CONSULTANT_SYSTEM_PROMPT)?
        .user("{query}")
}

/// Asks the consultant directly, without routing.
pub fn ask_consultant<M: ChatModel + ?Sized>(
    model: &M,
    temperature: f32,
    query: &str,
) -> Result<String, RouterError> {
    let template = consultant_prompt()?;
    Responder::from_template("consultant", model, template, temperature).respond(query)
}
