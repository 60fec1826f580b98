//! Error types surfaced by the library.

use reqwest::StatusCode;
use thiserror::Error;

/// Outcome of a failed remote model call.
///
/// The set is closed on purpose: callers decide between "try again later" and
/// "report the raw message" and nothing else.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    /// The service reported a transient overload (HTTP 503 / `UNAVAILABLE`).
    #[error("model service overloaded: {message}")]
    Overloaded {
        /// Message returned by the service.
        message: String,
    },
    /// Any other failure: transport, authentication, malformed replies.
    #[error("{message}")]
    Failed {
        /// Underlying error message.
        message: String,
    },
}

impl ModelError {
    /// Builds a generic failure.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    /// True for the transient overload variant.
    pub fn is_overloaded(&self) -> bool {
        matches!(self, Self::Overloaded { .. })
    }

    /// Picks the variant for a non-success HTTP response.
    pub fn classify(status: StatusCode, body: &str) -> Self {
        let message = format!("{status}: {body}");
        if status == StatusCode::SERVICE_UNAVAILABLE || mentions_overload(body) {
            Self::Overloaded { message }
        } else {
            Self::Failed { message }
        }
    }
}

impl From<reqwest::Error> for ModelError {
    fn from(err: reqwest::Error) -> Self {
        Self::failed(err.to_string())
    }
}

/// Text shown to the user when a model call fails.
///
/// Overload is transient and gets a retry hint; anything else carries the raw message.
pub fn report_model_error(err: &ModelError) -> String {
    match err {
        ModelError::Overloaded { .. } => {
            "O modelo está sobrecarregado no momento. Tente novamente mais tarde.".to_string()
        }
        ModelError::Failed { message } => format!("Erro ao gerar resposta: {message}"),
    }
}

fn mentions_overload(body: &str) -> bool {
    let lowered = body.to_ascii_lowercase();
    lowered.contains("\"code\": 503")
        || lowered.contains("\"code\":503")
        || lowered.contains("unavailable")
        || lowered.contains("overloaded")
}

/// Errors raised while rendering prompt templates.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PromptError {
    /// A placeholder had no value bound.
    #[error("missing value for prompt variable '{0}'")]
    MissingVariable(String),
    /// A `{` was never closed.
    #[error("unclosed placeholder starting at byte {0}")]
    UnclosedPlaceholder(usize),
}

/// Errors raised while parsing model output into structured values.
#[derive(Debug, Error)]
pub enum ParseError {
    /// No JSON object could be located in the reply.
    #[error("model reply contains no JSON object: {0}")]
    NoJson(String),
    /// A JSON object was found but did not match the expected shape.
    #[error("model reply does not match the expected shape: {0}")]
    Shape(#[from] serde_json::Error),
}
