#![warn(missing_docs)]
//! Core library entry points for the roteiro travel assistant.

pub mod chain;
pub mod config;
pub mod error;
pub mod history;
pub mod llm;
pub mod parser;
pub mod prompt;
pub mod rag;
pub mod router;

pub use chain::{ChainError, ChainOutcome, Destination, ItineraryRequest, Restaurants, TravelChain};
pub use config::{ModelArgs, ModelSettings};
pub use error::{report_model_error, ModelError, ParseError, PromptError};
pub use history::{ChatError, ChatHistory, Conversation, SessionStore};
pub use llm::{ChatMessage, ChatModel, ChatRequest, GeminiChat, Role};
pub use parser::{FieldSpec, JsonOutputParser, StrOutputParser};
pub use prompt::{ChatPromptTemplate, PromptTemplate, Vars};
pub use router::{
    Category, Classifier, KeywordClassifier, LlmClassifier, RouterError, RouterGraph,
};

use tracing_subscriber::EnvFilter;

use rag::{AdvisorError, IngestError};

/// Installs the global `tracing` subscriber used by every binary.
///
/// `RUST_LOG` wins when set; otherwise `debug` selects the `debug` level for
/// this crate (rendered prompts and raw replies) and `info` everywhere else.
pub fn init_tracing(debug: bool) {
    let fallback = if debug { "roteiro=debug,info" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Renders a binary's top-level failure.
///
/// Model failures anywhere in the library get [`report_model_error`]'s wording;
/// everything else prints its full context chain.
pub fn report_failure(err: &anyhow::Error) -> String {
    let model_error = err
        .downcast_ref::<ModelError>()
        .or_else(|| err.downcast_ref::<ChainError>().and_then(ChainError::model_error))
        .or_else(|| err.downcast_ref::<ChatError>().and_then(ChatError::model_error))
        .or_else(|| {
            err.downcast_ref::<RouterError>()
                .and_then(RouterError::model_error)
        })
        .or_else(|| {
            err.downcast_ref::<AdvisorError>()
                .and_then(AdvisorError::model_error)
        })
        .or_else(|| {
            err.downcast_ref::<IngestError>()
                .and_then(IngestError::model_error)
        });
    match model_error {
        Some(model_error) => report_model_error(model_error),
        None => format!("{err:#}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overload_is_found_inside_library_errors() {
        let err = anyhow::Error::from(ChainError::Model(ModelError::Overloaded {
            message: "503 UNAVAILABLE".into(),
        }));
        assert!(report_failure(&err).contains("sobrecarregado"));
    }

    #[test]
    fn router_overload_gets_the_retry_hint() {
        let err = anyhow::Error::from(RouterError::Model(ModelError::Overloaded {
            message: "503".into(),
        }));
        assert!(report_failure(&err).contains("Tente novamente"));
    }

    #[test]
    fn other_failures_keep_their_context() {
        let err = anyhow::anyhow!("arquivo ausente").context("failed to load index");
        assert_eq!(report_failure(&err), "failed to load index: arquivo ausente");
    }
}
