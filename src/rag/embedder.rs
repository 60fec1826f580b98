//! Embedding clients.

use std::thread;
use std::time::Duration;

use anyhow::Result;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::ModelSettings;
use crate::error::ModelError;
use crate::llm::gemini::build_client;

/// Turns text into vectors.
pub trait Embedder {
    /// Embeds document chunks, one vector per input, in input order.
    fn embed_batch(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>, ModelError>;

    /// Embeds a search query.
    fn embed_query(&self, text: &str) -> Result<Vec<f32>, ModelError>;
}

impl<E: Embedder + ?Sized> Embedder for &E {
    fn embed_batch(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>, ModelError> {
        (**self).embed_batch(inputs)
    }

    fn embed_query(&self, text: &str) -> Result<Vec<f32>, ModelError> {
        (**self).embed_query(text)
    }
}

/// Blocking client for Gemini `batchEmbedContents`.
#[derive(Clone)]
pub struct GeminiEmbedder {
    client: Client,
    endpoint: String,
    model_path: String,
    dimensions: Option<usize>,
    max_attempts: usize,
    batch_size: usize,
}

impl GeminiEmbedder {
    /// Builds a new embeddings client. `settings.model()` names the embedding model.
    pub fn new(
        settings: &ModelSettings,
        dimensions: Option<usize>,
        max_attempts: usize,
        batch_size: usize,
    ) -> Result<Self> {
        anyhow::ensure!(!settings.api_key().trim().is_empty(), "missing Gemini API key");
        anyhow::ensure!(!settings.model().is_empty(), "missing embedding model name");
        let client = build_client(settings)?;
        let endpoint = format!(
            "{}/models/{}:batchEmbedContents",
            settings.base_url(),
            settings.model()
        );
        Ok(Self {
            client,
            endpoint,
            model_path: format!("models/{}", settings.model()),
            dimensions,
            max_attempts: max_attempts.max(1),
            batch_size: batch_size.max(1),
        })
    }

    /// Maximum batch size configured for this client.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn embed(&self, inputs: &[&str], task: TaskType) -> Result<Vec<Vec<f32>>, ModelError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        if inputs.len() > self.batch_size {
            return Err(ModelError::failed(format!(
                "batch of {} exceeds configured max {}",
                inputs.len(),
                self.batch_size
            )));
        }
        let request = BatchEmbedRequest {
            requests: inputs
                .iter()
                .map(|&text| EmbedRequest {
                    model: &self.model_path,
                    content: EmbedContent {
                        parts: [EmbedPart { text }],
                    },
                    task_type: task,
                    output_dimensionality: self.dimensions,
                })
                .collect(),
        };

        let mut attempt = 0usize;
        loop {
            let response = self.client.post(&self.endpoint).json(&request).send();
            match response {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let parsed: BatchEmbedResponse = resp.json().map_err(|err| {
                            ModelError::failed(format!(
                                "failed to parse Gemini embedding response: {err}"
                            ))
                        })?;
                        if parsed.embeddings.len() != inputs.len() {
                            return Err(ModelError::failed(format!(
                                "Gemini returned {} embeddings for {} inputs",
                                parsed.embeddings.len(),
                                inputs.len()
                            )));
                        }
                        return Ok(parsed
                            .embeddings
                            .into_iter()
                            .map(|entry| entry.values)
                            .collect());
                    }
                    let body = resp
                        .text()
                        .unwrap_or_else(|_| "<body unavailable>".to_string());
                    if should_retry(status) && attempt + 1 < self.max_attempts {
                        attempt += 1;
                        warn!(%status, attempt, "embedding request failed; retrying");
                        thread::sleep(retry_backoff(attempt));
                        continue;
                    }
                    return Err(ModelError::classify(status, &body));
                }
                Err(err) => {
                    if is_retryable_error(&err) && attempt + 1 < self.max_attempts {
                        attempt += 1;
                        warn!(error = %err, attempt, "embedding request failed; retrying");
                        thread::sleep(retry_backoff(attempt));
                        continue;
                    }
                    return Err(err.into());
                }
            }
        }
    }
}

impl Embedder for GeminiEmbedder {
    fn embed_batch(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>, ModelError> {
        self.embed(inputs, TaskType::RetrievalDocument)
    }

    fn embed_query(&self, text: &str) -> Result<Vec<f32>, ModelError> {
        self.embed(&[text], TaskType::RetrievalQuery)?
            .pop()
            .ok_or_else(|| ModelError::failed("Gemini returned no query embedding"))
    }
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_body() || err.is_request()
}

fn retry_backoff(attempt: usize) -> Duration {
    let capped = attempt.min(5) as u32;
    Duration::from_millis(500 * (1 << capped))
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum TaskType {
    RetrievalDocument,
    RetrievalQuery,
}

#[derive(Serialize)]
struct BatchEmbedRequest<'a> {
    requests: Vec<EmbedRequest<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedRequest<'a> {
    model: &'a str,
    content: EmbedContent<'a>,
    task_type: TaskType,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_dimensionality: Option<usize>,
}

#[derive(Serialize)]
struct EmbedContent<'a> {
    parts: [EmbedPart<'a>; 1],
}

#[derive(Serialize)]
struct EmbedPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<EmbeddingValues>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_body_matches_batch_embed_shape() {
        let request = BatchEmbedRequest {
            requests: vec![EmbedRequest {
                model: "models/gemini-embedding-001",
                content: EmbedContent {
                    parts: [EmbedPart { text: "roubo" }],
                },
                task_type: TaskType::RetrievalDocument,
                output_dimensionality: None,
            }],
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "requests": [{
                    "model": "models/gemini-embedding-001",
                    "content": {"parts": [{"text": "roubo"}]},
                    "taskType": "RETRIEVAL_DOCUMENT"
                }]
            })
        );
    }

    #[test]
    fn backoff_is_capped() {
        assert_eq!(retry_backoff(1), Duration::from_millis(1000));
        assert_eq!(retry_backoff(9), retry_backoff(5));
    }

    #[test]
    fn oversized_batches_are_rejected_before_sending() {
        let settings = ModelSettings::new(
            "k",
            "http://127.0.0.1:9",
            "gemini-embedding-001",
            0.0,
            Duration::from_secs(1),
        );
        let embedder = GeminiEmbedder::new(&settings, None, 1, 2).unwrap();
        let err = embedder.embed_batch(&["a", "b", "c"]).unwrap_err();
        assert!(err.to_string().contains("exceeds configured max 2"));
        assert!(embedder.embed_batch(&[]).unwrap().is_empty());
    }
}
