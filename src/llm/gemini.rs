//! Blocking client for the Gemini `generateContent` endpoint.

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ChatModel, ChatRequest, Role};
use crate::config::ModelSettings;
use crate::error::ModelError;

/// Chat model backed by the Gemini REST API.
pub struct GeminiChat {
    client: Client,
    endpoint: String,
    model: String,
}

impl GeminiChat {
    /// Builds a new Gemini chat client.
    pub fn new(settings: &ModelSettings) -> Result<Self> {
        anyhow::ensure!(!settings.api_key().trim().is_empty(), "missing Gemini API key");
        anyhow::ensure!(!settings.model().is_empty(), "missing Gemini model name");
        let client = build_client(settings)?;
        let endpoint = format!(
            "{}/models/{}:generateContent",
            settings.base_url(),
            settings.model()
        );
        Ok(Self {
            client,
            endpoint,
            model: settings.model().to_string(),
        })
    }

    /// Model identifier this client talks to.
    pub fn model(&self) -> &str {
        &self.model
    }
}

/// Shared HTTP client setup for Gemini endpoints.
pub(crate) fn build_client(settings: &ModelSettings) -> Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(
        "x-goog-api-key",
        HeaderValue::from_str(settings.api_key().trim()).context("invalid Gemini API key")?,
    );
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Client::builder()
        .timeout(settings.timeout())
        .default_headers(headers)
        .build()
        .context("failed to build Gemini HTTP client")
}

impl ChatModel for GeminiChat {
    fn generate(&self, request: &ChatRequest) -> Result<String, ModelError> {
        let body = GenerateRequest::from_chat(request);
        if let Ok(rendered) = serde_json::to_string_pretty(&body) {
            debug!(model = %self.model, request = %rendered, "sending generateContent");
        }
        let resp = self.client.post(&self.endpoint).json(&body).send()?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp
                .text()
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(ModelError::classify(status, &text));
        }
        let parsed: GenerateResponse = resp
            .json()
            .map_err(|err| ModelError::failed(format!("failed to parse Gemini response: {err}")))?;
        let answer = parsed.into_text()?;
        debug!(model = %self.model, reply = %answer, "received generateContent reply");
        Ok(answer)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig<'a>,
}

impl<'a> GenerateRequest<'a> {
    fn from_chat(request: &'a ChatRequest) -> Self {
        let mut system_parts = Vec::new();
        let mut contents = Vec::new();
        for message in &request.messages {
            let part = Part {
                text: message.content.as_str(),
            };
            match message.role {
                Role::System => system_parts.push(part),
                Role::User => contents.push(Content {
                    role: Some("user"),
                    parts: vec![part],
                }),
                Role::Assistant => contents.push(Content {
                    role: Some("model"),
                    parts: vec![part],
                }),
            }
        }
        let system_instruction = (!system_parts.is_empty()).then_some(Content {
            role: None,
            parts: system_parts,
        });
        let generation_config = GenerationConfig {
            temperature: request.temperature,
            response_mime_type: request
                .response_schema
                .as_ref()
                .map(|_| "application/json"),
            response_schema: request.response_schema.as_ref(),
        };
        Self {
            system_instruction,
            contents,
            generation_config,
        }
    }
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<&'a serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

impl GenerateResponse {
    fn into_text(self) -> Result<String, ModelError> {
        let Some(candidate) = self.candidates.into_iter().next() else {
            let reason = self
                .prompt_feedback
                .and_then(|feedback| feedback.block_reason)
                .unwrap_or_else(|| "no candidates returned".to_string());
            return Err(ModelError::failed(format!("Gemini returned no answer: {reason}")));
        };
        let text = candidate
            .content
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();
        if text.is_empty() {
            let reason = candidate
                .finish_reason
                .unwrap_or_else(|| "empty content".to_string());
            return Err(ModelError::failed(format!(
                "Gemini response missing text content ({reason})"
            )));
        }
        Ok(text)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<ResponseContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ChatMessage;
    use serde_json::json;

    #[test]
    fn system_messages_fold_into_instruction() {
        let request = ChatRequest::new(
            vec![
                ChatMessage::system("Você é um consultor"),
                ChatMessage::user("oi"),
                ChatMessage::assistant("olá"),
                ChatMessage::user("praias?"),
            ],
            0.5,
        );
        let body = serde_json::to_value(GenerateRequest::from_chat(&request)).unwrap();
        assert_eq!(
            body["systemInstruction"],
            json!({"parts": [{"text": "Você é um consultor"}]})
        );
        let roles: Vec<&str> = body["contents"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["role"].as_str().unwrap())
            .collect();
        assert_eq!(roles, vec!["user", "model", "user"]);
        assert!(body["generationConfig"].get("responseSchema").is_none());
    }

    #[test]
    fn schema_requests_json_mime_type() {
        let schema = json!({"type": "OBJECT"});
        let request =
            ChatRequest::new(vec![ChatMessage::user("q")], 0.0).with_schema(schema.clone());
        let body = serde_json::to_value(GenerateRequest::from_chat(&request)).unwrap();
        assert_eq!(
            body["generationConfig"]["responseMimeType"],
            "application/json"
        );
        assert_eq!(body["generationConfig"]["responseSchema"], schema);
        assert!(body.get("systemInstruction").is_none());
    }

    #[test]
    fn response_text_parts_are_joined() {
        let raw = json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "Rio "}, {"text": "de Janeiro"}]},
                "finishReason": "STOP"
            }]
        });
        let parsed: GenerateResponse = serde_json::from_value(raw).unwrap();
        assert_eq!(parsed.into_text().unwrap(), "Rio de Janeiro");
    }

    #[test]
    fn blocked_prompt_is_a_failure() {
        let raw = json!({"promptFeedback": {"blockReason": "SAFETY"}});
        let parsed: GenerateResponse = serde_json::from_value(raw).unwrap();
        let err = parsed.into_text().unwrap_err();
        assert!(!err.is_overloaded());
        assert!(err.to_string().contains("SAFETY"));
    }
}
