//! Model settings shared by every binary.

use clap::Args;
use std::time::Duration;

/// Default Gemini REST endpoint.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
/// Default chat model.
pub const DEFAULT_CHAT_MODEL: &str = "gemini-2.5-flash";
/// Default embedding model.
pub const DEFAULT_EMBEDDING_MODEL: &str = "gemini-embedding-001";

/// Connection and sampling knobs for one chat model.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelSettings {
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
    timeout: Duration,
}

impl ModelSettings {
    /// Constructs a new set of model settings.
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        temperature: f32,
        timeout: Duration,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into(),
            model: normalize_model_name(&model.into()),
            temperature,
            timeout,
        }
    }

    /// Returns a copy with a different sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// API credential sent with every request.
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Bare model identifier (no `models/` prefix).
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Sampling temperature.
    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    /// Per-request HTTP timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Strips the `models/` prefix some callers include in model names.
pub fn normalize_model_name(model: &str) -> String {
    model
        .trim()
        .trim_start_matches("models/")
        .to_string()
}

/// Command-line arguments shared by binaries that talk to a chat model.
#[derive(Args, Debug, Clone)]
pub struct ModelArgs {
    /// Gemini API key
    #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true)]
    pub api_key: String,

    /// Base URL for the Gemini REST API
    #[arg(long, env = "ROTEIRO_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Chat model identifier
    #[arg(long, env = "ROTEIRO_MODEL", default_value = DEFAULT_CHAT_MODEL)]
    pub model: String,

    /// Sampling temperature
    #[arg(long, env = "ROTEIRO_TEMPERATURE", default_value_t = 0.5)]
    pub temperature: f32,

    /// Max seconds to wait for each model request
    #[arg(long, env = "ROTEIRO_TIMEOUT_SECS", default_value_t = 60)]
    pub timeout_secs: u64,

    /// Log rendered prompts and raw replies
    #[arg(long, env = "ROTEIRO_DEBUG", default_value_t = false)]
    pub debug: bool,
}

impl ModelArgs {
    /// Converts the parsed arguments into `ModelSettings`.
    pub fn settings(&self) -> ModelSettings {
        ModelSettings::new(
            self.api_key.clone(),
            self.base_url.clone(),
            self.model.clone(),
            self.temperature,
            self.request_timeout(),
        )
    }

    /// Returns the per-request timeout, never shorter than one second.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}
