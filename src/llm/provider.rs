use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::llm::{AnthropicConfig, AnthropicProvider, OpenAiConfig, OpenAiProvider};

/// A single generation request
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    /// Standing instructions for the model
    pub system: String,
    /// The task itself
    pub prompt: String,
    pub max_output_tokens: u32,
    pub temperature: Option<f64>,
}

/// Model output for one request
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub text: String,
    /// Input plus output tokens billed for the call
    pub tokens_used: u64,
}

/// Uniform call contract over interchangeable LLM backends
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Short backend identifier (e.g., "anthropic")
    fn name(&self) -> &str;

    /// Model the backend is configured with
    fn model(&self) -> &str;

    /// Run one completion. Each call may consume billed quota.
    async fn generate(&self, request: &GenerateRequest) -> Result<Generation, ProviderError>;
}

/// Running total of billed tokens across concurrent calls
#[derive(Debug, Clone, Default)]
pub struct TokenMeter(Arc<AtomicU64>);

impl TokenMeter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, tokens: u64) {
        self.0.fetch_add(tokens, Ordering::Relaxed);
    }

    pub fn total(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Supported backend vendors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[default]
    Anthropic,
    #[serde(rename = "openai", alias = "open_ai")]
    OpenAi,
}

impl ProviderKind {
    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::Anthropic => "claude-sonnet-4-20250514",
            ProviderKind::OpenAi => "gpt-4o-mini",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::Anthropic => write!(f, "anthropic"),
            ProviderKind::OpenAi => write!(f, "openai"),
        }
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anthropic" | "claude" => Ok(ProviderKind::Anthropic),
            "openai" | "open_ai" => Ok(ProviderKind::OpenAi),
            other => Err(format!("unknown provider '{}' (expected anthropic or openai)", other)),
        }
    }
}

/// Build a provider from environment credentials
pub fn build_provider(
    kind: ProviderKind,
    model: Option<&str>,
    request_timeout: Duration,
) -> Result<Arc<dyn LlmProvider>> {
    let model = model.unwrap_or(kind.default_model()).to_string();
    let provider: Arc<dyn LlmProvider> = match kind {
        ProviderKind::Anthropic => {
            let config = AnthropicConfig::from_env()?.with_model(model);
            Arc::new(AnthropicProvider::new(config, request_timeout))
        }
        ProviderKind::OpenAi => {
            let config = OpenAiConfig::from_env()?.with_model(model);
            Arc::new(OpenAiProvider::new(config, request_timeout))
        }
    };
    Ok(provider)
}

/// Parse a `Retry-After` header given in whole seconds
pub(crate) fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Map a transport-level reqwest failure onto the provider error taxonomy
pub(crate) fn classify_transport_error(backend: &str, error: reqwest::Error) -> ProviderError {
    if error.is_timeout() || error.is_connect() || error.is_request() {
        ProviderError::transient(format!("{} request failed: {}", backend, error))
    } else {
        ProviderError::permanent(format!("{} request failed: {}", backend, error))
    }
}
