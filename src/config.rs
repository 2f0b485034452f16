use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::llm::{ProviderKind, RetryConfig, RetryPolicy};
use crate::models::{ChunkConfig, TemplateChoice};
use crate::stages::{MapConfig, ReduceConfig, RefineConfig};

/// Encoding quality for extracted audio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioQuality {
    Low,
    #[default]
    Standard,
    High,
}

impl AudioQuality {
    /// ffmpeg `-q:a` value for VBR codecs (lower is better)
    pub fn vbr_quality(&self) -> u8 {
        match self {
            AudioQuality::Low => 7,
            AudioQuality::Standard => 4,
            AudioQuality::High => 1,
        }
    }
}

/// Target format for extracted and normalized audio
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    /// Container/codec extension, e.g. "wav" or "mp3"
    pub format: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub quality: AudioQuality,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            format: "wav".to_string(),
            sample_rate: 16_000,
            channels: 1,
            quality: AudioQuality::Standard,
        }
    }
}

/// Everything a job needs, fixed before it starts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub audio: AudioSettings,
    /// Language hint for transcription (e.g. "en")
    pub language: Option<String>,
    pub provider: ProviderKind,
    /// Model override; the provider's default when absent
    pub model: Option<String>,
    pub request_timeout_secs: u64,
    pub chunking: ChunkConfig,
    pub template: TemplateChoice,
    pub map: MapConfig,
    pub reduce: ReduceConfig,
    pub refine: RefineConfig,
    pub retry: RetryConfig,
    /// Keep extracted and normalized audio files after the job
    pub keep_intermediate: bool,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            audio: AudioSettings::default(),
            language: None,
            provider: ProviderKind::default(),
            model: None,
            request_timeout_secs: 120,
            chunking: ChunkConfig::default(),
            template: TemplateChoice::Auto,
            map: MapConfig::default(),
            reduce: ReduceConfig::default(),
            refine: RefineConfig::default(),
            retry: RetryConfig::default(),
            keep_intermediate: false,
        }
    }
}

impl WorkflowConfig {
    /// Load from a JSON file; absent fields take their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    /// Reject settings that could never run
    pub fn validate(&self) -> std::result::Result<(), String> {
        let mut problems = Vec::new();

        if self.chunking.max_tokens == 0 {
            problems.push("chunking.max_tokens must be positive");
        }
        if self.chunking.max_duration_ms == 0 {
            problems.push("chunking.max_duration_ms must be positive");
        }
        if self.map.max_concurrency == 0 {
            problems.push("map.max_concurrency must be positive");
        }
        if self.retry.max_attempts == 0 {
            problems.push("retry.max_attempts must be positive");
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            problems.push("retry.base_delay_ms must not exceed retry.max_delay_ms");
        }
        if self.request_timeout_secs == 0 {
            problems.push("request_timeout_secs must be positive");
        }
        if self.audio.sample_rate == 0 || self.audio.channels == 0 {
            problems.push("audio sample rate and channel count must be positive");
        }
        if self.audio.format.trim().is_empty() {
            problems.push("audio.format must not be empty");
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems.join("; "))
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from(&self.retry)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Model name that will be sent to the provider
    pub fn model_name(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.provider.default_model())
    }
}
