use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use tracing::info;

use crate::io::transcript_from_deepgram;
use crate::models::{DeepgramResponse, Transcript};
use crate::workflow::Transcriber;

const DEEPGRAM_BASE_URL: &str = "https://api.deepgram.com";

/// Configuration for the Deepgram speech-to-text API
#[derive(Debug, Clone)]
pub struct DeepgramConfig {
    /// API key (from DEEPGRAM_API_KEY env var)
    pub api_key: String,
    pub base_url: String,
    /// Model to use (e.g., "nova-2")
    pub model: String,
}

impl DeepgramConfig {
    /// Create config from environment variables
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("DEEPGRAM_API_KEY")
            .context("DEEPGRAM_API_KEY environment variable not set")?;

        Ok(Self {
            api_key,
            base_url: DEEPGRAM_BASE_URL.to_string(),
            model: "nova-2".to_string(),
        })
    }
}

/// Diarized transcription through Deepgram's pre-recorded audio endpoint
pub struct DeepgramTranscriber {
    client: Client,
    config: DeepgramConfig,
}

impl DeepgramTranscriber {
    pub fn new(config: DeepgramConfig, request_timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client, config }
    }

    fn query(&self, language_hint: Option<&str>) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("model", self.config.model.clone()),
            ("diarize", "true".to_string()),
            ("punctuate", "true".to_string()),
            ("smart_format", "true".to_string()),
            ("utterances", "true".to_string()),
        ];
        match language_hint {
            Some(language) => query.push(("language", language.to_string())),
            None => query.push(("detect_language", "true".to_string())),
        }
        query
    }
}

#[async_trait]
impl Transcriber for DeepgramTranscriber {
    async fn transcribe(&self, audio: &Path, language_hint: Option<&str>) -> Result<Transcript> {
        let bytes = tokio::fs::read(audio)
            .await
            .with_context(|| format!("Failed to read audio file: {:?}", audio))?;
        info!("Uploading {} bytes of audio for transcription", bytes.len());

        let url = format!("{}/v1/listen", self.config.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .query(&self.query(language_hint))
            .header("Authorization", format!("Token {}", self.config.api_key))
            .header("Content-Type", audio_mime_type(audio))
            .body(bytes)
            .send()
            .await
            .context("Failed to send request to Deepgram")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("Deepgram API error: {} - {}", status, body);
        }

        let response: DeepgramResponse = response
            .json()
            .await
            .context("Failed to parse Deepgram response")?;

        Ok(transcript_from_deepgram(&response))
    }
}

/// MIME type Deepgram expects for an audio file
fn audio_mime_type(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "wav" => "audio/wav",
        "mp3" => "audio/mpeg",
        "m4a" | "aac" => "audio/mp4",
        "flac" => "audio/flac",
        "ogg" | "opus" => "audio/ogg",
        _ => "application/octet-stream",
    }
}
