//! Contracts for the external work a job delegates: audio handling,
//! speech-to-text and summarization.

use std::path::{Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;

use crate::cancel::CancellationFlag;
use crate::config::AudioSettings;
use crate::models::{SummaryDocument, Transcript};
use crate::pipeline::SummarizationPipeline;

/// Audio extraction and normalization
#[async_trait]
pub trait AudioProcessor: Send + Sync {
    /// Pull the audio track out of a video file
    async fn extract_audio(&self, video: &Path, settings: &AudioSettings) -> Result<PathBuf>;

    /// Re-encode audio to the target format, sample rate and channel count
    async fn process_audio(&self, audio: &Path, settings: &AudioSettings) -> Result<PathBuf>;
}

/// Speech-to-text with speaker diarization
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: &Path, language_hint: Option<&str>) -> Result<Transcript>;
}

/// Turns a transcript into a summary document
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(
        &self,
        transcript: &Transcript,
        cancel: &CancellationFlag,
    ) -> Result<SummaryDocument>;
}

#[async_trait]
impl Summarizer for SummarizationPipeline {
    async fn summarize(
        &self,
        transcript: &Transcript,
        cancel: &CancellationFlag,
    ) -> Result<SummaryDocument> {
        Ok(SummarizationPipeline::summarize(self, transcript, cancel).await?)
    }
}
