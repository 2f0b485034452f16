use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::cancel::CancellationFlag;
use crate::config::WorkflowConfig;
use crate::error::SummarizeError;
use crate::llm::{LlmProvider, TokenMeter};
use crate::models::{SummaryDocument, Transcript};
use crate::stages::{
    chunk_transcript, execute_map, execute_reduce, execute_refine, select_template,
};

/// Map-reduce summarization with chain-of-density refinement.
///
/// Template selection and chunking happen up front; the map stage fans out
/// over chunks, the reduce stage merges sections in canonical order and the
/// refiner densifies the merged draft without losing coverage.
pub struct SummarizationPipeline {
    provider: Arc<dyn LlmProvider>,
    config: WorkflowConfig,
}

impl SummarizationPipeline {
    pub fn new(provider: Arc<dyn LlmProvider>, config: WorkflowConfig) -> Self {
        Self { provider, config }
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Summarize a transcript into a structured document
    pub async fn summarize(
        &self,
        transcript: &Transcript,
        cancel: &CancellationFlag,
    ) -> Result<SummaryDocument, SummarizeError> {
        self.config.validate().map_err(SummarizeError::Validation)?;
        transcript.validate().map_err(SummarizeError::Validation)?;

        let template = select_template(transcript, self.config.template);
        let chunks = chunk_transcript(transcript, &self.config.chunking)?;

        info!(
            "Summarizing {} segments as {} ({} chunks, model {})",
            transcript.segments.len(),
            template.label(),
            chunks.len(),
            self.provider.model()
        );

        if chunks.is_empty() {
            info!("Transcript is empty; returning an empty {} document", template);
            return Ok(SummaryDocument::empty(template, self.provider.model()));
        }

        let retry = self.config.retry_policy();
        let meter = TokenMeter::new();

        let partials = execute_map(
            &self.provider,
            &chunks,
            template,
            &self.config.map,
            &retry,
            &meter,
            cancel,
        )
        .await?;

        let reduced = execute_reduce(
            &self.provider,
            &partials,
            &chunks,
            template,
            &self.config.reduce,
            &retry,
            &meter,
        )
        .await?;

        let refined = execute_refine(
            &self.provider,
            reduced.document,
            &self.config.refine,
            &retry,
            &meter,
        )
        .await?;

        let mut document = refined.document;
        document.metadata.model_used = self.provider.model().to_string();
        document.metadata.token_usage_total = meter.total();
        document.metadata.chunk_count = chunks.len();
        document.metadata.refinement = refined.stats;
        document.metadata.generated_at = Utc::now();

        info!(
            "Summary complete: {} sections, {} tokens used",
            document.sections.len(),
            document.metadata.token_usage_total
        );

        Ok(document)
    }
}
