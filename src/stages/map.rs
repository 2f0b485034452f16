use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::cancel::CancellationFlag;
use crate::error::SummarizeError;
use crate::llm::{
    build_map_prompt, parse_section_payload, GenerateRequest, LlmProvider, RetryPolicy,
    TokenMeter, MAP_SYSTEM_PROMPT,
};
use crate::models::{PartialSummary, TemplateKind, TranscriptChunk};

/// Configuration for the map stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    /// Chunks summarized concurrently
    pub max_concurrency: usize,
    pub max_output_tokens: u32,
    pub temperature: Option<f64>,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 3,
            max_output_tokens: 2_048,
            temperature: Some(0.2),
        }
    }
}

/// Execute the map stage: summarize every chunk independently.
///
/// Chunks are dispatched in order to a pool of at most `max_concurrency`
/// workers. The first failure stops further dispatch; calls already in flight
/// are allowed to finish and the failure is reported with its chunk index.
/// Results are returned ordered by `sequence_index` regardless of the order in
/// which workers complete.
pub async fn execute_map(
    provider: &Arc<dyn LlmProvider>,
    chunks: &[TranscriptChunk],
    template: TemplateKind,
    config: &MapConfig,
    retry: &RetryPolicy,
    meter: &TokenMeter,
    cancel: &CancellationFlag,
) -> Result<Vec<PartialSummary>, SummarizeError> {
    if let Some((position, chunk)) = chunks
        .iter()
        .enumerate()
        .find(|(position, chunk)| chunk.sequence_index != *position)
    {
        return Err(SummarizeError::Validation(format!(
            "chunk at position {} has sequence index {}; indices must run 0..{}",
            position,
            chunk.sequence_index,
            chunks.len()
        )));
    }

    let total = chunks.len();
    let workers = config.max_concurrency.max(1);
    info!(
        "Map: summarizing {} chunks with {} workers ({} template)",
        total, workers, template
    );

    let semaphore = Arc::new(Semaphore::new(workers));
    let failed = Arc::new(AtomicBool::new(false));
    let mut tasks = JoinSet::new();
    let mut stop_reason: Option<SummarizeError> = None;

    for chunk in chunks {
        // Wait for a free worker before deciding whether to dispatch
        let Ok(permit) = semaphore.clone().acquire_owned().await else {
            break;
        };
        if failed.load(Ordering::SeqCst) {
            break;
        }
        if cancel.is_cancelled() {
            info!("Map: cancellation observed before chunk {}", chunk.sequence_index);
            stop_reason = Some(SummarizeError::Cancelled);
            break;
        }

        let request = GenerateRequest {
            system: MAP_SYSTEM_PROMPT.to_string(),
            prompt: build_map_prompt(chunk, total, template),
            max_output_tokens: config.max_output_tokens,
            temperature: config.temperature,
        };
        let sequence_index = chunk.sequence_index;
        let provider = provider.clone();
        let retry = retry.clone();
        let meter = meter.clone();
        let failed = failed.clone();

        tasks.spawn(async move {
            let _permit = permit;
            let result =
                summarize_chunk(provider, request, sequence_index, template, &retry, &meter).await;
            if result.is_err() {
                failed.store(true, Ordering::SeqCst);
            }
            (sequence_index, result)
        });
    }

    let mut slots: Vec<Option<PartialSummary>> = vec![None; total];
    let mut first_failure: Option<SummarizeError> = None;

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, Ok(partial))) => {
                debug!(
                    "Chunk {}: {} sections, {} tokens",
                    index,
                    partial.sections.len(),
                    partial.tokens_used
                );
                slots[index] = Some(partial);
            }
            Ok((index, Err(e))) => {
                warn!("Chunk {} failed: {}", index, e);
                // Report the lowest failing index among those that failed
                let replace = match &first_failure {
                    Some(SummarizeError::Chunk { sequence_index, .. }) => index < *sequence_index,
                    _ => true,
                };
                if replace {
                    first_failure = Some(SummarizeError::Chunk {
                        sequence_index: index,
                        source: Box::new(e),
                    });
                }
            }
            Err(e) => {
                warn!("Map worker aborted: {}", e);
                if first_failure.is_none() {
                    first_failure = Some(SummarizeError::Worker(e.to_string()));
                }
            }
        }
    }

    if let Some(error) = first_failure.or(stop_reason) {
        return Err(error);
    }

    let mut partials = Vec::with_capacity(total);
    for (index, slot) in slots.into_iter().enumerate() {
        match slot {
            Some(partial) => partials.push(partial),
            None => {
                return Err(SummarizeError::Worker(format!(
                    "no result recorded for chunk {}",
                    index
                )));
            }
        }
    }

    info!("Map: {} partial summaries collected", partials.len());
    Ok(partials)
}

/// One chunk's provider call, retried under the policy
async fn summarize_chunk(
    provider: Arc<dyn LlmProvider>,
    request: GenerateRequest,
    sequence_index: usize,
    template: TemplateKind,
    retry: &RetryPolicy,
    meter: &TokenMeter,
) -> Result<PartialSummary, SummarizeError> {
    let label = format!("chunk {}", sequence_index);
    let request = &request;

    retry
        .run(&label, |_attempt| {
            let provider = provider.clone();
            async move {
                let generation = provider.generate(request).await?;
                meter.record(generation.tokens_used);
                let sections = parse_section_payload(&generation.text, template)?;
                Ok(PartialSummary {
                    sequence_index,
                    sections,
                    tokens_used: generation.tokens_used,
                })
            }
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::llm::mock::{chunk_index, reply, ScriptedProvider};
    use crate::models::{SectionName, TranscriptSegment};
    use std::time::Duration;

    fn chunks(count: usize) -> Vec<TranscriptChunk> {
        (0..count)
            .map(|i| TranscriptChunk {
                sequence_index: i,
                segments: vec![TranscriptSegment::new(
                    "Alice",
                    i as u64 * 60_000,
                    i as u64 * 60_000 + 30_000,
                    format!("Point number {}", i),
                )],
                estimated_token_count: 4,
            })
            .collect()
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(2))
    }

    fn summary_reply(request: &GenerateRequest) -> Result<crate::llm::Generation, ProviderError> {
        let index = chunk_index(&request.prompt).unwrap();
        reply(format!(r#"{{"summary": "Chunk {} notes"}}"#, index))
    }

    async fn run(
        provider: Arc<dyn LlmProvider>,
        chunks: &[TranscriptChunk],
        cancel: &CancellationFlag,
    ) -> Result<Vec<PartialSummary>, SummarizeError> {
        execute_map(
            &provider,
            chunks,
            TemplateKind::Default,
            &MapConfig::default(),
            &fast_retry(),
            &TokenMeter::new(),
            cancel,
        )
        .await
    }

    #[tokio::test]
    async fn test_results_ordered_despite_reverse_completion() {
        let count = 8;
        let provider = ScriptedProvider::new(|request, _| summary_reply(request)).with_delay(
            move |request| {
                let index = chunk_index(&request.prompt).unwrap_or(0);
                Duration::from_millis(((count - index) * 5) as u64)
            },
        );
        let provider: Arc<dyn LlmProvider> = Arc::new(provider);

        let partials = run(provider, &chunks(count), &CancellationFlag::new())
            .await
            .unwrap();

        assert_eq!(partials.len(), count);
        for (i, partial) in partials.iter().enumerate() {
            assert_eq!(partial.sequence_index, i);
            assert_eq!(
                partial.section(SectionName::Summary),
                Some(format!("Chunk {} notes", i).as_str())
            );
        }
    }

    #[tokio::test]
    async fn test_gapped_sequence_indices_are_rejected() {
        let provider = Arc::new(ScriptedProvider::new(|request, _| summary_reply(request)));
        let mut gapped = chunks(3);
        gapped[2].sequence_index = 5;

        let error = run(provider.clone(), &gapped, &CancellationFlag::new())
            .await
            .unwrap_err();

        assert!(matches!(error, SummarizeError::Validation(_)));
        assert!(error.to_string().contains("sequence index 5"));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_invalid_payload_is_retried() {
        let provider = Arc::new(ScriptedProvider::new(|request, call| {
            if call == 1 {
                reply("Sure! The chunk was about budgets.")
            } else {
                summary_reply(request)
            }
        }));

        let partials = run(provider.clone(), &chunks(1), &CancellationFlag::new())
            .await
            .unwrap();

        assert_eq!(provider.calls(), 2);
        assert_eq!(partials[0].section(SectionName::Summary), Some("Chunk 0 notes"));
    }

    #[tokio::test]
    async fn test_permanent_failure_reports_chunk_and_stops_dispatch() {
        let provider = Arc::new(ScriptedProvider::new(|request, _| {
            match chunk_index(&request.prompt) {
                Some(2) => Err(ProviderError::permanent("HTTP 401 - invalid key")),
                _ => summary_reply(request),
            }
        }));
        let config = MapConfig {
            max_concurrency: 1,
            ..Default::default()
        };
        let dyn_provider: Arc<dyn LlmProvider> = provider.clone();

        let error = execute_map(
            &dyn_provider,
            &chunks(10),
            TemplateKind::Default,
            &config,
            &fast_retry(),
            &TokenMeter::new(),
            &CancellationFlag::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(error, SummarizeError::Chunk { sequence_index: 2, .. }));
        // Chunk 2 failed on its only attempt; with one worker nothing after it started
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn test_cancellation_before_dispatch() {
        let provider = Arc::new(ScriptedProvider::new(|request, _| summary_reply(request)));
        let cancel = CancellationFlag::new();
        cancel.cancel();

        let error = run(provider.clone(), &chunks(3), &cancel).await.unwrap_err();

        assert!(matches!(error, SummarizeError::Cancelled));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_tokens_metered_across_attempts() {
        let provider: Arc<dyn LlmProvider> = Arc::new(ScriptedProvider::new(|request, call| {
            if call == 1 {
                reply("not json")
            } else {
                summary_reply(request)
            }
        }));
        let meter = TokenMeter::new();

        execute_map(
            &provider,
            &chunks(2),
            TemplateKind::Default,
            &MapConfig::default(),
            &fast_retry(),
            &meter,
            &CancellationFlag::new(),
        )
        .await
        .unwrap();

        // Three calls at 10 tokens each, including the rejected reply
        assert_eq!(meter.total(), 30);
    }
}
