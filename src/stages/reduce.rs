use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::SummarizeError;
use crate::llm::{
    build_reduce_prompt, parse_section_text, GenerateRequest, LlmProvider, RetryPolicy,
    SectionFragment, TokenMeter, REDUCE_SYSTEM_PROMPT,
};
use crate::models::{PartialSummary, SectionName, SummaryDocument, TemplateKind, TranscriptChunk};

/// Configuration for the reduce stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReduceConfig {
    pub max_output_tokens: u32,
    pub temperature: Option<f64>,
}

impl Default for ReduceConfig {
    fn default() -> Self {
        Self {
            max_output_tokens: 2_048,
            temperature: Some(0.2),
        }
    }
}

/// Result of the reduce stage
#[derive(Debug)]
pub struct ReduceResult {
    pub document: SummaryDocument,
    /// Sections merged through a provider call
    pub sections_merged: usize,
    /// Sections taken verbatim from their only contributing chunk
    pub sections_passed_through: usize,
}

/// Execute the reduce stage: merge partial summaries into one document.
///
/// `partials` must be complete and ordered by `sequence_index`; `chunks` supplies
/// the time range shown for each fragment. Every section of the template is
/// present in the output, in canonical order.
pub async fn execute_reduce(
    provider: &Arc<dyn LlmProvider>,
    partials: &[PartialSummary],
    chunks: &[TranscriptChunk],
    template: TemplateKind,
    config: &ReduceConfig,
    retry: &RetryPolicy,
    meter: &TokenMeter,
) -> Result<ReduceResult, SummarizeError> {
    let mut document = SummaryDocument::empty(template, provider.model());
    document.metadata.chunk_count = partials.len();

    let mut sections_merged = 0;
    let mut sections_passed_through = 0;

    for &section in template.sections() {
        let fragments = collect_fragments(section, partials, chunks);

        let text = match fragments.as_slice() {
            [] => {
                debug!("Section {}: no content", section);
                continue;
            }
            [only] => {
                sections_passed_through += 1;
                only.text.trim().to_string()
            }
            _ => {
                debug!("Section {}: merging {} fragments", section, fragments.len());
                sections_merged += 1;
                merge_section(provider, template, section, &fragments, config, retry, meter)
                    .await
                    .map_err(|e| SummarizeError::Merge {
                        section: section.key().to_string(),
                        source: Box::new(e),
                    })?
            }
        };

        document.set_section_text(section, text);
    }

    info!(
        "Reduce: {} sections merged, {} passed through, {} empty",
        sections_merged,
        sections_passed_through,
        template.sections().len() - sections_merged - sections_passed_through
    );

    Ok(ReduceResult {
        document,
        sections_merged,
        sections_passed_through,
    })
}

/// Non-empty contributions to `section`, in chunk order
fn collect_fragments<'a>(
    section: SectionName,
    partials: &'a [PartialSummary],
    chunks: &[TranscriptChunk],
) -> Vec<SectionFragment<'a>> {
    let mut ordered: Vec<&PartialSummary> = partials.iter().collect();
    ordered.sort_by_key(|p| p.sequence_index);

    ordered
        .into_iter()
        .filter_map(|partial| {
            let text = partial.section(section)?;
            let chunk = chunks.iter().find(|c| c.sequence_index == partial.sequence_index);
            Some(SectionFragment {
                sequence_index: partial.sequence_index,
                start_ms: chunk.map(|c| c.start_ms()).unwrap_or(0),
                end_ms: chunk.map(|c| c.end_ms()).unwrap_or(0),
                text,
            })
        })
        .collect()
}

async fn merge_section(
    provider: &Arc<dyn LlmProvider>,
    template: TemplateKind,
    section: SectionName,
    fragments: &[SectionFragment<'_>],
    config: &ReduceConfig,
    retry: &RetryPolicy,
    meter: &TokenMeter,
) -> Result<String, SummarizeError> {
    let request = GenerateRequest {
        system: REDUCE_SYSTEM_PROMPT.to_string(),
        prompt: build_reduce_prompt(template, section, fragments),
        max_output_tokens: config.max_output_tokens,
        temperature: config.temperature,
    };
    let request = &request;
    let label = format!("merge {}", section);

    retry
        .run(&label, |_attempt| async move {
            let generation = provider.generate(request).await?;
            meter.record(generation.tokens_used);
            parse_section_text(&generation.text)
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::llm::mock::{reply, section_key, ScriptedProvider};
    use crate::models::TranscriptSegment;
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn chunk(index: usize) -> TranscriptChunk {
        TranscriptChunk {
            sequence_index: index,
            segments: vec![TranscriptSegment::new(
                "Alice",
                index as u64 * 60_000,
                index as u64 * 60_000 + 59_000,
                "text",
            )],
            estimated_token_count: 1,
        }
    }

    fn partial(index: usize, sections: &[(SectionName, &str)]) -> PartialSummary {
        PartialSummary {
            sequence_index: index,
            sections: sections
                .iter()
                .map(|(name, text)| (*name, text.to_string()))
                .collect::<BTreeMap<_, _>>(),
            tokens_used: 10,
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(2))
    }

    async fn reduce(
        provider: Arc<dyn LlmProvider>,
        partials: &[PartialSummary],
    ) -> Result<ReduceResult, SummarizeError> {
        let chunks: Vec<TranscriptChunk> = (0..partials.len()).map(chunk).collect();
        execute_reduce(
            &provider,
            partials,
            &chunks,
            TemplateKind::Default,
            &ReduceConfig::default(),
            &fast_retry(),
            &TokenMeter::new(),
        )
        .await
    }

    #[tokio::test]
    async fn test_merges_only_multi_chunk_sections() {
        let provider = Arc::new(ScriptedProvider::new(|request, _| {
            reply(format!("merged {}", section_key(&request.prompt).unwrap()))
        }));
        let partials = vec![
            partial(0, &[(SectionName::Summary, "Kickoff"), (SectionName::Decisions, "Ship Q3")]),
            partial(1, &[(SectionName::Summary, "Wrap-up")]),
        ];

        let result = reduce(provider.clone(), &partials).await.unwrap();
        let doc = &result.document;

        assert_eq!(provider.calls(), 1);
        assert_eq!(result.sections_merged, 1);
        assert_eq!(result.sections_passed_through, 1);
        assert_eq!(doc.section(SectionName::Summary), Some("merged summary"));
        assert_eq!(doc.section(SectionName::Decisions), Some("Ship Q3"));
        assert_eq!(doc.section(SectionName::ActionItems), Some(""));
        assert_eq!(doc.section_names(), TemplateKind::Default.sections().to_vec());
        assert_eq!(doc.metadata.chunk_count, 2);
    }

    #[tokio::test]
    async fn test_fragments_presented_in_chunk_order() {
        let provider = Arc::new(ScriptedProvider::new(|_, _| reply("merged")));
        // Deliberately out of order
        let partials = vec![
            partial(2, &[(SectionName::KeyPoints, "FRAG-C")]),
            partial(0, &[(SectionName::KeyPoints, "FRAG-A")]),
            partial(1, &[(SectionName::KeyPoints, "FRAG-B")]),
        ];

        reduce(provider.clone(), &partials).await.unwrap();

        let prompt = &provider.requests()[0].prompt;
        let first = prompt.find("FRAG-A").unwrap();
        let second = prompt.find("FRAG-B").unwrap();
        let third = prompt.find("FRAG-C").unwrap();
        assert!(first < second && second < third);
        assert!(prompt.contains("### Chunk 1 (00:00 - 00:59)"));
    }

    #[tokio::test]
    async fn test_empty_reply_is_retried_then_fails() {
        let provider = Arc::new(ScriptedProvider::new(|_, _| reply("   ")));
        let partials = vec![
            partial(0, &[(SectionName::Summary, "a")]),
            partial(1, &[(SectionName::Summary, "b")]),
        ];

        let error = reduce(provider.clone(), &partials).await.unwrap_err();

        assert_eq!(provider.calls(), 3);
        match error {
            SummarizeError::Merge { section, source } => {
                assert_eq!(section, "summary");
                assert!(matches!(*source, SummarizeError::InvalidResponse(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let provider = Arc::new(ScriptedProvider::new(|_, _| {
            Err(ProviderError::permanent("HTTP 400 - prompt is too long"))
        }));
        let partials = vec![
            partial(0, &[(SectionName::Summary, "a")]),
            partial(1, &[(SectionName::Summary, "b")]),
        ];

        let error = reduce(provider.clone(), &partials).await.unwrap_err();

        assert_eq!(provider.calls(), 1);
        assert!(error.provider_error().is_some());
    }
}
