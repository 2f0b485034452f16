mod common;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{fast_config, one_chunk_per_segment, pass_through, text, Call, MockProvider};
use precis::models::ChunkConfig;
use precis::{
    chunk_transcript, CancellationFlag, ProviderError, SectionName, SummarizationPipeline,
    SummarizeError, TemplateKind, Transcript, TranscriptSegment,
};

async fn summarize_with_reverse_completion(count: usize) {
    let provider = Arc::new(MockProvider::new(pass_through).with_delay(move |call| match call {
        Call::Map(i) => Duration::from_millis(((count - i) * 2) as u64),
        _ => Duration::ZERO,
    }));
    let mut config = fast_config();
    config.chunking.max_tokens = 1_000;
    let pipeline = SummarizationPipeline::new(provider.clone(), config);

    let doc = pipeline
        .summarize(&one_chunk_per_segment(count), &CancellationFlag::new())
        .await
        .unwrap();

    assert_eq!(doc.schema, TemplateKind::Default);
    assert_eq!(doc.section_names(), TemplateKind::Default.sections().to_vec());
    assert_eq!(doc.metadata.chunk_count, count);

    // Merged summary lists every chunk in index order
    let summary = doc.section(SectionName::Summary).unwrap();
    let positions: Vec<usize> = (0..count)
        .map(|i| summary.find(&format!("Chunk {} summary", i)).unwrap())
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]));

    if count > 3 {
        let order = provider.map_order();
        assert_ne!(order, (0..count).collect::<Vec<_>>(), "map calls finished in order");
    }
}

#[tokio::test]
async fn test_canonical_order_with_one_chunk() {
    summarize_with_reverse_completion(1).await;
}

#[tokio::test]
async fn test_canonical_order_with_two_chunks() {
    summarize_with_reverse_completion(2).await;
}

#[tokio::test]
async fn test_canonical_order_with_fifty_chunks() {
    summarize_with_reverse_completion(50).await;
}

fn budget_transcript() -> Transcript {
    // Token estimates 800, 950 and 300
    Transcript::from_segments(vec![
        TranscriptSegment::new("Alice", 0, 60_000, "a".repeat(3_200)),
        TranscriptSegment::new("Bob", 60_000, 120_000, "b".repeat(3_800)),
        TranscriptSegment::new("Alice", 120_000, 180_000, "c".repeat(1_200)),
    ])
}

#[test]
fn test_budget_yields_three_chunks() {
    let config = ChunkConfig {
        max_duration_ms: 600_000,
        max_tokens: 1_000,
    };

    let chunks = chunk_transcript(&budget_transcript(), &config).unwrap();

    let indices: Vec<usize> = chunks.iter().map(|c| c.sequence_index).collect();
    assert_eq!(indices, vec![0, 1, 2]);
}

#[tokio::test]
async fn test_rate_limited_chunk_succeeds_after_retries() {
    let attempts: Arc<Mutex<HashMap<usize, u32>>> = Arc::default();
    let seen = attempts.clone();
    let provider = Arc::new(MockProvider::new(move |request, call| match call {
        Call::Map(i) => {
            let attempt = {
                let mut seen = seen.lock().unwrap();
                let entry = seen.entry(i).or_insert(0);
                *entry += 1;
                *entry
            };
            if i == 1 && attempt <= 2 {
                Err(ProviderError::from_status(429, "rate limited"))
            } else if i == 1 {
                text(r#"{"summary": "Chunk 1 after retry"}"#)
            } else {
                text(format!(r#"{{"summary": "Chunk {} summary"}}"#, i))
            }
        }
        _ => pass_through(request, call),
    }));
    let mut config = fast_config();
    config.chunking.max_tokens = 1_000;
    let pipeline = SummarizationPipeline::new(provider.clone(), config);

    let doc = pipeline
        .summarize(&budget_transcript(), &CancellationFlag::new())
        .await
        .unwrap();

    assert_eq!(doc.metadata.chunk_count, 3);
    assert_eq!(attempts.lock().unwrap()[&1], 3);
    let summary = doc.section(SectionName::Summary).unwrap();
    assert!(summary.contains("Chunk 1 after retry"));
    assert!(summary.find("Chunk 0 summary") < summary.find("Chunk 1 after retry"));
    assert!(summary.find("Chunk 1 after retry") < summary.find("Chunk 2 summary"));
}

#[tokio::test]
async fn test_exhausted_retries_fail_with_chunk_index() {
    let provider = Arc::new(MockProvider::new(|request, call| match call {
        Call::Map(1) => Err(ProviderError::from_status(503, "unavailable")),
        _ => pass_through(request, call),
    }));
    let mut config = fast_config();
    config.chunking.max_tokens = 1_000;
    config.retry.max_attempts = 2;
    let pipeline = SummarizationPipeline::new(provider.clone(), config);

    let error = pipeline
        .summarize(&budget_transcript(), &CancellationFlag::new())
        .await
        .unwrap_err();

    assert!(matches!(error, SummarizeError::Chunk { sequence_index: 1, .. }));
    assert!(error.provider_error().is_some_and(|e| e.is_transient()));
    assert!(!provider.log().contains(&Call::Reduce));
}

#[tokio::test]
async fn test_refinement_never_drops_entities() {
    let draft = "Alice owns the Q3 budget review, due 2025-11-01.";
    let provider = Arc::new(MockProvider::new(move |request, call| match call {
        Call::Map(_) => text(format!(r#"{{"summary": "{}"}}"#, draft)),
        // Densifies by dropping the owner
        Call::Refine => text(common::current_text(&request.prompt).replace("Alice ", "")),
        Call::Reduce => pass_through(request, call),
    }));
    let mut config = fast_config();
    config.refine.passes = 3;
    let pipeline = SummarizationPipeline::new(provider.clone(), config);
    let transcript = Transcript::from_segments(vec![TranscriptSegment::new(
        "Alice",
        0,
        20_000,
        "I'll own the Q3 budget review, due November first.",
    )]);

    let doc = pipeline
        .summarize(&transcript, &CancellationFlag::new())
        .await
        .unwrap();

    assert_eq!(doc.section(SectionName::Summary), Some(draft));
    for entity in ["Alice", "Q3 budget", "2025-11-01"] {
        assert!(doc.full_text().contains(entity), "lost {}", entity);
    }
    assert_eq!(doc.metadata.refinement.passes_run, 3);
    assert_eq!(doc.metadata.refinement.passes_rejected, 3);
    assert_eq!(doc.metadata.refinement.passes_accepted, 0);
}

#[tokio::test]
async fn test_requirements_phrasing_selects_requirements_template() {
    let provider = Arc::new(MockProvider::new(|request, call| match call {
        Call::Map(_) => text(r#"{"functional_requirements": ["Export CSV"], "deliverables": "API design doc"}"#),
        _ => pass_through(request, call),
    }));
    let pipeline = SummarizationPipeline::new(provider, fast_config());
    let transcript = Transcript::from_segments(vec![
        TranscriptSegment::new("PM", 0, 10_000, "The system must export CSV files."),
        TranscriptSegment::new("PM", 10_000, 20_000, "It shall keep audit logs."),
        TranscriptSegment::new("Lead", 20_000, 30_000, "The first deliverable is the API design."),
    ]);

    let doc = pipeline
        .summarize(&transcript, &CancellationFlag::new())
        .await
        .unwrap();

    assert_eq!(doc.schema, TemplateKind::Requirements);
    assert_eq!(doc.section_names(), TemplateKind::Requirements.sections().to_vec());
    assert_eq!(doc.section(SectionName::FunctionalRequirements), Some("- Export CSV"));
}

#[tokio::test]
async fn test_out_of_template_payload_is_retried_then_rejected() {
    let provider = Arc::new(MockProvider::new(|request, call| match call {
        Call::Map(_) => text(r#"{"summary": "ok", "procedure": "not in this template"}"#),
        _ => pass_through(request, call),
    }));
    let mut config = fast_config();
    config.retry.max_attempts = 3;
    let pipeline = SummarizationPipeline::new(provider.clone(), config);
    let transcript = Transcript::from_segments(vec![TranscriptSegment::new(
        "A", 0, 1_000, "Good morning.",
    )]);

    let error = pipeline
        .summarize(&transcript, &CancellationFlag::new())
        .await
        .unwrap_err();

    assert_eq!(provider.calls(), 3);
    match error {
        SummarizeError::Chunk { sequence_index, source } => {
            assert_eq!(sequence_index, 0);
            assert!(matches!(*source, SummarizeError::InvalidResponse(_)));
        }
        other => panic!("unexpected error: {other}"),
    }
}
