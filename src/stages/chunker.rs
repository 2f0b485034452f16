use tracing::debug;

use crate::error::SummarizeError;
use crate::models::{ChunkConfig, Transcript, TranscriptChunk, TranscriptSegment};

/// Split a transcript into ordered, budget-bounded chunks.
///
/// Segments are scanned in order and accumulated while both the duration and
/// the token estimate stay within budget. When the next segment would exceed
/// either budget the current chunk is closed, even if under-full. A segment
/// that alone exceeds a budget gets a chunk of its own; segments are never
/// split. An empty transcript yields no chunks.
pub fn chunk_transcript(
    transcript: &Transcript,
    config: &ChunkConfig,
) -> Result<Vec<TranscriptChunk>, SummarizeError> {
    validate_chunk_config(config)?;

    let mut builder = ChunkBuilder::default();
    let mut chunks = Vec::new();

    for segment in &transcript.segments {
        if !builder.is_empty() && !builder.fits(segment, config) {
            chunks.push(builder.finish(chunks.len()));
        }
        builder.push(segment);
    }

    if !builder.is_empty() {
        chunks.push(builder.finish(chunks.len()));
    }

    debug!(
        "Chunked {} segments into {} chunks (budget {} tokens / {}ms)",
        transcript.segments.len(),
        chunks.len(),
        config.max_tokens,
        config.max_duration_ms
    );

    Ok(chunks)
}

/// Reject budgets that could never admit a segment
pub fn validate_chunk_config(config: &ChunkConfig) -> Result<(), SummarizeError> {
    if config.max_tokens == 0 {
        return Err(SummarizeError::Validation(
            "chunk token budget must be positive".to_string(),
        ));
    }
    if config.max_duration_ms == 0 {
        return Err(SummarizeError::Validation(
            "chunk duration budget must be positive".to_string(),
        ));
    }
    Ok(())
}

#[derive(Default)]
struct ChunkBuilder {
    segments: Vec<TranscriptSegment>,
    tokens: usize,
    start_ms: u64,
    end_ms: u64,
}

impl ChunkBuilder {
    fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Whether adding `segment` keeps both budgets
    fn fits(&self, segment: &TranscriptSegment, config: &ChunkConfig) -> bool {
        let tokens = self.tokens + segment.estimated_tokens();
        let duration = self.end_ms.max(segment.end_ms).saturating_sub(self.start_ms);
        tokens <= config.max_tokens && duration <= config.max_duration_ms
    }

    fn push(&mut self, segment: &TranscriptSegment) {
        if self.segments.is_empty() {
            self.start_ms = segment.start_ms;
            self.end_ms = segment.end_ms;
        }
        self.end_ms = self.end_ms.max(segment.end_ms);
        self.tokens += segment.estimated_tokens();
        self.segments.push(segment.clone());
    }

    fn finish(&mut self, sequence_index: usize) -> TranscriptChunk {
        let chunk = TranscriptChunk {
            sequence_index,
            segments: std::mem::take(&mut self.segments),
            estimated_token_count: self.tokens,
        };
        self.tokens = 0;
        chunk
    }
}
