use serde::{Deserialize, Serialize};

use super::TranscriptSegment;

/// Budget for chunk generation; whichever limit is reached first closes a chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkConfig {
    /// Maximum wall-clock span of a chunk in milliseconds
    pub max_duration_ms: u64,
    /// Maximum estimated tokens of a chunk
    pub max_tokens: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            max_duration_ms: 600_000, // 10 minutes
            max_tokens: 3_000,
        }
    }
}

/// A contiguous, budget-bounded slice of a transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptChunk {
    /// Position of this chunk, gapless from 0
    pub sequence_index: usize,
    /// Whole segments, in transcript order
    pub segments: Vec<TranscriptSegment>,
    /// Sum of the segments' token estimates
    pub estimated_token_count: usize,
}

impl TranscriptChunk {
    /// Start timestamp of the first segment
    pub fn start_ms(&self) -> u64 {
        self.segments.first().map(|s| s.start_ms).unwrap_or(0)
    }

    /// Latest end timestamp among the segments
    pub fn end_ms(&self) -> u64 {
        self.segments.iter().map(|s| s.end_ms).max().unwrap_or(0)
    }

    /// Wall-clock span covered by this chunk
    pub fn duration_ms(&self) -> u64 {
        self.end_ms().saturating_sub(self.start_ms())
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }
}
