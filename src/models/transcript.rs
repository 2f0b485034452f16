use serde::{Deserialize, Serialize};

/// Per-word timing detail carried through from the transcription backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Word {
    pub text: String,
    pub start_ms: u64,
    pub end_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// One speaker utterance - immutable once produced by the transcriber
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    /// Speaker label (e.g., "Speaker 0" or a resolved name)
    pub speaker_id: String,
    /// Start timestamp in milliseconds
    pub start_ms: u64,
    /// End timestamp in milliseconds
    pub end_ms: u64,
    /// Spoken text
    pub text: String,
    /// Optional word-level timing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub words: Option<Vec<Word>>,
}

impl TranscriptSegment {
    pub fn new(
        speaker_id: impl Into<String>,
        start_ms: u64,
        end_ms: u64,
        text: impl Into<String>,
    ) -> Self {
        Self {
            speaker_id: speaker_id.into(),
            start_ms,
            end_ms,
            text: text.into(),
            words: None,
        }
    }

    /// Duration of this segment in milliseconds
    pub fn duration_ms(&self) -> u64 {
        self.end_ms.saturating_sub(self.start_ms)
    }

    /// Cheap token estimate for budget checks
    pub fn estimated_tokens(&self) -> usize {
        estimate_tokens(&self.text)
    }
}

/// Approximate token count: one token per four characters, rounded up.
///
/// Deliberately independent of any model tokenizer; it only has to be
/// deterministic and monotonic in text length.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// An ordered transcript with its metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    /// Segments ordered by start time
    pub segments: Vec<TranscriptSegment>,
    /// Language code reported by the transcriber
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Source media duration, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// Speaker roster in order of first appearance
    #[serde(default)]
    pub speakers: Vec<String>,
}

impl Transcript {
    /// Build a transcript from segments, deriving the speaker roster
    pub fn from_segments(segments: Vec<TranscriptSegment>) -> Self {
        let mut transcript = Self {
            segments,
            ..Default::default()
        };
        transcript.speakers = transcript.derive_speakers();
        transcript
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Source duration, falling back to the span covered by segments
    pub fn duration_ms(&self) -> u64 {
        self.duration_ms.unwrap_or_else(|| {
            let start = self.segments.first().map(|s| s.start_ms).unwrap_or(0);
            let end = self.segments.iter().map(|s| s.end_ms).max().unwrap_or(0);
            end.saturating_sub(start)
        })
    }

    /// Speakers in order of first appearance
    pub fn derive_speakers(&self) -> Vec<String> {
        let mut speakers: Vec<String> = Vec::new();
        for segment in &self.segments {
            if !speakers.contains(&segment.speaker_id) {
                speakers.push(segment.speaker_id.clone());
            }
        }
        speakers
    }

    /// Full text of the transcript, one segment per line
    pub fn full_text(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Check the ordering and timing invariants the chunker relies on
    pub fn validate(&self) -> Result<(), String> {
        for (index, segment) in self.segments.iter().enumerate() {
            if segment.end_ms < segment.start_ms {
                return Err(format!(
                    "segment {} ends ({}ms) before it starts ({}ms)",
                    index, segment.end_ms, segment.start_ms
                ));
            }
        }
        for (index, pair) in self.segments.windows(2).enumerate() {
            if pair[1].start_ms < pair[0].start_ms {
                return Err(format!(
                    "segment {} starts at {}ms, before segment {} at {}ms",
                    index + 1,
                    pair[1].start_ms,
                    index,
                    pair[0].start_ms
                ));
            }
        }
        Ok(())
    }
}
