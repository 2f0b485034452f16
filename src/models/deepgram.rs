use serde::{Deserialize, Serialize};

/// Root response from Deepgram API
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeepgramResponse {
    #[serde(default)]
    pub metadata: Option<DeepgramMetadata>,
    pub results: DeepgramResults,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeepgramMetadata {
    /// Audio duration in seconds
    #[serde(default)]
    pub duration: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeepgramResults {
    pub channels: Vec<DeepgramChannel>,
    /// Speaker utterances, present when requested with `utterances=true`
    #[serde(default)]
    pub utterances: Option<Vec<DeepgramUtterance>>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeepgramChannel {
    pub alternatives: Vec<DeepgramAlternative>,
    #[serde(default)]
    pub detected_language: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeepgramAlternative {
    pub words: Vec<DeepgramWord>,
    #[serde(default)]
    pub transcript: Option<String>,
}

/// A single word from Deepgram with diarization info
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeepgramWord {
    /// The recognized text
    pub word: String,
    /// Start timestamp in seconds
    pub start: f64,
    /// End timestamp in seconds
    pub end: f64,
    /// Transcription accuracy score (0-1)
    pub confidence: f64,
    /// Numeric speaker identifier (absent without diarization)
    #[serde(default)]
    pub speaker: u32,
    /// Punctuated form of the word, if smart formatting was on
    #[serde(default)]
    pub punctuated_word: Option<String>,
}

impl DeepgramWord {
    /// Punctuated text when available, raw word otherwise
    pub fn display_text(&self) -> &str {
        self.punctuated_word.as_deref().unwrap_or(&self.word)
    }
}

/// A diarized utterance
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeepgramUtterance {
    pub start: f64,
    pub end: f64,
    pub transcript: String,
    #[serde(default)]
    pub speaker: u32,
    #[serde(default)]
    pub words: Vec<DeepgramWord>,
}

impl DeepgramResponse {
    /// Extract all words from the first channel's first alternative
    pub fn words(&self) -> &[DeepgramWord] {
        self.results
            .channels
            .first()
            .and_then(|c| c.alternatives.first())
            .map(|a| a.words.as_slice())
            .unwrap_or(&[])
    }

    /// Language detected on the first channel
    pub fn detected_language(&self) -> Option<&str> {
        self.results
            .channels
            .first()
            .and_then(|c| c.detected_language.as_deref())
    }
}

/// Convert Deepgram's fractional seconds to milliseconds
pub fn seconds_to_ms(seconds: f64) -> u64 {
    (seconds.max(0.0) * 1000.0).round() as u64
}
