use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::models::{seconds_to_ms, DeepgramResponse, DeepgramWord, Transcript, TranscriptSegment, Word};

/// Transcript file in the native format
#[derive(Debug, Deserialize)]
struct NativeTranscript {
    segments: Vec<TranscriptSegment>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    duration_ms: Option<u64>,
    #[serde(default)]
    speakers: Vec<String>,
}

/// Load a transcript JSON file (native or Deepgram format)
pub fn load_transcript_file(path: &Path) -> Result<Transcript> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read file: {:?}", path))?;
    parse_transcript_json(&content).with_context(|| format!("Failed to load transcript: {:?}", path))
}

/// Parse transcript JSON, detecting the format from its shape
pub fn parse_transcript_json(json: &str) -> Result<Transcript> {
    let value: serde_json::Value = serde_json::from_str(json).context("Invalid JSON")?;

    if value.get("results").is_some() {
        let response: DeepgramResponse =
            serde_json::from_value(value).context("Failed to parse Deepgram JSON")?;
        return Ok(transcript_from_deepgram(&response));
    }

    let native: NativeTranscript =
        serde_json::from_value(value).context("Failed to parse transcript JSON")?;
    let mut transcript = Transcript {
        segments: native.segments,
        language: native.language,
        duration_ms: native.duration_ms,
        speakers: native.speakers,
    };
    if transcript.speakers.is_empty() {
        transcript.speakers = transcript.derive_speakers();
    }
    Ok(transcript)
}

/// Convert a Deepgram response into a transcript.
///
/// Utterances are used when the response has them; otherwise consecutive
/// words from the same speaker are grouped into one segment.
pub fn transcript_from_deepgram(response: &DeepgramResponse) -> Transcript {
    let segments = match &response.results.utterances {
        Some(utterances) if !utterances.is_empty() => utterances
            .iter()
            .map(|u| TranscriptSegment {
                speaker_id: speaker_label(u.speaker),
                start_ms: seconds_to_ms(u.start),
                end_ms: seconds_to_ms(u.end),
                text: u.transcript.trim().to_string(),
                words: (!u.words.is_empty()).then(|| u.words.iter().map(to_word).collect()),
            })
            .collect(),
        _ => group_words(response.words()),
    };

    let mut transcript = Transcript::from_segments(segments);
    transcript.language = response.detected_language().map(str::to_string);
    transcript.duration_ms = response
        .metadata
        .as_ref()
        .and_then(|m| m.duration)
        .map(seconds_to_ms);
    transcript
}

/// Group words into speaker turns, closing a turn whenever the speaker changes
fn group_words(words: &[DeepgramWord]) -> Vec<TranscriptSegment> {
    let mut segments = Vec::new();
    let mut turn: Vec<&DeepgramWord> = Vec::new();

    for word in words {
        let speaker_changed = turn.last().is_some_and(|w| w.speaker != word.speaker);
        if speaker_changed {
            segments.push(close_turn(&turn));
            turn.clear();
        }
        turn.push(word);
    }

    if !turn.is_empty() {
        segments.push(close_turn(&turn));
    }

    segments
}

fn close_turn(turn: &[&DeepgramWord]) -> TranscriptSegment {
    let speaker = turn.first().map(|w| w.speaker).unwrap_or(0);
    let start_ms = turn.first().map(|w| seconds_to_ms(w.start)).unwrap_or(0);
    let end_ms = turn.iter().map(|w| seconds_to_ms(w.end)).max().unwrap_or(start_ms);
    let text = turn
        .iter()
        .map(|w| w.display_text())
        .collect::<Vec<_>>()
        .join(" ");

    TranscriptSegment {
        speaker_id: speaker_label(speaker),
        start_ms,
        end_ms,
        text,
        words: Some(turn.iter().map(|w| to_word(w)).collect()),
    }
}

fn to_word(word: &DeepgramWord) -> Word {
    Word {
        text: word.display_text().to_string(),
        start_ms: seconds_to_ms(word.start),
        end_ms: seconds_to_ms(word.end),
        confidence: Some(word.confidence),
    }
}

fn speaker_label(speaker: u32) -> String {
    format!("Speaker {}", speaker)
}
