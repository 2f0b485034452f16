use crate::models::{SectionName, TemplateKind, TranscriptChunk};

/// System prompt for the map stage (per-chunk extraction)
pub const MAP_SYSTEM_PROMPT: &str = r#"You are summarizing one chunk of a longer meeting transcript. You MUST follow these rules:

1. Report ONLY content evidenced in the transcript chunk you are given.
2. Do NOT invent participants, decisions, dates, numbers, or action items.
3. Keep speaker labels exactly as they appear in the transcript.
4. Output MUST be a single JSON object whose keys are the requested section keys and whose values are strings.
5. Use an empty string for a section with no content in this chunk.

Write compact markdown inside each value (bullets are fine). Never add keys that were not requested."#;

/// System prompt for the reduce stage (per-section merge)
pub const REDUCE_SYSTEM_PROMPT: &str = r#"You are merging partial notes of one summary section, taken from consecutive chunks of the same meeting. You MUST follow these rules:

1. Preserve every distinct fact, name, number, date, decision and action item.
2. Remove statements that repeat the same fact (adjacent chunks often overlap).
3. Where the same person appears under different labels, use one consistent label.
4. Keep chronological order where it matters.
5. Output only the merged section text in compact markdown. No preamble, no heading."#;

/// System prompt for chain-of-density refinement
pub const REFINE_SYSTEM_PROMPT: &str = r#"You are rewriting one section of a meeting summary to be denser. You MUST follow these rules:

1. Communicate the same or more information in the same or fewer words.
2. Every entity listed under "Must keep" MUST appear verbatim in your rewrite.
3. Do not add facts that are not in the current text.
4. Fuse related statements, drop filler and hedging, prefer concrete nouns.
5. Output only the rewritten section text in compact markdown. No preamble, no heading."#;

/// Build the user prompt for one chunk
pub fn build_map_prompt(chunk: &TranscriptChunk, total_chunks: usize, template: TemplateKind) -> String {
    let mut prompt = String::new();

    prompt.push_str(&format!(
        "# Chunk {} of {}\n",
        chunk.sequence_index + 1,
        total_chunks
    ));
    prompt.push_str(&format!("Template: {} ({})\n", template.label(), template.key()));
    prompt.push_str(&format!(
        "Time range: {} - {}\n\n",
        format_timestamp(chunk.start_ms()),
        format_timestamp(chunk.end_ms())
    ));

    prompt.push_str("## Sections\n");
    prompt.push_str("Return a JSON object with exactly these keys:\n");
    for section in template.sections() {
        prompt.push_str(&format!("- \"{}\": {}\n", section.key(), section.description()));
    }
    prompt.push('\n');

    prompt.push_str("## Transcript\n");
    for segment in &chunk.segments {
        prompt.push_str(&format!(
            "[{}] {}: {}\n",
            format_timestamp(segment.start_ms),
            segment.speaker_id,
            segment.text.trim()
        ));
    }
    prompt.push('\n');

    prompt.push_str("## Instructions\n");
    prompt.push_str("Extract what this chunk contributes to each section.\n");
    if total_chunks > 1 {
        prompt.push_str(
            "Other chunks are summarized separately; do not guess at what happened before or after.\n",
        );
    }
    prompt.push_str("Respond with the JSON object only.\n");

    prompt
}

/// One chunk's contribution to a section, as shown to the reducer
pub struct SectionFragment<'a> {
    pub sequence_index: usize,
    pub start_ms: u64,
    pub end_ms: u64,
    pub text: &'a str,
}

/// Build the user prompt merging one section across chunks
pub fn build_reduce_prompt(
    template: TemplateKind,
    section: SectionName,
    fragments: &[SectionFragment<'_>],
) -> String {
    let mut prompt = String::new();

    prompt.push_str(&format!("# Merge section: {}\n", section.key()));
    prompt.push_str(&format!(
        "Section: {} - {}\n",
        section.title(),
        section.description()
    ));
    prompt.push_str(&format!("Document: {}\n\n", template.label()));

    prompt.push_str("## Fragments\n");
    for fragment in fragments {
        prompt.push_str(&format!(
            "### Chunk {} ({} - {})\n{}\n\n",
            fragment.sequence_index + 1,
            format_timestamp(fragment.start_ms),
            format_timestamp(fragment.end_ms),
            fragment.text.trim()
        ));
    }

    prompt.push_str("## Instructions\n");
    prompt.push_str(&format!(
        "Merge the {} fragments above into one \"{}\" section.\n",
        fragments.len(),
        section.title()
    ));
    prompt.push_str("Deduplicate overlapping statements but keep every distinct fact.\n");

    prompt
}

/// Build the user prompt densifying one section
pub fn build_refine_prompt(
    section: SectionName,
    text: &str,
    must_keep: &[&str],
    pass: u32,
    total_passes: u32,
) -> String {
    let mut prompt = String::new();

    prompt.push_str(&format!("# Densify section: {}\n", section.key()));
    prompt.push_str(&format!("Pass {} of {}\n", pass, total_passes));
    prompt.push_str(&format!(
        "Section: {}\nCurrent length: {} characters\n\n",
        section.title(),
        text.chars().count()
    ));

    if !must_keep.is_empty() {
        prompt.push_str("## Must keep\n");
        for entity in must_keep {
            prompt.push_str(&format!("- {}\n", entity));
        }
        prompt.push('\n');
    }

    prompt.push_str("## Current text\n");
    prompt.push_str(text.trim());
    prompt.push_str("\n\n## Instructions\n");
    prompt.push_str("Rewrite the current text to be denser without dropping any entity or fact.\n");
    prompt.push_str("Do not exceed the current length.\n");

    prompt
}

/// Format milliseconds as MM:SS (minutes keep counting past the hour)
pub fn format_timestamp(ms: u64) -> String {
    let seconds = ms / 1000;
    let minutes = seconds / 60;
    let secs = seconds % 60;
    format!("{:02}:{:02}", minutes, secs)
}
