use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::models::{JobRecord, SummaryDocument};

/// Write any serializable value as pretty JSON
fn write_pretty_json<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create file: {:?}", path))?;
    serde_json::to_writer_pretty(file, value).context("Failed to write JSON")?;
    Ok(())
}

/// Write the structured summary
pub fn write_summary_json(document: &SummaryDocument, path: &Path) -> Result<()> {
    write_pretty_json(document, path)
}

/// Write a job's stage-by-stage record
pub fn write_job_record(job: &JobRecord, path: &Path) -> Result<()> {
    write_pretty_json(job, path)
}

/// Human-readable rendering of a summary document
pub struct MarkdownSummary<'a> {
    document: &'a SummaryDocument,
}

impl<'a> MarkdownSummary<'a> {
    pub fn new(document: &'a SummaryDocument) -> Self {
        Self { document }
    }

    /// Format the document as Markdown, one heading per section
    pub fn format(&self) -> String {
        let doc = self.document;
        let meta = &doc.metadata;
        let mut output = String::new();

        output.push_str(&format!("# {}\n\n", capitalize(doc.schema.label())));
        output.push_str(&format!(
            "_Generated {} with {} from {} chunks ({} tokens)_\n\n",
            meta.generated_at.format("%Y-%m-%d %H:%M UTC"),
            meta.model_used,
            meta.chunk_count,
            meta.token_usage_total
        ));

        for section in &doc.sections {
            output.push_str(&format!("## {}\n\n", section.name.title()));
            let text = section.text.trim();
            if text.is_empty() {
                output.push_str("_Nothing noted._\n\n");
            } else {
                output.push_str(text);
                output.push_str("\n\n");
            }
        }

        output
    }

    /// Write to a Markdown file
    pub fn write_file(&self, path: &Path) -> Result<()> {
        let mut file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create file: {:?}", path))?;
        write!(file, "{}", self.format())?;
        Ok(())
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
