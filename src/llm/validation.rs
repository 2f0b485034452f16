use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::SummarizeError;
use crate::models::{SectionName, TemplateKind};

/// Parse and validate a map-stage reply against the template's sections.
///
/// The reply must be a JSON object (optionally wrapped in a code fence or
/// surrounded by prose). Keys must be section keys of `template`; values must be
/// strings or arrays of strings. Missing or blank sections are omitted.
pub fn parse_section_payload(
    reply: &str,
    template: TemplateKind,
) -> Result<BTreeMap<SectionName, String>, SummarizeError> {
    let json = extract_json_object(reply).ok_or_else(|| {
        SummarizeError::InvalidResponse(format!("no JSON object in reply: {}", preview(reply)))
    })?;

    let value: Value = serde_json::from_str(json)
        .map_err(|e| SummarizeError::InvalidResponse(format!("malformed JSON: {}", e)))?;

    let Value::Object(map) = value else {
        return Err(SummarizeError::InvalidResponse(
            "reply is not a JSON object".to_string(),
        ));
    };

    let mut errors = Vec::new();
    let mut sections = BTreeMap::new();

    for (key, value) in map {
        let Some(section) = template.section_by_key(&key) else {
            errors.push(format!("unexpected section \"{}\" for {} template", key, template));
            continue;
        };

        let text = match value {
            Value::String(s) => s,
            Value::Null => String::new(),
            Value::Array(items) => match join_string_items(&items) {
                Some(text) => text,
                None => {
                    errors.push(format!("section \"{}\" contains non-text items", key));
                    continue;
                }
            },
            other => {
                errors.push(format!("section \"{}\" is not text: {}", key, other));
                continue;
            }
        };

        let text = text.trim();
        if !text.is_empty() {
            sections.insert(section, text.to_string());
        }
    }

    if errors.is_empty() {
        Ok(sections)
    } else {
        Err(SummarizeError::InvalidResponse(errors.join("; ")))
    }
}

/// Clean up a free-text section reply (reduce and refine stages)
pub fn parse_section_text(reply: &str) -> Result<String, SummarizeError> {
    let text = strip_code_fence(reply.trim()).trim();
    if text.is_empty() {
        return Err(SummarizeError::InvalidResponse("empty section text".to_string()));
    }
    Ok(text.to_string())
}

/// Array items rendered as a bullet list
fn join_string_items(items: &[Value]) -> Option<String> {
    let mut lines = Vec::with_capacity(items.len());
    for item in items {
        let text = item.as_str()?.trim();
        if !text.is_empty() {
            if text.starts_with("- ") || text.starts_with("* ") {
                lines.push(text.to_string());
            } else {
                lines.push(format!("- {}", text));
            }
        }
    }
    Some(lines.join("\n"))
}

/// Slice from the first `{` to the last `}`
fn extract_json_object(reply: &str) -> Option<&str> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    (end > start).then(|| &reply[start..=end])
}

/// Remove a surrounding ``` fence, if the whole reply is fenced
fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return text;
    };
    // Drop an info string such as "markdown" on the opening line
    match body.find('\n') {
        Some(newline) if !body[..newline].contains(' ') => &body[newline + 1..],
        _ => body,
    }
}

fn preview(text: &str) -> String {
    let mut preview: String = text.chars().take(80).collect();
    if text.chars().count() > 80 {
        preview.push_str("...");
    }
    preview
}
