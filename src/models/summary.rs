use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

/// Named section of a summary - restricted enum so model output can be validated
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionName {
    Summary,
    KeyPoints,
    Decisions,
    ActionItems,
    OpenQuestions,
    Purpose,
    Prerequisites,
    Procedure,
    Warnings,
    Verification,
    Context,
    Options,
    Rationale,
    Goal,
    Ideas,
    Themes,
    NextSteps,
    Background,
    FunctionalRequirements,
    NonFunctionalRequirements,
    Constraints,
    Deliverables,
}

impl SectionName {
    /// Machine key used in model payloads and JSON output
    pub fn key(&self) -> &'static str {
        match self {
            SectionName::Summary => "summary",
            SectionName::KeyPoints => "key_points",
            SectionName::Decisions => "decisions",
            SectionName::ActionItems => "action_items",
            SectionName::OpenQuestions => "open_questions",
            SectionName::Purpose => "purpose",
            SectionName::Prerequisites => "prerequisites",
            SectionName::Procedure => "procedure",
            SectionName::Warnings => "warnings",
            SectionName::Verification => "verification",
            SectionName::Context => "context",
            SectionName::Options => "options",
            SectionName::Rationale => "rationale",
            SectionName::Goal => "goal",
            SectionName::Ideas => "ideas",
            SectionName::Themes => "themes",
            SectionName::NextSteps => "next_steps",
            SectionName::Background => "background",
            SectionName::FunctionalRequirements => "functional_requirements",
            SectionName::NonFunctionalRequirements => "non_functional_requirements",
            SectionName::Constraints => "constraints",
            SectionName::Deliverables => "deliverables",
        }
    }

    /// Human-readable heading
    pub fn title(&self) -> &'static str {
        match self {
            SectionName::Summary => "Summary",
            SectionName::KeyPoints => "Key Points",
            SectionName::Decisions => "Decisions",
            SectionName::ActionItems => "Action Items",
            SectionName::OpenQuestions => "Open Questions",
            SectionName::Purpose => "Purpose",
            SectionName::Prerequisites => "Prerequisites",
            SectionName::Procedure => "Procedure",
            SectionName::Warnings => "Warnings",
            SectionName::Verification => "Verification",
            SectionName::Context => "Context",
            SectionName::Options => "Options Considered",
            SectionName::Rationale => "Rationale",
            SectionName::Goal => "Goal",
            SectionName::Ideas => "Ideas",
            SectionName::Themes => "Themes",
            SectionName::NextSteps => "Next Steps",
            SectionName::Background => "Background",
            SectionName::FunctionalRequirements => "Functional Requirements",
            SectionName::NonFunctionalRequirements => "Non-Functional Requirements",
            SectionName::Constraints => "Constraints",
            SectionName::Deliverables => "Deliverables",
        }
    }

    /// What belongs in this section, phrased for the model
    pub fn description(&self) -> &'static str {
        match self {
            SectionName::Summary => "a short narrative of what was discussed",
            SectionName::KeyPoints => "the most important statements and facts, as bullets",
            SectionName::Decisions => "decisions that were made, with who made them",
            SectionName::ActionItems => "tasks with owner and due date when stated",
            SectionName::OpenQuestions => "questions raised but not resolved",
            SectionName::Purpose => "what the procedure achieves and when it applies",
            SectionName::Prerequisites => "tools, access, or conditions needed before starting",
            SectionName::Procedure => "the ordered steps, numbered",
            SectionName::Warnings => "cautions, failure modes, and things not to do",
            SectionName::Verification => "how to confirm the procedure succeeded",
            SectionName::Context => "the problem or situation requiring a decision",
            SectionName::Options => "alternatives that were considered, with trade-offs",
            SectionName::Rationale => "the reasons given for the chosen option",
            SectionName::Goal => "the problem or opportunity being explored",
            SectionName::Ideas => "every distinct idea proposed, with who proposed it",
            SectionName::Themes => "recurring themes or clusters among the ideas",
            SectionName::NextSteps => "follow-ups agreed for promising ideas",
            SectionName::Background => "the context and stakeholders of the requirements",
            SectionName::FunctionalRequirements => "what the system or deliverable must do",
            SectionName::NonFunctionalRequirements => {
                "performance, security, reliability and similar qualities"
            }
            SectionName::Constraints => "budget, schedule, technology, or policy limits",
            SectionName::Deliverables => "artifacts to be delivered, with dates when stated",
        }
    }
}

impl fmt::Display for SectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Output schema of a summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKind {
    Default,
    Sop,
    Decision,
    Brainstorm,
    Requirements,
}

impl TemplateKind {
    pub const ALL: [TemplateKind; 5] = [
        TemplateKind::Default,
        TemplateKind::Sop,
        TemplateKind::Decision,
        TemplateKind::Brainstorm,
        TemplateKind::Requirements,
    ];

    /// Canonical section order for this schema
    pub fn sections(&self) -> &'static [SectionName] {
        use SectionName::*;
        match self {
            TemplateKind::Default => &[Summary, KeyPoints, Decisions, ActionItems, OpenQuestions],
            TemplateKind::Sop => &[Purpose, Prerequisites, Procedure, Warnings, Verification],
            TemplateKind::Decision => &[Context, Options, Decisions, Rationale, ActionItems],
            TemplateKind::Brainstorm => &[Goal, Ideas, Themes, NextSteps],
            TemplateKind::Requirements => &[
                Background,
                FunctionalRequirements,
                NonFunctionalRequirements,
                Constraints,
                Deliverables,
                OpenQuestions,
            ],
        }
    }

    pub fn has_section(&self, section: SectionName) -> bool {
        self.sections().contains(&section)
    }

    /// Look up a section of this schema by its payload key
    pub fn section_by_key(&self, key: &str) -> Option<SectionName> {
        self.sections().iter().copied().find(|s| s.key() == key)
    }

    pub fn key(&self) -> &'static str {
        match self {
            TemplateKind::Default => "default",
            TemplateKind::Sop => "sop",
            TemplateKind::Decision => "decision",
            TemplateKind::Brainstorm => "brainstorm",
            TemplateKind::Requirements => "requirements",
        }
    }

    /// How the meeting is described to the model
    pub fn label(&self) -> &'static str {
        match self {
            TemplateKind::Default => "general meeting summary",
            TemplateKind::Sop => "standard operating procedure",
            TemplateKind::Decision => "decision record",
            TemplateKind::Brainstorm => "brainstorming session summary",
            TemplateKind::Requirements => "requirements document",
        }
    }
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

impl FromStr for TemplateKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        TemplateKind::ALL
            .into_iter()
            .find(|kind| kind.key() == normalized)
            .ok_or_else(|| {
                format!(
                    "unsupported template '{}' (expected auto, default, sop, decision, brainstorm or requirements)",
                    s
                )
            })
    }
}

/// Template override from configuration: detect automatically or force a schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TemplateChoice {
    #[default]
    Auto,
    Fixed(TemplateKind),
}

impl FromStr for TemplateChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("auto") {
            Ok(TemplateChoice::Auto)
        } else {
            s.parse().map(TemplateChoice::Fixed)
        }
    }
}

impl TryFrom<String> for TemplateChoice {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TemplateChoice> for String {
    fn from(choice: TemplateChoice) -> Self {
        match choice {
            TemplateChoice::Auto => "auto".to_string(),
            TemplateChoice::Fixed(kind) => kind.key().to_string(),
        }
    }
}

/// Section texts produced for one chunk by the map stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialSummary {
    /// Mirrors the originating chunk's index
    pub sequence_index: usize,
    /// Section texts; sections without evidence in the chunk are absent
    pub sections: BTreeMap<SectionName, String>,
    /// Tokens billed for producing this partial
    pub tokens_used: u64,
}

impl PartialSummary {
    /// Text for a section, if this chunk contributed any
    pub fn section(&self, name: SectionName) -> Option<&str> {
        self.sections
            .get(&name)
            .map(|s| s.as_str())
            .filter(|s| !s.trim().is_empty())
    }
}

/// One populated section of a summary document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub name: SectionName,
    pub text: String,
}

/// Outcome counters of the refinement stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefinementStats {
    pub passes_run: u32,
    pub passes_accepted: u32,
    pub passes_rejected: u32,
}

/// Metadata attached to a finished summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryMetadata {
    pub schema: TemplateKind,
    pub model_used: String,
    pub token_usage_total: u64,
    pub chunk_count: usize,
    pub refinement: RefinementStats,
    pub generated_at: DateTime<Utc>,
}

/// The structured summary of a transcript
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryDocument {
    pub schema: TemplateKind,
    /// Sections in the schema's canonical order
    #[serde(serialize_with = "serialize_sections")]
    pub sections: Vec<Section>,
    pub metadata: SummaryMetadata,
}

impl SummaryDocument {
    /// A document with every section of the schema present and empty
    pub fn empty(schema: TemplateKind, model_used: impl Into<String>) -> Self {
        Self {
            schema,
            sections: schema
                .sections()
                .iter()
                .map(|&name| Section {
                    name,
                    text: String::new(),
                })
                .collect(),
            metadata: SummaryMetadata {
                schema,
                model_used: model_used.into(),
                token_usage_total: 0,
                chunk_count: 0,
                refinement: RefinementStats::default(),
                generated_at: Utc::now(),
            },
        }
    }

    /// Get a section's text by name
    pub fn section(&self, name: SectionName) -> Option<&str> {
        self.sections
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.text.as_str())
    }

    /// Replace the text of an existing section; sections are never added
    pub fn set_section_text(&mut self, name: SectionName, text: impl Into<String>) -> bool {
        match self.sections.iter_mut().find(|s| s.name == name) {
            Some(section) => {
                section.text = text.into();
                true
            }
            None => false,
        }
    }

    /// Section names in document order
    pub fn section_names(&self) -> Vec<SectionName> {
        self.sections.iter().map(|s| s.name).collect()
    }

    /// Whether every section is blank
    pub fn is_blank(&self) -> bool {
        self.sections.iter().all(|s| s.text.trim().is_empty())
    }

    /// All section texts joined, for fingerprinting and length checks
    pub fn full_text(&self) -> String {
        self.sections
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Serialize sections as an object keyed by section key, preserving order
fn serialize_sections<S: Serializer>(sections: &[Section], serializer: S) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(sections.len()))?;
    for section in sections {
        map.serialize_entry(section.name.key(), &section.text)?;
    }
    map.end()
}
