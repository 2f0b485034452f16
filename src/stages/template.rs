use tracing::debug;

use crate::llm::coverage::count_term;
use crate::models::{TemplateChoice, TemplateKind, Transcript};

/// Weighted phrase signals per template; matched case-insensitively on word boundaries
const SIGNALS: &[(TemplateKind, &[(&str, f64)])] = &[
    (
        TemplateKind::Requirements,
        &[
            ("must", 1.0),
            ("shall", 2.0),
            ("requirement", 2.0),
            ("requirements", 2.0),
            ("deliverable", 2.0),
            ("deliverables", 2.0),
            ("acceptance criteria", 3.0),
            ("user story", 2.0),
            ("spec", 1.0),
            ("specification", 1.5),
            ("needs to support", 1.5),
            ("out of scope", 1.5),
        ],
    ),
    (
        TemplateKind::Sop,
        &[
            ("procedure", 2.0),
            ("step 1", 3.0),
            ("step one", 3.0),
            ("next step", 1.0),
            ("checklist", 2.0),
            ("runbook", 2.5),
            ("make sure you", 1.0),
            ("first you", 1.5),
            ("then you", 1.5),
            ("click", 1.0),
            ("verify that", 1.0),
        ],
    ),
    (
        TemplateKind::Brainstorm,
        &[
            ("brainstorm", 3.0),
            ("brainstorming", 3.0),
            ("idea", 1.0),
            ("ideas", 1.0),
            ("what if", 2.0),
            ("could we", 1.5),
            ("how about", 1.5),
            ("crazy idea", 2.0),
            ("blue sky", 2.0),
        ],
    ),
    (
        TemplateKind::Decision,
        &[
            ("decide", 1.5),
            ("decided", 2.0),
            ("decision", 2.0),
            ("approved", 2.0),
            ("approve", 1.5),
            ("vote", 2.0),
            ("agreed", 1.5),
            ("go with", 1.0),
            ("sign off", 1.5),
            ("trade-off", 1.0),
        ],
    ),
];

/// Score of every template for a transcript
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateScores {
    pub scores: Vec<(TemplateKind, f64)>,
}

impl TemplateScores {
    pub fn score(&self, kind: TemplateKind) -> f64 {
        self.scores
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, s)| *s)
            .unwrap_or(0.0)
    }

    /// Highest-scoring template; ties at the top and all-zero resolve to Default
    pub fn best(&self) -> TemplateKind {
        let top = self.scores.iter().map(|(_, s)| *s).fold(0.0_f64, f64::max);
        if top <= 0.0 {
            return TemplateKind::Default;
        }
        let leaders: Vec<TemplateKind> = self
            .scores
            .iter()
            .filter(|(_, s)| (*s - top).abs() < f64::EPSILON)
            .map(|(k, _)| *k)
            .collect();
        match leaders.as_slice() {
            [only] => *only,
            _ => TemplateKind::Default,
        }
    }
}

/// Score transcript text against each template's signals
pub fn score_templates(text: &str) -> TemplateScores {
    let haystack = text.to_lowercase();
    let mut scores = vec![(TemplateKind::Default, 0.0)];

    for (kind, signals) in SIGNALS {
        let score = signals
            .iter()
            .map(|(phrase, weight)| count_term(&haystack, phrase) as f64 * weight)
            .sum();
        scores.push((*kind, score));
    }

    TemplateScores { scores }
}

/// Pick the template for a job, honoring a fixed override
pub fn select_template(transcript: &Transcript, choice: TemplateChoice) -> TemplateKind {
    match choice {
        TemplateChoice::Fixed(kind) => kind,
        TemplateChoice::Auto => {
            let scores = score_templates(&transcript.full_text());
            let selected = scores.best();
            debug!("Template scores {:?}, selected {}", scores.scores, selected);
            selected
        }
    }
}
