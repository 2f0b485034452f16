use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::SummarizeError;
use crate::llm::{
    build_refine_prompt, parse_section_text, CoverageFingerprint, GenerateRequest, LlmProvider,
    RetryPolicy, TokenMeter, REFINE_SYSTEM_PROMPT,
};
use crate::models::{RefinementStats, SectionName, SummaryDocument};

/// Configuration for the chain-of-density refiner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefineConfig {
    /// Densification passes; zero disables refinement
    pub passes: u32,
    pub max_output_tokens: u32,
    pub temperature: Option<f64>,
}

impl Default for RefineConfig {
    fn default() -> Self {
        Self {
            passes: 2,
            max_output_tokens: 2_048,
            temperature: Some(0.3),
        }
    }
}

/// Result of refinement
#[derive(Debug)]
pub struct RefineResult {
    pub document: SummaryDocument,
    pub stats: RefinementStats,
}

/// Verdict on one candidate draft
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    Accepted,
    /// Entities of the prior draft that the candidate dropped
    CoverageRegressionRejected { missing: Vec<String> },
}

/// Execute chain-of-density refinement.
///
/// Each pass rewrites every non-empty section, then compares the coverage
/// fingerprint of the whole candidate with that of the current draft. A
/// candidate that lost any entity is discarded and the current draft carries
/// over to the next pass. Rejected passes still count toward the total.
pub async fn execute_refine(
    provider: &Arc<dyn LlmProvider>,
    document: SummaryDocument,
    config: &RefineConfig,
    retry: &RetryPolicy,
    meter: &TokenMeter,
) -> Result<RefineResult, SummarizeError> {
    let mut stats = RefinementStats::default();
    let mut current = document;

    if config.passes == 0 || current.is_blank() {
        debug!("Refine: nothing to do");
        return Ok(RefineResult {
            document: current,
            stats,
        });
    }

    info!("Refine: running {} densification passes", config.passes);

    for pass in 1..=config.passes {
        let candidate = densify(provider, &current, pass, config, retry, meter)
            .await
            .map_err(|e| SummarizeError::Refine {
                pass,
                source: Box::new(e),
            })?;

        stats.passes_run += 1;
        match check_coverage(&current, &candidate) {
            PassOutcome::Accepted => {
                debug!(
                    "Pass {}: accepted ({} -> {} chars)",
                    pass,
                    current.full_text().chars().count(),
                    candidate.full_text().chars().count()
                );
                stats.passes_accepted += 1;
                current = candidate;
            }
            PassOutcome::CoverageRegressionRejected { missing } => {
                warn!(
                    "Pass {}: coverage regression, keeping prior draft (dropped: {})",
                    pass,
                    missing.join(", ")
                );
                stats.passes_rejected += 1;
            }
        }
    }

    info!(
        "Refine: {} of {} passes accepted",
        stats.passes_accepted, stats.passes_run
    );

    current.metadata.refinement = stats;
    Ok(RefineResult {
        document: current,
        stats,
    })
}

/// Compare a candidate draft against the draft it would replace
pub fn check_coverage(prior: &SummaryDocument, candidate: &SummaryDocument) -> PassOutcome {
    let fingerprint = CoverageFingerprint::extract(&prior.full_text());
    let missing = fingerprint.missing_in(&candidate.full_text());
    if missing.is_empty() {
        PassOutcome::Accepted
    } else {
        PassOutcome::CoverageRegressionRejected { missing }
    }
}

/// Produce one candidate draft by rewriting every non-empty section
async fn densify(
    provider: &Arc<dyn LlmProvider>,
    current: &SummaryDocument,
    pass: u32,
    config: &RefineConfig,
    retry: &RetryPolicy,
    meter: &TokenMeter,
) -> Result<SummaryDocument, SummarizeError> {
    let mut candidate = current.clone();

    for section in &current.sections {
        if section.text.trim().is_empty() {
            continue;
        }
        let text =
            rewrite_section(provider, section.name, &section.text, pass, config, retry, meter)
                .await?;
        candidate.set_section_text(section.name, text);
    }

    Ok(candidate)
}

async fn rewrite_section(
    provider: &Arc<dyn LlmProvider>,
    section: SectionName,
    text: &str,
    pass: u32,
    config: &RefineConfig,
    retry: &RetryPolicy,
    meter: &TokenMeter,
) -> Result<String, SummarizeError> {
    let fingerprint = CoverageFingerprint::extract(text);
    let request = GenerateRequest {
        system: REFINE_SYSTEM_PROMPT.to_string(),
        prompt: build_refine_prompt(section, text, &fingerprint.checklist(), pass, config.passes),
        max_output_tokens: config.max_output_tokens,
        temperature: config.temperature,
    };
    let request = &request;
    let label = format!("refine {} pass {}", section, pass);

    retry
        .run(&label, |_attempt| async move {
            let generation = provider.generate(request).await?;
            meter.record(generation.tokens_used);
            parse_section_text(&generation.text)
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::llm::mock::{current_text, reply, ScriptedProvider};
    use crate::models::TemplateKind;
    use std::time::Duration;

    fn draft() -> SummaryDocument {
        let mut doc = SummaryDocument::empty(TemplateKind::Default, "scripted-model");
        doc.set_section_text(
            SectionName::Summary,
            "The team met and discussed that Alice will own the Q3 budget which is due on 2025-11-01.",
        );
        doc.set_section_text(SectionName::ActionItems, "- Bob drafts the hiring plan");
        doc
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::new(2, Duration::from_millis(1), Duration::from_millis(2))
    }

    async fn refine(
        provider: Arc<dyn LlmProvider>,
        passes: u32,
    ) -> Result<RefineResult, SummarizeError> {
        let config = RefineConfig {
            passes,
            ..Default::default()
        };
        execute_refine(&provider, draft(), &config, &fast_retry(), &TokenMeter::new()).await
    }

    #[tokio::test]
    async fn test_denser_rewrite_is_accepted() {
        let provider = Arc::new(ScriptedProvider::new(|request, _| {
            let text = current_text(&request.prompt).unwrap();
            reply(text.replace("The team met and discussed that ", "").replace(" which is", ""))
        }));

        let result = refine(provider.clone(), 1).await.unwrap();

        assert_eq!(provider.calls(), 2);
        assert_eq!(result.stats.passes_accepted, 1);
        assert_eq!(
            result.document.section(SectionName::Summary),
            Some("Alice will own the Q3 budget due on 2025-11-01.")
        );
        assert_eq!(result.document.metadata.refinement, result.stats);
    }

    #[tokio::test]
    async fn test_entity_loss_rejects_pass() {
        // Drops one entity per call
        let provider = Arc::new(ScriptedProvider::new(|request, _| {
            let text = current_text(&request.prompt).unwrap();
            reply(text.replace("Alice ", "").replace("Bob ", ""))
        }));

        let result = refine(provider, 3).await.unwrap();

        assert_eq!(
            result.stats,
            RefinementStats {
                passes_run: 3,
                passes_accepted: 0,
                passes_rejected: 3,
            }
        );
        assert_eq!(result.document.sections, draft().sections);
        for entity in ["Alice", "Q3", "2025-11-01"] {
            assert!(result.document.full_text().contains(entity));
        }
    }

    #[tokio::test]
    async fn test_changed_figure_phrase_rejects_pass() {
        let provider = Arc::new(ScriptedProvider::new(|request, _| {
            let text = current_text(&request.prompt).unwrap();
            reply(text.replace("Q3 budget", "Q3 hiring"))
        }));

        let result = refine(provider, 2).await.unwrap();

        assert_eq!(result.stats.passes_accepted, 0);
        assert_eq!(result.stats.passes_rejected, 2);
        assert!(result.document.full_text().contains("Q3 budget"));
    }

    #[test]
    fn test_check_coverage_keeps_qualified_figures() {
        let mut prior = SummaryDocument::empty(TemplateKind::Default, "m");
        prior.set_section_text(SectionName::Summary, "Alice owns the Q3 budget, due 2025-11-01.");
        let mut candidate = prior.clone();
        candidate.set_section_text(SectionName::Summary, "Alice owns Q3 hiring, due 2025-11-01.");

        assert_eq!(
            check_coverage(&prior, &candidate),
            PassOutcome::CoverageRegressionRejected {
                missing: vec!["Q3 budget".to_string()]
            }
        );

        candidate.set_section_text(SectionName::Summary, "Alice: Q3 budget, due 2025-11-01.");
        assert_eq!(check_coverage(&prior, &candidate), PassOutcome::Accepted);
    }

    #[tokio::test]
    async fn test_empty_sections_are_not_sent() {
        let provider = Arc::new(ScriptedProvider::new(|request, _| {
            reply(current_text(&request.prompt).unwrap().to_string())
        }));

        refine(provider.clone(), 1).await.unwrap();

        // Only summary and action_items carry text
        assert_eq!(provider.calls(), 2);
        for request in provider.requests() {
            assert_eq!(request.system, REFINE_SYSTEM_PROMPT);
        }
        assert!(provider.requests()[0].prompt.contains("- Alice\n"));
    }

    #[tokio::test]
    async fn test_blank_document_skips_refinement() {
        let provider = Arc::new(ScriptedProvider::new(|_, _| reply("unused")));
        let dyn_provider: Arc<dyn LlmProvider> = provider.clone();
        let doc = SummaryDocument::empty(TemplateKind::Sop, "m");

        let result = execute_refine(
            &dyn_provider,
            doc,
            &RefineConfig::default(),
            &fast_retry(),
            &TokenMeter::new(),
        )
        .await
        .unwrap();

        assert_eq!(provider.calls(), 0);
        assert_eq!(result.stats.passes_run, 0);
    }

    #[tokio::test]
    async fn test_provider_failure_names_the_pass() {
        let provider = Arc::new(ScriptedProvider::new(|_, _| {
            Err(ProviderError::transient("HTTP 529 - overloaded"))
        }));

        let error = refine(provider.clone(), 2).await.unwrap_err();

        assert!(matches!(error, SummarizeError::Refine { pass: 1, .. }));
        // Two attempts on the first section, then escalation
        assert_eq!(provider.calls(), 2);
    }
}
