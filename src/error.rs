//! Error types for the summarization pipeline and workflow engine.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::StageKind;

/// Whether a provider failure is worth retrying
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    /// Rate limiting, timeouts, 5xx-class failures
    Transient,
    /// Authentication failures and rejected requests
    Permanent,
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderErrorKind::Transient => write!(f, "transient"),
            ProviderErrorKind::Permanent => write!(f, "permanent"),
        }
    }
}

/// Failure reported by an LLM backend
#[derive(Debug, Clone, Error)]
#[error("{kind} provider error: {detail}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub detail: String,
    /// Server-requested delay before the next attempt, if any
    pub retry_after: Option<Duration>,
}

impl ProviderError {
    pub fn transient(detail: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::Transient,
            detail: detail.into(),
            retry_after: None,
        }
    }

    pub fn permanent(detail: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::Permanent,
            detail: detail.into(),
            retry_after: None,
        }
    }

    pub fn with_retry_after(mut self, retry_after: Option<Duration>) -> Self {
        self.retry_after = retry_after;
        self
    }

    pub fn is_transient(&self) -> bool {
        self.kind == ProviderErrorKind::Transient
    }

    /// Classify an HTTP status returned by a backend
    pub fn from_status(status: u16, body: &str) -> Self {
        let detail = format!("HTTP {} - {}", status, body);
        match status {
            408 | 409 | 425 | 429 | 500..=599 => Self::transient(detail),
            _ => Self::permanent(detail),
        }
    }
}

/// Errors raised while summarizing a transcript
#[derive(Debug, Error)]
pub enum SummarizeError {
    /// Malformed input or configuration; the job never starts
    #[error("validation error: {0}")]
    Validation(String),

    /// A chunk could not be summarized after all attempts
    #[error("chunk {sequence_index} failed: {source}")]
    Chunk {
        sequence_index: usize,
        #[source]
        source: Box<SummarizeError>,
    },

    /// Merging a section failed after all attempts
    #[error("merging section {section} failed: {source}")]
    Merge {
        section: String,
        #[source]
        source: Box<SummarizeError>,
    },

    /// A refinement pass failed after all attempts
    #[error("refinement pass {pass} failed: {source}")]
    Refine {
        pass: u32,
        #[source]
        source: Box<SummarizeError>,
    },

    /// The model answered, but not in the expected schema
    #[error("invalid model response: {0}")]
    InvalidResponse(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// A map worker task died without reporting a result
    #[error("map worker failed: {0}")]
    Worker(String),

    /// Cancellation was observed before all chunks were dispatched
    #[error("summarization cancelled")]
    Cancelled,
}

impl SummarizeError {
    /// Whether another attempt at the same call could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            SummarizeError::Provider(e) => e.is_transient(),
            SummarizeError::InvalidResponse(_) => true,
            _ => false,
        }
    }

    /// The provider failure at the root of this error, if any
    pub fn provider_error(&self) -> Option<&ProviderError> {
        match self {
            SummarizeError::Provider(e) => Some(e),
            SummarizeError::Chunk { source, .. }
            | SummarizeError::Merge { source, .. }
            | SummarizeError::Refine { source, .. } => source.provider_error(),
            _ => None,
        }
    }
}

/// Terminal failure of a workflow job
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Rejected before any stage ran
    #[error("validation error: {0}")]
    Validation(String),

    #[error("stage {stage} failed: {source}")]
    StageFailed {
        stage: StageKind,
        #[source]
        source: anyhow::Error,
    },

    #[error("job cancelled before stage {0}")]
    Cancelled(StageKind),
}

impl WorkflowError {
    /// Stage responsible for the failure, if the job got that far
    pub fn stage(&self) -> Option<StageKind> {
        match self {
            WorkflowError::Validation(_) => None,
            WorkflowError::StageFailed { stage, .. } | WorkflowError::Cancelled(stage) => {
                Some(*stage)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(ProviderError::from_status(429, "slow down").is_transient());
        assert!(ProviderError::from_status(503, "").is_transient());
        assert!(ProviderError::from_status(529, "overloaded").is_transient());
        assert!(!ProviderError::from_status(401, "bad key").is_transient());
        assert!(!ProviderError::from_status(400, "prompt is too long").is_transient());
    }

    #[test]
    fn test_provider_error_display() {
        let error = ProviderError::permanent("invalid x-api-key");
        assert_eq!(error.to_string(), "permanent provider error: invalid x-api-key");
    }

    #[test]
    fn test_retryable() {
        assert!(SummarizeError::from(ProviderError::transient("timeout")).is_retryable());
        assert!(!SummarizeError::from(ProviderError::permanent("auth")).is_retryable());
        assert!(SummarizeError::InvalidResponse("not json".into()).is_retryable());
        assert!(!SummarizeError::Validation("empty".into()).is_retryable());
    }

    #[test]
    fn test_nested_provider_error() {
        let error = SummarizeError::Chunk {
            sequence_index: 4,
            source: Box::new(SummarizeError::Provider(ProviderError::permanent("auth"))),
        };
        assert_eq!(
            error.provider_error().map(|e| e.kind),
            Some(ProviderErrorKind::Permanent)
        );
        assert!(error.to_string().starts_with("chunk 4 failed"));
    }
}
