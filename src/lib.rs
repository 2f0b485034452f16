pub mod cancel;
pub mod config;
pub mod error;
pub mod io;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod stages;
pub mod workflow;

pub use cancel::CancellationFlag;
pub use config::{AudioQuality, AudioSettings, WorkflowConfig};
pub use error::{ProviderError, ProviderErrorKind, SummarizeError, WorkflowError};
pub use io::{
    load_transcript_file, parse_transcript_json, write_job_record, write_summary_json,
    DeepgramConfig, DeepgramTranscriber, FfmpegAudioProcessor, MarkdownSummary,
};
pub use llm::{build_provider, GenerateRequest, Generation, LlmProvider, ProviderKind, RetryPolicy};
pub use models::{
    JobRecord, JobStatus, ProgressEvent, SectionName, StageKind, StageStatus, SummaryDocument,
    TemplateChoice, TemplateKind, Transcript, TranscriptSegment,
};
pub use pipeline::SummarizationPipeline;
pub use stages::{chunk_transcript, score_templates, select_template};
pub use workflow::{AudioProcessor, ProgressCallback, Summarizer, Transcriber, WorkflowEngine};
