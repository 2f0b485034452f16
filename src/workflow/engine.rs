use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::Utc;
use tracing::{info, warn};

use crate::cancel::CancellationFlag;
use crate::config::WorkflowConfig;
use crate::error::{SummarizeError, WorkflowError};
use crate::io::load_transcript_file;
use crate::models::{
    InputKind, JobRecord, JobStatus, ProgressEvent, StageKind, StageStatus, SummaryDocument,
    Transcript,
};
use crate::workflow::{AudioProcessor, Summarizer, Transcriber};

/// Receives a progress event after every stage transition
pub type ProgressCallback = Arc<dyn Fn(&ProgressEvent) + Send + Sync>;

/// Output of one stage, fed to the next
enum Artifact {
    Media(PathBuf),
    TranscriptFile(PathBuf),
    Transcript(Transcript),
    Summary(SummaryDocument),
}

/// Runs the stages a job's input calls for, strictly in sequence
pub struct WorkflowEngine {
    audio: Arc<dyn AudioProcessor>,
    transcriber: Arc<dyn Transcriber>,
    summarizer: Arc<dyn Summarizer>,
    config: WorkflowConfig,
    progress: Option<ProgressCallback>,
}

impl WorkflowEngine {
    pub fn new(
        audio: Arc<dyn AudioProcessor>,
        transcriber: Arc<dyn Transcriber>,
        summarizer: Arc<dyn Summarizer>,
        config: WorkflowConfig,
    ) -> Self {
        Self {
            audio,
            transcriber,
            summarizer,
            config,
            progress: None,
        }
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Validate an input and create its job record.
    ///
    /// Transcript inputs are loaded and checked here, so a malformed file is
    /// rejected before any stage runs.
    pub fn create_job(&self, input: &Path) -> Result<JobRecord, WorkflowError> {
        self.config.validate().map_err(WorkflowError::Validation)?;

        let kind = InputKind::from_path(input).ok_or_else(|| {
            WorkflowError::Validation(format!("unsupported input type: {:?}", input))
        })?;

        if kind == InputKind::Transcript {
            let transcript = load_transcript_file(input)
                .map_err(|e| WorkflowError::Validation(format!("{:#}", e)))?;
            transcript.validate().map_err(|problem| {
                WorkflowError::Validation(format!("malformed transcript {:?}: {}", input, problem))
            })?;
        }

        let job = JobRecord::new(input, kind);
        info!(
            "Job {}: {:?} input, stages [{}]",
            job.job_id,
            kind,
            kind.stages()
                .iter()
                .map(|s| s.name())
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(job)
    }

    /// Run every pending stage of `job`, updating it as stages progress.
    ///
    /// The cancellation flag is checked before each stage; once it is set no
    /// further stage starts and the job ends `Cancelled`.
    pub async fn execute(
        &self,
        job: &mut JobRecord,
        cancel: &CancellationFlag,
    ) -> Result<SummaryDocument, WorkflowError> {
        let mut artifact = match job.input_kind {
            InputKind::Video | InputKind::Audio => Artifact::Media(job.input_path.clone()),
            InputKind::Transcript => Artifact::TranscriptFile(job.input_path.clone()),
        };
        let mut intermediates = Vec::new();

        let outcome = self
            .run_stages(job, cancel, &mut artifact, &mut intermediates)
            .await;

        if !self.config.keep_intermediate {
            remove_intermediates(&intermediates).await;
        }

        job.finished_at = Some(Utc::now());
        match outcome {
            Ok(()) => match artifact {
                Artifact::Summary(document) => {
                    job.status = JobStatus::Succeeded;
                    info!("Job {}: succeeded", job.job_id);
                    Ok(document)
                }
                _ => {
                    let stage = StageKind::Summarize;
                    let error = WorkflowError::StageFailed {
                        stage,
                        source: anyhow::anyhow!("job produced no summary"),
                    };
                    job.status = JobStatus::Failed(stage);
                    job.error = Some(error.to_string());
                    Err(error)
                }
            },
            Err(error) => {
                job.error = Some(error.to_string());
                Err(error)
            }
        }
    }

    async fn run_stages(
        &self,
        job: &mut JobRecord,
        cancel: &CancellationFlag,
        artifact: &mut Artifact,
        intermediates: &mut Vec<PathBuf>,
    ) -> Result<(), WorkflowError> {
        for &stage in job.input_kind.stages() {
            if cancel.is_cancelled() {
                self.cancel_remaining(job, stage);
                return Err(WorkflowError::Cancelled(stage));
            }

            self.transition(job, stage, StageStatus::Running, None);
            job.status = JobStatus::Running(stage);
            info!("Job {}: stage {} started", job.job_id, stage);

            let input = std::mem::replace(artifact, Artifact::Media(PathBuf::new()));
            match self.run_stage(stage, input, cancel).await {
                Ok(output) => {
                    if let Artifact::Media(path) = &output {
                        if path != &job.input_path {
                            intermediates.push(path.clone());
                        }
                    }
                    *artifact = output;
                    self.transition(job, stage, StageStatus::Succeeded, None);
                    info!("Job {}: stage {} succeeded", job.job_id, stage);
                }
                Err(e) if is_cancellation(&e) => {
                    info!("Job {}: cancelled during {}", job.job_id, stage);
                    self.cancel_remaining(job, stage);
                    return Err(WorkflowError::Cancelled(stage));
                }
                Err(e) => {
                    warn!("Job {}: stage {} failed: {:#}", job.job_id, stage, e);
                    self.transition(job, stage, StageStatus::Failed, Some(format!("{:#}", e)));
                    job.status = JobStatus::Failed(stage);
                    return Err(WorkflowError::StageFailed { stage, source: e });
                }
            }
        }
        Ok(())
    }

    async fn run_stage(
        &self,
        stage: StageKind,
        input: Artifact,
        cancel: &CancellationFlag,
    ) -> Result<Artifact> {
        let settings = &self.config.audio;
        match (stage, input) {
            (StageKind::ExtractAudio, Artifact::Media(video)) => {
                let audio = self.audio.extract_audio(&video, settings).await?;
                Ok(Artifact::Media(audio))
            }
            (StageKind::ProcessAudio, Artifact::Media(audio)) => {
                let processed = self.audio.process_audio(&audio, settings).await?;
                Ok(Artifact::Media(processed))
            }
            (StageKind::Transcribe, Artifact::Media(audio)) => {
                let transcript = self
                    .transcriber
                    .transcribe(&audio, self.config.language.as_deref())
                    .await?;
                info!(
                    "Transcribed {} segments from {} speakers",
                    transcript.segments.len(),
                    transcript.speakers.len()
                );
                Ok(Artifact::Transcript(transcript))
            }
            (StageKind::Summarize, Artifact::TranscriptFile(path)) => {
                let transcript = load_transcript_file(&path)?;
                let document = self.summarizer.summarize(&transcript, cancel).await?;
                Ok(Artifact::Summary(document))
            }
            (StageKind::Summarize, Artifact::Transcript(transcript)) => {
                let document = self.summarizer.summarize(&transcript, cancel).await?;
                Ok(Artifact::Summary(document))
            }
            (stage, _) => bail!("stage {} received an input it cannot handle", stage),
        }
    }

    /// Mark `from` and every later pending stage cancelled
    fn cancel_remaining(&self, job: &mut JobRecord, from: StageKind) {
        let stages: Vec<StageKind> = job
            .stages
            .iter()
            .skip_while(|s| s.stage != from)
            .filter(|s| matches!(s.status, StageStatus::Pending | StageStatus::Running))
            .map(|s| s.stage)
            .collect();

        job.status = JobStatus::Cancelled;
        for stage in stages {
            self.transition(job, stage, StageStatus::Cancelled, None);
        }
        info!("Job {}: cancelled before {}", job.job_id, from);
    }

    fn transition(
        &self,
        job: &mut JobRecord,
        stage: StageKind,
        status: StageStatus,
        error: Option<String>,
    ) {
        let now = Utc::now();
        if let Some(record) = job.stage_mut(stage) {
            record.status = status;
            match status {
                StageStatus::Running => record.started_at = Some(now),
                StageStatus::Pending => {}
                _ => record.finished_at = Some(now),
            }
            if error.is_some() {
                record.error = error;
            }
        }

        if let Some(callback) = &self.progress {
            callback(&ProgressEvent {
                completed_stage_count: job.completed_stages(),
                total_stage_count: job.total_stages(),
                stage_name: stage.name().to_string(),
                status,
            });
        }
    }
}

fn is_cancellation(error: &anyhow::Error) -> bool {
    matches!(
        error.downcast_ref::<SummarizeError>(),
        Some(SummarizeError::Cancelled)
    )
}

async fn remove_intermediates(paths: &[PathBuf]) {
    for path in paths {
        if let Err(e) = tokio::fs::remove_file(path).await {
            warn!("Could not remove intermediate file {:?}: {}", path, e);
        }
    }
}
