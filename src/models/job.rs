use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of artifact a job starts from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    Video,
    Audio,
    Transcript,
}

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "mov", "avi", "webm", "m4v", "wmv", "flv"];
const AUDIO_EXTENSIONS: &[&str] = &["wav", "mp3", "m4a", "flac", "ogg", "opus", "aac", "wma"];
const TRANSCRIPT_EXTENSIONS: &[&str] = &["json"];

impl InputKind {
    /// Classify an input path by its extension
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        if VIDEO_EXTENSIONS.contains(&extension.as_str()) {
            Some(InputKind::Video)
        } else if AUDIO_EXTENSIONS.contains(&extension.as_str()) {
            Some(InputKind::Audio)
        } else if TRANSCRIPT_EXTENSIONS.contains(&extension.as_str()) {
            Some(InputKind::Transcript)
        } else {
            None
        }
    }

    /// Stages enabled for this input, in execution order
    pub fn stages(&self) -> &'static [StageKind] {
        match self {
            InputKind::Video => &[
                StageKind::ExtractAudio,
                StageKind::ProcessAudio,
                StageKind::Transcribe,
                StageKind::Summarize,
            ],
            InputKind::Audio => &[
                StageKind::ProcessAudio,
                StageKind::Transcribe,
                StageKind::Summarize,
            ],
            InputKind::Transcript => &[StageKind::Summarize],
        }
    }
}

/// A workflow stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    ExtractAudio,
    ProcessAudio,
    Transcribe,
    Summarize,
}

impl StageKind {
    pub fn name(&self) -> &'static str {
        match self {
            StageKind::ExtractAudio => "extract-audio",
            StageKind::ProcessAudio => "process-audio",
            StageKind::Transcribe => "transcribe",
            StageKind::Summarize => "summarize",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Status of a single stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StageStatus::Pending => "pending",
            StageStatus::Running => "running",
            StageStatus::Succeeded => "succeeded",
            StageStatus::Failed => "failed",
            StageStatus::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// Status of a whole job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "stage")]
pub enum JobStatus {
    Pending,
    Running(StageKind),
    Succeeded,
    Failed(StageKind),
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed(_) | JobStatus::Cancelled
        )
    }
}

/// Progress of one stage within a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: StageKind,
    pub status: StageStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

/// Stage-by-stage record of a job; owned by the workflow engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: String,
    pub input_path: PathBuf,
    pub input_kind: InputKind,
    pub status: JobStatus,
    pub stages: Vec<StageRecord>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl JobRecord {
    pub fn new(input_path: impl Into<PathBuf>, input_kind: InputKind) -> Self {
        Self {
            job_id: uuid::Uuid::new_v4().to_string(),
            input_path: input_path.into(),
            input_kind,
            status: JobStatus::Pending,
            stages: input_kind
                .stages()
                .iter()
                .map(|&stage| StageRecord {
                    stage,
                    status: StageStatus::Pending,
                    started_at: None,
                    finished_at: None,
                    error: None,
                })
                .collect(),
            created_at: Utc::now(),
            finished_at: None,
            error: None,
        }
    }

    pub fn total_stages(&self) -> usize {
        self.stages.len()
    }

    /// Number of stages that finished successfully
    pub fn completed_stages(&self) -> usize {
        self.stages
            .iter()
            .filter(|s| s.status == StageStatus::Succeeded)
            .count()
    }

    pub fn stage(&self, stage: StageKind) -> Option<&StageRecord> {
        self.stages.iter().find(|s| s.stage == stage)
    }

    pub(crate) fn stage_mut(&mut self, stage: StageKind) -> Option<&mut StageRecord> {
        self.stages.iter_mut().find(|s| s.stage == stage)
    }
}

/// Progress notification emitted after each stage transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub completed_stage_count: usize,
    pub total_stage_count: usize,
    pub stage_name: String,
    pub status: StageStatus,
}
