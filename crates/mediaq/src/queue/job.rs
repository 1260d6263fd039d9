use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which converter a job runs through. Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Image,
    Video,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Image => "image",
            JobKind::Video => "video",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state. Mirrors the directory the record lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// Name of the queue directory holding records in this state.
    pub fn directory_name(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "done",
            JobStatus::Failed => "failed",
        }
    }
}

/// Dimensions and timing of a converted file. Images leave everything unset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fps: Option<u32>,
}

impl MediaMeta {
    pub fn is_empty(&self) -> bool {
        self.width.is_none() && self.height.is_none() && self.duration.is_none() && self.fps.is_none()
    }
}

/// Outcome of a successful conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionResult {
    pub success: bool,
    pub size: u64,
    pub mime: String,
    pub ext: String,
    #[serde(default)]
    pub meta: MediaMeta,
}

impl ConversionResult {
    pub fn new(size: u64, mime: &str, ext: &str, meta: MediaMeta) -> Self {
        Self {
            success: true,
            size,
            mime: mime.to_string(),
            ext: ext.to_string(),
            meta,
        }
    }
}

/// A unit of conversion work, persisted as `<queue>/<state>/<jobId>.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub job_id: String,
    pub lead_id: String,
    pub attachment_id: String,
    pub kind: JobKind,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub original_name: String,
    pub original_size: u64,
    pub original_mime: String,
    #[serde(default)]
    pub attempt: u32,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ConversionResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Everything the submitter knows about a new job.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub lead_id: String,
    pub attachment_id: String,
    pub kind: JobKind,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub original_name: String,
    pub original_size: u64,
    pub original_mime: String,
}

impl JobRecord {
    pub fn new(job: NewJob) -> Self {
        Self {
            job_id: uuid::Uuid::new_v4().to_string(),
            lead_id: job.lead_id,
            attachment_id: job.attachment_id,
            kind: job.kind,
            input_path: job.input_path,
            output_path: job.output_path,
            original_name: job.original_name,
            original_size: job.original_size,
            original_mime: job.original_mime,
            attempt: 0,
            status: JobStatus::Pending,
            created_at: Utc::now(),
            completed_at: None,
            failed_at: None,
            result: None,
            error: None,
        }
    }

    /// File name of this record inside any state directory.
    pub fn file_name(&self) -> String {
        format!("{}.json", self.job_id)
    }

    pub fn mark_completed(&mut self, result: ConversionResult) {
        self.result = Some(result);
        self.completed_at = Some(Utc::now());
        self.status = JobStatus::Completed;
    }

    /// Records a failed attempt. Returns true once the retry budget is spent,
    /// in which case the status is `Failed`; otherwise it is back to `Pending`.
    pub fn record_failure(&mut self, error: &str, max_retries: u32) -> bool {
        self.error = Some(error.to_string());
        self.failed_at = Some(Utc::now());
        self.attempt += 1;

        let exhausted = self.attempt >= max_retries;
        self.status = if exhausted {
            JobStatus::Failed
        } else {
            JobStatus::Pending
        };
        exhausted
    }

    /// Lower-cased extension of the original upload, without the dot.
    pub fn original_extension(&self) -> Option<String> {
        std::path::Path::new(&self.original_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
    }
}
