use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MediaqError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Submit error: {0}")]
    Submit(#[from] SubmitError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Conversion error: {0}")]
    Convert(#[from] ConvertError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Invalid value for {key}: '{value}' ({reason})")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Config validation failed: {message}")]
    Validation { message: String },
}

/// Rejections surfaced synchronously to the caller of the submitter.
/// Nothing is enqueued when one of these is returned.
#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("Unsupported file type '{extension}' ({mime})")]
    UnsupportedType { extension: String, mime: String },

    #[error("File extension '{extension}' does not match declared type '{mime}'")]
    MimeMismatch { extension: String, mime: String },

    #[error("Invalid lead id '{0}'")]
    InvalidLeadId(String),

    #[error("Storage failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Failed to enqueue job: {0}")]
    Queue(#[from] QueueError),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to move file from '{from}' to '{to}': {source}")]
    MoveFile {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Storage failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Failed to scan '{path}': {source}")]
    ScanFailed {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("Failed to claim '{path}': {source}")]
    ClaimFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid job record '{path}': {source}")]
    InvalidRecord {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize job {job_id}: {source}")]
    Serialize {
        job_id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to remove '{path}': {source}")]
    RemoveFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Watch error: {0}")]
    Watch(String),
}

/// Failures of an external tool invocation.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("{program} not found (is it installed and on PATH?)")]
    NotFound { program: String },

    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with code {code}: {stderr}")]
    Failed {
        program: String,
        code: i32,
        stderr: String,
    },

    #[error("{program} timed out after {}s", .timeout.as_secs())]
    Timeout { program: String, timeout: Duration },

    #[error("{program} produced unparseable output: {reason}")]
    InvalidOutput { program: String, reason: String },
}

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("Video too long: {duration:.1}s exceeds maximum of {max}s")]
    DurationExceeded { duration: f64, max: u64 },

    #[error("No video stream found in '{0}'")]
    NoVideoStream(PathBuf),

    #[error("No converter registered for {0} jobs")]
    NoConverter(String),

    #[error("Output file '{path}' missing after conversion: {source}")]
    MissingOutput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Storage failed: {0}")]
    Storage(#[from] StorageError),
}

pub type Result<T> = std::result::Result<T, MediaqError>;
