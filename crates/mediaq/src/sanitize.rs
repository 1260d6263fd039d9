//! Keeps absolute upload and output paths out of logs and stored errors.
//!
//! Job records carry full paths under the temp and public roots, and ffmpeg
//! echoes its input path in most error messages. Logs get the file name or a
//! correlation hash; stored errors get the paths swapped for file names.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;

use crate::queue::JobRecord;

/// File name component of `path`, for span fields.
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Short deterministic hash, to correlate log lines about the same path.
pub fn hash_path(path: &Path) -> String {
    let mut hasher = DefaultHasher::new();
    path.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

/// Replaces the job's input and output paths inside `message` with their
/// file names. Used on tool errors before they are logged or stored.
pub fn redact_job_message(message: &str, job: &JobRecord) -> String {
    let mut redacted = message.to_string();
    for path in [&job.input_path, &job.output_path] {
        let full = path.to_string_lossy();
        if !full.is_empty() {
            redacted = redacted.replace(full.as_ref(), &redact_path(path));
        }
    }
    redacted
}
