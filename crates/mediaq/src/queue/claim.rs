//! Strategies for taking exclusive ownership of a pending job file.
//!
//! A claim is a single `rename` from `pending/` into a processing location.
//! Rename within one filesystem is atomic, so of any number of callers
//! racing on the same source exactly one succeeds; the rest see `NotFound`.

use std::io;
use std::path::{Path, PathBuf};

pub trait ClaimStrategy: Send + Sync {
    /// Directory that claimed records of this worker live in.
    fn processing_directory(&self, processing_root: &Path) -> PathBuf;

    /// Moves `pending_path` into this worker's processing directory.
    ///
    /// Returns `Ok(None)` if the file vanished (another claimer won).
    fn claim(&self, pending_path: &Path, processing_root: &Path) -> io::Result<Option<PathBuf>> {
        let file_name = match pending_path.file_name() {
            Some(name) => name,
            None => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "pending path has no file name",
                ))
            }
        };
        let target = self.processing_directory(processing_root).join(file_name);

        match std::fs::rename(pending_path, &target) {
            Ok(()) => Ok(Some(target)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn name(&self) -> String;
}

/// Claims straight into `processing/<id>.json`. Safe for one worker process.
#[derive(Debug, Clone, Default)]
pub struct RenameClaim;

impl ClaimStrategy for RenameClaim {
    fn processing_directory(&self, processing_root: &Path) -> PathBuf {
        processing_root.to_path_buf()
    }

    fn name(&self) -> String {
        "rename".to_string()
    }
}

/// Claims into `processing/<worker-id>/<id>.json` so that each worker only
/// ever finalizes and recovers its own namespace.
#[derive(Debug, Clone)]
pub struct PartitionedClaim {
    worker_id: String,
}

impl PartitionedClaim {
    pub fn new(worker_id: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.into(),
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }
}

impl ClaimStrategy for PartitionedClaim {
    fn processing_directory(&self, processing_root: &Path) -> PathBuf {
        processing_root.join(&self.worker_id)
    }

    fn name(&self) -> String {
        format!("partitioned:{}", self.worker_id)
    }
}
