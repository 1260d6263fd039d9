use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use log::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::QueueError;
use crate::queue::claim::{ClaimStrategy, RenameClaim};
use crate::queue::job::{JobRecord, JobStatus};
use crate::storage::filesystem::{ensure_directory, remove_best_effort, write_atomic};

/// The four state directories under the queue root.
#[derive(Debug, Clone)]
pub struct QueueDirs {
    root: PathBuf,
}

impl QueueDirs {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dir(&self, status: JobStatus) -> PathBuf {
        self.root.join(status.directory_name())
    }

    pub fn pending(&self) -> PathBuf {
        self.dir(JobStatus::Pending)
    }

    pub fn processing(&self) -> PathBuf {
        self.dir(JobStatus::Processing)
    }

    pub fn done(&self) -> PathBuf {
        self.dir(JobStatus::Completed)
    }

    pub fn failed(&self) -> PathBuf {
        self.dir(JobStatus::Failed)
    }

    pub fn ensure(&self) -> Result<(), QueueError> {
        for status in [
            JobStatus::Pending,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            ensure_directory(&self.dir(status))?;
        }
        Ok(())
    }
}

/// A pending job file found by a scan.
#[derive(Debug, Clone)]
pub struct PendingEntry {
    pub path: PathBuf,
    pub modified: SystemTime,
}

/// A job this worker owns. `path` is its file in the processing area.
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    pub record: JobRecord,
    pub path: PathBuf,
}

/// What happened to a job after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOutcome {
    Requeued,
    Exhausted,
}

/// Per-state job counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct QueueCounts {
    pub pending: usize,
    pub processing: usize,
    pub done: usize,
    pub failed: usize,
}

/// File-system job queue. Directory placement is the source of truth for a
/// job's state; the `status` field in the payload is rewritten after every
/// move so the two agree.
#[derive(Clone)]
pub struct JobQueue {
    dirs: QueueDirs,
    strategy: Arc<dyn ClaimStrategy>,
}

impl JobQueue {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self::with_strategy(root, Arc::new(RenameClaim))
    }

    pub fn with_strategy<P: AsRef<Path>>(root: P, strategy: Arc<dyn ClaimStrategy>) -> Self {
        Self {
            dirs: QueueDirs::new(root),
            strategy,
        }
    }

    pub fn dirs(&self) -> &QueueDirs {
        &self.dirs
    }

    pub fn strategy_name(&self) -> String {
        self.strategy.name()
    }

    /// Creates the state directories (and this worker's processing partition).
    pub fn ensure(&self) -> Result<(), QueueError> {
        self.dirs.ensure()?;
        ensure_directory(&self.strategy.processing_directory(&self.dirs.processing()))?;
        Ok(())
    }

    /// Writes a new record into `pending`.
    pub fn enqueue(&self, record: &JobRecord) -> Result<PathBuf, QueueError> {
        let dir = self.dirs.pending();
        ensure_directory(&dir)?;
        let path = dir.join(record.file_name());
        write_record(&path, record)?;
        debug!("Enqueued job {} ({})", record.job_id, record.kind);
        Ok(path)
    }

    /// Lists pending job files, oldest modification time first.
    pub fn list_pending(&self) -> Result<Vec<PendingEntry>, QueueError> {
        let dir = self.dirs.pending();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        for entry in WalkDir::new(&dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| QueueError::ScanFailed {
                path: dir.clone(),
                source: e,
            })?;

            if !entry.file_type().is_file() || !is_job_file(entry.path()) {
                continue;
            }

            // The file may be claimed between listing and stat.
            let modified = match entry.metadata().ok().and_then(|m| m.modified().ok()) {
                Some(modified) => modified,
                None => continue,
            };

            entries.push(PendingEntry {
                path: entry.path().to_path_buf(),
                modified,
            });
        }

        entries.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.path.cmp(&b.path)));
        Ok(entries)
    }

    /// Atomically claims a pending job file, then rewrites it with
    /// `status = processing`.
    ///
    /// Returns `Ok(None)` when another claimer got there first.
    pub fn claim(&self, pending_path: &Path) -> Result<Option<ClaimedJob>, QueueError> {
        let claimed_path = match self
            .strategy
            .claim(pending_path, &self.dirs.processing())
            .map_err(|e| QueueError::ClaimFailed {
                path: pending_path.to_path_buf(),
                source: e,
            })? {
            Some(path) => path,
            None => return Ok(None),
        };

        let mut record = match read_record(&claimed_path) {
            Ok(record) => record,
            Err(e) => {
                // Unparseable payloads can never succeed; park them in failed/.
                warn!("Discarding unreadable job file {}: {}", claimed_path.display(), e);
                self.quarantine(&claimed_path);
                return Err(e);
            }
        };

        record.status = JobStatus::Processing;
        write_record(&claimed_path, &record)?;

        Ok(Some(ClaimedJob {
            record,
            path: claimed_path,
        }))
    }

    /// Re-reads a claimed job from disk.
    pub fn reload(&self, claimed: &ClaimedJob) -> Result<JobRecord, QueueError> {
        read_record(&claimed.path)
    }

    /// Finalizes a successful job: `done/<id>.json`, then drop the claim.
    pub fn complete(&self, claimed: &ClaimedJob, record: &JobRecord) -> Result<PathBuf, QueueError> {
        let target = self.dirs.done().join(record.file_name());
        self.finalize(claimed, record, &target)?;
        Ok(target)
    }

    /// Finalizes a failed attempt. The record must already carry the
    /// updated `attempt`/`status` (see [`JobRecord::record_failure`]).
    pub fn fail(&self, claimed: &ClaimedJob, record: &JobRecord) -> Result<FailOutcome, QueueError> {
        let (dir, outcome) = match record.status {
            JobStatus::Failed => (self.dirs.failed(), FailOutcome::Exhausted),
            _ => (self.dirs.pending(), FailOutcome::Requeued),
        };
        self.finalize(claimed, record, &dir.join(record.file_name()))?;
        Ok(outcome)
    }

    fn finalize(&self, claimed: &ClaimedJob, record: &JobRecord, target: &Path) -> Result<(), QueueError> {
        if let Some(parent) = target.parent() {
            ensure_directory(parent)?;
        }
        write_record(target, record)?;
        std::fs::remove_file(&claimed.path).map_err(|e| QueueError::RemoveFailed {
            path: claimed.path.clone(),
            source: e,
        })?;
        Ok(())
    }

    fn quarantine(&self, path: &Path) {
        let failed_dir = self.dirs.failed();
        if ensure_directory(&failed_dir).is_err() {
            return;
        }
        if let Some(name) = path.file_name() {
            if let Err(e) = std::fs::rename(path, failed_dir.join(name)) {
                warn!("Failed to quarantine {}: {}", path.display(), e);
                remove_best_effort(path);
            }
        }
    }

    /// Number of job files in each state directory. Processing includes
    /// worker partitions.
    pub fn counts(&self) -> Result<QueueCounts, QueueError> {
        Ok(QueueCounts {
            pending: count_jobs(&self.dirs.pending(), 1)?,
            processing: count_jobs(&self.dirs.processing(), 2)?,
            done: count_jobs(&self.dirs.done(), 1)?,
            failed: count_jobs(&self.dirs.failed(), 1)?,
        })
    }

    /// Job files in this queue's own processing directory. Other workers'
    /// partitions are never listed.
    pub fn list_claimed(&self) -> Result<Vec<PendingEntry>, QueueError> {
        let dir = self.strategy.processing_directory(&self.dirs.processing());
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        for entry in WalkDir::new(&dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| QueueError::ScanFailed {
                path: dir.clone(),
                source: e,
            })?;
            if !entry.file_type().is_file() || !is_job_file(entry.path()) {
                continue;
            }
            if let Some(modified) = entry.metadata().ok().and_then(|m| m.modified().ok()) {
                entries.push(PendingEntry {
                    path: entry.path().to_path_buf(),
                    modified,
                });
            }
        }
        entries.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.path.cmp(&b.path)));
        Ok(entries)
    }

    /// Moves a record found in the processing area to the directory matching
    /// its (already updated) status. Used by orphan recovery.
    pub(crate) fn release(&self, path: &Path, record: &JobRecord) -> Result<(), QueueError> {
        let claimed = ClaimedJob {
            record: record.clone(),
            path: path.to_path_buf(),
        };
        self.fail(&claimed, record).map(|outcome| {
            info!(
                "Released job {} from processing ({:?})",
                record.job_id, outcome
            );
        })
    }
}

pub(crate) fn read_record(path: &Path) -> Result<JobRecord, QueueError> {
    let content = std::fs::read(path).map_err(|e| {
        QueueError::Storage(crate::error::StorageError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })
    })?;
    serde_json::from_slice(&content).map_err(|e| QueueError::InvalidRecord {
        path: path.to_path_buf(),
        source: e,
    })
}

fn write_record(path: &Path, record: &JobRecord) -> Result<(), QueueError> {
    let json = serde_json::to_vec_pretty(record).map_err(|e| QueueError::Serialize {
        job_id: record.job_id.clone(),
        source: e,
    })?;
    write_atomic(path, &json)?;
    Ok(())
}

fn is_job_file(path: &Path) -> bool {
    let is_hidden = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(true);
    !is_hidden && path.extension().and_then(|e| e.to_str()) == Some("json")
}

fn count_jobs(dir: &Path, depth: usize) -> Result<usize, QueueError> {
    if !dir.exists() {
        return Ok(0);
    }
    let mut count = 0;
    for entry in WalkDir::new(dir).min_depth(1).max_depth(depth) {
        let entry = entry.map_err(|e| QueueError::ScanFailed {
            path: dir.to_path_buf(),
            source: e,
        })?;
        if entry.file_type().is_file() && is_job_file(entry.path()) {
            count += 1;
        }
    }
    Ok(count)
}
