//! Startup sweep for jobs left in `processing/` by a worker that died
//! mid-job.
//!
//! A record is considered orphaned once its file has not been touched for
//! `stale_after`. The sweep charges the lost run as a failed attempt, so a
//! job that keeps crashing the worker still ends up in `failed/`. Only the
//! queue's own processing directory is swept; partitions of other workers
//! belong to them.

use std::time::{Duration, SystemTime};

use tracing::{info, warn};

use crate::error::QueueError;
use crate::queue::job::JobStatus;
use crate::queue::store::{read_record, JobQueue};

const ORPHAN_ERROR: &str = "Worker stopped while the job was processing";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub requeued: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Moves stale processing entries back to `pending` (or to `failed` once
/// `max_retries` is reached).
pub fn recover_orphans(
    queue: &JobQueue,
    stale_after: Duration,
    max_retries: u32,
) -> Result<RecoveryReport, QueueError> {
    let now = SystemTime::now();
    let mut report = RecoveryReport::default();

    for entry in queue.list_claimed()? {
        let age = now.duration_since(entry.modified).unwrap_or_default();
        if age < stale_after {
            report.skipped += 1;
            continue;
        }

        let mut record = match read_record(&entry.path) {
            Ok(record) => record,
            Err(e) => {
                warn!(path = %entry.path.display(), error = %e, "Skipping unreadable orphan");
                report.skipped += 1;
                continue;
            }
        };

        record.record_failure(ORPHAN_ERROR, max_retries);
        match queue.release(&entry.path, &record) {
            Ok(()) => {
                if record.status == JobStatus::Failed {
                    report.failed += 1;
                } else {
                    report.requeued += 1;
                }
            }
            Err(e) => {
                warn!(job_id = %record.job_id, error = %e, "Failed to release orphaned job");
                report.skipped += 1;
            }
        }
    }

    if report.requeued + report.failed > 0 {
        info!(
            requeued = report.requeued,
            failed = report.failed,
            "Recovered orphaned jobs"
        );
    }
    Ok(report)
}
