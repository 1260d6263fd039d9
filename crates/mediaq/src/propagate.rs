//! Reports a finished job back into the lead's attachment list.
//!
//! Propagation is best-effort: the job's own state transition never depends
//! on it. Missing leads or attachments (deleted while the job ran) and store
//! errors are logged and dropped.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::db::lead_repo;
use crate::db::{Database, DatabaseError};
use crate::queue::{JobRecord, JobStatus, MediaMeta};
use crate::submit::attachment::AttachmentStatus;

pub use crate::db::lead_repo::UpdateOutcome;

/// New values for one attachment entry.
#[derive(Debug, Clone, PartialEq)]
pub enum AttachmentUpdate {
    Ready {
        mime: String,
        size: u64,
        meta: MediaMeta,
        processed_at: DateTime<Utc>,
    },
    Failed {
        error: String,
        processed_at: DateTime<Utc>,
    },
}

impl AttachmentUpdate {
    /// Builds the update for a record that just completed or failed an
    /// attempt. Returns `None` for records that carry neither a result nor
    /// an error.
    pub fn from_record(record: &JobRecord) -> Option<Self> {
        match (&record.status, &record.result) {
            (JobStatus::Completed, Some(result)) => Some(AttachmentUpdate::Ready {
                mime: result.mime.clone(),
                size: result.size,
                meta: result.meta.clone(),
                processed_at: record.completed_at.unwrap_or_else(Utc::now),
            }),
            _ => record.error.as_ref().map(|error| AttachmentUpdate::Failed {
                error: error.clone(),
                processed_at: record.failed_at.unwrap_or_else(Utc::now),
            }),
        }
    }

    pub fn status(&self) -> AttachmentStatus {
        match self {
            AttachmentUpdate::Ready { .. } => AttachmentStatus::Ready,
            AttachmentUpdate::Failed { .. } => AttachmentStatus::Failed,
        }
    }

    /// Attachment fields to overwrite, keyed by their JSON names.
    pub fn fields(&self) -> Vec<(&'static str, Value)> {
        let status = json!(self.status().as_str());
        match self {
            AttachmentUpdate::Ready {
                mime,
                size,
                meta,
                processed_at,
            } => vec![
                ("status", status),
                ("type", json!(mime)),
                ("size", json!(size)),
                ("meta", json!(meta)),
                ("error", Value::Null),
                ("processedAt", json!(processed_at)),
            ],
            AttachmentUpdate::Failed {
                error,
                processed_at,
            } => vec![
                ("status", status),
                ("error", json!(error)),
                ("processedAt", json!(processed_at)),
            ],
        }
    }
}

/// Lookup-by-id-then-update-in-place on a lead's attachment list.
pub trait AttachmentStore: Send + Sync {
    fn update_attachment(
        &self,
        lead_id: &str,
        attachment_id: &str,
        update: &AttachmentUpdate,
    ) -> Result<UpdateOutcome, DatabaseError>;
}

/// `AttachmentStore` over the SQLite `leads` table.
#[derive(Clone)]
pub struct SqliteAttachmentStore {
    db: Database,
}

impl SqliteAttachmentStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

impl AttachmentStore for SqliteAttachmentStore {
    fn update_attachment(
        &self,
        lead_id: &str,
        attachment_id: &str,
        update: &AttachmentUpdate,
    ) -> Result<UpdateOutcome, DatabaseError> {
        lead_repo::update_attachment(&self.db, lead_id, attachment_id, &update.fields())
    }
}

pub struct ResultPropagator {
    store: Box<dyn AttachmentStore>,
}

impl ResultPropagator {
    pub fn new(store: Box<dyn AttachmentStore>) -> Self {
        Self { store }
    }

    /// Pushes the record's outcome to its attachment. Never fails.
    pub fn propagate(&self, record: &JobRecord) -> Option<UpdateOutcome> {
        let update = AttachmentUpdate::from_record(record)?;

        match self
            .store
            .update_attachment(&record.lead_id, &record.attachment_id, &update)
        {
            Ok(UpdateOutcome::Updated) => {
                debug!(
                    job_id = %record.job_id,
                    attachment_id = %record.attachment_id,
                    status = update.status().as_str(),
                    "Attachment updated"
                );
                Some(UpdateOutcome::Updated)
            }
            Ok(outcome) => {
                warn!(
                    job_id = %record.job_id,
                    lead_id = %record.lead_id,
                    attachment_id = %record.attachment_id,
                    ?outcome,
                    "Attachment no longer exists, result not recorded"
                );
                Some(outcome)
            }
            Err(e) => {
                warn!(job_id = %record.job_id, error = %e, "Failed to update attachment");
                None
            }
        }
    }
}
