#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use mediaq::db::lead_repo;
use mediaq::{
    ClaimStrategy, ConverterRegistry, Database, JobQueue, JobRecord, JobStatus, JobSubmitter,
    ProcessingAttachment, PublicFiles, ResultPropagator, SqliteAttachmentStore, UploadedFile,
    Worker, WorkerConfig, WorkerOptions,
};
use tempfile::TempDir;

use super::runner::ScriptedRunner;

/// Isolated upload, queue, output and database roots for one test.
pub struct TestHarness {
    pub temp_dir: TempDir,
    pub uploads_dir: PathBuf,
    pub config: WorkerConfig,
    pub db: Database,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let root = temp_dir.path();
        let uploads_dir = root.join("incoming");
        std::fs::create_dir_all(&uploads_dir).expect("Failed to create uploads dir");

        let config = WorkerConfig {
            temp_dir: root.join("tmp"),
            queue_dir: root.join("queue"),
            output_dir: root.join("public"),
            public_url_prefix: "/uploads".to_string(),
            database_path: root.join("mediaq.db"),
            poll_interval_ms: 20,
            recover_orphans: false,
            watch: false,
            ..WorkerConfig::default()
        };
        let db = Database::open_in_memory().expect("Failed to open database");

        Self {
            temp_dir,
            uploads_dir,
            config,
            db,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.config.max_retries = max_retries;
        self
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn queue(&self) -> JobQueue {
        let queue = JobQueue::new(&self.config.queue_dir);
        queue.ensure().expect("Failed to create queue dirs");
        queue
    }

    pub fn queue_with(&self, strategy: Arc<dyn ClaimStrategy>) -> JobQueue {
        let queue = JobQueue::with_strategy(&self.config.queue_dir, strategy);
        queue.ensure().expect("Failed to create queue dirs");
        queue
    }

    pub fn public_files(&self) -> PublicFiles {
        PublicFiles::new(&self.config.output_dir, &self.config.public_url_prefix)
    }

    pub fn submitter(&self) -> JobSubmitter {
        JobSubmitter::new(&self.config.temp_dir, self.queue(), self.public_files())
    }

    pub fn worker(&self, runner: Arc<ScriptedRunner>) -> Worker {
        self.worker_on(self.queue(), runner)
    }

    pub fn worker_on(&self, queue: JobQueue, runner: Arc<ScriptedRunner>) -> Worker {
        let options = WorkerOptions {
            poll_interval: Duration::from_millis(self.config.poll_interval_ms),
            ..WorkerOptions::from_config(&self.config)
        };
        Worker::new(
            queue,
            ConverterRegistry::new(self.config.convert_settings(), runner),
            ResultPropagator::new(Box::new(SqliteAttachmentStore::new(self.db.clone()))),
            options,
        )
    }

    /// Writes an upload into the incoming area the way an HTTP layer would.
    pub fn upload(&self, name: &str, mime: &str, content: &[u8]) -> UploadedFile {
        let temp_path = self.uploads_dir.join(uuid::Uuid::new_v4().to_string());
        std::fs::write(&temp_path, content).expect("Failed to write upload");
        UploadedFile {
            temp_path,
            original_name: name.to_string(),
            size: content.len() as u64,
            mime: mime.to_string(),
        }
    }

    /// Submits an upload and stores the returned attachment on the lead.
    pub fn submit(&self, lead_id: &str, name: &str, mime: &str) -> ProcessingAttachment {
        let attachment = self
            .submitter()
            .submit(lead_id, self.upload(name, mime, b"original-bytes"))
            .expect("Failed to submit upload");
        lead_repo::insert_lead(&self.db, lead_id).expect("Failed to insert lead");
        lead_repo::append_attachment(&self.db, lead_id, &attachment)
            .expect("Failed to append attachment");
        attachment
    }

    pub fn attachments(&self, lead_id: &str) -> Vec<ProcessingAttachment> {
        lead_repo::find_attachments(&self.db, lead_id)
            .expect("Failed to read attachments")
            .expect("Lead not found")
    }

    pub fn attachment(&self, lead_id: &str, attachment_id: &str) -> ProcessingAttachment {
        self.attachments(lead_id)
            .into_iter()
            .find(|a| a.id == attachment_id)
            .expect("Attachment not found")
    }

    /// Every record currently stored under `status`.
    pub fn records(&self, status: JobStatus) -> Vec<JobRecord> {
        let dir = self.queue().dirs().dir(status);
        let mut records: Vec<JobRecord> = std::fs::read_dir(&dir)
            .expect("Failed to read queue dir")
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .map(|path| {
                let bytes = std::fs::read(&path).expect("Failed to read job record");
                serde_json::from_slice(&bytes).expect("Failed to parse job record")
            })
            .collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        records
    }

    pub fn record_for(&self, status: JobStatus, attachment_id: &str) -> JobRecord {
        self.records(status)
            .into_iter()
            .find(|r| r.attachment_id == attachment_id)
            .expect("Job record not found")
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Drains until nothing is claimable, so requeued jobs get their retries.
pub async fn drain_until_idle(worker: &Worker) -> usize {
    let mut total = 0;
    for _ in 0..20 {
        let processed = worker.drain().await.expect("Failed to drain queue");
        if processed == 0 {
            break;
        }
        total += processed;
    }
    total
}
