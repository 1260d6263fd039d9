use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info};

use crate::error::SubmitError;
use crate::queue::{JobQueue, JobRecord, NewJob};
use crate::storage::filesystem::{ensure_parent, file_size, move_file, remove_best_effort};
use crate::storage::public::{is_safe_segment, PublicFiles};
use crate::submit::attachment::{AttachmentStatus, OriginalInfo, ProcessingAttachment};
use crate::submit::format::{normalize_mime, MediaFormat};

/// A file the web tier has already written to a temporary location.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub temp_path: PathBuf,
    pub original_name: String,
    pub size: u64,
    pub mime: String,
}

/// Accepts uploads on the request path.
///
/// Files that can be served as-is are moved straight into the public
/// output area. Everything else is staged under the temp root and handed
/// to the worker through a pending job record.
#[derive(Clone)]
pub struct JobSubmitter {
    temp_root: PathBuf,
    queue: JobQueue,
    public: PublicFiles,
}

impl JobSubmitter {
    pub fn new<P: AsRef<Path>>(temp_root: P, queue: JobQueue, public: PublicFiles) -> Self {
        Self {
            temp_root: temp_root.as_ref().to_path_buf(),
            queue,
            public,
        }
    }

    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    pub fn public_files(&self) -> &PublicFiles {
        &self.public
    }

    /// Scratch location for a staged original.
    pub fn staging_path(&self, lead_id: &str, file_name: &str) -> PathBuf {
        self.temp_root.join("leads").join(lead_id).join(file_name)
    }

    pub fn submit(
        &self,
        lead_id: &str,
        upload: UploadedFile,
    ) -> Result<ProcessingAttachment, SubmitError> {
        if !is_safe_segment(lead_id) {
            return Err(SubmitError::InvalidLeadId(lead_id.to_string()));
        }
        let format = MediaFormat::classify(&upload.original_name, &upload.mime)?;
        let attachment_id = uuid::Uuid::new_v4().to_string();

        if format.needs_processing() {
            self.submit_for_processing(lead_id, &attachment_id, format, upload)
        } else {
            self.store_directly(lead_id, &attachment_id, format, upload)
        }
    }

    fn store_directly(
        &self,
        lead_id: &str,
        attachment_id: &str,
        format: &MediaFormat,
        upload: UploadedFile,
    ) -> Result<ProcessingAttachment, SubmitError> {
        let file_name = format!("{}.{}", attachment_id, format.extension);
        let destination = self.public.attachment_path(lead_id, &file_name);

        ensure_parent(&destination)?;
        move_file(&upload.temp_path, &destination)?;
        let size = file_size(&destination)?;

        debug!(lead_id, attachment_id, kind = %format.kind, "Stored upload without processing");

        let mime = normalize_mime(&upload.mime);
        let now = Utc::now();
        Ok(ProcessingAttachment {
            id: attachment_id.to_string(),
            name: upload.original_name.clone(),
            url: self.public.attachment_url(lead_id, &file_name),
            path: destination.to_string_lossy().to_string(),
            size,
            mime_type: mime.clone(),
            status: AttachmentStatus::Ready,
            kind: format.kind,
            original: OriginalInfo {
                name: upload.original_name,
                size: upload.size,
                mime,
            },
            meta: None,
            error: None,
            created_at: now,
            processed_at: Some(now),
        })
    }

    fn submit_for_processing(
        &self,
        lead_id: &str,
        attachment_id: &str,
        format: &MediaFormat,
        upload: UploadedFile,
    ) -> Result<ProcessingAttachment, SubmitError> {
        let staged = self.staging_path(lead_id, &format!("{}.{}", attachment_id, format.extension));
        ensure_parent(&staged)?;
        move_file(&upload.temp_path, &staged)?;

        let output_name = format!("{}.{}", attachment_id, format.output_extension());
        let output_path = self.public.attachment_path(lead_id, &output_name);
        let mime = normalize_mime(&upload.mime);

        let record = JobRecord::new(NewJob {
            lead_id: lead_id.to_string(),
            attachment_id: attachment_id.to_string(),
            kind: format.kind,
            input_path: staged,
            output_path: output_path.clone(),
            original_name: upload.original_name.clone(),
            original_size: upload.size,
            original_mime: mime.clone(),
        });
        if let Err(e) = self.queue.enqueue(&record) {
            remove_best_effort(&record.input_path);
            return Err(e.into());
        }

        info!(
            job_id = %record.job_id,
            lead_id,
            attachment_id,
            kind = %format.kind,
            "Queued upload for conversion"
        );

        Ok(ProcessingAttachment {
            id: attachment_id.to_string(),
            name: display_name(&upload.original_name, format.output_extension()),
            url: self.public.attachment_url(lead_id, &output_name),
            path: output_path.to_string_lossy().to_string(),
            size: upload.size,
            mime_type: mime.clone(),
            status: AttachmentStatus::Processing,
            kind: format.kind,
            original: OriginalInfo {
                name: upload.original_name,
                size: upload.size,
                mime,
            },
            meta: None,
            error: None,
            created_at: record.created_at,
            processed_at: None,
        })
    }
}

/// `clip.mov` + `mp4` -> `clip.mp4`.
fn display_name(original_name: &str, extension: &str) -> String {
    let stem = Path::new(original_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("file");
    format!("{}.{}", stem, extension)
}
