use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::queue::{JobKind, MediaMeta};

/// The status the business tier polls and displays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentStatus {
    Processing,
    Ready,
    Failed,
}

impl AttachmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttachmentStatus::Processing => "processing",
            AttachmentStatus::Ready => "ready",
            AttachmentStatus::Failed => "failed",
        }
    }
}

/// Provenance of the source upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginalInfo {
    pub name: String,
    pub size: u64,
    pub mime: String,
}

/// Entry stored in the owning record's attachment list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingAttachment {
    pub id: String,
    pub name: String,
    pub url: String,
    pub path: String,
    pub size: u64,
    #[serde(rename = "type")]
    pub mime_type: String,
    pub status: AttachmentStatus,
    pub kind: JobKind,
    pub original: OriginalInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<MediaMeta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
}

impl ProcessingAttachment {
    pub fn is_ready(&self) -> bool {
        self.status == AttachmentStatus::Ready
    }
}
