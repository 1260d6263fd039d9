pub mod attachment;
pub mod format;
pub mod submitter;

pub use attachment::{AttachmentStatus, OriginalInfo, ProcessingAttachment};
pub use format::{guess_mime, MediaFormat, TargetFormat, FORMATS};
pub use submitter::{JobSubmitter, UploadedFile};
