pub mod config;
pub mod convert;
pub mod db;
pub mod error;
pub mod propagate;
pub mod queue;
pub mod sanitize;
pub mod storage;
pub mod submit;
pub mod telemetry;
pub mod worker;

pub use config::{load_config, load_from_env, LogFormat, WorkerConfig};
pub use convert::{
    ConvertSettings, Converter, ConverterRegistry, ProcessRunner, ToolInvocation, ToolOutput,
    ToolRunner,
};
pub use db::{Database, DatabaseError};
pub use error::{
    ConfigError, ConvertError, MediaqError, QueueError, Result, StorageError, SubmitError,
    ToolError,
};
pub use propagate::{AttachmentStore, AttachmentUpdate, ResultPropagator, SqliteAttachmentStore};
pub use queue::{
    ClaimStrategy, ConversionResult, JobKind, JobQueue, JobRecord, JobStatus, MediaMeta,
    PartitionedClaim, RenameClaim,
};
pub use storage::PublicFiles;
pub use submit::{AttachmentStatus, JobSubmitter, ProcessingAttachment, UploadedFile};
pub use worker::{JobOutcome, Worker, WorkerOptions};
