pub mod claim;
pub mod job;
pub mod recovery;
pub mod store;
pub mod watcher;

pub use claim::{ClaimStrategy, PartitionedClaim, RenameClaim};
pub use job::{ConversionResult, JobKind, JobRecord, JobStatus, MediaMeta, NewJob};
pub use recovery::{recover_orphans, RecoveryReport};
pub use store::{ClaimedJob, FailOutcome, JobQueue, PendingEntry, QueueCounts, QueueDirs};
pub use watcher::PendingWatcher;
