use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use notify::{RecursiveMode, Watcher};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, DebouncedEventKind, Debouncer};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::error::QueueError;

/// Wakes the worker loop as soon as a job file lands in `pending/`.
///
/// Polling stays in place underneath; the watcher only shortens the wait.
/// Dropping it stops the watch.
pub struct PendingWatcher {
    _debouncer: Debouncer<notify::RecommendedWatcher>,
}

impl PendingWatcher {
    pub fn start(pending_dir: &Path, wake: Arc<Notify>) -> Result<Self, QueueError> {
        let mut debouncer = new_debouncer(
            Duration::from_millis(250),
            move |result: DebounceEventResult| match result {
                Ok(events) => {
                    let has_job = events.iter().any(|event| {
                        matches!(event.kind, DebouncedEventKind::Any)
                            && event.path.extension().and_then(|e| e.to_str()) == Some("json")
                    });
                    if has_job {
                        debug!("Pending directory changed, waking worker");
                        wake.notify_one();
                    }
                }
                Err(e) => warn!("Watch error: {:?}", e),
            },
        )
        .map_err(|e| QueueError::Watch(e.to_string()))?;

        debouncer
            .watcher()
            .watch(pending_dir, RecursiveMode::NonRecursive)
            .map_err(|e| QueueError::Watch(e.to_string()))?;

        info!("Watching {} for new jobs", pending_dir.display());
        Ok(Self {
            _debouncer: debouncer,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_watch_missing_directory_fails() {
        let temp_dir = TempDir::new().unwrap();
        let result = PendingWatcher::start(&temp_dir.path().join("missing"), Arc::new(Notify::new()));
        assert!(matches!(result, Err(QueueError::Watch(_))));
    }

    #[tokio::test]
    async fn test_new_job_file_wakes() {
        let temp_dir = TempDir::new().unwrap();
        let wake = Arc::new(Notify::new());
        let _watcher = PendingWatcher::start(temp_dir.path(), Arc::clone(&wake)).unwrap();

        std::fs::write(temp_dir.path().join("job.json"), b"{}").unwrap();

        let woke = tokio::time::timeout(Duration::from_secs(10), wake.notified()).await;
        assert!(woke.is_ok(), "watcher did not wake within 10s");
    }
}
