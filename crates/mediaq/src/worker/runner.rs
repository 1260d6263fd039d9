use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

use crate::config::WorkerConfig;
use crate::convert::ConverterRegistry;
use crate::error::{ConvertError, QueueError};
use crate::propagate::ResultPropagator;
use crate::queue::{
    recover_orphans, ClaimedJob, ConversionResult, FailOutcome, JobQueue, JobRecord,
    PendingWatcher,
};
use crate::sanitize::{hash_path, redact_job_message, redact_path};
use crate::storage::filesystem::{ensure_parent, remove_best_effort};

/// Loop tuning taken from the worker config.
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    pub max_retries: u32,
    pub poll_interval: Duration,
    pub recover_orphans: bool,
    pub orphan_after: Duration,
    pub watch: bool,
}

impl WorkerOptions {
    pub fn from_config(config: &WorkerConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            poll_interval: config.poll_interval(),
            recover_orphans: config.recover_orphans,
            orphan_after: config.orphan_after(),
            watch: config.watch,
        }
    }
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self::from_config(&WorkerConfig::default())
    }
}

/// Terminal result of one processed job file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Requeued,
    Failed,
}

/// Sequential queue consumer. One job at a time, each fully awaited,
/// oldest pending file first.
pub struct Worker {
    queue: JobQueue,
    converters: ConverterRegistry,
    propagator: Arc<ResultPropagator>,
    options: WorkerOptions,
    wake: Arc<Notify>,
}

impl Worker {
    pub fn new(
        queue: JobQueue,
        converters: ConverterRegistry,
        propagator: ResultPropagator,
        options: WorkerOptions,
    ) -> Self {
        Self {
            queue,
            converters,
            propagator: Arc::new(propagator),
            options,
            wake: Arc::new(Notify::new()),
        }
    }

    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    /// Handle that cuts the current idle wait short.
    pub fn waker(&self) -> Arc<Notify> {
        Arc::clone(&self.wake)
    }

    /// Runs until `cancel` fires. A job in flight at cancellation is dropped
    /// (its child process is killed) and its record stays in `processing`
    /// for the next startup sweep.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), QueueError> {
        self.queue.ensure()?;
        info!(
            queue = %self.queue.dirs().root().display(),
            claim = %self.queue.strategy_name(),
            max_retries = self.options.max_retries,
            "Worker started"
        );

        if self.options.recover_orphans {
            if let Err(e) =
                recover_orphans(&self.queue, self.options.orphan_after, self.options.max_retries)
            {
                error!(error = %e, "Orphan recovery failed");
            }
        }

        let _watcher = if self.options.watch {
            match PendingWatcher::start(&self.queue.dirs().pending(), self.waker()) {
                Ok(watcher) => Some(watcher),
                Err(e) => {
                    warn!(error = %e, "Falling back to polling only");
                    None
                }
            }
        } else {
            None
        };

        loop {
            let processed = tokio::select! {
                _ = cancel.cancelled() => break,
                processed = self.drain() => processed,
            };

            match processed {
                Ok(0) => {}
                Ok(count) => {
                    debug!(count, "Drained pending jobs");
                    // Requeued jobs are picked up on the next scan without waiting.
                    continue;
                }
                Err(e) => error!(error = %e, "Failed to scan pending jobs"),
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.options.poll_interval) => {}
                _ = self.wake.notified() => debug!("Woken early"),
            }
        }

        info!("Worker stopped");
        Ok(())
    }

    /// Processes every job currently pending. Returns how many this worker
    /// claimed.
    pub async fn drain(&self) -> Result<usize, QueueError> {
        let mut processed = 0;
        for entry in self.queue.list_pending()? {
            match self.process(&entry.path).await {
                Ok(Some(_)) => processed += 1,
                Ok(None) => {}
                Err(e) => error!(path = %redact_path(&entry.path), error = %e, "Failed to process job"),
            }
        }
        Ok(processed)
    }

    /// Claims and runs one pending job. `Ok(None)` when the file was claimed
    /// by someone else first.
    pub async fn process(&self, pending_path: &Path) -> Result<Option<JobOutcome>, QueueError> {
        let Some(claimed) = self.queue.claim(pending_path)? else {
            debug!(path = %redact_path(pending_path), "Job already claimed");
            return Ok(None);
        };

        let span = info_span!(
            "job",
            job_id = %claimed.record.job_id,
            kind = %claimed.record.kind,
            attempt = claimed.record.attempt
        );

        async {
            info!(input = %redact_path(&claimed.record.input_path), "Processing job");
            let started = std::time::Instant::now();

            let outcome = match self.convert(&claimed).await {
                Ok(result) => self.finish_success(&claimed, result).await?,
                Err(e) => {
                    let message = redact_job_message(&e.to_string(), &claimed.record);
                    self.finish_failure(&claimed, &message).await?
                }
            };

            info!(?outcome, elapsed_ms = started.elapsed().as_millis() as u64, "Job finished");
            Ok::<_, QueueError>(Some(outcome))
        }
        .instrument(span)
        .await
    }

    async fn convert(&self, claimed: &ClaimedJob) -> Result<ConversionResult, ConvertError> {
        ensure_parent(&claimed.record.output_path)?;
        self.converters.convert(&claimed.record).await
    }

    /// Writes the record's state onto its attachment. The SQLite update can
    /// wait on the busy timeout and the connection lock, so it runs on the
    /// blocking pool.
    async fn propagate(&self, record: &JobRecord) {
        let propagator = Arc::clone(&self.propagator);
        let record = record.clone();
        let span = Span::current();
        let update =
            tokio::task::spawn_blocking(move || span.in_scope(|| propagator.propagate(&record)));
        if let Err(e) = update.await {
            error!(error = %e, "Attachment update task failed");
        }
    }

    async fn finish_success(
        &self,
        claimed: &ClaimedJob,
        result: ConversionResult,
    ) -> Result<JobOutcome, QueueError> {
        let mut record = claimed.record.clone();
        record.mark_completed(result);

        self.propagate(&record).await;
        self.queue.complete(claimed, &record)?;
        self.cleanup_input(&record.input_path);

        Ok(JobOutcome::Completed)
    }

    async fn finish_failure(
        &self,
        claimed: &ClaimedJob,
        message: &str,
    ) -> Result<JobOutcome, QueueError> {
        let mut record = match self.queue.reload(claimed) {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "Could not reload job record, using in-memory copy");
                claimed.record.clone()
            }
        };

        record.record_failure(message, self.options.max_retries);
        warn!(attempt = record.attempt, error = message, "Job attempt failed");

        self.propagate(&record).await;
        let outcome = self.queue.fail(claimed, &record)?;

        Ok(match outcome {
            FailOutcome::Requeued => JobOutcome::Requeued,
            FailOutcome::Exhausted => {
                error!(attempts = record.attempt, "Job failed permanently");
                self.cleanup_input(&record.input_path);
                JobOutcome::Failed
            }
        })
    }

    fn cleanup_input(&self, input: &Path) {
        if remove_best_effort(input) {
            debug!(input = %hash_path(input), "Removed staged input");
        }
    }
}
