//! Bounded-concurrency download scheduler.
//!
//! Executes a flat task list with a semaphore-bounded pool of Tokio tasks,
//! retrying transient failures with exponential backoff and delivering
//! fetched bytes to the [`Assembler`](crate::assemble::Assembler). One
//! failed task never aborts the run; failures are counted and reported in
//! the run statistics.

mod error;
mod progress;
mod retry;
mod task;

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use bytes::Bytes;
use futures_util::StreamExt;
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, RANGE};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

pub use error::{MAX_CONCURRENCY, MIN_CONCURRENCY, SchedulerError, TransferError};
pub use progress::{ProgressEvent, ProgressSink};
pub use retry::{
    DEFAULT_MAX_ATTEMPTS, FailureType, RetryDecision, RetryPolicy, classify_error,
};
pub use task::{DownloadTask, TaskKind};

use retry::parse_retry_after;

use crate::assemble::{AssembleOutcome, Assembler};
use crate::decrypt::decrypt_segment;
use crate::session::SessionContext;

/// Default concurrency if not specified.
pub const DEFAULT_CONCURRENCY: usize = 8;

/// One task that failed for good, for the end-of-run report.
#[derive(Debug, Clone)]
pub struct TaskFailure {
    /// Task label.
    pub label: String,
    /// Final error rendered for display.
    pub reason: String,
}

/// Statistics from one scheduler run.
///
/// Atomic counters updated from concurrent download tasks.
#[derive(Debug, Default)]
pub struct RunStats {
    completed: AtomicUsize,
    failed: AtomicUsize,
    retried: AtomicUsize,
    bytes: AtomicU64,
    failures: Mutex<Vec<TaskFailure>>,
}

impl RunStats {
    /// Creates a zeroed stats tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successfully completed tasks.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Number of tasks that failed after exhausting retries.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Total retry attempts made across all tasks.
    #[must_use]
    pub fn retried(&self) -> usize {
        self.retried.load(Ordering::SeqCst)
    }

    /// Total bytes delivered to disk.
    #[must_use]
    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::SeqCst)
    }

    /// Snapshot of per-task failures for the end-of-run report.
    #[must_use]
    pub fn failures(&self) -> Vec<TaskFailure> {
        match self.failures.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn record_completed(&self, bytes: u64) {
        self.completed.fetch_add(1, Ordering::SeqCst);
        self.bytes.fetch_add(bytes, Ordering::SeqCst);
    }

    fn record_retry(&self) {
        self.retried.fetch_add(1, Ordering::SeqCst);
    }

    fn record_failure(&self, label: String, reason: String) {
        self.failed.fetch_add(1, Ordering::SeqCst);
        let mut failures = match self.failures.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        failures.push(TaskFailure { label, reason });
    }
}

/// Semaphore-bounded download scheduler with retry support.
///
/// Each task runs in its own Tokio task holding a semaphore permit for its
/// whole lifetime; the permit releases on drop, so a panicking task cannot
/// leak capacity.
#[derive(Debug)]
pub struct Scheduler {
    semaphore: Arc<Semaphore>,
    concurrency: usize,
    retry_policy: RetryPolicy,
}

impl Scheduler {
    /// Creates a scheduler with the given concurrency limit (1-30).
    ///
    /// # Errors
    ///
    /// [`SchedulerError::InvalidConcurrency`] outside the valid range.
    #[instrument(level = "debug", skip(retry_policy))]
    pub fn new(concurrency: usize, retry_policy: RetryPolicy) -> Result<Self, SchedulerError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&concurrency) {
            return Err(SchedulerError::InvalidConcurrency { value: concurrency });
        }

        debug!(
            concurrency,
            max_attempts = retry_policy.max_attempts(),
            "creating scheduler"
        );

        Ok(Self {
            semaphore: Arc::new(Semaphore::new(concurrency)),
            concurrency,
            retry_policy,
        })
    }

    /// Returns the configured concurrency limit.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Returns the configured retry policy.
    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Executes all tasks, in submission order, up to the concurrency limit.
    ///
    /// Duplicate tasks aimed at the same destination (and, for segments,
    /// the same sequence) are executed once. Cancellation stops admission
    /// of new tasks and aborts in-flight waits; already-persisted files are
    /// left in place.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::SemaphoreClosed`] if the semaphore closes
    /// unexpectedly. Individual task failures do NOT error; they are
    /// reported in the returned [`RunStats`].
    #[instrument(skip_all, fields(tasks = tasks.len(), concurrency = self.concurrency))]
    pub async fn run(
        &self,
        tasks: Vec<DownloadTask>,
        client: &Client,
        session: &Arc<SessionContext>,
        assembler: &Arc<Assembler>,
        progress: &ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<RunStats, SchedulerError> {
        let tasks = dedup_tasks(tasks);
        progress.emit(ProgressEvent::RunStarted {
            total_tasks: tasks.len(),
        });
        info!(tasks = tasks.len(), "starting scheduler run");

        let stats = Arc::new(RunStats::new());
        let mut handles = Vec::with_capacity(tasks.len());

        for task in tasks {
            if cancel.is_cancelled() {
                debug!("cancellation requested, not admitting further tasks");
                break;
            }

            let permit = self
                .semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| SchedulerError::SemaphoreClosed)?;

            let client = client.clone();
            let session = Arc::clone(session);
            let assembler = Arc::clone(assembler);
            let stats = Arc::clone(&stats);
            let progress = progress.clone();
            let cancel = cancel.clone();
            let retry_policy = self.retry_policy.clone();

            handles.push(tokio::spawn(async move {
                // Permit held for the task's whole lifetime (RAII).
                let _permit = permit;
                let label = task.label();

                let result = tokio::select! {
                    () = cancel.cancelled() => Err((TransferError::Cancelled, 0)),
                    result = transfer_with_retry(
                        &client,
                        &task,
                        &session,
                        &assembler,
                        &retry_policy,
                        &stats,
                        &progress,
                    ) => result,
                };

                match result {
                    Ok(outcome) => {
                        stats.record_completed(outcome.bytes);
                        progress.emit(ProgressEvent::Completed {
                            label,
                            bytes: outcome.bytes,
                        });
                        if let Some(path) = outcome.persisted {
                            progress.emit(ProgressEvent::LecturePersisted { path });
                        }
                    }
                    Err((e, attempts)) => {
                        warn!(label = %label, error = %e, attempts, "task failed for good");
                        stats.record_failure(label.clone(), e.to_string());
                        progress.emit(ProgressEvent::Failed {
                            label,
                            reason: e.to_string(),
                        });
                    }
                }
            }));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "download task panicked");
            }
        }

        let stats = match Arc::try_unwrap(stats) {
            Ok(stats) => stats,
            Err(arc_stats) => {
                // All tasks are joined, so this branch should be
                // unreachable; rebuild from the shared counters if not.
                let rebuilt = RunStats::new();
                rebuilt
                    .completed
                    .store(arc_stats.completed(), Ordering::SeqCst);
                rebuilt.failed.store(arc_stats.failed(), Ordering::SeqCst);
                rebuilt
                    .retried
                    .store(arc_stats.retried(), Ordering::SeqCst);
                rebuilt.bytes.store(arc_stats.bytes(), Ordering::SeqCst);
                if let Ok(mut failures) = rebuilt.failures.lock() {
                    *failures = arc_stats.failures();
                }
                rebuilt
            }
        };

        info!(
            completed = stats.completed(),
            failed = stats.failed(),
            retried = stats.retried(),
            bytes = stats.bytes(),
            "scheduler run complete"
        );
        Ok(stats)
    }
}

/// Drops tasks whose (destination, segment sequence) was already seen.
fn dedup_tasks(tasks: Vec<DownloadTask>) -> Vec<DownloadTask> {
    let mut seen: HashSet<(PathBuf, Option<u64>)> = HashSet::with_capacity(tasks.len());
    tasks
        .into_iter()
        .filter(|task| {
            let sequence = match &task.kind {
                TaskKind::Segment { sequence, .. } => Some(*sequence),
                TaskKind::Caption { .. } | TaskKind::Asset { .. } => None,
            };
            seen.insert((task.dest().clone(), sequence))
        })
        .collect()
}

/// What a successful task delivered.
struct TaskOutcome {
    /// Bytes delivered to disk for this task.
    bytes: u64,
    /// Set when this task completed a lecture's media file.
    persisted: Option<PathBuf>,
}

/// Fetches, decrypts, and delivers one task with retry on transient failure.
///
/// Returns the final error and total attempt count when retries are
/// exhausted or the failure is not retryable.
#[instrument(skip_all, fields(url = %task.url))]
async fn transfer_with_retry(
    client: &Client,
    task: &DownloadTask,
    session: &SessionContext,
    assembler: &Assembler,
    policy: &RetryPolicy,
    stats: &RunStats,
    progress: &ProgressSink,
) -> Result<TaskOutcome, (TransferError, u32)> {
    let label = task.label();
    progress.emit(ProgressEvent::Started {
        label: label.clone(),
    });

    let mut attempt = 0u32;
    loop {
        attempt += 1;
        debug!(attempt, "attempting transfer");

        match attempt_transfer(client, task, session, assembler).await {
            Ok(outcome) => return Ok(outcome),
            Err(e) => {
                let failure_type = classify_error(&e);

                // A 429 with Retry-After overrides the computed backoff.
                let retry_after_delay = match (&e, failure_type) {
                    (
                        TransferError::HttpStatus {
                            retry_after: Some(value),
                            ..
                        },
                        FailureType::RateLimited,
                    ) => parse_retry_after(value),
                    _ => None,
                };

                match policy.should_retry(failure_type, attempt) {
                    RetryDecision::Retry {
                        delay: backoff_delay,
                        attempt: next_attempt,
                    } => {
                        let delay = retry_after_delay.unwrap_or(backoff_delay);
                        info!(
                            attempt = next_attempt,
                            max_attempts = policy.max_attempts(),
                            delay_ms = delay.as_millis(),
                            error = %e,
                            "retrying transfer"
                        );
                        stats.record_retry();
                        progress.emit(ProgressEvent::Retried {
                            label: label.clone(),
                            attempt: next_attempt,
                            delay,
                        });
                        tokio::time::sleep(delay).await;
                    }
                    RetryDecision::DoNotRetry { reason } => {
                        debug!(%reason, "not retrying transfer");
                        return Err((e, attempt));
                    }
                }
            }
        }
    }
}

/// One fetch-decrypt-deliver attempt.
async fn attempt_transfer(
    client: &Client,
    task: &DownloadTask,
    session: &SessionContext,
    assembler: &Assembler,
) -> Result<TaskOutcome, TransferError> {
    let mut request = client.get(&task.url);
    if let Some(auth) = session.authorization() {
        request = request.header(AUTHORIZATION, auth);
    }
    if let Some(range) = &task.byte_range {
        request = request.header(RANGE, range.header_value());
    }

    let response = request
        .send()
        .await
        .map_err(|e| TransferError::from_reqwest(&task.url, e))?;
    if !response.status().is_success() {
        return Err(TransferError::http_status(&task.url, &response));
    }

    // Stream the body so a mid-transfer drop surfaces as a retryable
    // network error instead of a silent truncation.
    let mut stream = response.bytes_stream();
    let mut buf = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| TransferError::from_reqwest(&task.url, e))?;
        buf.extend_from_slice(&chunk);
    }
    let body = Bytes::from(buf);

    match &task.kind {
        TaskKind::Segment {
            dest,
            sequence,
            total,
            key,
        } => {
            let data = match key {
                Some(key) => decrypt_segment(body, &key.key_id, &key.iv, session)?,
                None => body,
            };
            let bytes = data.len() as u64;
            let outcome = assembler.accept_segment(dest, *total, *sequence, data)?;
            let persisted = match outcome {
                AssembleOutcome::Persisted { .. } => Some(dest.clone()),
                AssembleOutcome::Pending => None,
            };
            Ok(TaskOutcome { bytes, persisted })
        }
        TaskKind::Caption { dest } | TaskKind::Asset { dest } => {
            assembler.write_whole(dest, &body)?;
            Ok(TaskOutcome {
                bytes: body.len() as u64,
                persisted: None,
            })
        }
    }
}
