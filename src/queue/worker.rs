// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Queue manager and the single download worker.

use std::any::Any;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::{watch, Mutex, Notify};
use tokio::task::JoinHandle;

use super::locks::resilient_write;
use super::status::{project, StatusSnapshot};
use super::store::{QueueStore, DEFAULT_HISTORY_LIMIT};
use super::types::{JobOutcome, JobStatus, NewJob, DEFAULT_TITLE};
use crate::error::QueueError;
use crate::fetch::{with_timeout, FetchError, FetchOutput, FetchRequest, Fetcher};
use crate::utils::{tail_text, MAX_PAYLOAD_BYTES};

/// Tunables for the queue and its worker.
#[derive(Debug, Clone)]
pub struct QueueOptions {
    /// Finished jobs kept in history
    pub history_limit: usize,
    /// How long the idle worker sleeps between polls when not woken
    pub poll_interval: Duration,
    /// Per-download limit; zero disables it
    pub download_timeout: Duration,
    /// Ask the collaborator for a title when the caller gave none
    pub resolve_titles: bool,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            history_limit: DEFAULT_HISTORY_LIMIT,
            poll_interval: Duration::from_secs(1),
            download_timeout: Duration::from_secs(300),
            resolve_titles: true,
        }
    }
}

/// Result of a successful add-to-queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnqueuedJob {
    pub id: String,
    /// 1-based position in the pending queue at insertion time
    pub position: usize,
    pub title: String,
}

/// Why a direct download did not succeed.
#[derive(Debug, Error)]
pub enum DirectDownloadError {
    #[error(transparent)]
    Invalid(#[from] QueueError),
    #[error(transparent)]
    Failed(#[from] FetchError),
}

/// Owns the queue store and its worker.
///
/// Every operation takes the store lock for one short critical section. The
/// worker never holds the lock while the collaborator runs.
pub struct QueueManager {
    store: Arc<RwLock<QueueStore>>,
    fetcher: Arc<dyn Fetcher>,
    wake: Arc<Notify>,
    shutdown_tx: watch::Sender<bool>,
    worker: Mutex<Option<JoinHandle<()>>>,
    options: QueueOptions,
}

impl QueueManager {
    /// Create the manager and spawn its worker on the current tokio runtime.
    pub fn start(options: QueueOptions, fetcher: Arc<dyn Fetcher>) -> Self {
        let store = Arc::new(RwLock::new(QueueStore::new(options.history_limit)));
        let fetcher = with_timeout(fetcher, options.download_timeout);
        let wake = Arc::new(Notify::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let worker = tokio::spawn(worker_loop(
            store.clone(),
            fetcher.clone(),
            wake.clone(),
            shutdown_rx,
            options.poll_interval,
        ));

        Self {
            store,
            fetcher,
            wake,
            shutdown_tx,
            worker: Mutex::new(Some(worker)),
            options,
        }
    }

    /// Validate a request, resolve its title if needed, and queue it.
    pub async fn enqueue(&self, request: NewJob) -> Result<EnqueuedJob, QueueError> {
        let mut request = request.validate()?;

        if request.title.is_none() && self.options.resolve_titles {
            request.title = self
                .fetcher
                .lookup_title(&request.video_url, request.referer_url.as_deref())
                .await;
        }

        let title = request
            .title
            .clone()
            .unwrap_or_else(|| DEFAULT_TITLE.to_string());
        let enqueued = {
            let mut store = resilient_write(&self.store);
            let id = store.enqueue(request)?;
            let position = store.position(&id).unwrap_or_else(|| store.pending_len());
            EnqueuedJob { id, position, title }
        };

        tracing::info!(
            job_id = %enqueued.id,
            position = enqueued.position,
            title = %enqueued.title,
            "Job queued"
        );
        self.wake.notify_one();
        Ok(enqueued)
    }

    /// Remove a pending job. False when it is not pending.
    pub fn remove(&self, id: &str) -> bool {
        let removed = resilient_write(&self.store).remove(id);
        if removed {
            tracing::info!(job_id = %id, "Job removed from queue");
        } else {
            tracing::debug!(job_id = %id, "Remove ignored: job not pending");
        }
        removed
    }

    /// Drop all pending jobs. Returns how many were removed.
    pub fn clear_pending(&self) -> usize {
        let removed = resilient_write(&self.store).clear_pending();
        tracing::info!(removed, "Queue cleared");
        removed
    }

    /// Forget finished jobs. Returns how many were removed.
    pub fn clear_history(&self) -> usize {
        let removed = resilient_write(&self.store).clear_history();
        tracing::info!(removed, "History cleared");
        removed
    }

    /// Current status view.
    pub fn status(&self) -> StatusSnapshot {
        project(&self.store)
    }

    /// Run one download right now, outside the queue.
    pub async fn download_now(&self, request: NewJob) -> Result<FetchOutput, DirectDownloadError> {
        let request = request.validate()?;
        tracing::info!(url = %request.video_url, download_type = %request.download_type, "Direct download started");

        let started = Instant::now();
        let result = run_contained(self.fetcher.clone(), FetchRequest::from(&request)).await;
        match &result {
            Ok(_) => tracing::info!(
                url = %request.video_url,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Direct download finished"
            ),
            Err(e) => tracing::warn!(url = %request.video_url, error = %e, "Direct download failed"),
        }

        result.map(|mut out| {
            out.output = tail_text(&out.output, MAX_PAYLOAD_BYTES);
            out
        })
        .map_err(DirectDownloadError::from)
    }

    /// Stop the worker after the in-flight job (if any) finishes.
    pub async fn shutdown(&self) {
        // Err means the worker already exited.
        let _ = self.shutdown_tx.send(true);

        let handle = self.worker.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Queue worker ended abnormally");
            }
        }
    }

    /// True until `shutdown` completes.
    pub async fn is_running(&self) -> bool {
        self.worker
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

/// The worker: claim, run, record, repeat.
async fn worker_loop(
    store: Arc<RwLock<QueueStore>>,
    fetcher: Arc<dyn Fetcher>,
    wake: Arc<Notify>,
    mut shutdown_rx: watch::Receiver<bool>,
    poll_interval: Duration,
) {
    tracing::info!("Queue worker started");

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let claimed = resilient_write(&store).dequeue_next();

        let Some(job) = claimed else {
            tokio::select! {
                _ = wake.notified() => {}
                _ = tokio::time::sleep(poll_interval) => {}
                changed = shutdown_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
            continue;
        };

        tracing::info!(
            job_id = %job.id,
            title = %job.title,
            url = %job.video_url,
            download_type = %job.download_type,
            "Download started"
        );

        let started = Instant::now();
        let result = run_contained(fetcher.clone(), FetchRequest::from(&job)).await;
        let outcome = outcome_from(result);

        let (recorded, (pending, _, completed, failed)) = {
            let mut guard = resilient_write(&store);
            let recorded = guard.record_result(&job.id, outcome);
            (recorded, guard.counts())
        };
        match recorded {
            Ok(finished) if finished.status == JobStatus::Completed => {
                tracing::info!(
                    job_id = %finished.id,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    destination = ?finished.destination,
                    "Download completed"
                );
            }
            Ok(finished) => {
                tracing::warn!(
                    job_id = %finished.id,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    error = finished.error.as_deref().unwrap_or(""),
                    "Download failed"
                );
            }
            Err(e) => {
                tracing::error!(job_id = %job.id, error = %e, "Could not record download result");
            }
        }
        tracing::debug!(pending, completed, failed, "Queue state");
    }

    tracing::info!("Queue worker stopped");
}

/// Run the collaborator in its own task so a panic becomes a failure.
async fn run_contained(
    fetcher: Arc<dyn Fetcher>,
    request: FetchRequest,
) -> Result<FetchOutput, FetchError> {
    let handle = tokio::spawn(async move { fetcher.fetch(&request).await });

    match handle.await {
        Ok(result) => result,
        Err(e) if e.is_panic() => Err(FetchError::Other(format!(
            "download task panicked: {}",
            panic_message(e.into_panic())
        ))),
        Err(e) => Err(FetchError::Other(format!("download task was cancelled: {}", e))),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn outcome_from(result: Result<FetchOutput, FetchError>) -> JobOutcome {
    match result {
        Ok(out) => JobOutcome::Completed {
            output: tail_text(&out.output, MAX_PAYLOAD_BYTES),
            destination: out.destination,
        },
        Err(e) => JobOutcome::Failed {
            error: failure_text(&e),
        },
    }
}

/// Error message followed by the tail of whatever the collaborator printed.
fn failure_text(error: &FetchError) -> String {
    match error.output().map(str::trim).filter(|o| !o.is_empty()) {
        Some(output) => tail_text(&format!("{}\n{}", error, output), MAX_PAYLOAD_BYTES),
        None => error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_from_success() {
        let outcome = outcome_from(Ok(FetchOutput {
            output: "log".into(),
            destination: Some("/d/a.mp4".into()),
        }));
        assert_eq!(
            outcome,
            JobOutcome::Completed {
                output: "log".into(),
                destination: Some("/d/a.mp4".into())
            }
        );
    }

    #[test]
    fn test_outcome_from_exit_folds_output_into_error() {
        let outcome = outcome_from(Err(FetchError::Exit {
            program: "yt-dlp".into(),
            code: 2,
            output: "ERROR: boom\n".into(),
        }));
        assert_eq!(
            outcome,
            JobOutcome::Failed {
                error: "yt-dlp exited with code 2\nERROR: boom".into(),
            }
        );
    }

    #[test]
    fn test_outcome_from_timeout_has_no_output_tail() {
        let outcome = outcome_from(Err(FetchError::TimedOut(Duration::from_secs(5))));
        assert_eq!(outcome, JobOutcome::failed("download timed out after 5 seconds"));
    }

    #[test]
    fn test_panic_message_variants() {
        assert_eq!(panic_message(Box::new("static")), "static");
        assert_eq!(panic_message(Box::new(String::from("owned"))), "owned");
        assert_eq!(panic_message(Box::new(7u8)), "unknown panic");
    }
}
