//! Upload dispatching
//!
//! Queues finished artifacts, keeps the on-disk footprint under quota as new
//! data arrives, and hands artifacts to the transport as the upload budget
//! allows.

use crate::clips::splitter::write_manifest;
use crate::recorder::state::SessionCompleted;
use crate::storage::quota::{dir_size_recursive, QuotaEnforcer};
use crate::storage::store::{CounterStore, StoreError};
use crate::sync::rate_limit::UploadRateLimiter;
use crate::utils::clock::{Clock, SystemClock};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};

/// Pause before retrying after a transport or store failure
const FAILURE_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Sends one artifact (file or directory) to the backend
pub trait UploadTransport: Send + Sync {
    fn upload(&self, path: &Path) -> anyhow::Result<()>;
}

/// Result of one [`UploadDispatcher::pump`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Nothing queued
    Idle,
    /// Uploaded and removed from the queue
    Sent(PathBuf),
    /// Budget exhausted; the head stays queued until the window resets
    Deferred(Duration),
    /// Larger than a whole window allows, dropped
    Rejected(PathBuf),
    /// No longer on disk, dropped
    Missing(PathBuf),
    /// Transport failed; re-queued at the head
    Failed(PathBuf),
}

type ActivePaths = Box<dyn Fn() -> Vec<PathBuf> + Send + Sync>;

/// Upload queue gated by quota and rate limit
pub struct UploadDispatcher<S: CounterStore, C: Clock = SystemClock> {
    limiter: UploadRateLimiter<S, C>,
    transport: Arc<dyn UploadTransport>,
    quota: QuotaEnforcer,
    quota_roots: Vec<PathBuf>,
    quota_bytes: u64,
    active_paths: ActivePaths,
    queue: Mutex<VecDeque<PathBuf>>,
}

impl<S: CounterStore, C: Clock> UploadDispatcher<S, C> {
    pub fn new(
        limiter: UploadRateLimiter<S, C>,
        transport: Arc<dyn UploadTransport>,
        quota_roots: Vec<PathBuf>,
        quota_bytes: u64,
    ) -> Self {
        Self {
            limiter,
            transport,
            quota: QuotaEnforcer::new(),
            quota_roots,
            quota_bytes,
            active_paths: Box::new(Vec::new),
            queue: Mutex::new(VecDeque::new()),
        }
    }

    /// Paths the quota check must never delete, queried on every check
    pub fn with_active_paths<F>(mut self, active_paths: F) -> Self
    where
        F: Fn() -> Vec<PathBuf> + Send + Sync + 'static,
    {
        self.active_paths = Box::new(active_paths);
        self
    }

    pub fn limiter(&self) -> &UploadRateLimiter<S, C> {
        &self.limiter
    }

    pub fn queued(&self) -> Vec<PathBuf> {
        self.queue.lock().iter().cloned().collect()
    }

    /// Queue an artifact, then bring disk usage back under quota
    pub fn enqueue(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        tracing::debug!("Queued {:?} for upload", path);
        self.queue.lock().push_back(path);
        self.check_quota();
    }

    /// Queue a session's clips followed by its manifest.
    ///
    /// A session whose manifest could not be written gets another attempt
    /// here; if that fails too the clips go up without one.
    pub fn enqueue_session(&self, event: &SessionCompleted) {
        let manifest_path = match &event.manifest_path {
            Some(path) => Some(path.clone()),
            None => match write_manifest(
                &event.output_dir,
                &event.clips,
                event.session_start_device_clock_secs,
            ) {
                Ok(path) => {
                    tracing::info!("Rewrote missing manifest {:?}", path);
                    Some(path)
                }
                Err(e) => {
                    tracing::warn!(
                        "Manifest for {:?} still unavailable: {}",
                        event.output_dir,
                        e
                    );
                    None
                }
            },
        };

        {
            let mut queue = self.queue.lock();
            queue.extend(event.clips.iter().map(|clip| clip.path.clone()));
            queue.extend(manifest_path);
        }
        tracing::debug!(
            "Queued {} clips of session {:?}",
            event.clips.len(),
            event.output_dir
        );
        self.check_quota();
    }

    fn check_quota(&self) {
        let protected = (self.active_paths)();
        let removed = self
            .quota
            .enforce_excluding(&self.quota_roots, self.quota_bytes, &protected);
        if !removed.is_empty() {
            self.queue
                .lock()
                .retain(|queued| !removed.iter().any(|gone| queued.starts_with(gone)));
        }
    }

    /// Try to send the head of the queue
    pub fn pump(&self) -> Result<DispatchOutcome, StoreError> {
        let Some(path) = self.queue.lock().pop_front() else {
            return Ok(DispatchOutcome::Idle);
        };

        if !path.exists() {
            tracing::warn!("Queued artifact {:?} disappeared, dropping", path);
            return Ok(DispatchOutcome::Missing(path));
        }

        let size = dir_size_recursive(&path);
        if !self.limiter.fits(size) {
            tracing::warn!(
                "Artifact {:?} ({} bytes) exceeds the per-window ceiling, dropping",
                path,
                size
            );
            return Ok(DispatchOutcome::Rejected(path));
        }

        let allowed = match self.limiter.try_consume(size) {
            Ok(allowed) => allowed,
            Err(e) => {
                self.queue.lock().push_front(path);
                return Err(e);
            }
        };
        if !allowed {
            self.queue.lock().push_front(path);
            let wait = self.limiter.time_until_next_window()?;
            tracing::info!("Upload budget used up, next window in {:?}", wait);
            return Ok(DispatchOutcome::Deferred(wait));
        }

        match self.transport.upload(&path) {
            Ok(()) => {
                tracing::info!("Uploaded {:?} ({} bytes)", path, size);
                Ok(DispatchOutcome::Sent(path))
            }
            Err(e) => {
                tracing::warn!("Upload of {:?} failed: {:#}", path, e);
                self.queue.lock().push_front(path.clone());
                Ok(DispatchOutcome::Failed(path))
            }
        }
    }
}

impl<S, C> UploadDispatcher<S, C>
where
    S: CounterStore + 'static,
    C: Clock + 'static,
{
    /// Consume session events until the channel closes, uploading as the
    /// budget allows and sleeping through exhausted windows.
    pub async fn run(self: Arc<Self>, mut events: mpsc::UnboundedReceiver<SessionCompleted>) {
        let mut resume_at: Option<Instant> = None;

        loop {
            if resume_at.is_none() {
                resume_at = self.clone().drain().await;
            }

            let next = resume_at;
            let resume = async move {
                match next {
                    Some(at) => sleep_until(at).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => {
                        let this = self.clone();
                        let queued =
                            tokio::task::spawn_blocking(move || this.enqueue_session(&event)).await;
                        if let Err(e) = queued {
                            tracing::error!("Enqueue task failed: {}", e);
                        }
                    }
                    None => {
                        tracing::debug!("Session event channel closed, upload loop exiting");
                        break;
                    }
                },
                _ = resume => {
                    resume_at = None;
                }
            }
        }
    }

    /// Pump until idle; returns when to try again if blocked
    async fn drain(self: Arc<Self>) -> Option<Instant> {
        loop {
            let this = self.clone();
            let outcome = match tokio::task::spawn_blocking(move || this.pump()).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!("Upload task failed: {}", e);
                    return Some(Instant::now() + FAILURE_RETRY_DELAY);
                }
            };

            match outcome {
                Ok(DispatchOutcome::Idle) => return None,
                Ok(DispatchOutcome::Deferred(wait)) => return Some(Instant::now() + wait),
                Ok(DispatchOutcome::Failed(_)) => return Some(Instant::now() + FAILURE_RETRY_DELAY),
                Ok(_) => continue,
                Err(e) => {
                    tracing::error!("Upload counters unavailable: {}", e);
                    return Some(Instant::now() + FAILURE_RETRY_DELAY);
                }
            }
        }
    }
}
