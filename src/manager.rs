//! Job manager: owns every translation job and drives it to a terminal state.
//!
//! ## Flow per job
//!
//! ```text
//! submit ──▶ Pending ──permit──▶ Running ──engine ok──▶ store.put ──▶ Succeeded
//!                                  │  ▲
//!                       transient  │  │ backoff elapsed
//!                                  ▼  │
//!                                (retrying) ──attempts exhausted──▶ Failed
//!                                  │
//!                       permanent  └────────────────────────────────▶ Failed
//!
//! cancel (any non-terminal state) ───────────────────────────────────▶ Cancelled
//! ```
//!
//! Each submitted job runs in its own tokio task. A semaphore bounds the
//! number of jobs talking to the engine at once; a per-job
//! `CancellationToken` (child of the manager's root token) interrupts an
//! in-flight engine call or a backoff sleep.
//!
//! All state lives behind one mutex: the job table plus an index of the
//! active job per source document. The conflict check in `submit` and every
//! transition happen under that lock, so two concurrent submissions for the
//! same document can never both be accepted, and a cancelled job can never
//! be flipped to Succeeded by an attempt that finishes late.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, watch, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::JobManagerConfig;
use crate::document::{DocumentId, DocumentMeta};
use crate::engine::TranslationEngine;
use crate::error::{EngineError, TranslateError};
use crate::events::{JobEvent, JobEventBroadcaster, JobEventKind, JobEventStream};
use crate::job::{JobId, JobStatus, TranslationJob, Transition};
use crate::language::normalize_language;
use crate::store::ArtifactStore;

struct JobEntry {
    job: TranslationJob,
    status_tx: watch::Sender<JobStatus>,
    cancel: CancellationToken,
}

#[derive(Default)]
struct Registry {
    jobs: HashMap<JobId, JobEntry>,
    /// Source document → its single non-terminal job.
    active: HashMap<DocumentId, JobId>,
}

impl Registry {
    /// Apply `change` to job `id`, publishing the new status and `kind` on
    /// success. Returns `None` if the job is unknown or the move is refused.
    fn apply(
        &mut self,
        events: &JobEventBroadcaster,
        id: JobId,
        change: Transition,
        kind: JobEventKind,
    ) -> Option<JobStatus> {
        let entry = self.jobs.get_mut(&id)?;
        if !entry.job.transition(change) {
            return None;
        }
        let status = entry.job.snapshot();

        if status.is_terminal() && self.active.get(&status.source_document_id) == Some(&id) {
            self.active.remove(&status.source_document_id);
        }
        entry.status_tx.send_replace(status.clone());
        events.send(JobEvent::new(id, &status.source_document_id, status.state, kind));
        Some(status)
    }
}

struct Inner {
    config: JobManagerConfig,
    store: Arc<dyn ArtifactStore>,
    engine: Arc<dyn TranslationEngine>,
    registry: Mutex<Registry>,
    permits: Arc<Semaphore>,
    shutdown: CancellationToken,
    events: JobEventBroadcaster,
}

/// Accepts translation requests and tracks them to completion.
///
/// Cheap to clone; clones share the same job table.
///
/// # Example
/// ```rust,no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use edgequake_pdftrans::{EchoEngine, JobManager, JobManagerConfig, MemoryStore};
///
/// # async fn demo(doc: edgequake_pdftrans::DocumentId) -> Result<(), edgequake_pdftrans::TranslateError> {
/// let manager = JobManager::new(
///     JobManagerConfig::default(),
///     Arc::new(MemoryStore::new()),
///     Arc::new(EchoEngine::default()),
/// );
/// let job = manager.submit(&doc, "fr").await?;
/// let status = manager.wait_for(job, Duration::from_secs(30)).await?;
/// println!("{} → {}", job, status.state);
/// # Ok(()) }
/// ```
#[derive(Clone)]
pub struct JobManager {
    inner: Arc<Inner>,
}

impl JobManager {
    pub fn new(
        config: JobManagerConfig,
        store: Arc<dyn ArtifactStore>,
        engine: Arc<dyn TranslationEngine>,
    ) -> Self {
        info!(
            "Job manager: engine={}, max_concurrent_jobs={}, max_retries={}",
            engine.name(),
            config.max_concurrent_jobs,
            config.max_retries
        );
        let permits = Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1)));
        let events = JobEventBroadcaster::new(config.event_capacity);
        Self {
            inner: Arc::new(Inner {
                config,
                store,
                engine,
                registry: Mutex::new(Registry::default()),
                permits,
                shutdown: CancellationToken::new(),
                events,
            }),
        }
    }

    pub fn config(&self) -> &JobManagerConfig {
        &self.inner.config
    }

    pub fn store(&self) -> Arc<dyn ArtifactStore> {
        Arc::clone(&self.inner.store)
    }

    // ── Submission ───────────────────────────────────────────────────────

    /// Start translating `source` into `target_language`, letting the
    /// engine detect the source language.
    pub async fn submit(
        &self,
        source: &DocumentId,
        target_language: &str,
    ) -> Result<JobId, TranslateError> {
        self.submit_with_source(source, None, target_language).await
    }

    /// Start a translation job and return its id without waiting for it.
    ///
    /// # Errors
    /// * `InvalidLanguage`: a language tag is malformed.
    /// * `DocumentNotFound`: `source` is not in the store.
    /// * `Conflict`: `source` already has a non-terminal job.
    pub async fn submit_with_source(
        &self,
        source: &DocumentId,
        source_language: Option<&str>,
        target_language: &str,
    ) -> Result<JobId, TranslateError> {
        let target_language = normalize_language(target_language)?;
        let source_language = source_language.map(normalize_language).transpose()?;

        if !self.inner.store.exists(source).await {
            return Err(TranslateError::DocumentNotFound(source.clone()));
        }
        if self.inner.shutdown.is_cancelled() {
            return Err(TranslateError::Internal("job manager is shut down".into()));
        }

        let job = TranslationJob::new(source.clone(), source_language, target_language);
        let id = job.id;
        let cancel = self.inner.shutdown.child_token();
        {
            let mut reg = self.inner.lock();
            if let Some(existing) = reg.active.get(source) {
                return Err(TranslateError::Conflict {
                    document: source.clone(),
                    existing: *existing,
                });
            }
            let snapshot = job.snapshot();
            let (status_tx, _) = watch::channel(snapshot.clone());
            reg.active.insert(source.clone(), id);
            reg.jobs.insert(
                id,
                JobEntry {
                    job: job.clone(),
                    status_tx,
                    cancel: cancel.clone(),
                },
            );
            self.inner
                .events
                .send(JobEvent::new(id, source, snapshot.state, JobEventKind::Submitted));
        }

        info!(
            "Job {} submitted: document {} → {}",
            id,
            source.short(),
            job.target_language
        );
        tokio::spawn(Arc::clone(&self.inner).run_job(job, cancel));
        Ok(id)
    }

    // ── Queries ──────────────────────────────────────────────────────────

    pub fn status(&self, id: JobId) -> Result<JobStatus, TranslateError> {
        self.inner
            .lock()
            .jobs
            .get(&id)
            .map(|e| e.job.snapshot())
            .ok_or(TranslateError::JobNotFound(id))
    }

    /// Wait until the job is terminal, or fail with `TimedOut` once
    /// `timeout` elapses. Timing out does not cancel the job.
    pub async fn wait_for(&self, id: JobId, timeout: Duration) -> Result<JobStatus, TranslateError> {
        let mut rx = self
            .inner
            .lock()
            .jobs
            .get(&id)
            .map(|e| e.status_tx.subscribe())
            .ok_or(TranslateError::JobNotFound(id))?;

        let outcome = tokio::time::timeout(timeout, rx.wait_for(JobStatus::is_terminal))
            .await
            .map(|r| r.map(|status| JobStatus::clone(&status)));

        match outcome {
            Ok(Ok(status)) => Ok(status),
            // Sender dropped: the job was evicted, which only happens once terminal.
            Ok(Err(_)) => Ok(rx.borrow().clone()),
            Err(_) => Err(TranslateError::TimedOut {
                job: id,
                waited_ms: timeout.as_millis().min(u64::MAX as u128) as u64,
            }),
        }
    }

    /// Every tracked job, newest first.
    pub fn list(&self) -> Vec<JobStatus> {
        let mut all: Vec<JobStatus> = self
            .inner
            .lock()
            .jobs
            .values()
            .map(|e| e.job.snapshot())
            .collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all
    }

    /// The non-terminal job for `document`, if any.
    pub fn active_job_for(&self, document: &DocumentId) -> Option<JobId> {
        self.inner.lock().active.get(document).copied()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.inner.events.subscribe()
    }

    /// Event stream, optionally restricted to one job.
    pub fn events(&self, only: Option<JobId>) -> JobEventStream {
        self.inner.events.stream(only)
    }

    // ── Control ──────────────────────────────────────────────────────────

    /// Cancel a Pending or Running job.
    ///
    /// Cancelling a job that is already terminal changes nothing and
    /// returns its current status.
    pub fn cancel(&self, id: JobId) -> Result<JobStatus, TranslateError> {
        let (status, token) = {
            let mut reg = self.inner.lock();
            let entry = reg.jobs.get(&id).ok_or(TranslateError::JobNotFound(id))?;
            let token = entry.cancel.clone();
            let current = entry.job.snapshot();
            match reg.apply(&self.inner.events, id, Transition::Cancelled, JobEventKind::Cancelled) {
                Some(status) => (status, Some(token)),
                None => (current, None),
            }
        };
        if let Some(token) = token {
            token.cancel();
            info!("Job {} cancelled", id);
        } else {
            debug!("Job {} already {}; cancel ignored", id, status.state);
        }
        Ok(status)
    }

    /// Drop terminal jobs whose last update is older than `older_than`.
    /// Returns how many were removed.
    pub fn evict_finished(&self, older_than: Duration) -> usize {
        let cutoff = match chrono::Duration::from_std(older_than)
            .ok()
            .and_then(|d| Utc::now().checked_sub_signed(d))
        {
            Some(c) => c,
            None => return 0,
        };
        let mut reg = self.inner.lock();
        let before = reg.jobs.len();
        reg.jobs
            .retain(|_, e| !(e.job.state().is_terminal() && e.job.updated_at() <= cutoff));
        let removed = before - reg.jobs.len();
        if removed > 0 {
            debug!("Evicted {} finished job(s)", removed);
        }
        removed
    }

    /// Run [`evict_finished`](Self::evict_finished) every `interval` until
    /// [`shutdown`](Self::shutdown).
    pub fn spawn_eviction_task(&self, interval: Duration, retention: Duration) -> JoinHandle<()> {
        let manager = self.clone();
        let stop = self.inner.shutdown.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => {
                        manager.evict_finished(retention);
                    }
                }
            }
        })
    }

    /// Cancel every non-terminal job and stop background tasks. New
    /// submissions are refused afterwards.
    pub fn shutdown(&self) {
        let cancelled = {
            let mut reg = self.inner.lock();
            let live: Vec<JobId> = reg
                .jobs
                .iter()
                .filter(|(_, e)| !e.job.state().is_terminal())
                .map(|(id, _)| *id)
                .collect();
            live.into_iter()
                .filter(|id| {
                    reg.apply(&self.inner.events, *id, Transition::Cancelled, JobEventKind::Cancelled)
                        .is_some()
                })
                .count()
        };
        self.inner.shutdown.cancel();
        info!("Job manager shut down ({} job(s) cancelled)", cancelled);
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn apply(&self, id: JobId, change: Transition, kind: JobEventKind) -> Option<JobStatus> {
        self.lock().apply(&self.events, id, change, kind)
    }

    fn fail(&self, id: JobId, error: String) {
        warn!("Job {} failed: {}", id, error);
        self.apply(
            id,
            Transition::Failed {
                error: error.clone(),
            },
            JobEventKind::Failed { error },
        );
    }

    /// Make sure a job whose token fired ends up Cancelled. A no-op when
    /// `cancel` or `shutdown` already moved it.
    fn observe_cancel(&self, id: JobId) {
        debug!("Job {} interrupted by cancellation", id);
        self.apply(id, Transition::Cancelled, JobEventKind::Cancelled);
    }

    async fn run_job(self: Arc<Self>, job: TranslationJob, cancel: CancellationToken) {
        let id = job.id;

        let _permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return self.observe_cancel(id),
            permit = Arc::clone(&self.permits).acquire_owned() => match permit {
                Ok(p) => p,
                Err(_) => return self.fail(id, "job manager closed".into()),
            },
        };

        let document = match self.store.get(&job.source).await {
            Ok(d) => d,
            Err(e) => return self.fail(id, format!("loading source document: {e}")),
        };

        let max_attempts = self.config.max_attempts();
        let timeout = self.config.attempt_timeout();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            if self
                .apply(id, Transition::AttemptStarted, JobEventKind::AttemptStarted { attempt })
                .is_none()
            {
                // Cancelled between attempts.
                return;
            }
            debug!(
                "Job {}: attempt {}/{} via {}",
                id,
                attempt,
                max_attempts,
                self.engine.name()
            );

            let call = self.engine.translate(
                &document.bytes,
                job.source_language.as_deref(),
                &job.target_language,
            );
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return self.observe_cancel(id),
                r = tokio::time::timeout(timeout, call) => {
                    r.unwrap_or_else(|_| Err(EngineError::timeout(self.config.attempt_timeout_secs)))
                }
            };

            match outcome {
                Ok(bytes) => {
                    let meta = DocumentMeta::translation_of(&job.source, &document.meta, &job.target_language);
                    let result = match self.store.put(bytes, meta).await {
                        Ok(r) => r,
                        Err(e) => return self.fail(id, format!("storing translated document: {e}")),
                    };
                    if self
                        .apply(
                            id,
                            Transition::Succeeded {
                                result: result.clone(),
                            },
                            JobEventKind::Succeeded {
                                result_document_id: result.clone(),
                            },
                        )
                        .is_some()
                    {
                        info!(
                            "Job {} succeeded after {} attempt(s): result {}",
                            id,
                            attempt,
                            result.short()
                        );
                    } else {
                        debug!("Job {} finished after cancellation; result discarded", id);
                    }
                    return;
                }
                Err(err) if err.is_transient() && attempt < max_attempts => {
                    let delay = self.config.backoff(attempt);
                    warn!(
                        "Job {}: attempt {}/{} failed ({}), retrying in {}ms",
                        id,
                        attempt,
                        max_attempts,
                        err,
                        delay.as_millis()
                    );
                    let error = err.to_string();
                    if self
                        .apply(
                            id,
                            Transition::RetryScheduled {
                                error: error.clone(),
                            },
                            JobEventKind::RetryScheduled {
                                attempt,
                                delay_ms: delay.as_millis() as u64,
                                error,
                            },
                        )
                        .is_none()
                    {
                        return;
                    }
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return self.observe_cancel(id),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(err) => {
                    let error = if err.is_transient() {
                        format!("{err} (gave up after {attempt} attempts)")
                    } else {
                        err.to_string()
                    };
                    return self.fail(id, error);
                }
            }
        }
    }
}
