//! Job queue: worker pool, LISTEN/NOTIFY or polling, retry, and
//! submission.
//!
//! Shutdown: [`JobQueue::shutdown`] signals the pool to stop claiming;
//! it does not wait for in-flight attempts. Coordinate with the runtime
//! for graceful shutdown and give running attempts time to finish.

use anyhow::{Context, Result};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::sleep;
use uuid::Uuid;

use vidhub_core::models::{Job, JobStats};
use vidhub_core::JobError;
use vidhub_db::{JobRepository, JOB_NOTIFY_CHANNEL};

use crate::dispatcher::JobDispatcher;

/// Cap on the retry backoff so long attempt budgets cannot produce
/// unbounded delays.
pub const MAX_RETRY_BACKOFF_SECS: u64 = 300;

/// Heartbeat cadence for active attempts.
const HEARTBEAT_INTERVAL_SECS: u64 = 10;

/// Backoff before attempt `failed_attempt + 1`: `base · 2^(k-1)` where
/// `k` is the attempt that just failed, capped.
#[inline]
pub fn compute_retry_backoff_seconds(base_secs: u64, failed_attempt: i32) -> u64 {
    let exponent = failed_attempt.max(1) as u32 - 1;
    base_secs
        .saturating_mul(2_u64.saturating_pow(exponent))
        .min(MAX_RETRY_BACKOFF_SECS)
}

#[derive(Clone)]
pub struct JobQueueConfig {
    pub worker_concurrency: usize,
    pub poll_interval_ms: u64,
    pub max_attempts: i32,
    pub backoff_base_secs: u64,
    pub attempt_timeout_seconds: i32,
    /// Interval between reaper runs (stalled jobs + retention). 0
    /// disables the reaper.
    pub stalled_reap_interval_secs: u64,
    /// Grace period added to the attempt timeout before an active job
    /// with a lapsed heartbeat is returned to the queue.
    pub stalled_grace_period_secs: i64,
    pub retain_completed: i64,
    pub retain_failed: i64,
}

impl Default for JobQueueConfig {
    fn default() -> Self {
        Self {
            worker_concurrency: 3,
            poll_interval_ms: 1000,
            max_attempts: 3,
            backoff_base_secs: 5,
            attempt_timeout_seconds: 300,
            stalled_reap_interval_secs: 60,
            stalled_grace_period_secs: 60,
            retain_completed: 100,
            retain_failed: 200,
        }
    }
}

pub struct JobQueue {
    repository: JobRepository,
    config: JobQueueConfig,
    shutdown_tx: mpsc::Sender<()>,
}

impl JobQueue {
    /// Create the queue and start its worker pool.
    ///
    /// With a `pool`, the workers LISTEN on the job channel and wake
    /// immediately on enqueue in addition to polling; without one they
    /// only poll.
    pub fn new(
        repository: JobRepository,
        config: JobQueueConfig,
        dispatcher: Weak<dyn JobDispatcher>,
        pool: Option<sqlx::PgPool>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let repo_clone = repository.clone();
        let config_clone = config.clone();
        tokio::spawn(async move {
            Self::worker_pool(repo_clone, config_clone, dispatcher, shutdown_rx, pool).await;
        });

        Self {
            repository,
            config,
            shutdown_tx,
        }
    }

    /// Submit a processing job for a video.
    #[tracing::instrument(skip(self))]
    pub async fn enqueue(&self, video_id: Uuid, priority: i32) -> Result<Job> {
        let job = self
            .repository
            .enqueue(
                video_id,
                priority,
                self.config.max_attempts,
                self.config.attempt_timeout_seconds,
            )
            .await
            .context("Failed to enqueue job")?;
        Ok(job)
    }

    /// Per-job progress, recorded durably so `status` can answer
    /// without the worker.
    pub async fn progress(&self, job_id: Uuid, percent: i32) -> Result<()> {
        self.repository.update_progress(job_id, percent).await
    }

    /// Durable job state for status endpoints.
    pub async fn status(&self, job_id: Uuid) -> Result<Option<Job>> {
        self.repository.get(job_id).await
    }

    /// Queue counters by state.
    pub async fn stats(&self) -> Result<JobStats> {
        self.repository.stats().await
    }

    async fn worker_pool(
        repository: JobRepository,
        config: JobQueueConfig,
        dispatcher: Weak<dyn JobDispatcher>,
        mut shutdown_rx: mpsc::Receiver<()>,
        pool: Option<sqlx::PgPool>,
    ) {
        let use_listen = pool.is_some();
        tracing::info!(
            worker_concurrency = config.worker_concurrency,
            poll_interval_ms = config.poll_interval_ms,
            listen_notify = use_listen,
            "Job queue worker pool started"
        );

        let semaphore = Arc::new(Semaphore::new(config.worker_concurrency.max(1)));
        let poll_interval = Duration::from_millis(config.poll_interval_ms);

        // Wake channel fed by LISTEN so the select below never blocks on
        // a missing pool.
        let (notify_tx, mut notify_rx) = mpsc::channel::<()>(16);
        if let Some(pool) = pool {
            tokio::spawn(async move {
                loop {
                    match sqlx::postgres::PgListener::connect_with(&pool).await {
                        Ok(mut listener) => {
                            if let Err(e) = listener.listen(JOB_NOTIFY_CHANNEL).await {
                                tracing::warn!(error = %e, "LISTEN failed, will retry");
                                tokio::time::sleep(Duration::from_secs(5)).await;
                                continue;
                            }
                            while listener.recv().await.is_ok() {
                                let _ = notify_tx.send(()).await;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "PgListener connect failed, will retry");
                            tokio::time::sleep(Duration::from_secs(5)).await;
                        }
                    }
                }
            });
        }

        // Reaper: stalled active jobs back to waiting, finished jobs
        // pruned to the retention window.
        let (reaper_shutdown_tx, mut reaper_shutdown_rx) = mpsc::channel::<()>(1);
        if config.stalled_reap_interval_secs > 0 {
            let repo = repository.clone();
            let grace = config.stalled_grace_period_secs;
            let retain_completed = config.retain_completed;
            let retain_failed = config.retain_failed;
            let interval = Duration::from_secs(config.stalled_reap_interval_secs);
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            if let Err(e) = repo.reap_stalled(grace).await {
                                tracing::error!(error = %e, "Stalled job reaper failed");
                            }
                            if let Err(e) = repo.prune_finished(retain_completed, retain_failed).await {
                                tracing::error!(error = %e, "Job retention pruning failed");
                            }
                        }
                        _ = reaper_shutdown_rx.recv() => break,
                    }
                }
            });
        }

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("Job queue worker pool shutting down");
                    let _ = reaper_shutdown_tx.send(()).await;
                    break;
                }
                _ = notify_rx.recv() => {
                    Self::claim_and_dispatch(&repository, &config, &semaphore, &dispatcher).await;
                }
                _ = sleep(poll_interval) => {
                    Self::claim_and_dispatch(&repository, &config, &semaphore, &dispatcher).await;
                }
            }
        }

        tracing::info!("Job queue worker pool stopped");
    }

    async fn claim_and_dispatch(
        repository: &JobRepository,
        config: &JobQueueConfig,
        semaphore: &Arc<Semaphore>,
        dispatcher: &Weak<dyn JobDispatcher>,
    ) {
        let permit = match semaphore.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                tracing::debug!("All worker slots busy, skipping claim");
                return;
            }
        };

        match repository.claim_next().await {
            Ok(Some(job)) => {
                let repo = repository.clone();
                let config = config.clone();
                let dispatcher = dispatcher.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    if let Err(e) = Self::run_attempt(job, repo, config, dispatcher).await {
                        tracing::error!(error = %e, "Job attempt ended in error");
                    }
                });
            }
            Ok(None) => {
                drop(permit);
                tracing::trace!("No claimable jobs");
            }
            Err(e) => {
                drop(permit);
                tracing::error!(error = %e, "Failed to claim job");
            }
        }
    }

    #[tracing::instrument(skip(repository, config, dispatcher), fields(job.id = %job.id, job.video_id = %job.video_id, job.attempt = job.attempt + 1))]
    async fn run_attempt(
        job: Job,
        repository: JobRepository,
        config: JobQueueConfig,
        dispatcher: Weak<dyn JobDispatcher>,
    ) -> Result<()> {
        let dispatcher = dispatcher
            .upgrade()
            .ok_or_else(|| anyhow::anyhow!("JobDispatcher was dropped, cannot process job"))?;

        // Liveness while the attempt runs; stalled detection keys off
        // these writes.
        let heartbeat = {
            let repo = repository.clone();
            let job_id = job.id;
            tokio::spawn(async move {
                let mut ticker =
                    tokio::time::interval(Duration::from_secs(HEARTBEAT_INTERVAL_SECS));
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    ticker.tick().await;
                    if let Err(e) = repo.heartbeat(job_id).await {
                        tracing::warn!(error = %e, job_id = %job_id, "Heartbeat write failed");
                    }
                }
            })
        };

        let timeout = Duration::from_secs(job.timeout_seconds.max(1) as u64);
        let result = tokio::time::timeout(timeout, dispatcher.dispatch(&job)).await;
        heartbeat.abort();

        match result {
            Ok(Ok(())) => {
                repository
                    .mark_completed(job.id)
                    .await
                    .context("Failed to mark job completed")?;
                tracing::info!(job_id = %job.id, "Job completed");
                Ok(())
            }
            Ok(Err(e)) => {
                let unrecoverable = e
                    .downcast_ref::<JobError>()
                    .map(|je| !je.is_recoverable())
                    .unwrap_or(false);

                tracing::error!(
                    job_id = %job.id,
                    error = %e,
                    attempt = job.attempt + 1,
                    max_attempts = job.max_attempts,
                    unrecoverable,
                    "Job attempt failed"
                );

                if !unrecoverable && job.can_retry() {
                    let backoff =
                        compute_retry_backoff_seconds(config.backoff_base_secs, job.attempt + 1);
                    tracing::info!(job_id = %job.id, backoff_seconds = backoff, "Scheduling retry");
                    repository
                        .schedule_retry(job.id, backoff, &e.to_string())
                        .await
                        .context("Failed to schedule retry")?;
                    Ok(())
                } else {
                    let reason = e.to_string();
                    repository
                        .mark_failed(job.id, &reason)
                        .await
                        .context("Failed to mark job failed")?;
                    dispatcher.on_terminal_failure(&job, &reason).await;
                    tracing::error!(job_id = %job.id, "Job failed terminally");
                    Err(e)
                }
            }
            Err(_) => {
                let reason = format!("Attempt timed out after {}s", job.timeout_seconds);
                tracing::error!(job_id = %job.id, timeout_seconds = job.timeout_seconds, "Job attempt timed out");

                if job.can_retry() {
                    let backoff =
                        compute_retry_backoff_seconds(config.backoff_base_secs, job.attempt + 1);
                    repository
                        .schedule_retry(job.id, backoff, &reason)
                        .await
                        .context("Failed to schedule retry after timeout")?;
                    Ok(())
                } else {
                    repository
                        .mark_failed(job.id, &reason)
                        .await
                        .context("Failed to mark job failed after timeout")?;
                    dispatcher.on_terminal_failure(&job, &reason).await;
                    Err(anyhow::anyhow!(reason))
                }
            }
        }
    }

    /// Signal the pool to stop claiming. Returns immediately; running
    /// attempts finish on their own or hit their timeout.
    pub async fn shutdown(&self) {
        tracing::info!("Initiating job queue shutdown");
        let _ = self.shutdown_tx.send(()).await;
    }
}

impl Clone for JobQueue {
    fn clone(&self) -> Self {
        Self {
            repository: self.repository.clone(),
            config: self.config.clone(),
            shutdown_tx: self.shutdown_tx.clone(),
        }
    }
}
