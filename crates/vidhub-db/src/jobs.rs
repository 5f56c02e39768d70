//! Job repository: durable queue state in Postgres.
//!
//! Claims use `FOR UPDATE SKIP LOCKED` so concurrent workers never
//! double-claim; enqueues notify the worker channel so claims happen
//! without waiting for the next poll tick.

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use sqlx::{PgPool, Postgres, Row};
use uuid::Uuid;

use vidhub_core::models::{Job, JobStats, JobStatus};

/// Channel name for PostgreSQL LISTEN/NOTIFY when a job is enqueued.
pub const JOB_NOTIFY_CHANNEL: &str = "vidhub_new_job";

const JOB_COLUMNS: &str = "id, video_id, status, priority, attempt, max_attempts, timeout_seconds, \
     progress, run_at, started_at, completed_at, heartbeat_at, failure_reason, enqueued_at, \
     updated_at";

#[derive(Clone)]
pub struct JobRepository {
    pool: PgPool,
}

impl JobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Enqueue a processing job and wake the workers. The notify is
    /// non-fatal; polling discovers the job if it fails.
    #[tracing::instrument(skip(self))]
    pub async fn enqueue(
        &self,
        video_id: Uuid,
        priority: i32,
        max_attempts: i32,
        timeout_seconds: i32,
    ) -> Result<Job> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction for enqueue")?;

        let job = sqlx::query_as::<Postgres, Job>(&format!(
            r#"
            INSERT INTO jobs (video_id, priority, max_attempts, timeout_seconds)
            VALUES ($1, $2, $3, $4)
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(video_id)
        .bind(priority)
        .bind(max_attempts)
        .bind(timeout_seconds)
        .fetch_one(&mut *tx)
        .await
        .context("Failed to insert job")?;

        if let Err(e) = sqlx::query("SELECT pg_notify($1, '')")
            .bind(JOB_NOTIFY_CHANNEL)
            .execute(&mut *tx)
            .await
        {
            tracing::warn!(error = %e, job_id = %job.id, "pg_notify failed; workers will poll");
        }

        tx.commit()
            .await
            .context("Failed to commit enqueue transaction")?;

        tracing::info!(job_id = %job.id, video_id = %video_id, "Job enqueued");
        Ok(job)
    }

    /// Claim the next runnable job and mark it active.
    #[tracing::instrument(skip(self))]
    pub async fn claim_next(&self) -> Result<Option<Job>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin claim transaction")?;

        let claimed: Option<Job> = sqlx::query_as::<Postgres, Job>(&format!(
            r#"
            SELECT {JOB_COLUMNS}
            FROM jobs
            WHERE status IN ('waiting', 'retrying') AND run_at <= NOW()
            ORDER BY priority DESC, run_at ASC
            LIMIT 1
            FOR UPDATE SKIP LOCKED
            "#
        ))
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to fetch next job")?;

        let job = match claimed {
            Some(job) => {
                let active = sqlx::query_as::<Postgres, Job>(&format!(
                    r#"
                    UPDATE jobs
                    SET status = 'active', started_at = NOW(), heartbeat_at = NOW(),
                        progress = 0, updated_at = NOW()
                    WHERE id = $1
                    RETURNING {JOB_COLUMNS}
                    "#
                ))
                .bind(job.id)
                .fetch_one(&mut *tx)
                .await
                .context("Failed to mark job active")?;
                Some(active)
            }
            None => None,
        };

        tx.commit()
            .await
            .context("Failed to commit claim transaction")?;
        Ok(job)
    }

    /// Record liveness for an active job; stalled detection keys off
    /// this timestamp.
    pub async fn heartbeat(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE jobs SET heartbeat_at = NOW(), updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to record heartbeat")?;
        Ok(())
    }

    pub async fn update_progress(&self, id: Uuid, progress: i32) -> Result<()> {
        sqlx::query(
            "UPDATE jobs SET progress = $2, heartbeat_at = NOW(), updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(progress.clamp(0, 100))
        .execute(&self.pool)
        .await
        .context("Failed to update job progress")?;
        Ok(())
    }

    pub async fn mark_completed(&self, id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'completed', progress = 100, attempt = attempt + 1,
                completed_at = NOW(), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .context("Failed to mark job completed")?;
        Ok(())
    }

    /// Terminal failure after the last allowed execution.
    pub async fn mark_failed(&self, id: Uuid, reason: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'failed', attempt = attempt + 1, failure_reason = $2,
                completed_at = NOW(), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(reason)
        .execute(&self.pool)
        .await
        .context("Failed to mark job failed")?;
        Ok(())
    }

    /// Count the finished execution and schedule the next one after the
    /// given backoff.
    #[tracing::instrument(skip(self))]
    pub async fn schedule_retry(&self, id: Uuid, backoff_seconds: u64, reason: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'retrying', attempt = attempt + 1, failure_reason = $3,
                run_at = $2, progress = 0, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(Utc::now() + Duration::seconds(backoff_seconds as i64))
        .bind(reason)
        .execute(&self.pool)
        .await
        .context("Failed to schedule retry")?;
        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Job>> {
        let job = sqlx::query_as::<Postgres, Job>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch job")?;
        Ok(job)
    }

    /// Return active jobs whose heartbeat lapsed beyond their timeout
    /// plus the grace period to the waiting state.
    #[tracing::instrument(skip(self))]
    pub async fn reap_stalled(&self, grace_period_secs: i64) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'waiting', run_at = NOW(), updated_at = NOW()
            WHERE status = 'active'
              AND heartbeat_at < NOW() - make_interval(secs => timeout_seconds + $1)
            "#,
        )
        .bind(grace_period_secs as f64)
        .execute(&self.pool)
        .await
        .context("Failed to reap stalled jobs")?;

        let reaped = result.rows_affected();
        if reaped > 0 {
            tracing::warn!(reaped, "Returned stalled jobs to the queue");
        }
        Ok(reaped)
    }

    /// Retention pruning: keep only the most recent N completed and M
    /// failed jobs.
    #[tracing::instrument(skip(self))]
    pub async fn prune_finished(&self, retain_completed: i64, retain_failed: i64) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM jobs
            WHERE id IN (
                SELECT id FROM (
                    SELECT id,
                           ROW_NUMBER() OVER (PARTITION BY status ORDER BY completed_at DESC) AS rank,
                           status
                    FROM jobs
                    WHERE status IN ('completed', 'failed')
                ) ranked
                WHERE (status = 'completed' AND rank > $1)
                   OR (status = 'failed' AND rank > $2)
            )
            "#,
        )
        .bind(retain_completed)
        .bind(retain_failed)
        .execute(&self.pool)
        .await
        .context("Failed to prune finished jobs")?;
        Ok(result.rows_affected())
    }

    /// Queue counters by state.
    pub async fn stats(&self) -> Result<JobStats> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS count FROM jobs GROUP BY status")
            .fetch_all(&self.pool)
            .await
            .context("Failed to compute job stats")?;

        let mut stats = JobStats::default();
        for row in rows {
            let status: JobStatus = row.try_get("status")?;
            let count: i64 = row.try_get("count")?;
            match status {
                JobStatus::Waiting => stats.waiting = count,
                JobStatus::Active => stats.active = count,
                JobStatus::Retrying => stats.retrying = count,
                JobStatus::Completed => stats.completed = count,
                JobStatus::Failed => stats.failed = count,
            }
        }
        Ok(stats)
    }
}
