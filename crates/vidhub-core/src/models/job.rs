//! Processing job model backing the durable queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "job_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Queued and claimable.
    Waiting,
    /// Claimed by a worker slot.
    Active,
    /// Failed and scheduled to run again after backoff.
    Retrying,
    Completed,
    Failed,
}

impl Display for JobStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            JobStatus::Waiting => write!(f, "waiting"),
            JobStatus::Active => write!(f, "active"),
            JobStatus::Retrying => write!(f, "retrying"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Job {
    pub id: Uuid,
    pub video_id: Uuid,
    pub status: JobStatus,
    pub priority: i32,
    /// Number of completed executions. The running execution is
    /// `attempt + 1`.
    pub attempt: i32,
    pub max_attempts: i32,
    pub timeout_seconds: i32,
    pub progress: i32,
    pub run_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub heartbeat_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
    pub enqueued_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Whether another execution is allowed after a failure.
    pub fn can_retry(&self) -> bool {
        self.attempt + 1 < self.max_attempts
    }
}

/// Queue counters by state.
#[derive(Debug, Clone, Copy, Default, Serialize, ToSchema)]
pub struct JobStats {
    pub waiting: i64,
    pub active: i64,
    pub retrying: i64,
    pub completed: i64,
    pub failed: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job_with_attempt(attempt: i32) -> Job {
        Job {
            id: Uuid::new_v4(),
            video_id: Uuid::new_v4(),
            status: JobStatus::Active,
            priority: 5,
            attempt,
            max_attempts: 3,
            timeout_seconds: 300,
            progress: 0,
            run_at: Utc::now(),
            started_at: Some(Utc::now()),
            completed_at: None,
            heartbeat_at: None,
            failure_reason: None,
            enqueued_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn retry_allowed_until_max_attempts_executions() {
        // attempt counts completed runs; run k+1 is in flight
        assert!(job_with_attempt(0).can_retry());
        assert!(job_with_attempt(1).can_retry());
        assert!(!job_with_attempt(2).can_retry());
        assert!(!job_with_attempt(5).can_retry());
    }

    #[test]
    fn status_display_matches_db_labels() {
        assert_eq!(JobStatus::Waiting.to_string(), "waiting");
        assert_eq!(JobStatus::Retrying.to_string(), "retrying");
        assert_eq!(JobStatus::Failed.to_string(), "failed");
    }
}
