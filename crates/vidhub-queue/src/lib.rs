//! Durable FIFO job queue with priority, retries, heartbeats, and
//! bounded worker concurrency, backed by Postgres.

mod dispatcher;
mod queue;

pub use dispatcher::JobDispatcher;
pub use queue::{compute_retry_backoff_seconds, JobQueue, JobQueueConfig, MAX_RETRY_BACKOFF_SECS};
