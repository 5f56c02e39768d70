//! Dispatch seam between the queue and the processing pipeline.

use anyhow::Result;
use async_trait::async_trait;

use vidhub_core::models::Job;

/// Executes one job attempt. The queue holds this behind a `Weak`
/// reference so dropping the application state stops dispatch without a
/// reference cycle through the queue's background task.
#[async_trait]
pub trait JobDispatcher: Send + Sync {
    /// Run one attempt. Errors are retried unless wrapped in an
    /// unrecoverable [`vidhub_core::JobError`] or the attempt budget is
    /// spent.
    async fn dispatch(&self, job: &Job) -> Result<()>;

    /// Called exactly once when a job fails terminally (budget spent,
    /// unrecoverable error, or timeout on the last attempt). This is
    /// the durable completion signal the worker observes.
    async fn on_terminal_failure(&self, job: &Job, reason: &str);
}
