//! Error wrapper for background jobs, carrying retry semantics.
//!
//! The queue retries failed jobs by default; a handler that knows an
//! error will never succeed (missing video row, malformed payload)
//! wraps it as unrecoverable so the queue fails the job terminally.

use std::fmt;

#[derive(Debug)]
pub struct JobError {
    source: anyhow::Error,
    recoverable: bool,
}

impl JobError {
    pub fn recoverable(source: anyhow::Error) -> Self {
        Self {
            source,
            recoverable: true,
        }
    }

    pub fn unrecoverable(source: anyhow::Error) -> Self {
        Self {
            source,
            recoverable: false,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        self.recoverable
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

impl std::error::Error for JobError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}
