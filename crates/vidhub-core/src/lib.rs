//! Core types shared across the vidhub workspace: configuration, the
//! error taxonomy, and the domain models.

pub mod config;
pub mod error;
pub mod job_error;
pub mod models;

pub use config::Config;
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use job_error::JobError;
