//! Database repositories for the data access layer.
//!
//! Each repository owns a clone of the shared `PgPool` and exposes the
//! queries for one domain entity. Callers compose repositories; no
//! repository calls another.

mod jobs;
mod organizations;
mod users;
mod videos;

pub use jobs::{JobRepository, JOB_NOTIFY_CHANNEL};
pub use organizations::OrganizationRepository;
pub use users::UserRepository;
pub use videos::{VideoListQuery, VideoPage, VideoRepository};
