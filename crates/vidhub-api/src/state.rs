//! Application state shared across handlers.

use sqlx::PgPool;
use std::sync::Arc;
use std::time::Instant;

use crate::auth::tokens::TokenService;
use crate::middleware::Limiters;
use crate::worker::ProcessingPipeline;
use vidhub_core::Config;
use vidhub_db::{JobRepository, OrganizationRepository, UserRepository, VideoRepository};
use vidhub_queue::JobQueue;
use vidhub_realtime::Hub;
use vidhub_storage::BlobStore;

/// Database pool and repositories.
#[derive(Clone)]
pub struct DbState {
    pub pool: PgPool,
    pub organizations: OrganizationRepository,
    pub users: UserRepository,
    pub videos: VideoRepository,
    pub jobs: JobRepository,
}

impl DbState {
    pub fn new(pool: PgPool) -> Self {
        Self {
            organizations: OrganizationRepository::new(pool.clone()),
            users: UserRepository::new(pool.clone()),
            videos: VideoRepository::new(pool.clone()),
            jobs: JobRepository::new(pool.clone()),
            pool,
        }
    }
}

/// Main application state. Built once at bootstrap and passed as an
/// explicit dependency; no hidden globals.
pub struct AppState {
    pub config: Config,
    pub db: DbState,
    pub blobs: Arc<dyn BlobStore>,
    pub hub: Hub,
    pub queue: JobQueue,
    pub tokens: TokenService,
    pub limiters: Limiters,
    pub started_at: Instant,
    /// Keeps the dispatcher alive; the queue only holds a `Weak` to it.
    pub pipeline: Arc<ProcessingPipeline>,
}

impl AppState {
    pub fn is_production(&self) -> bool {
        self.config.is_production()
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
