//! Build the application state and wire the background services.

use anyhow::{Context, Result};
use axum::Router;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::auth::tokens::TokenService;
use crate::middleware::Limiters;
use crate::setup::{database, routes};
use crate::state::{AppState, DbState};
use crate::worker::ProcessingPipeline;
use vidhub_core::Config;
use vidhub_media::{MediaProber, ThumbnailGenerator};
use vidhub_queue::{JobDispatcher, JobQueue, JobQueueConfig};
use vidhub_realtime::Hub;
use vidhub_storage::create_blob_store;

/// Initialize every component and return the shared state plus the
/// routed application.
pub async fn initialize_app(config: Config) -> Result<(Arc<AppState>, Router)> {
    let pool = database::setup_database(&config).await?;
    let db = DbState::new(pool.clone());

    let blobs = create_blob_store(&config.storage)
        .await
        .context("Failed to initialize blob store")?;

    let hub = Hub::new();
    let tokens = TokenService::new(&config.auth);
    let limiters = Limiters::from_config(&config.rate_limit);

    let prober = MediaProber::new(config.media.ffprobe_path.clone())
        .context("Invalid ffprobe configuration")?;
    let thumbnailer = ThumbnailGenerator::new(config.media.ffmpeg_path.clone());

    let pipeline = Arc::new(ProcessingPipeline::new(
        db.videos.clone(),
        db.jobs.clone(),
        blobs.clone(),
        hub.clone(),
        prober,
        thumbnailer,
        Duration::from_secs(config.queue.processing_timeout_seconds.max(1) as u64),
    ));

    let queue_config = JobQueueConfig {
        worker_concurrency: config.queue.worker_concurrency,
        poll_interval_ms: config.queue.poll_interval_ms,
        max_attempts: config.queue.max_attempts,
        backoff_base_secs: config.queue.backoff_base_secs,
        attempt_timeout_seconds: config.queue.processing_timeout_seconds,
        stalled_reap_interval_secs: config.queue.stalled_reap_interval_secs,
        stalled_grace_period_secs: config.queue.stalled_grace_period_secs,
        retain_completed: config.queue.retain_completed,
        retain_failed: config.queue.retain_failed,
    };
    let dispatcher: Arc<dyn JobDispatcher> = pipeline.clone();
    let queue = JobQueue::new(
        db.jobs.clone(),
        queue_config,
        Arc::downgrade(&dispatcher),
        Some(pool),
    );

    match queue.stats().await {
        Ok(stats) => tracing::info!(
            waiting = stats.waiting,
            retrying = stats.retrying,
            active = stats.active,
            "Job queue ready"
        ),
        Err(e) => tracing::warn!(error = %e, "Could not read job queue stats"),
    }

    let state = Arc::new(AppState {
        config,
        db,
        blobs,
        hub,
        queue,
        tokens,
        limiters,
        started_at: Instant::now(),
        pipeline,
    });

    let router = routes::setup_routes(state.clone())?;
    Ok((state, router))
}
