//! The processing pipeline dispatched by the job queue: probe →
//! thumbnail → sensitivity → finalize, publishing progress between
//! stages.
//!
//! Progress within one attempt is monotone: 0 (starting), 15
//! (metadata), 30 (thumbnail), 80 (analysis), 100 (completed). A retry
//! starts over at 0. The completed-row commit happens strictly before
//! the `complete` event so a client that re-reads on the event sees
//! the final state.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use vidhub_core::models::{Job, Resolution, Video, VideoMetadata};
use vidhub_core::JobError;
use vidhub_db::{JobRepository, VideoRepository};
use vidhub_media::probe::VideoProbe;
use vidhub_media::{analyze, analysis_error_report, AnalyzerInput, MediaProber, ThumbnailGenerator};
use vidhub_queue::JobDispatcher;
use vidhub_realtime::{org_room, video_room, Hub, RealtimeEvent};
use vidhub_storage::{keys, BlobStore};

pub struct ProcessingPipeline {
    videos: VideoRepository,
    jobs: JobRepository,
    blobs: Arc<dyn BlobStore>,
    hub: Hub,
    prober: MediaProber,
    thumbnailer: ThumbnailGenerator,
    /// Kill deadline for each external-tool invocation; matches the
    /// attempt timeout so a wedged tool cannot outlive the attempt.
    tool_deadline: Duration,
}

impl ProcessingPipeline {
    pub fn new(
        videos: VideoRepository,
        jobs: JobRepository,
        blobs: Arc<dyn BlobStore>,
        hub: Hub,
        prober: MediaProber,
        thumbnailer: ThumbnailGenerator,
        tool_deadline: Duration,
    ) -> Self {
        Self {
            videos,
            jobs,
            blobs,
            hub,
            prober,
            thumbnailer,
            tool_deadline,
        }
    }

    /// Record progress durably, then push it to the tenant and video
    /// rooms. Events for one video leave here in issue order.
    async fn publish_progress(
        &self,
        video: &Video,
        job: &Job,
        progress: i32,
        stage: &str,
        message: &str,
    ) -> Result<()> {
        self.jobs.update_progress(job.id, progress).await?;
        self.videos.update_progress(video.id, progress).await?;

        let event = RealtimeEvent::VideoProgress {
            video_id: video.id,
            progress,
            stage: stage.to_string(),
            message: message.to_string(),
        };
        self.hub.emit(&org_room(video.organization_id), &event).await;
        self.hub.emit(&video_room(video.id), &event).await;
        Ok(())
    }

    async fn download_original(&self, video: &Video, dir: &std::path::Path) -> Result<std::path::PathBuf> {
        let input_path = dir.join(format!("input.{}", video.format));
        let mut file = tokio::fs::File::create(&input_path)
            .await
            .context("Failed to create temp input file")?;

        let mut stream = self
            .blobs
            .get_stream(&video.storage_key)
            .await
            .context("Failed to open original blob")?;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("Failed to read original blob")?;
            file.write_all(&chunk)
                .await
                .context("Failed to write temp input file")?;
        }
        file.flush().await.context("Failed to flush temp input file")?;
        Ok(input_path)
    }

    fn metadata_from_probe(probe: &VideoProbe, fallback_format: &str) -> VideoMetadata {
        VideoMetadata {
            duration_seconds: probe.duration_seconds.unwrap_or(0.0),
            resolution: Resolution {
                width: probe.width.unwrap_or(0),
                height: probe.height.unwrap_or(0),
            },
            codec: probe.codec.clone().unwrap_or_else(|| "unknown".to_string()),
            bitrate: probe.bitrate.unwrap_or(0),
            frame_rate: probe.frame_rate.unwrap_or(0.0),
            audio_codec: probe.audio_codec.clone(),
            format: probe
                .format_name
                .clone()
                .unwrap_or_else(|| fallback_format.to_string()),
        }
    }

    /// True when the probe carries nothing the analyzer can work with.
    fn probe_is_unreadable(probe: &VideoProbe) -> bool {
        probe.duration_seconds.is_none() && probe.width.is_none() && probe.codec.is_none()
    }

    async fn process(&self, job: &Job) -> Result<()> {
        // Stage 1: load and mark. A missing row will never appear on
        // retry, so the failure is terminal.
        let video = self
            .videos
            .get_unchecked(job.video_id)
            .await?
            .ok_or_else(|| {
                anyhow::Error::new(JobError::unrecoverable(anyhow!(
                    "Video {} no longer exists",
                    job.video_id
                )))
            })?;

        self.videos.begin_processing(video.id).await?;
        self.publish_progress(&video, job, 0, "starting", "Processing started")
            .await?;

        let temp_dir = tempfile::TempDir::new().context("Failed to create temp directory")?;
        let input_path = self.download_original(&video, temp_dir.path()).await?;

        // Stage 2: probe metadata.
        let probe = self
            .prober
            .probe(&input_path, self.tool_deadline)
            .await
            .context("Failed to probe video")?;
        let metadata = Self::metadata_from_probe(&probe, &video.format);
        self.videos.update_metadata(video.id, &metadata).await?;
        self.publish_progress(&video, job, 15, "metadata", "Metadata extracted")
            .await?;

        // Stage 3: thumbnail at one second. Non-fatal: a video without a
        // poster frame is still playable.
        match self.generate_thumbnail(&video, &input_path, temp_dir.path()).await {
            Ok(key) => {
                self.videos.update_thumbnail(video.id, &key).await?;
                self.publish_progress(&video, job, 30, "thumbnail", "Thumbnail generated")
                    .await?;
            }
            Err(e) => {
                tracing::warn!(video_id = %video.id, error = %e, "Thumbnail generation failed, continuing");
                self.publish_progress(&video, job, 30, "thumbnail", "Thumbnail skipped")
                    .await?;
            }
        }

        // Stage 4: sensitivity scoring over the probe and file facts.
        let mut report = if Self::probe_is_unreadable(&probe) {
            analysis_error_report("probe returned no usable metadata")
        } else {
            analyze(&AnalyzerInput {
                probe: &probe,
                file_size: video.file_size.max(0) as u64,
                original_filename: &video.original_filename,
                container_format: &video.format,
            })
        };
        report.analyzed_at = Some(Utc::now());
        self.videos.update_sensitivity(video.id, &report).await?;
        self.publish_progress(&video, job, 80, "analysis", "Sensitivity analysis complete")
            .await?;

        // Stage 5: finalize. Commit the completed row before any client
        // can hear about it.
        self.videos.mark_completed(video.id).await?;
        self.publish_progress(&video, job, 100, "completed", "Processing complete")
            .await?;

        let event = RealtimeEvent::VideoProcessComplete {
            video_id: video.id,
            status: vidhub_core::models::VideoStatus::Completed,
            sensitivity: report,
            thumbnail_key: self
                .videos
                .get_unchecked(video.id)
                .await?
                .and_then(|v| v.thumbnail_key),
            duration: Some(metadata.duration_seconds),
            resolution: Some(metadata.resolution),
        };
        self.hub.emit(&org_room(video.organization_id), &event).await;
        self.hub.emit(&video_room(video.id), &event).await;

        tracing::info!(video_id = %video.id, "Video processing completed");
        Ok(())
    }

    async fn generate_thumbnail(
        &self,
        video: &Video,
        input_path: &std::path::Path,
        temp_dir: &std::path::Path,
    ) -> Result<String> {
        let output_path = temp_dir.join("thumbnail.jpg");
        let bytes = self
            .thumbnailer
            .extract_frame(input_path, &output_path, 1.0, self.tool_deadline)
            .await?;

        let key = keys::thumbnail_key(video.id);
        self.blobs
            .put(&key, bytes.into())
            .await
            .map_err(|e| anyhow!("Failed to upload thumbnail: {}", e))?;
        Ok(key)
    }

    async fn emit_failed(&self, video_id: Uuid, organization_id: Uuid, reason: &str) {
        let event = RealtimeEvent::VideoProcessFailed {
            video_id,
            error: reason.to_string(),
        };
        self.hub.emit(&org_room(organization_id), &event).await;
        self.hub.emit(&video_room(video_id), &event).await;
    }
}

#[async_trait]
impl JobDispatcher for ProcessingPipeline {
    #[tracing::instrument(skip(self, job), fields(video_id = %job.video_id, attempt = job.attempt + 1))]
    async fn dispatch(&self, job: &Job) -> Result<()> {
        self.process(job).await
    }

    async fn on_terminal_failure(&self, job: &Job, reason: &str) {
        tracing::error!(video_id = %job.video_id, reason = %reason, "Processing failed terminally");

        if let Err(e) = self.videos.mark_failed(job.video_id).await {
            tracing::error!(video_id = %job.video_id, error = %e, "Failed to mark video failed");
        }

        match self.videos.get_unchecked(job.video_id).await {
            Ok(Some(video)) => {
                // user-visible message stays generic; the detail is in
                // the job row and the logs
                self.emit_failed(video.id, video.organization_id, "Video processing failed")
                    .await;
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!(video_id = %job.video_id, error = %e, "Failed to load video for failure event");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_maps_to_metadata_with_defaults() {
        let probe = VideoProbe {
            duration_seconds: Some(12.0),
            width: Some(640),
            height: Some(360),
            codec: None,
            bitrate: None,
            frame_rate: Some(24.0),
            audio_codec: None,
            format_name: None,
        };
        let metadata = ProcessingPipeline::metadata_from_probe(&probe, "webm");
        assert_eq!(metadata.codec, "unknown");
        assert_eq!(metadata.bitrate, 0);
        assert_eq!(metadata.format, "webm");
        assert_eq!(metadata.resolution.width, 640);
    }

    #[test]
    fn unreadable_probe_detected() {
        assert!(ProcessingPipeline::probe_is_unreadable(&VideoProbe::default()));

        let partial = VideoProbe {
            duration_seconds: Some(5.0),
            ..VideoProbe::default()
        };
        assert!(!ProcessingPipeline::probe_is_unreadable(&partial));
    }
}
