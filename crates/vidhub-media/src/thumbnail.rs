//! Thumbnail extraction via ffmpeg.

use anyhow::{anyhow, Context, Result};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

pub struct ThumbnailGenerator {
    ffmpeg_path: String,
}

impl ThumbnailGenerator {
    pub fn new(ffmpeg_path: String) -> Self {
        Self { ffmpeg_path }
    }

    /// Extract a single JPEG frame at `timestamp_seconds` and return
    /// its bytes. The subprocess carries a kill deadline.
    #[tracing::instrument(skip(self, video_path, output_path), fields(ffmpeg = %self.ffmpeg_path))]
    pub async fn extract_frame(
        &self,
        video_path: &Path,
        output_path: &Path,
        timestamp_seconds: f64,
        deadline: Duration,
    ) -> Result<Vec<u8>> {
        let child = Command::new(&self.ffmpeg_path)
            .args(["-y", "-ss", &format!("{:.3}", timestamp_seconds), "-i"])
            .arg(video_path)
            .args(["-vframes", "1", "-q:v", "4", "-f", "image2"])
            .arg(output_path)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(deadline, child)
            .await
            .map_err(|_| anyhow!("ffmpeg timed out after {:?}", deadline))?
            .context("Failed to execute ffmpeg")?;

        if !output.status.success() {
            return Err(anyhow!(
                "ffmpeg failed: {}",
                String::from_utf8_lossy(&output.stderr)
            ));
        }

        let bytes = tokio::fs::read(output_path)
            .await
            .context("Failed to read generated thumbnail")?;
        if bytes.is_empty() {
            return Err(anyhow!("ffmpeg produced an empty thumbnail"));
        }

        tracing::debug!(size_bytes = bytes.len(), "Thumbnail extracted");
        Ok(bytes)
    }
}
