//! Metadata extraction via ffprobe.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Raw probe result. Fields stay optional so the sensitivity analyzer
/// can see exactly which ones the container failed to report.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VideoProbe {
    pub duration_seconds: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub codec: Option<String>,
    pub bitrate: Option<u64>,
    pub frame_rate: Option<f64>,
    pub audio_codec: Option<String>,
    pub format_name: Option<String>,
}

/// Reject paths that could smuggle arguments or escape the temp dir.
fn validate_path(path: &str) -> Result<()> {
    let dangerous = [';', '|', '&', '$', '`', '(', ')', '<', '>', '\n', '\r'];
    if path.chars().any(|c| dangerous.contains(&c)) {
        return Err(anyhow!("Path contains dangerous characters: {}", path));
    }
    if path.contains("..") {
        return Err(anyhow!("Path contains directory traversal: {}", path));
    }
    Ok(())
}

pub struct MediaProber {
    ffprobe_path: String,
}

impl MediaProber {
    pub fn new(ffprobe_path: String) -> Result<Self> {
        validate_path(&ffprobe_path).context("Invalid ffprobe path")?;
        Ok(Self { ffprobe_path })
    }

    /// Probe a file on disk. The subprocess gets a kill deadline so a
    /// wedged ffprobe cannot outlive the processing attempt.
    #[tracing::instrument(skip(self, video_path), fields(ffprobe = %self.ffprobe_path))]
    pub async fn probe(&self, video_path: &Path, deadline: Duration) -> Result<VideoProbe> {
        validate_path(&video_path.to_string_lossy()).context("Invalid video path")?;
        let start = std::time::Instant::now();

        let child = Command::new(&self.ffprobe_path)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(video_path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(deadline, child)
            .await
            .map_err(|_| anyhow!("ffprobe timed out after {:?}", deadline))?
            .context("Failed to execute ffprobe")?;

        if !output.status.success() {
            return Err(anyhow!(
                "ffprobe failed: {}",
                String::from_utf8_lossy(&output.stderr)
            ));
        }

        let probe = parse_ffprobe_output(&output.stdout)?;

        tracing::info!(
            duration_ms = start.elapsed().as_millis() as u64,
            video_duration = ?probe.duration_seconds,
            width = ?probe.width,
            height = ?probe.height,
            codec = ?probe.codec,
            "Probe completed"
        );
        Ok(probe)
    }
}

/// Parse ffprobe's JSON output. Separated from the invocation so it can
/// be tested against canned payloads.
pub fn parse_ffprobe_output(stdout: &[u8]) -> Result<VideoProbe> {
    let data: serde_json::Value =
        serde_json::from_slice(stdout).context("Failed to parse ffprobe output")?;

    let format = &data["format"];
    let streams = data["streams"].as_array().cloned().unwrap_or_default();

    let video_stream = streams
        .iter()
        .find(|s| s["codec_type"].as_str() == Some("video"));
    let audio_stream = streams
        .iter()
        .find(|s| s["codec_type"].as_str() == Some("audio"));

    let frame_rate = video_stream
        .and_then(|s| s["r_frame_rate"].as_str())
        .and_then(parse_frame_rate);

    Ok(VideoProbe {
        duration_seconds: format["duration"].as_str().and_then(|d| d.parse().ok()),
        width: video_stream.and_then(|s| s["width"].as_u64()).map(|w| w as u32),
        height: video_stream
            .and_then(|s| s["height"].as_u64())
            .map(|h| h as u32),
        codec: video_stream
            .and_then(|s| s["codec_name"].as_str())
            .map(str::to_string),
        bitrate: format["bit_rate"].as_str().and_then(|b| b.parse().ok()),
        frame_rate,
        audio_codec: audio_stream
            .and_then(|s| s["codec_name"].as_str())
            .map(str::to_string),
        format_name: format["format_name"]
            .as_str()
            .and_then(|f| f.split(',').next())
            .map(str::to_string),
    })
}

/// ffprobe reports frame rate as a rational like "30000/1001".
fn parse_frame_rate(raw: &str) -> Option<f64> {
    let mut parts = raw.split('/');
    let num: f64 = parts.next()?.parse().ok()?;
    match parts.next() {
        Some(den) => {
            let den: f64 = den.parse().ok()?;
            if den == 0.0 {
                None
            } else {
                Some(num / den)
            }
        }
        None => Some(num),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "streams": [
            {"codec_type": "video", "codec_name": "h264", "width": 1920, "height": 1080, "r_frame_rate": "30000/1001"},
            {"codec_type": "audio", "codec_name": "aac"}
        ],
        "format": {"format_name": "mov,mp4,m4a,3gp,3g2,mj2", "duration": "120.500000", "bit_rate": "5000000"}
    }"#;

    #[test]
    fn parses_complete_probe() {
        let probe = parse_ffprobe_output(SAMPLE.as_bytes()).unwrap();
        assert_eq!(probe.duration_seconds, Some(120.5));
        assert_eq!(probe.width, Some(1920));
        assert_eq!(probe.height, Some(1080));
        assert_eq!(probe.codec.as_deref(), Some("h264"));
        assert_eq!(probe.bitrate, Some(5_000_000));
        assert!((probe.frame_rate.unwrap() - 29.97).abs() < 0.01);
        assert_eq!(probe.audio_codec.as_deref(), Some("aac"));
        assert_eq!(probe.format_name.as_deref(), Some("mov"));
    }

    #[test]
    fn missing_audio_stream_yields_none() {
        let json = r#"{
            "streams": [{"codec_type": "video", "codec_name": "vp9", "width": 640, "height": 480, "r_frame_rate": "25/1"}],
            "format": {"format_name": "webm", "duration": "10.0", "bit_rate": "800000"}
        }"#;
        let probe = parse_ffprobe_output(json.as_bytes()).unwrap();
        assert!(probe.audio_codec.is_none());
        assert_eq!(probe.frame_rate, Some(25.0));
    }

    #[test]
    fn missing_fields_stay_none() {
        let probe = parse_ffprobe_output(br#"{"streams": [], "format": {}}"#).unwrap();
        assert!(probe.duration_seconds.is_none());
        assert!(probe.width.is_none());
        assert!(probe.codec.is_none());
    }

    #[test]
    fn frame_rate_rational_edge_cases() {
        assert_eq!(parse_frame_rate("30/1"), Some(30.0));
        assert_eq!(parse_frame_rate("0/0"), None);
        assert_eq!(parse_frame_rate("24"), Some(24.0));
        assert_eq!(parse_frame_rate("abc"), None);
    }

    #[test]
    fn dangerous_paths_rejected() {
        assert!(validate_path("/tmp/ok/input.mp4").is_ok());
        assert!(validate_path("/tmp/x;rm -rf /").is_err());
        assert!(validate_path("../escape.mp4").is_err());
    }
}
