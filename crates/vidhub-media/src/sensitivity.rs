//! Heuristic content-sensitivity scoring.
//!
//! A pure, deterministic function over probed metadata and file facts.
//! Each triggered rule contributes an additive weight; the final score
//! is clamped to 1.0 and mapped to a status/level pair.

use vidhub_core::models::{SensitivityLevel, SensitivityReport, SensitivityStatus};

use crate::probe::VideoProbe;

const LONG_DURATION_SECS: f64 = 7200.0;
const EXTREME_DURATION_SECS: f64 = 10800.0;
const MIN_WIDTH: u32 = 320;
const MIN_HEIGHT: u32 = 240;
const MAX_WIDTH: u32 = 7680;
const MAX_HEIGHT: u32 = 4320;
const HIGH_BITRATE_BPS: u64 = 15_000_000;
const LOW_BITRATE_BPS: u64 = 100_000;
const MAX_FRAME_RATE: f64 = 120.0;
const MIN_FRAME_RATE: f64 = 15.0;
const ASPECT_TOLERANCE: f64 = 0.05;
const HIGH_DATA_RATE_BYTES: f64 = 10_000_000.0;
const LOW_DATA_RATE_BYTES: f64 = 50_000.0;
const MIN_BYTES_PER_SECOND: f64 = 100_000.0;
const FLAG_THRESHOLD: f64 = 0.7;
const REVIEW_THRESHOLD: f64 = 0.4;

const COMMON_ASPECT_RATIOS: [f64; 5] = [
    16.0 / 9.0,
    4.0 / 3.0,
    21.0 / 9.0,
    1.0,
    9.0 / 16.0,
];

const KNOWN_CONTAINERS: [&str; 5] = ["mp4", "avi", "mov", "mkv", "webm"];

/// File facts and probe for one analysis.
#[derive(Debug, Clone)]
pub struct AnalyzerInput<'a> {
    pub probe: &'a VideoProbe,
    pub file_size: u64,
    pub original_filename: &'a str,
    pub container_format: &'a str,
}

/// Report for a file whose metadata could not be read at all.
pub fn analysis_error_report(details: &str) -> SensitivityReport {
    SensitivityReport {
        level: SensitivityLevel::Unknown,
        score: 0.0,
        status: SensitivityStatus::Safe,
        categories: vec!["analysis_error".to_string()],
        analysis_details: Some(details.to_string()),
        ..SensitivityReport::default()
    }
}

/// Score one video. Pure: identical inputs always yield identical
/// output (timestamps are stamped by the caller).
pub fn analyze(input: &AnalyzerInput<'_>) -> SensitivityReport {
    let probe = input.probe;
    let mut score = 0.0f64;
    let mut categories: Vec<String> = Vec::new();
    let mut details: Vec<String> = Vec::new();

    let mut hit = |score: &mut f64, categories: &mut Vec<String>, weight: f64, name: &str| {
        *score += weight;
        categories.push(name.to_string());
    };

    let duration = probe.duration_seconds.unwrap_or(0.0);

    if duration > LONG_DURATION_SECS {
        hit(&mut score, &mut categories, 0.10, "long_duration");
        details.push(format!("duration {:.0}s exceeds {:.0}s", duration, LONG_DURATION_SECS));
        if duration > EXTREME_DURATION_SECS {
            hit(&mut score, &mut categories, 0.05, "extremely_long_duration");
        }
    }

    let width = probe.width.unwrap_or(0);
    let height = probe.height.unwrap_or(0);
    if probe.width.is_some() && probe.height.is_some() && (width == 0 || height == 0) {
        hit(&mut score, &mut categories, 0.30, "no_video_stream");
        details.push("container reports a zero-sized video stream".to_string());
    } else if width > 0 && height > 0 {
        if width < MIN_WIDTH || height < MIN_HEIGHT || width > MAX_WIDTH || height > MAX_HEIGHT {
            hit(&mut score, &mut categories, 0.15, "unusual_resolution");
            details.push(format!("resolution {}x{} outside expected bounds", width, height));
        }
        let ratio = width as f64 / height as f64;
        let near_common = COMMON_ASPECT_RATIOS
            .iter()
            .any(|common| (ratio - common).abs() / common <= ASPECT_TOLERANCE);
        if !near_common {
            hit(&mut score, &mut categories, 0.10, "suspicious_aspect_ratio");
            details.push(format!("aspect ratio {:.3} is uncommon", ratio));
        }
    }

    if let Some(bitrate) = probe.bitrate {
        if bitrate > HIGH_BITRATE_BPS {
            hit(&mut score, &mut categories, 0.10, "high_bitrate");
            details.push(format!("bitrate {}bps exceeds {}bps", bitrate, HIGH_BITRATE_BPS));
        }
        if bitrate < LOW_BITRATE_BPS && duration > 60.0 {
            hit(&mut score, &mut categories, 0.15, "low_bitrate");
            details.push(format!("bitrate {}bps below {}bps", bitrate, LOW_BITRATE_BPS));
        }
    }

    if let Some(frame_rate) = probe.frame_rate {
        if frame_rate != 0.0 && (frame_rate > MAX_FRAME_RATE || frame_rate < MIN_FRAME_RATE) {
            hit(&mut score, &mut categories, 0.10, "unusual_framerate");
            details.push(format!("frame rate {:.2} outside 15-120", frame_rate));
        }
    }

    if probe.audio_codec.is_none() && duration > 60.0 {
        hit(&mut score, &mut categories, 0.05, "no_audio_long_video");
        details.push("no audio stream in a video longer than a minute".to_string());
    }

    let mut low_data_rate = false;
    if duration > 0.0 {
        let bytes_per_second = input.file_size as f64 / duration;
        if bytes_per_second > HIGH_DATA_RATE_BYTES {
            hit(&mut score, &mut categories, 0.10, "high_data_rate");
            details.push(format!("data rate {:.0}B/s is unusually high", bytes_per_second));
        }
        if bytes_per_second < LOW_DATA_RATE_BYTES && duration > 60.0 {
            hit(&mut score, &mut categories, 0.15, "low_data_rate");
            details.push(format!("data rate {:.0}B/s is unusually low", bytes_per_second));
            low_data_rate = true;
        }
    }

    if !KNOWN_CONTAINERS.contains(&input.container_format) {
        hit(&mut score, &mut categories, 0.05, "unusual_format");
        details.push(format!("container '{}' is uncommon", input.container_format));
    }

    let missing_probe_field = probe.duration_seconds.is_none()
        || probe.width.is_none()
        || probe.height.is_none()
        || probe.codec.is_none()
        || probe.bitrate.is_none()
        || probe.frame_rate.is_none();
    if missing_probe_field || probe.codec.as_deref() == Some("unknown") {
        hit(&mut score, &mut categories, 0.25, "corrupt_metadata");
        details.push("probe left required fields empty".to_string());
    }

    // The same signal as low_data_rate measured from the other side;
    // counted once per analysis.
    if !low_data_rate
        && duration > 0.0
        && (input.file_size as f64) < duration * MIN_BYTES_PER_SECOND
    {
        hit(&mut score, &mut categories, 0.15, "suspiciously_small_file");
        details.push(format!(
            "file of {} bytes is small for {:.0}s of video",
            input.file_size, duration
        ));
    }

    let score = score.min(1.0);

    let (status, level) = if score > FLAG_THRESHOLD {
        (SensitivityStatus::Flagged, SensitivityLevel::High)
    } else if score > REVIEW_THRESHOLD {
        categories.push("manual_review_recommended".to_string());
        (SensitivityStatus::Flagged, SensitivityLevel::Medium)
    } else {
        (SensitivityStatus::Safe, SensitivityLevel::Low)
    };

    SensitivityReport {
        level,
        score,
        status,
        categories,
        analysis_details: if details.is_empty() {
            None
        } else {
            Some(details.join("; "))
        },
        ..SensitivityReport::default()
    }
}
