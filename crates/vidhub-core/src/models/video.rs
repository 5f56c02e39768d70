//! Video model: processing lifecycle, visibility, probed metadata, and
//! the sensitivity report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Row;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "video_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum VideoStatus {
    Uploading,
    Processing,
    Completed,
    Failed,
}

impl Display for VideoStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            VideoStatus::Uploading => write!(f, "uploading"),
            VideoStatus::Processing => write!(f, "processing"),
            VideoStatus::Completed => write!(f, "completed"),
            VideoStatus::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "video_visibility", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Private,
    Organization,
    Public,
}

impl FromStr for Visibility {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "private" => Ok(Visibility::Private),
            "organization" => Ok(Visibility::Organization),
            "public" => Ok(Visibility::Public),
            _ => Err(anyhow::anyhow!("Invalid visibility: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

/// Metadata probed from the uploaded file.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct VideoMetadata {
    pub duration_seconds: f64,
    pub resolution: Resolution,
    pub codec: String,
    pub bitrate: u64,
    pub frame_rate: f64,
    pub audio_codec: Option<String>,
    pub format: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SensitivityLevel {
    Low,
    Medium,
    High,
    Unknown,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SensitivityStatus {
    Pending,
    Safe,
    Flagged,
}

impl Display for SensitivityStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            SensitivityStatus::Pending => write!(f, "pending"),
            SensitivityStatus::Safe => write!(f, "safe"),
            SensitivityStatus::Flagged => write!(f, "flagged"),
        }
    }
}

/// Outcome of the heuristic sensitivity analysis, stored as jsonb.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SensitivityReport {
    pub level: SensitivityLevel,
    pub score: f64,
    pub status: SensitivityStatus,
    pub categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analyzed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_by: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_notes: Option<String>,
}

impl Default for SensitivityReport {
    fn default() -> Self {
        Self {
            level: SensitivityLevel::Unknown,
            score: 0.0,
            status: SensitivityStatus::Pending,
            categories: Vec::new(),
            analysis_details: None,
            analyzed_at: None,
            reviewed_by: None,
            review_notes: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Video {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub original_filename: String,
    pub storage_key: String,
    pub file_size: i64,
    pub format: String,
    pub organization_id: Uuid,
    pub uploaded_by: Uuid,
    pub visibility: Visibility,
    pub allowed_user_ids: Vec<Uuid>,
    pub status: VideoStatus,
    pub processing_progress: i32,
    pub metadata: Option<VideoMetadata>,
    pub thumbnail_key: Option<String>,
    pub sensitivity: SensitivityReport,
    pub view_count: i64,
    pub last_viewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl sqlx::FromRow<'_, sqlx::postgres::PgRow> for Video {
    fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        let metadata: Option<serde_json::Value> = row.try_get("metadata")?;
        let sensitivity: serde_json::Value = row.try_get("sensitivity")?;
        Ok(Video {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            original_filename: row.try_get("original_filename")?,
            storage_key: row.try_get("storage_key")?,
            file_size: row.try_get("file_size")?,
            format: row.try_get("format")?,
            organization_id: row.try_get("organization_id")?,
            uploaded_by: row.try_get("uploaded_by")?,
            visibility: row.try_get("visibility")?,
            allowed_user_ids: row.try_get("allowed_user_ids")?,
            status: row.try_get("status")?,
            processing_progress: row.try_get("processing_progress")?,
            metadata: metadata
                .map(serde_json::from_value)
                .transpose()
                .map_err(|e| {
                    sqlx::Error::Decode(format!("Failed to decode video metadata: {}", e).into())
                })?,
            thumbnail_key: row.try_get("thumbnail_key")?,
            sensitivity: serde_json::from_value(sensitivity).map_err(|e| {
                sqlx::Error::Decode(format!("Failed to decode sensitivity report: {}", e).into())
            })?,
            view_count: row.try_get("view_count")?,
            last_viewed_at: row.try_get("last_viewed_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl Video {
    /// MIME type for the stored container format.
    pub fn content_type(&self) -> &'static str {
        mime_for_format(&self.format)
    }
}

/// MIME type for a container format, defaulting to mp4.
pub fn mime_for_format(format: &str) -> &'static str {
    match format {
        "mp4" => "video/mp4",
        "avi" => "video/x-msvideo",
        "mov" => "video/quicktime",
        "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        _ => "video/mp4",
    }
}

/// Video shape returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct VideoResponse {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub original_filename: String,
    pub file_size: i64,
    pub format: String,
    pub organization_id: Uuid,
    pub uploaded_by: Uuid,
    pub visibility: Visibility,
    pub status: VideoStatus,
    pub processing_progress: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<VideoMetadata>,
    pub has_thumbnail: bool,
    pub sensitivity: SensitivityReport,
    pub view_count: i64,
    pub last_viewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Video> for VideoResponse {
    fn from(video: Video) -> Self {
        VideoResponse {
            id: video.id,
            title: video.title,
            description: video.description,
            original_filename: video.original_filename,
            file_size: video.file_size,
            format: video.format,
            organization_id: video.organization_id,
            uploaded_by: video.uploaded_by,
            visibility: video.visibility,
            status: video.status,
            processing_progress: video.processing_progress,
            metadata: video.metadata,
            has_thumbnail: video.thumbnail_key.is_some(),
            sensitivity: video.sensitivity,
            view_count: video.view_count,
            last_viewed_at: video.last_viewed_at,
            created_at: video.created_at,
            updated_at: video.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_video() -> Video {
        Video {
            id: Uuid::new_v4(),
            title: "demo".to_string(),
            description: String::new(),
            original_filename: "demo.mp4".to_string(),
            storage_key: "videos/abc123".to_string(),
            file_size: 1024,
            format: "mp4".to_string(),
            organization_id: Uuid::new_v4(),
            uploaded_by: Uuid::new_v4(),
            visibility: Visibility::Organization,
            allowed_user_ids: Vec::new(),
            status: VideoStatus::Processing,
            processing_progress: 0,
            metadata: None,
            thumbnail_key: None,
            sensitivity: SensitivityReport::default(),
            view_count: 0,
            last_viewed_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn visibility_parses_all_three_values() {
        assert_eq!("private".parse::<Visibility>().unwrap(), Visibility::Private);
        assert_eq!(
            "organization".parse::<Visibility>().unwrap(),
            Visibility::Organization
        );
        assert_eq!("public".parse::<Visibility>().unwrap(), Visibility::Public);
        assert!("hidden".parse::<Visibility>().is_err());
    }

    #[test]
    fn mime_mapping_covers_allowed_formats() {
        assert_eq!(mime_for_format("mp4"), "video/mp4");
        assert_eq!(mime_for_format("webm"), "video/webm");
        assert_eq!(mime_for_format("mkv"), "video/x-matroska");
        assert_eq!(mime_for_format("something-else"), "video/mp4");
    }

    #[test]
    fn default_sensitivity_is_pending() {
        let report = SensitivityReport::default();
        assert_eq!(report.status, SensitivityStatus::Pending);
        assert_eq!(report.level, SensitivityLevel::Unknown);
        assert_eq!(report.score, 0.0);
        assert!(report.categories.is_empty());
    }

    #[test]
    fn response_exposes_thumbnail_presence_not_key() {
        let mut video = sample_video();
        video.thumbnail_key = Some("thumbnails/abc.jpg".to_string());
        let response = VideoResponse::from(video);
        assert!(response.has_thumbnail);
        let json = serde_json::to_string(&response).unwrap();
        assert!(!json.contains("thumbnails/abc.jpg"));
    }

    #[test]
    fn metadata_round_trips_through_json() {
        let metadata = VideoMetadata {
            duration_seconds: 120.5,
            resolution: Resolution {
                width: 1920,
                height: 1080,
            },
            codec: "h264".to_string(),
            bitrate: 5_000_000,
            frame_rate: 29.97,
            audio_codec: Some("aac".to_string()),
            format: "mp4".to_string(),
        };

        let json = serde_json::to_value(&metadata).unwrap();
        let back: VideoMetadata = serde_json::from_value(json).unwrap();
        assert_eq!(back.resolution, metadata.resolution);
        assert_eq!(back.codec, "h264");
        assert_eq!(back.audio_codec.as_deref(), Some("aac"));
    }
}
