//! Organization model: the tenant boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Row;
use utoipa::ToSchema;
use uuid::Uuid;

const DEFAULT_MAX_STORAGE_GB: i64 = 50;
const DEFAULT_MAX_VIDEO_SIZE_MB: i64 = 500;

fn default_max_storage_gb() -> i64 {
    DEFAULT_MAX_STORAGE_GB
}

fn default_max_video_size_mb() -> i64 {
    DEFAULT_MAX_VIDEO_SIZE_MB
}

fn default_allowed_formats() -> Vec<String> {
    ["mp4", "avi", "mov", "mkv", "webm"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Per-organization limits, stored as jsonb on the organization row.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrganizationSettings {
    #[serde(default = "default_max_storage_gb")]
    pub max_storage_gb: i64,
    #[serde(default = "default_max_video_size_mb")]
    pub max_video_size_mb: i64,
    #[serde(default = "default_allowed_formats")]
    pub allowed_formats: Vec<String>,
}

impl Default for OrganizationSettings {
    fn default() -> Self {
        Self {
            max_storage_gb: DEFAULT_MAX_STORAGE_GB,
            max_video_size_mb: DEFAULT_MAX_VIDEO_SIZE_MB,
            allowed_formats: default_allowed_formats(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub owner_id: Option<Uuid>,
    pub settings: OrganizationSettings,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl sqlx::FromRow<'_, sqlx::postgres::PgRow> for Organization {
    fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        let settings: serde_json::Value = row.try_get("settings")?;
        Ok(Organization {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            slug: row.try_get("slug")?,
            owner_id: row.try_get("owner_id")?,
            settings: serde_json::from_value(settings).map_err(|e| {
                sqlx::Error::Decode(format!("Failed to decode organization settings: {}", e).into())
            })?,
            active: row.try_get("active")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Derive a URL-safe slug from an organization name: lowercased,
/// non-alphanumeric runs collapsed into single hyphens.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_hyphen = true;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_hyphen = false;
        } else if !last_hyphen {
            slug.push('-');
            last_hyphen = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_lowercases_and_hyphenates() {
        assert_eq!(slugify("Acme Corp"), "acme-corp");
        assert_eq!(slugify("  Spaced   Out  "), "spaced-out");
        assert_eq!(slugify("Already-Slugged"), "already-slugged");
    }

    #[test]
    fn slugify_strips_punctuation() {
        assert_eq!(slugify("O'Brien & Sons, Ltd."), "o-brien-sons-ltd");
        assert_eq!(slugify("---"), "");
    }

    #[test]
    fn settings_default_allows_common_containers() {
        let settings = OrganizationSettings::default();
        assert!(settings.allowed_formats.contains(&"mp4".to_string()));
        assert_eq!(settings.max_video_size_mb, 500);
    }

    #[test]
    fn settings_deserialize_fills_missing_fields() {
        let settings: OrganizationSettings = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(settings.max_storage_gb, 50);
        assert!(!settings.allowed_formats.is_empty());
    }
}
