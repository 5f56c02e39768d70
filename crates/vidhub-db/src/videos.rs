//! Video repository. All read paths that serve client requests are
//! tenant-scoped; only the processing worker uses the unchecked lookup.

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder, Row};
use uuid::Uuid;

use vidhub_core::models::{
    SensitivityReport, SensitivityStatus, Video, VideoMetadata, VideoStatus, Visibility,
};

const VIDEO_COLUMNS: &str = "id, title, description, original_filename, storage_key, file_size, \
     format, organization_id, uploaded_by, visibility, allowed_user_ids, status, \
     processing_progress, metadata, thumbnail_key, sensitivity, view_count, last_viewed_at, \
     created_at, updated_at";

/// Filters and paging for the tenant video listing.
#[derive(Debug, Clone)]
pub struct VideoListQuery {
    pub page: i64,
    pub limit: i64,
    pub status: Option<VideoStatus>,
    pub sensitivity_status: Option<SensitivityStatus>,
    pub sort_by: String,
    pub descending: bool,
    pub search: Option<String>,
}

impl Default for VideoListQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 20,
            status: None,
            sensitivity_status: None,
            sort_by: "created_at".to_string(),
            descending: true,
            search: None,
        }
    }
}

#[derive(Debug)]
pub struct VideoPage {
    pub videos: Vec<Video>,
    pub total: i64,
}

/// Sort columns the listing accepts; anything else falls back to
/// created_at so user input never reaches the ORDER BY clause.
fn sort_column(requested: &str) -> &'static str {
    match requested {
        "title" => "title",
        "file_size" => "file_size",
        "view_count" => "view_count",
        "updated_at" => "updated_at",
        _ => "created_at",
    }
}

#[derive(Clone)]
pub struct VideoRepository {
    pool: PgPool,
}

impl VideoRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert the video row after the blob has been stored.
    #[tracing::instrument(skip(self, title, description))]
    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        &self,
        title: &str,
        description: &str,
        original_filename: &str,
        storage_key: &str,
        file_size: i64,
        format: &str,
        organization_id: Uuid,
        uploaded_by: Uuid,
        visibility: Visibility,
    ) -> Result<Video> {
        let video = sqlx::query_as::<Postgres, Video>(&format!(
            r#"
            INSERT INTO videos (
                title, description, original_filename, storage_key, file_size, format,
                organization_id, uploaded_by, visibility, status, processing_progress
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'processing', 0)
            RETURNING {VIDEO_COLUMNS}
            "#
        ))
        .bind(title)
        .bind(description)
        .bind(original_filename)
        .bind(storage_key)
        .bind(file_size)
        .bind(format)
        .bind(organization_id)
        .bind(uploaded_by)
        .bind(visibility)
        .fetch_one(&self.pool)
        .await
        .context("Failed to insert video")?;

        tracing::info!(video_id = %video.id, org_id = %organization_id, "Video created");
        Ok(video)
    }

    /// Tenant-scoped lookup; a video in another tenant is simply absent.
    pub async fn get(&self, organization_id: Uuid, id: Uuid) -> Result<Option<Video>> {
        let video = sqlx::query_as::<Postgres, Video>(&format!(
            "SELECT {VIDEO_COLUMNS} FROM videos WHERE id = $1 AND organization_id = $2"
        ))
        .bind(id)
        .bind(organization_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch video")?;
        Ok(video)
    }

    /// Lookup without a tenant filter. Used by the worker (jobs carry
    /// no tenant) and by public-visibility streaming.
    pub async fn get_unchecked(&self, id: Uuid) -> Result<Option<Video>> {
        let video = sqlx::query_as::<Postgres, Video>(&format!(
            "SELECT {VIDEO_COLUMNS} FROM videos WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch video")?;
        Ok(video)
    }

    /// Paged tenant listing with filters and title/description search.
    #[tracing::instrument(skip(self, query))]
    pub async fn list(&self, organization_id: Uuid, query: &VideoListQuery) -> Result<VideoPage> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {VIDEO_COLUMNS}, COUNT(*) OVER() AS total_count FROM videos WHERE organization_id = "
        ));
        builder.push_bind(organization_id);

        if let Some(status) = query.status {
            builder.push(" AND status = ");
            builder.push_bind(status);
        }
        if let Some(sensitivity) = query.sensitivity_status {
            builder.push(" AND sensitivity->>'status' = ");
            builder.push_bind(sensitivity.to_string());
        }
        if let Some(search) = query.search.as_deref().filter(|s| !s.is_empty()) {
            let pattern = format!("%{}%", search.replace('%', "\\%").replace('_', "\\_"));
            builder.push(" AND (title ILIKE ");
            builder.push_bind(pattern.clone());
            builder.push(" OR description ILIKE ");
            builder.push_bind(pattern);
            builder.push(")");
        }

        let order = if query.descending { "DESC" } else { "ASC" };
        builder.push(format!(
            " ORDER BY {} {} LIMIT ",
            sort_column(&query.sort_by),
            order
        ));
        builder.push_bind(query.limit.clamp(1, 100));
        builder.push(" OFFSET ");
        builder.push_bind((query.page.max(1) - 1) * query.limit.clamp(1, 100));

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .context("Failed to list videos")?;

        let total = rows
            .first()
            .map(|row| row.try_get::<i64, _>("total_count"))
            .transpose()?
            .unwrap_or(0);
        let videos = rows
            .iter()
            .map(Video::from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(VideoPage { videos, total })
    }

    /// Update the caller-editable fields.
    #[tracing::instrument(skip(self, title, description))]
    pub async fn update_details(
        &self,
        organization_id: Uuid,
        id: Uuid,
        title: Option<&str>,
        description: Option<&str>,
        visibility: Option<Visibility>,
    ) -> Result<Option<Video>> {
        let video = sqlx::query_as::<Postgres, Video>(&format!(
            r#"
            UPDATE videos
            SET title = COALESCE($3, title),
                description = COALESCE($4, description),
                visibility = COALESCE($5, visibility),
                updated_at = NOW()
            WHERE id = $1 AND organization_id = $2
            RETURNING {VIDEO_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(organization_id)
        .bind(title)
        .bind(description)
        .bind(visibility)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to update video")?;
        Ok(video)
    }

    /// Delete the row, returning the blob keys so the caller can remove
    /// the stored bytes. Deleting twice finds no row the second time.
    #[tracing::instrument(skip(self))]
    pub async fn delete(
        &self,
        organization_id: Uuid,
        id: Uuid,
    ) -> Result<Option<(String, Option<String>)>> {
        let row = sqlx::query(
            r#"
            DELETE FROM videos
            WHERE id = $1 AND organization_id = $2
            RETURNING storage_key, thumbnail_key
            "#,
        )
        .bind(id)
        .bind(organization_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to delete video")?;

        Ok(match row {
            Some(row) => Some((row.try_get("storage_key")?, row.try_get("thumbnail_key")?)),
            None => None,
        })
    }

    /// Begin a processing attempt: status back to processing, progress
    /// reset to zero. Completed rows never regress, so a stale re-run
    /// of an already-finished job is a no-op.
    pub async fn begin_processing(&self, id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE videos
            SET status = 'processing', processing_progress = 0, updated_at = NOW()
            WHERE id = $1 AND status <> 'completed'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .context("Failed to mark video processing")?;
        Ok(())
    }

    /// Atomic progress write; concurrent readers observe either the old
    /// or the new value, never a torn row. Completed rows keep 100.
    pub async fn update_progress(&self, id: Uuid, progress: i32) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE videos
            SET processing_progress = $2, updated_at = NOW()
            WHERE id = $1 AND status <> 'completed'
            "#,
        )
        .bind(id)
        .bind(progress.clamp(0, 100))
        .execute(&self.pool)
        .await
        .context("Failed to update processing progress")?;
        Ok(())
    }

    pub async fn update_metadata(&self, id: Uuid, metadata: &VideoMetadata) -> Result<()> {
        sqlx::query("UPDATE videos SET metadata = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(serde_json::to_value(metadata)?)
            .execute(&self.pool)
            .await
            .context("Failed to store video metadata")?;
        Ok(())
    }

    pub async fn update_thumbnail(&self, id: Uuid, thumbnail_key: &str) -> Result<()> {
        sqlx::query("UPDATE videos SET thumbnail_key = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(thumbnail_key)
            .execute(&self.pool)
            .await
            .context("Failed to store thumbnail key")?;
        Ok(())
    }

    pub async fn update_sensitivity(&self, id: Uuid, report: &SensitivityReport) -> Result<()> {
        sqlx::query("UPDATE videos SET sensitivity = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(serde_json::to_value(report)?)
            .execute(&self.pool)
            .await
            .context("Failed to store sensitivity report")?;
        Ok(())
    }

    /// Terminal success. Completed rows never regress; the guard keeps a
    /// late retry of an already-completed video from rewriting state.
    pub async fn mark_completed(&self, id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE videos
            SET status = 'completed', processing_progress = 100, updated_at = NOW()
            WHERE id = $1 AND status <> 'completed'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .context("Failed to mark video completed")?;
        Ok(())
    }

    /// Terminal failure.
    pub async fn mark_failed(&self, id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE videos
            SET status = 'failed', processing_progress = 0, updated_at = NOW()
            WHERE id = $1 AND status <> 'completed'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .context("Failed to mark video failed")?;
        Ok(())
    }

    /// Best-effort view counter; failures are the caller's to ignore.
    pub async fn record_view(&self, id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE videos
            SET view_count = view_count + 1, last_viewed_at = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .context("Failed to record view")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_column_rejects_unknown_input() {
        assert_eq!(sort_column("title"), "title");
        assert_eq!(sort_column("view_count"), "view_count");
        assert_eq!(sort_column("created_at"), "created_at");
        assert_eq!(sort_column("id; DROP TABLE videos"), "created_at");
    }

    #[test]
    fn list_query_defaults_to_newest_first() {
        let query = VideoListQuery::default();
        assert_eq!(query.page, 1);
        assert_eq!(query.limit, 20);
        assert!(query.descending);
        assert_eq!(query.sort_by, "created_at");
    }
}
