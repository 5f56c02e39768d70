//! Video metadata endpoints: list, get, update, delete, status.

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::access::{check_modify_access, check_read_access};
use crate::auth::models::AuthContext;
use crate::error::{ErrorResponse, HttpAppError, ValidatedJson};
use crate::state::AppState;
use vidhub_core::models::{
    SensitivityStatus, Video, VideoResponse, VideoStatus, Visibility,
};
use vidhub_core::AppError;
use vidhub_db::VideoListQuery;

const MAX_TITLE_LEN: usize = 200;
const MAX_DESCRIPTION_LEN: usize = 1000;

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListParams {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub status: Option<VideoStatus>,
    pub sensitivity_status: Option<SensitivityStatus>,
    pub sort_by: Option<String>,
    pub order: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_pages: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VideoListResponse {
    pub videos: Vec<VideoResponse>,
    pub pagination: Pagination,
}

async fn load_tenant_video(
    state: &AppState,
    ctx: &AuthContext,
    id: Uuid,
) -> Result<Video, AppError> {
    state
        .db
        .videos
        .get(ctx.organization_id, id)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?
        .ok_or_else(|| AppError::NotFound("Video not found".to_string()))
}

#[utoipa::path(
    get,
    path = "/api/videos",
    tag = "videos",
    params(ListParams),
    responses((status = 200, description = "Videos in the caller's organization", body = VideoListResponse)),
    security(("bearer" = []))
)]
pub async fn list_videos(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, HttpAppError> {
    let limit = params.limit.unwrap_or(20).clamp(1, 100);
    let page = params.page.unwrap_or(1).max(1);

    let query = VideoListQuery {
        page,
        limit,
        status: params.status,
        sensitivity_status: params.sensitivity_status,
        sort_by: params.sort_by.unwrap_or_else(|| "created_at".to_string()),
        descending: !matches!(params.order.as_deref(), Some("asc")),
        search: params.search,
    };

    let page_result = state
        .db
        .videos
        .list(ctx.organization_id, &query)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    let total = page_result.total;
    Ok(Json(VideoListResponse {
        videos: page_result
            .videos
            .into_iter()
            .map(VideoResponse::from)
            .collect(),
        pagination: Pagination {
            page,
            limit,
            total,
            total_pages: (total + limit - 1) / limit,
        },
    }))
}

#[utoipa::path(
    get,
    path = "/api/videos/{id}",
    tag = "videos",
    params(("id" = Uuid, Path, description = "Video id")),
    responses(
        (status = 200, description = "Video", body = VideoResponse),
        (status = 404, description = "Not found in the caller's tenant", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub async fn get_video(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpAppError> {
    let video = load_tenant_video(&state, &ctx, id).await?;
    check_read_access(&video, Some(&ctx))?;
    Ok(Json(VideoResponse::from(video)))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateVideoRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub visibility: Option<Visibility>,
}

#[utoipa::path(
    put,
    path = "/api/videos/{id}",
    tag = "videos",
    params(("id" = Uuid, Path, description = "Video id")),
    request_body = UpdateVideoRequest,
    responses(
        (status = 200, description = "Updated video", body = VideoResponse),
        (status = 403, description = "Not the uploader or an admin", body = ErrorResponse),
        (status = 404, description = "Not found", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub async fn update_video(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<UpdateVideoRequest>,
) -> Result<impl IntoResponse, HttpAppError> {
    let video = load_tenant_video(&state, &ctx, id).await?;
    check_modify_access(&video, &ctx)?;

    if let Some(title) = req.title.as_deref() {
        let title = title.trim();
        if title.is_empty() || title.chars().count() > MAX_TITLE_LEN {
            return Err(AppError::Validation(format!(
                "Title must be 1-{} characters",
                MAX_TITLE_LEN
            ))
            .into());
        }
    }
    if let Some(description) = req.description.as_deref() {
        if description.chars().count() > MAX_DESCRIPTION_LEN {
            return Err(AppError::Validation(format!(
                "Description must be at most {} characters",
                MAX_DESCRIPTION_LEN
            ))
            .into());
        }
    }

    let updated = state
        .db
        .videos
        .update_details(
            ctx.organization_id,
            id,
            req.title.as_deref().map(str::trim),
            req.description.as_deref(),
            req.visibility,
        )
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?
        .ok_or_else(|| AppError::NotFound("Video not found".to_string()))?;

    Ok(Json(VideoResponse::from(updated)))
}

#[utoipa::path(
    delete,
    path = "/api/videos/{id}",
    tag = "videos",
    params(("id" = Uuid, Path, description = "Video id")),
    responses(
        (status = 200, description = "Deleted"),
        (status = 403, description = "Not the uploader or an admin", body = ErrorResponse),
        (status = 404, description = "Not found", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub async fn delete_video(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpAppError> {
    let video = load_tenant_video(&state, &ctx, id).await?;
    check_modify_access(&video, &ctx)?;

    let keys = state
        .db
        .videos
        .delete(ctx.organization_id, id)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?
        .ok_or_else(|| AppError::NotFound("Video not found".to_string()))?;

    // Row first, then blobs: a re-issued delete 404s instead of
    // deleting the blob twice.
    let (storage_key, thumbnail_key) = keys;
    let blobs = state.blobs.clone();
    tokio::spawn(async move {
        if let Err(e) = blobs.delete(&storage_key).await {
            tracing::warn!(key = %storage_key, error = %e, "Failed to delete original blob");
        }
        if let Some(thumb) = thumbnail_key {
            if let Err(e) = blobs.delete(&thumb).await {
                tracing::warn!(key = %thumb, error = %e, "Failed to delete thumbnail blob");
            }
        }
    });

    tracing::info!(video_id = %id, "Video deleted");
    Ok(Json(serde_json::json!({})))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VideoStatusResponse {
    pub status: VideoStatus,
    pub progress: i32,
    pub sensitivity_status: SensitivityStatus,
}

#[utoipa::path(
    get,
    path = "/api/videos/{id}/status",
    tag = "videos",
    params(("id" = Uuid, Path, description = "Video id")),
    responses(
        (status = 200, description = "Processing status", body = VideoStatusResponse),
        (status = 404, description = "Not found", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub async fn video_status(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpAppError> {
    let video = load_tenant_video(&state, &ctx, id).await?;
    check_read_access(&video, Some(&ctx))?;

    Ok(Json(VideoStatusResponse {
        status: video.status,
        progress: video.processing_progress,
        sensitivity_status: video.sensitivity.status,
    }))
}
