//! Multipart video upload.
//!
//! The blob is written before the row; if anything later fails the
//! blob is deleted best-effort so a rejected upload leaves nothing
//! behind. The processing job is enqueued only after the row exists.

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use bytes::Bytes;
use std::sync::Arc;

use crate::access::require_role;
use crate::auth::models::AuthContext;
use crate::error::{ErrorResponse, HttpAppError};
use crate::state::AppState;
use vidhub_core::models::{Organization, UserRole, VideoResponse, Visibility};
use vidhub_core::AppError;
use vidhub_storage::keys;

const MAX_TITLE_LEN: usize = 200;
const MAX_DESCRIPTION_LEN: usize = 1000;
const DEFAULT_JOB_PRIORITY: i32 = 5;

struct UploadFields {
    file: Bytes,
    original_filename: String,
    content_type: Option<String>,
    title: String,
    description: String,
    visibility: Visibility,
}

async fn collect_fields(mut multipart: Multipart) -> Result<UploadFields, AppError> {
    let mut file: Option<(Bytes, String, Option<String>)> = None;
    let mut title: Option<String> = None;
    let mut description = String::new();
    let mut visibility = Visibility::Organization;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Malformed multipart body: {}", e)))?
    {
        match field.name().unwrap_or_default() {
            "video" => {
                let filename = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| AppError::Validation("Video file must have a filename".to_string()))?;
                let content_type = field.content_type().map(str::to_string);
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Failed to read upload: {}", e)))?;
                file = Some((data, filename, content_type));
            }
            "title" => {
                title = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| AppError::BadRequest(format!("Invalid title field: {}", e)))?,
                );
            }
            "description" => {
                description = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Invalid description field: {}", e)))?;
            }
            "visibility" => {
                let raw = field.text().await.map_err(|e| {
                    AppError::BadRequest(format!("Invalid visibility field: {}", e))
                })?;
                visibility = raw
                    .parse()
                    .map_err(|_| AppError::Validation(format!("Unknown visibility '{}'", raw)))?;
            }
            other => {
                tracing::debug!(field = %other, "Ignoring unknown multipart field");
            }
        }
    }

    let (file, original_filename, content_type) =
        file.ok_or_else(|| AppError::Validation("Missing video file field".to_string()))?;
    let title = title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Validation("Title is required".to_string()))?;

    Ok(UploadFields {
        file,
        original_filename,
        content_type,
        title,
        description,
        visibility,
    })
}

fn extension_of(filename: &str) -> Option<String> {
    std::path::Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}

fn validate_upload(
    fields: &UploadFields,
    organization: &Organization,
    global_max_bytes: usize,
) -> Result<String, AppError> {
    if fields.title.chars().count() > MAX_TITLE_LEN {
        return Err(AppError::Validation(format!(
            "Title must be at most {} characters",
            MAX_TITLE_LEN
        )));
    }
    if fields.description.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(AppError::Validation(format!(
            "Description must be at most {} characters",
            MAX_DESCRIPTION_LEN
        )));
    }

    let format = extension_of(&fields.original_filename)
        .ok_or_else(|| AppError::Validation("File has no recognizable extension".to_string()))?;
    if !organization.settings.allowed_formats.contains(&format) {
        return Err(AppError::Validation(format!(
            "Format '{}' is not allowed; allowed: {}",
            format,
            organization.settings.allowed_formats.join(", ")
        )));
    }

    // Declared content type, when present, must agree with the
    // extension's family.
    if let Some(content_type) = fields.content_type.as_deref() {
        if !content_type.starts_with("video/") && content_type != "application/octet-stream" {
            return Err(AppError::Validation(format!(
                "Content type '{}' is not a video type",
                content_type
            )));
        }
    }

    let org_max_bytes = (organization.settings.max_video_size_mb as u64) * 1024 * 1024;
    let max_bytes = org_max_bytes.min(global_max_bytes as u64);
    if fields.file.len() as u64 > max_bytes {
        return Err(AppError::PayloadTooLarge(format!(
            "File of {} bytes exceeds the {} byte limit",
            fields.file.len(),
            max_bytes
        )));
    }
    if fields.file.is_empty() {
        return Err(AppError::Validation("Uploaded file is empty".to_string()));
    }

    Ok(format)
}

#[utoipa::path(
    post,
    path = "/api/videos",
    tag = "videos",
    request_body(content = Vec<u8>, content_type = "multipart/form-data", description = "Fields: video (file), title, description?, visibility?"),
    responses(
        (status = 201, description = "Video created and queued for processing", body = VideoResponse),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 403, description = "Role not allowed to upload", body = ErrorResponse),
        (status = 413, description = "File too large", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub async fn upload_video(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    multipart: Multipart,
) -> Result<impl IntoResponse, HttpAppError> {
    require_role(&ctx, &[UserRole::Editor, UserRole::Admin])?;

    let fields = collect_fields(multipart).await?;

    let organization = state
        .db
        .organizations
        .get_by_id(ctx.organization_id)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?
        .ok_or_else(|| AppError::Internal("Organization missing".to_string()))?;

    let format = validate_upload(&fields, &organization, state.config.media.max_video_size_bytes)?;

    // Organization storage quota over existing originals plus this one.
    let used = state
        .db
        .organizations
        .storage_used_bytes(organization.id)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;
    let quota = (organization.settings.max_storage_gb as u64) * 1024 * 1024 * 1024;
    if used as u64 + fields.file.len() as u64 > quota {
        return Err(AppError::PayloadTooLarge(
            "Organization storage quota exceeded".to_string(),
        )
        .into());
    }

    let storage_key = keys::generate_video_key();
    let file_size = fields.file.len() as i64;
    state.blobs.put(&storage_key, fields.file).await?;

    let video = match state
        .db
        .videos
        .create(
            &fields.title,
            &fields.description,
            &fields.original_filename,
            &storage_key,
            file_size,
            &format,
            ctx.organization_id,
            ctx.subject_id,
            fields.visibility,
        )
        .await
    {
        Ok(video) => video,
        Err(e) => {
            // the blob exists but the row does not: clean up so the
            // failed upload leaves nothing behind
            let blobs = state.blobs.clone();
            let key = storage_key.clone();
            tokio::spawn(async move {
                if let Err(cleanup_err) = blobs.delete(&key).await {
                    tracing::warn!(error = %cleanup_err, key = %key, "Failed to clean up blob after row failure");
                }
            });
            return Err(HttpAppError::from(AppError::Internal(e.to_string())));
        }
    };

    if let Err(e) = state.queue.enqueue(video.id, DEFAULT_JOB_PRIORITY).await {
        tracing::error!(video_id = %video.id, error = %e, "Failed to enqueue processing job");
        // the row exists with status=processing; the reaper will not
        // save it, so surface the failure
        return Err(HttpAppError::from(AppError::Internal(
            "Failed to queue processing".to_string(),
        )));
    }

    tracing::info!(
        video_id = %video.id,
        org_id = %ctx.organization_id,
        size_bytes = file_size,
        "Video uploaded and queued"
    );
    Ok((StatusCode::CREATED, Json(VideoResponse::from(video))))
}
