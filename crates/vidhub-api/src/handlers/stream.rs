//! Byte-range streaming of originals and thumbnails.
//!
//! Auth on these routes accepts the `token` query parameter because
//! media elements cannot set headers. The body is copied from a
//! positioned blob read in bounded chunks; dropping the response body
//! (client disconnect) drops the stream and aborts the copy.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures::StreamExt;
use std::sync::Arc;
use uuid::Uuid;

use crate::access::check_read_access;
use crate::auth::models::MaybeAuth;
use crate::error::{ErrorResponse, HttpAppError};
use crate::state::AppState;
use vidhub_core::models::{Video, VideoStatus};
use vidhub_core::AppError;

/// One inclusive byte range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// Parse a `Range` header against a resource of `size` bytes.
///
/// Supported: `bytes=start-end` and `bytes=start-`. Suffix ranges
/// (`bytes=-N`) and multi-range requests are unsupported and invalid.
/// Any out-of-bounds range is invalid; the caller answers 416.
pub fn parse_range(header: &str, size: u64) -> Option<ByteRange> {
    let spec = header.strip_prefix("bytes=")?;
    if spec.contains(',') {
        return None;
    }

    let (start_raw, end_raw) = spec.split_once('-')?;
    if start_raw.is_empty() {
        // suffix range: unsupported
        return None;
    }

    let start: u64 = start_raw.trim().parse().ok()?;
    let end: u64 = if end_raw.trim().is_empty() {
        size.checked_sub(1)?
    } else {
        end_raw.trim().parse().ok()?
    };

    if start > end || end >= size {
        return None;
    }
    Some(ByteRange { start, end })
}

fn unsatisfiable_range(size: u64) -> Response {
    let mut response = HttpAppError(AppError::RangeNotSatisfiable { size }).into_response();
    if let Ok(value) = format!("bytes */{}", size).parse() {
        response
            .headers_mut()
            .insert(header::CONTENT_RANGE, value);
    }
    response
}

async fn load_streamable_video(
    state: &AppState,
    ctx: &MaybeAuth,
    id: Uuid,
) -> Result<Video, HttpAppError> {
    let video = state
        .db
        .videos
        .get_unchecked(id)
        .await
        .map_err(|e| HttpAppError(AppError::Internal(e.to_string())))?
        .ok_or_else(|| HttpAppError(AppError::NotFound("Video not found".to_string())))?;

    check_read_access(&video, ctx.0.as_ref())?;
    Ok(video)
}

fn body_from_blob(stream: vidhub_storage::ByteStream) -> Body {
    Body::from_stream(stream.map(|chunk| {
        chunk.map_err(|e| std::io::Error::other(format!("Blob stream error: {}", e)))
    }))
}

#[utoipa::path(
    get,
    path = "/api/stream/{id}",
    tag = "stream",
    params(
        ("id" = Uuid, Path, description = "Video id"),
        ("token" = Option<String>, Query, description = "Access token for media elements")
    ),
    responses(
        (status = 200, description = "Full video body"),
        (status = 206, description = "Partial content"),
        (status = 202, description = "Still processing"),
        (status = 404, description = "Not found", body = ErrorResponse),
        (status = 416, description = "Range not satisfiable"),
        (status = 500, description = "Processing failed", body = ErrorResponse)
    )
)]
pub async fn stream_video(
    State(state): State<Arc<AppState>>,
    ctx: MaybeAuth,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Response, HttpAppError> {
    let video = load_streamable_video(&state, &ctx, id).await?;

    match video.status {
        VideoStatus::Completed => {}
        VideoStatus::Failed => {
            return Err(HttpAppError(AppError::Internal(
                "Video processing failed".to_string(),
            )));
        }
        VideoStatus::Uploading | VideoStatus::Processing => {
            return Ok((
                StatusCode::ACCEPTED,
                Json(serde_json::json!({
                    "status": video.status,
                    "progress": video.processing_progress,
                })),
            )
                .into_response());
        }
    }

    let size = video.file_size.max(0) as u64;
    let content_type = video.content_type();

    let range_header = headers
        .get(header::RANGE)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string);

    let response = match range_header {
        None => {
            let stream = state.blobs.get_stream(&video.storage_key).await?;
            Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, content_type)
                .header(header::CONTENT_LENGTH, size)
                .header(header::ACCEPT_RANGES, "bytes")
                .header(header::CACHE_CONTROL, "public, max-age=31536000")
                .body(body_from_blob(stream))
                .map_err(|e| AppError::Internal(format!("Failed to build response: {}", e)))?
        }
        Some(raw) => {
            let range = match parse_range(&raw, size) {
                Some(range) => range,
                None => return Ok(unsatisfiable_range(size)),
            };

            let stream = state
                .blobs
                .get_range_stream(&video.storage_key, range.start, range.len())
                .await?;
            Response::builder()
                .status(StatusCode::PARTIAL_CONTENT)
                .header(
                    header::CONTENT_RANGE,
                    format!("bytes {}-{}/{}", range.start, range.end, size),
                )
                .header(header::CONTENT_TYPE, content_type)
                .header(header::CONTENT_LENGTH, range.len())
                .header(header::ACCEPT_RANGES, "bytes")
                .header(header::CACHE_CONTROL, "public, max-age=31536000")
                .body(body_from_blob(stream))
                .map_err(|e| AppError::Internal(format!("Failed to build response: {}", e)))?
        }
    };

    // Headers are decided; count the view off the request path. Losing
    // this write never affects delivery.
    let videos = state.db.videos.clone();
    tokio::spawn(async move {
        if let Err(e) = videos.record_view(id).await {
            tracing::debug!(video_id = %id, error = %e, "View count update failed");
        }
    });

    Ok(response)
}

#[utoipa::path(
    get,
    path = "/api/stream/{id}/thumbnail",
    tag = "stream",
    params(
        ("id" = Uuid, Path, description = "Video id"),
        ("token" = Option<String>, Query, description = "Access token for media elements")
    ),
    responses(
        (status = 200, description = "JPEG thumbnail", content_type = "image/jpeg"),
        (status = 404, description = "No thumbnail", body = ErrorResponse)
    )
)]
pub async fn stream_thumbnail(
    State(state): State<Arc<AppState>>,
    ctx: MaybeAuth,
    Path(id): Path<Uuid>,
) -> Result<Response, HttpAppError> {
    let video = load_streamable_video(&state, &ctx, id).await?;

    let thumbnail_key = video
        .thumbnail_key
        .as_deref()
        .ok_or_else(|| HttpAppError(AppError::NotFound("No thumbnail".to_string())))?;

    let stream = state.blobs.get_stream(thumbnail_key).await?;
    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "image/jpeg")
        .header(header::CACHE_CONTROL, "public, max-age=31536000")
        .body(body_from_blob(stream))
        .map_err(|e| AppError::Internal(format!("Failed to build response: {}", e)))?;
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_range_parses() {
        let range = parse_range("bytes=0-1048575", 209_715_200).unwrap();
        assert_eq!(range.start, 0);
        assert_eq!(range.end, 1_048_575);
        assert_eq!(range.len(), 1_048_576);
    }

    #[test]
    fn open_ended_range_defaults_to_last_byte() {
        let range = parse_range("bytes=100-", 1000).unwrap();
        assert_eq!(range.start, 100);
        assert_eq!(range.end, 999);
    }

    #[test]
    fn single_byte_ranges() {
        // first byte
        let range = parse_range("bytes=0-0", 1000).unwrap();
        assert_eq!(range.len(), 1);
        // last byte
        let range = parse_range("bytes=999-999", 1000).unwrap();
        assert_eq!((range.start, range.end), (999, 999));
    }

    #[test]
    fn out_of_bounds_rejected() {
        // start at the file size
        assert!(parse_range("bytes=1000-", 1000).is_none());
        assert!(parse_range("bytes=1000-1000", 1000).is_none());
        // end beyond the file
        assert!(parse_range("bytes=0-1000", 1000).is_none());
        // inverted
        assert!(parse_range("bytes=10-5", 1000).is_none());
    }

    #[test]
    fn suffix_and_multi_ranges_unsupported() {
        assert!(parse_range("bytes=-500", 1000).is_none());
        assert!(parse_range("bytes=0-1,5-9", 1000).is_none());
    }

    #[test]
    fn malformed_ranges_rejected() {
        assert!(parse_range("bites=0-1", 1000).is_none());
        assert!(parse_range("bytes=a-b", 1000).is_none());
        assert!(parse_range("bytes=", 1000).is_none());
        assert!(parse_range("bytes=5", 1000).is_none());
    }

    #[test]
    fn empty_file_has_no_valid_range() {
        assert!(parse_range("bytes=0-", 0).is_none());
        assert!(parse_range("bytes=0-0", 0).is_none());
    }

    #[test]
    fn seek_window_in_large_file() {
        let range = parse_range("bytes=104857600-105906175", 209_715_200).unwrap();
        assert_eq!(range.len(), 1_048_576);
        assert_eq!(range.start, 104_857_600);
        assert_eq!(range.end, 105_906_175);
    }
}
