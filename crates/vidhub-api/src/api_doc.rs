//! OpenAPI document assembled from the handler annotations.

use utoipa::OpenApi;

use crate::error::ErrorResponse;
use crate::handlers;
use vidhub_core::models::{
    Resolution, SensitivityLevel, SensitivityReport, SensitivityStatus, UserResponse, UserRole,
    VideoMetadata, VideoResponse, VideoStatus, Visibility,
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "vidhub API",
        description = "Multi-tenant video management service"
    ),
    paths(
        handlers::health::health,
        handlers::auth::register,
        handlers::auth::login,
        handlers::auth::refresh,
        handlers::auth::logout,
        handlers::auth::me,
        handlers::video_upload::upload_video,
        handlers::videos::list_videos,
        handlers::videos::get_video,
        handlers::videos::update_video,
        handlers::videos::delete_video,
        handlers::videos::video_status,
        handlers::stream::stream_video,
        handlers::stream::stream_thumbnail,
    ),
    components(schemas(
        ErrorResponse,
        UserResponse,
        UserRole,
        VideoResponse,
        VideoStatus,
        Visibility,
        VideoMetadata,
        Resolution,
        SensitivityReport,
        SensitivityLevel,
        SensitivityStatus,
        handlers::auth::RegisterRequest,
        handlers::auth::LoginRequest,
        handlers::auth::AuthResponse,
        handlers::videos::UpdateVideoRequest,
        handlers::videos::VideoListResponse,
        handlers::videos::Pagination,
        handlers::videos::VideoStatusResponse,
        handlers::health::HealthResponse,
    ))
)]
pub struct ApiDoc;
