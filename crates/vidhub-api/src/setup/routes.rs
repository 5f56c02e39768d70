//! Route configuration and middleware composition.
//!
//! Per-route order for protected routes: panic recovery → request
//! logging → CORS → body-size limit → global rate limit → auth →
//! category limiters/guards → handler. Cookies are parsed by
//! extractors, so no dedicated layer appears here.

use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    middleware::from_fn_with_state,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_rapidoc::RapiDoc;

use crate::api_doc::ApiDoc;
use crate::auth::middleware::{optional_auth, require_auth};
use crate::handlers::{auth, health, realtime, stream, video_upload, videos};
use crate::middleware::rate_limit::{auth_rate_limit, global_rate_limit, upload_rate_limit};
use crate::middleware::security_headers::security_headers;
use crate::state::AppState;

/// Slack on top of the configured maximum upload for multipart framing.
const BODY_LIMIT_SLACK_BYTES: usize = 10 * 1024 * 1024;

/// Cap on simultaneously served requests.
const HTTP_CONCURRENCY_LIMIT: usize = 10_000;

fn setup_cors(state: &AppState) -> Result<CorsLayer> {
    let origin: HeaderValue = state
        .config
        .server
        .frontend_origin
        .parse()
        .context("FRONTEND_ORIGIN is not a valid origin")?;

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]))
}

pub fn setup_routes(state: Arc<AppState>) -> Result<Router> {
    let cors = setup_cors(&state)?;
    let body_limit = state.config.media.max_video_size_bytes + BODY_LIMIT_SLACK_BYTES;

    // Credential endpoints carry the strict auth limiter.
    let auth_routes = Router::new()
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/refresh", post(auth::refresh))
        .layer(from_fn_with_state(state.clone(), auth_rate_limit));

    let public_routes = Router::new()
        .route("/api/health", get(health::health))
        .route(
            "/api/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        )
        .merge(auth_routes);

    // Streaming permits public visibility, so auth is optional; the
    // realtime handshake verifies its own token.
    let streaming_routes = Router::new()
        .route("/api/stream/{id}", get(stream::stream_video))
        .route("/api/stream/{id}/thumbnail", get(stream::stream_thumbnail))
        .layer(from_fn_with_state(state.clone(), optional_auth));

    let realtime_routes = Router::new().route("/api/realtime", get(realtime::realtime_connect));

    let protected_routes = Router::new()
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/me", get(auth::me))
        .route("/api/videos", get(videos::list_videos))
        .route(
            "/api/videos",
            post(video_upload::upload_video)
                .layer(from_fn_with_state(state.clone(), upload_rate_limit)),
        )
        .route(
            "/api/videos/{id}",
            get(videos::get_video)
                .put(videos::update_video)
                .delete(videos::delete_video),
        )
        .route("/api/videos/{id}/status", get(videos::video_status))
        .layer(from_fn_with_state(state.clone(), require_auth));

    let app = public_routes
        .merge(streaming_routes)
        .merge(realtime_routes)
        .merge(protected_routes)
        .merge(RapiDoc::new("/api/openapi.json").path("/docs"))
        // Layers run top-down from the last one added: recovery, then
        // tracing, CORS, body cap, headers, global rate limit.
        .layer(from_fn_with_state(state.clone(), global_rate_limit))
        .layer(axum::middleware::from_fn(security_headers))
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(ConcurrencyLimitLayer::new(HTTP_CONCURRENCY_LIMIT))
        .layer(CatchPanicLayer::new())
        .with_state(state);

    Ok(app)
}
