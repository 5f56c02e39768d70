//! Authentication endpoints: register, login, refresh, logout, me.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use validator::Validate;

use crate::auth::middleware::REFRESH_TOKEN_COOKIE;
use crate::auth::models::AuthContext;
use crate::auth::passwords::{hash_password, verify_password};
use crate::auth::tokens::{TokenService, TokenVerification};
use crate::error::{ErrorResponse, HttpAppError, ValidatedJson};
use crate::state::AppState;
use vidhub_core::models::{
    slugify, Organization, OrganizationSettings, User, UserResponse, UserRole,
};
use vidhub_core::AppError;

const MIN_PASSWORD_LEN: usize = 8;

/// Slug of the shared organization that users registering without an
/// organization name are attached to.
const DEFAULT_ORG_SLUG: &str = "default";

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    #[validate(email)]
    pub email: String,
    pub password: String,
    pub name: String,
    #[serde(rename = "organizationName")]
    pub organization_name: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuthResponse {
    pub user: UserResponse,
    pub access_token: String,
}

fn refresh_cookie(state: &AppState, token: String) -> Cookie<'static> {
    Cookie::build((REFRESH_TOKEN_COOKIE, token))
        .path("/api/auth")
        .http_only(true)
        .same_site(SameSite::Strict)
        .secure(state.is_production())
        .max_age(time::Duration::days(
            state.config.auth.refresh_token_ttl_days,
        ))
        .build()
}

fn removal_cookie(state: &AppState) -> Cookie<'static> {
    Cookie::build((REFRESH_TOKEN_COOKIE, ""))
        .path("/api/auth")
        .http_only(true)
        .same_site(SameSite::Strict)
        .secure(state.is_production())
        .max_age(time::Duration::ZERO)
        .build()
}

/// Issue both tokens and persist the refresh digest in the one-slot
/// column.
async fn issue_session(state: &AppState, user: &User) -> Result<(String, String), AppError> {
    let access_token = state
        .tokens
        .issue_access(user)
        .map_err(|e| AppError::Internal(format!("Failed to sign access token: {}", e)))?;
    let refresh_token = state
        .tokens
        .issue_refresh(user.id)
        .map_err(|e| AppError::Internal(format!("Failed to sign refresh token: {}", e)))?;

    state
        .db
        .users
        .set_refresh_token(user.id, &TokenService::refresh_digest(&refresh_token))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok((access_token, refresh_token))
}

fn validate_registration(req: &RegisterRequest) -> Result<(), AppError> {
    req.validate()
        .map_err(|_| AppError::Validation("Invalid email address".to_string()))?;
    if req.password.len() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    if req.name.trim().is_empty() {
        return Err(AppError::Validation("Name is required".to_string()));
    }
    Ok(())
}

async fn default_organization(state: &AppState) -> Result<Organization, AppError> {
    if let Some(org) = state
        .db
        .organizations
        .get_by_slug(DEFAULT_ORG_SLUG)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?
    {
        return Ok(org);
    }

    match state
        .db
        .organizations
        .create("Default", DEFAULT_ORG_SLUG, &OrganizationSettings::default())
        .await
    {
        Ok(org) => Ok(org),
        // lost the creation race: someone else just made it
        Err(AppError::Conflict(_)) => state
            .db
            .organizations
            .get_by_slug(DEFAULT_ORG_SLUG)
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?
            .ok_or_else(|| AppError::Internal("Default organization vanished".to_string())),
        Err(e) => Err(e),
    }
}

#[utoipa::path(
    post,
    path = "/api/auth/register",
    tag = "auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered", body = AuthResponse),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 409, description = "Duplicate email or organization", body = ErrorResponse)
    )
)]
pub async fn register(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<RegisterRequest>,
) -> Result<impl IntoResponse, HttpAppError> {
    validate_registration(&req)?;
    let email = req.email.trim().to_lowercase();

    // The first registrant naming an organization creates it and owns
    // it; everyone else lands in the shared default organization.
    let (organization, role) = match req.organization_name.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => {
            let slug = slugify(name);
            if slug.is_empty() {
                return Err(AppError::Validation("Invalid organization name".to_string()).into());
            }
            let org = state
                .db
                .organizations
                .create(name, &slug, &OrganizationSettings::default())
                .await?;
            (org, UserRole::Admin)
        }
        _ => {
            let role = match req.role.as_deref() {
                Some("viewer") => UserRole::Viewer,
                _ => UserRole::Editor,
            };
            (default_organization(&state).await?, role)
        }
    };

    let password_hash = hash_password(&req.password, state.config.auth.bcrypt_cost)?;
    let user = state
        .db
        .users
        .create(&email, &password_hash, req.name.trim(), role, organization.id)
        .await?;

    if role == UserRole::Admin && organization.owner_id.is_none() {
        state
            .db
            .organizations
            .set_owner(organization.id, user.id)
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?;
    }

    let (access_token, refresh_token) = issue_session(&state, &user).await?;
    let jar = jar.add(refresh_cookie(&state, refresh_token));

    tracing::info!(user_id = %user.id, org_id = %organization.id, "User registered");
    Ok((
        StatusCode::CREATED,
        jar,
        Json(AuthResponse {
            user: UserResponse::from(user),
            access_token,
        }),
    ))
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = AuthResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse)
    )
)]
pub async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<impl IntoResponse, HttpAppError> {
    let email = req.email.trim().to_lowercase();

    let user = state
        .db
        .users
        .get_by_email(&email)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?
        .ok_or_else(|| AppError::Unauthorized("Invalid email or password".to_string()))?;

    if !verify_password(&req.password, &user.password_hash)? {
        return Err(AppError::Unauthorized("Invalid email or password".to_string()).into());
    }
    if !user.active {
        return Err(AppError::Forbidden("Account is disabled".to_string()).into());
    }

    state
        .db
        .users
        .touch_last_login(user.id)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    let (access_token, refresh_token) = issue_session(&state, &user).await?;
    let jar = jar.add(refresh_cookie(&state, refresh_token));

    tracing::info!(user_id = %user.id, "User logged in");
    Ok((
        jar,
        Json(AuthResponse {
            user: UserResponse::from(user),
            access_token,
        }),
    ))
}

#[utoipa::path(
    post,
    path = "/api/auth/refresh",
    tag = "auth",
    responses(
        (status = 200, description = "New access token", body = AuthResponse),
        (status = 401, description = "Invalid, expired, or replayed refresh token", body = ErrorResponse)
    )
)]
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<impl IntoResponse, HttpAppError> {
    let presented = jar
        .get(REFRESH_TOKEN_COOKIE)
        .map(|c| c.value().to_string())
        .ok_or_else(|| AppError::Unauthorized("Missing refresh token".to_string()))?;

    let claims = match state.tokens.verify_refresh(&presented) {
        TokenVerification::Valid(claims) => claims,
        TokenVerification::Expired => {
            return Err(AppError::Unauthorized("Refresh token expired".to_string()).into())
        }
        _ => return Err(AppError::Unauthorized("Invalid refresh token".to_string()).into()),
    };

    let user = state
        .db
        .users
        .get_by_id(claims.sub)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?
        .ok_or_else(|| AppError::Unauthorized("Unknown user".to_string()))?;

    if !user.active {
        return Err(AppError::Forbidden("Account is disabled".to_string()).into());
    }

    let presented_digest = TokenService::refresh_digest(&presented);
    match &user.refresh_token_current {
        Some(current) if *current == presented_digest => {}
        // one-slot mismatch: this token was already spent or revoked
        _ => {
            tracing::warn!(user_id = %user.id, "Refresh token reuse detected");
            return Err(AppError::Unauthorized("Refresh token reuse detected".to_string()).into());
        }
    }

    let access_token = state
        .tokens
        .issue_access(&user)
        .map_err(|e| AppError::Internal(format!("Failed to sign access token: {}", e)))?;
    let next_refresh = state
        .tokens
        .issue_refresh(user.id)
        .map_err(|e| AppError::Internal(format!("Failed to sign refresh token: {}", e)))?;

    // Compare-and-swap rotation: a concurrent refresh with the same
    // token loses the race and is treated as a replay.
    let rotated = state
        .db
        .users
        .swap_refresh_token(
            user.id,
            &presented_digest,
            &TokenService::refresh_digest(&next_refresh),
        )
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;
    if !rotated {
        return Err(AppError::Unauthorized("Refresh token reuse detected".to_string()).into());
    }

    let jar = jar.add(refresh_cookie(&state, next_refresh));
    Ok((
        jar,
        Json(AuthResponse {
            user: UserResponse::from(user),
            access_token,
        }),
    ))
}

#[utoipa::path(
    post,
    path = "/api/auth/logout",
    tag = "auth",
    responses((status = 200, description = "Logged out")),
    security(("bearer" = []))
)]
pub async fn logout(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    jar: CookieJar,
) -> Result<impl IntoResponse, HttpAppError> {
    state
        .db
        .users
        .clear_refresh_token(ctx.subject_id)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    // any realtime connections of this subject are told to close
    state.hub.close_subject(ctx.subject_id).await;

    let jar = jar.add(removal_cookie(&state));
    tracing::info!(user_id = %ctx.subject_id, "User logged out");
    Ok((jar, Json(serde_json::json!({}))))
}

#[utoipa::path(
    get,
    path = "/api/auth/me",
    tag = "auth",
    responses((status = 200, description = "Current user", body = UserResponse)),
    security(("bearer" = []))
)]
pub async fn me(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
) -> Result<impl IntoResponse, HttpAppError> {
    let user = state
        .db
        .users
        .get_by_id(ctx.subject_id)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    Ok(Json(serde_json::json!({ "user": UserResponse::from(user) })))
}
