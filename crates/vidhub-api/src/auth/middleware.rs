//! Auth & tenancy middleware.
//!
//! The access token is resolved from the `Authorization` header, the
//! access-token cookie, or the `token` query parameter, in that order.
//! The query parameter exists because media elements cannot set
//! headers on range requests.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use std::sync::Arc;

use crate::auth::models::AuthContext;
use crate::auth::tokens::TokenVerification;
use crate::error::HttpAppError;
use crate::state::AppState;
use vidhub_core::AppError;

/// Cookie the client may store its access token in.
pub const ACCESS_TOKEN_COOKIE: &str = "access_token";

/// Cookie carrying the refresh token, scoped to the auth routes.
pub const REFRESH_TOKEN_COOKIE: &str = "refresh_token";

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::to_string)
}

fn cookie_token(headers: &HeaderMap) -> Option<String> {
    CookieJar::from_headers(headers)
        .get(ACCESS_TOKEN_COOKIE)
        .map(|c| c.value().to_string())
}

fn query_token(uri: &Uri) -> Option<String> {
    uri.query()?
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == "token")
        .map(|(_, value)| value.to_string())
}

/// Header -> cookie -> query parameter, first hit wins.
pub fn resolve_access_token(headers: &HeaderMap, uri: &Uri) -> Option<String> {
    bearer_token(headers)
        .or_else(|| cookie_token(headers))
        .or_else(|| query_token(uri))
}

async fn authenticate(state: &AppState, token: &str) -> Result<AuthContext, AppError> {
    let claims = match state.tokens.verify_access(token) {
        TokenVerification::Valid(claims) => claims,
        TokenVerification::Expired => return Err(AppError::TokenExpired),
        TokenVerification::WrongKind => {
            return Err(AppError::Unauthorized("Wrong token kind".to_string()))
        }
        TokenVerification::Malformed | TokenVerification::BadSignature => {
            return Err(AppError::Unauthorized("Invalid access token".to_string()))
        }
    };

    // Claims alone are not enough: the account must still exist and be
    // active.
    let user = state
        .db
        .users
        .get_by_id(claims.sub)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?
        .ok_or_else(|| AppError::Unauthorized("Unknown user".to_string()))?;

    if !user.active {
        return Err(AppError::Forbidden("Account is disabled".to_string()));
    }

    Ok(AuthContext {
        subject_id: user.id,
        role: user.role,
        organization_id: user.organization_id,
    })
}

/// Reject requests without a valid access token.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = match resolve_access_token(request.headers(), request.uri()) {
        Some(token) => token,
        None => {
            return HttpAppError(AppError::Unauthorized(
                "Missing access token".to_string(),
            ))
            .into_response()
        }
    };

    match authenticate(&state, &token).await {
        Ok(ctx) => {
            request.extensions_mut().insert(ctx);
            next.run(request).await
        }
        Err(e) => HttpAppError(e).into_response(),
    }
}

/// Attach the caller's identity when a token is present; proceed
/// anonymously when it is not. An invalid token is still rejected.
pub async fn optional_auth(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(token) = resolve_access_token(request.headers(), request.uri()) {
        match authenticate(&state, &token).await {
            Ok(ctx) => {
                request.extensions_mut().insert(ctx);
            }
            Err(e) => return HttpAppError(e).into_response(),
        }
    }
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_header_wins_over_cookie_and_query() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "Authorization",
            HeaderValue::from_static("Bearer header-token"),
        );
        headers.insert(
            "Cookie",
            HeaderValue::from_static("access_token=cookie-token"),
        );
        let uri: Uri = "/api/stream/x?token=query-token".parse().unwrap();

        assert_eq!(
            resolve_access_token(&headers, &uri).as_deref(),
            Some("header-token")
        );
    }

    #[test]
    fn cookie_wins_over_query() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "Cookie",
            HeaderValue::from_static("other=1; access_token=cookie-token"),
        );
        let uri: Uri = "/api/stream/x?token=query-token".parse().unwrap();

        assert_eq!(
            resolve_access_token(&headers, &uri).as_deref(),
            Some("cookie-token")
        );
    }

    #[test]
    fn query_parameter_is_the_last_resort() {
        let headers = HeaderMap::new();
        let uri: Uri = "/api/stream/x?a=b&token=query-token&c=d".parse().unwrap();

        assert_eq!(
            resolve_access_token(&headers, &uri).as_deref(),
            Some("query-token")
        );
    }

    #[test]
    fn no_token_resolves_to_none() {
        let headers = HeaderMap::new();
        let uri: Uri = "/api/videos".parse().unwrap();
        assert!(resolve_access_token(&headers, &uri).is_none());
    }

    #[test]
    fn non_bearer_authorization_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert("Authorization", HeaderValue::from_static("Basic dXNlcg=="));
        let uri: Uri = "/api/videos".parse().unwrap();
        assert!(resolve_access_token(&headers, &uri).is_none());
    }
}
