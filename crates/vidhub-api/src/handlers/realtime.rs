//! WebSocket endpoint for the realtime hub.
//!
//! The access token is verified at the handshake (header, cookie, or
//! `token` query parameter). The connection joins its tenant and
//! subject rooms, may subscribe to individual videos, and is closed by
//! the server when the access token expires; the client reconnects
//! with a fresh token and is re-admitted.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{HeaderMap, Uri},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{StreamExt, StreamMap};
use uuid::Uuid;

use crate::auth::middleware::resolve_access_token;
use crate::auth::models::AuthContext;
use crate::auth::tokens::TokenVerification;
use crate::error::HttpAppError;
use crate::state::AppState;
use vidhub_core::AppError;
use vidhub_realtime::{org_room, user_room, video_room, Frame, RealtimeEvent};

pub async fn realtime_connect(
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    uri: Uri,
) -> Result<Response, HttpAppError> {
    let token = resolve_access_token(&headers, &uri)
        .ok_or_else(|| AppError::Unauthorized("Missing access token".to_string()))?;

    let claims = match state.tokens.verify_access(&token) {
        TokenVerification::Valid(claims) => claims,
        TokenVerification::Expired => return Err(AppError::TokenExpired.into()),
        _ => return Err(AppError::Unauthorized("Invalid access token".to_string()).into()),
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

    let ctx = AuthContext {
        subject_id: user.id,
        role: user.role,
        organization_id: user.organization_id,
    };
    let expires_at = claims.exp;

    Ok(ws.on_upgrade(move |socket| handle_connection(state, socket, ctx, expires_at)))
}

async fn handle_connection(
    state: Arc<AppState>,
    mut socket: WebSocket,
    ctx: AuthContext,
    expires_at: i64,
) {
    let mut rooms: StreamMap<String, BroadcastStream<Frame>> = StreamMap::new();

    let tenant_room = org_room(ctx.organization_id);
    let subject_room = user_room(ctx.subject_id);
    rooms.insert(
        tenant_room.clone(),
        BroadcastStream::new(state.hub.subscribe(&tenant_room).await),
    );
    rooms.insert(
        subject_room.clone(),
        BroadcastStream::new(state.hub.subscribe(&subject_room).await),
    );

    let connected = RealtimeEvent::Connected {
        subject_id: ctx.subject_id,
        organization_id: ctx.organization_id,
    };
    if socket
        .send(Message::Text(connected.to_wire().into()))
        .await
        .is_err()
    {
        return;
    }

    tracing::info!(
        subject_id = %ctx.subject_id,
        org_id = %ctx.organization_id,
        "Realtime connection established"
    );

    // Token lifetime bounds the connection.
    let remaining = (expires_at - Utc::now().timestamp()).max(0) as u64;
    let expiry = tokio::time::sleep(Duration::from_secs(remaining));
    tokio::pin!(expiry);

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        handle_client_command(&state, &ctx, &mut rooms, text.as_str()).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!(error = %e, "Realtime socket error");
                        break;
                    }
                }
            }
            outgoing = rooms.next() => {
                match outgoing {
                    Some((_, Ok(Frame::Event(frame)))) => {
                        if socket.send(Message::Text(frame.to_string().into())).await.is_err() {
                            break;
                        }
                    }
                    Some((_, Ok(Frame::Close))) => {
                        tracing::info!(subject_id = %ctx.subject_id, "Closing realtime connection: logout");
                        let _ = socket.send(Message::Close(None)).await;
                        break;
                    }
                    // drop-oldest: the client reconciles by re-reading
                    // the video record
                    Some((room, Err(BroadcastStreamRecvError::Lagged(skipped)))) => {
                        tracing::debug!(room = %room, skipped, "Realtime consumer lagged");
                    }
                    None => break,
                }
            }
            _ = &mut expiry => {
                tracing::info!(subject_id = %ctx.subject_id, "Closing realtime connection: token expired");
                let _ = socket.send(Message::Close(None)).await;
                break;
            }
        }
    }

    tracing::debug!(subject_id = %ctx.subject_id, "Realtime connection closed");
}

/// Text protocol: `subscribe:video <id>` / `unsubscribe:video <id>`.
async fn handle_client_command(
    state: &AppState,
    ctx: &AuthContext,
    rooms: &mut StreamMap<String, BroadcastStream<Frame>>,
    command: &str,
) {
    let mut parts = command.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some("subscribe:video"), Some(raw_id)) => {
            let Ok(video_id) = raw_id.parse::<Uuid>() else {
                return;
            };
            // tenant guard: only videos in the caller's organization
            match state.db.videos.get(ctx.organization_id, video_id).await {
                Ok(Some(_)) => {
                    let room = video_room(video_id);
                    if !rooms.contains_key(&room) {
                        let receiver = state.hub.subscribe(&room).await;
                        rooms.insert(room, BroadcastStream::new(receiver));
                    }
                }
                Ok(None) => {
                    tracing::debug!(video_id = %video_id, "Ignored subscription to foreign video");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Video lookup failed during subscribe");
                }
            }
        }
        (Some("unsubscribe:video"), Some(raw_id)) => {
            if let Ok(video_id) = raw_id.parse::<Uuid>() {
                rooms.remove(&video_room(video_id));
            }
        }
        _ => {
            tracing::debug!(command = %command, "Unknown realtime command");
        }
    }
}
