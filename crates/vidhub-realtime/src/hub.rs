//! Room registry and fan-out.
//!
//! Each room is a `tokio::sync::broadcast` channel; a connection
//! subscribes to the rooms it belongs to and forwards received frames
//! onto its socket. A slow consumer lags the channel and skips the
//! oldest frames instead of back-pressuring publishers, which is the
//! required drop-oldest overflow policy. Clients reconcile by
//! re-reading the video record after a gap.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::event::RealtimeEvent;

/// Per-room outbound queue depth before the oldest frames are dropped.
const ROOM_BUFFER: usize = 256;

pub fn org_room(organization_id: Uuid) -> String {
    format!("org:{}", organization_id)
}

pub fn user_room(user_id: Uuid) -> String {
    format!("user:{}", user_id)
}

pub fn video_room(video_id: Uuid) -> String {
    format!("video:{}", video_id)
}

/// What a room delivers to its connections.
#[derive(Debug, Clone)]
pub enum Frame {
    /// A serialized event envelope to forward to the client.
    Event(Arc<str>),
    /// Server-initiated disconnect (logout); the connection closes.
    Close,
}

/// Shared hub handle. Cheap to clone.
#[derive(Clone, Default)]
pub struct Hub {
    rooms: Arc<RwLock<HashMap<String, broadcast::Sender<Frame>>>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join a room, creating it on first subscription.
    pub async fn subscribe(&self, room: &str) -> broadcast::Receiver<Frame> {
        let mut rooms = self.rooms.write().await;
        rooms
            .entry(room.to_string())
            .or_insert_with(|| broadcast::channel(ROOM_BUFFER).0)
            .subscribe()
    }

    async fn send(&self, room: &str, frame: Frame) -> bool {
        let delivered = {
            let rooms = self.rooms.read().await;
            match rooms.get(room) {
                Some(sender) => sender.send(frame).is_ok(),
                None => return false,
            }
        };

        if !delivered {
            // nobody is listening any more; drop the empty room
            let mut rooms = self.rooms.write().await;
            if let Some(sender) = rooms.get(room) {
                if sender.receiver_count() == 0 {
                    rooms.remove(room);
                }
            }
        }
        delivered
    }

    /// Publish an event to a room. Rooms with no connections are a
    /// no-op.
    pub async fn emit(&self, room: &str, event: &RealtimeEvent) {
        let frame = Frame::Event(Arc::from(event.to_wire()));
        if self.send(room, frame).await {
            tracing::trace!(room = %room, event = %event.name(), "Event published");
        }
    }

    /// Tell every connection of a subject to close (explicit logout).
    pub async fn close_subject(&self, user_id: Uuid) {
        let room = user_room(user_id);
        if self.send(&room, Frame::Close).await {
            tracing::debug!(user_id = %user_id, "Close signal sent to subject connections");
        }
    }

    /// Number of connections currently joined to a room.
    pub async fn room_size(&self, room: &str) -> usize {
        let rooms = self.rooms.read().await;
        rooms
            .get(room)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }

    /// Number of live rooms.
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}
