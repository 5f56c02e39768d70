//! Typed events pushed over the realtime channel.

use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use vidhub_core::models::{Resolution, SensitivityReport, VideoStatus};

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum RealtimeEvent {
    Connected {
        subject_id: Uuid,
        organization_id: Uuid,
    },
    VideoProgress {
        video_id: Uuid,
        progress: i32,
        stage: String,
        message: String,
    },
    VideoProcessComplete {
        video_id: Uuid,
        status: VideoStatus,
        sensitivity: SensitivityReport,
        thumbnail_key: Option<String>,
        duration: Option<f64>,
        resolution: Option<Resolution>,
    },
    VideoProcessFailed {
        video_id: Uuid,
        error: String,
    },
}

impl RealtimeEvent {
    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            RealtimeEvent::Connected { .. } => "connected",
            RealtimeEvent::VideoProgress { .. } => "video:progress",
            RealtimeEvent::VideoProcessComplete { .. } => "video:process:complete",
            RealtimeEvent::VideoProcessFailed { .. } => "video:process:failed",
        }
    }

    /// Serialize to the wire envelope `{"event": ..., "data": ...}`.
    pub fn to_wire(&self) -> String {
        json!({ "event": self.name(), "data": self }).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_event_wire_shape() {
        let video_id = Uuid::new_v4();
        let event = RealtimeEvent::VideoProgress {
            video_id,
            progress: 30,
            stage: "thumbnail".to_string(),
            message: "Thumbnail generated".to_string(),
        };

        let wire: serde_json::Value = serde_json::from_str(&event.to_wire()).unwrap();
        assert_eq!(wire["event"], "video:progress");
        assert_eq!(wire["data"]["progress"], 30);
        assert_eq!(wire["data"]["video_id"], video_id.to_string());
    }

    #[test]
    fn event_names_are_stable() {
        let failed = RealtimeEvent::VideoProcessFailed {
            video_id: Uuid::new_v4(),
            error: "boom".to_string(),
        };
        assert_eq!(failed.name(), "video:process:failed");

        let connected = RealtimeEvent::Connected {
            subject_id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
        };
        assert_eq!(connected.name(), "connected");
    }
}
