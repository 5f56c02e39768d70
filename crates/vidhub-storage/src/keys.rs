//! Storage key generation.

use rand::RngCore;
use uuid::Uuid;

/// Prefix for uploaded originals.
pub const VIDEO_PREFIX: &str = "videos";

/// Prefix for generated thumbnails.
pub const THUMBNAIL_PREFIX: &str = "thumbnails";

/// Generate an opaque, collision-resistant key for an uploaded
/// original: 128 random bits, hex encoded, under `videos/`.
pub fn generate_video_key() -> String {
    let mut raw = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut raw);
    format!("{}/{}", VIDEO_PREFIX, hex::encode(raw))
}

/// Thumbnail key derived from the video id. Deriving (rather than
/// randomizing) makes retries overwrite the same object.
pub fn thumbnail_key(video_id: Uuid) -> String {
    format!("{}/{}.jpg", THUMBNAIL_PREFIX, video_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_keys_are_unique_and_prefixed() {
        let a = generate_video_key();
        let b = generate_video_key();
        assert_ne!(a, b);
        assert!(a.starts_with("videos/"));
        assert_eq!(a.len(), "videos/".len() + 32);
    }

    #[test]
    fn thumbnail_key_is_stable_per_video() {
        let id = Uuid::new_v4();
        assert_eq!(thumbnail_key(id), thumbnail_key(id));
        assert!(thumbnail_key(id).ends_with(".jpg"));
    }
}
