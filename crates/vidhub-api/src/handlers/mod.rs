//! HTTP request handlers.

pub mod auth;
pub mod health;
pub mod realtime;
pub mod stream;
pub mod video_upload;
pub mod videos;
