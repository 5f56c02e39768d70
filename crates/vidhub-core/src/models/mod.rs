//! Domain models shared across crates.

pub mod job;
pub mod organization;
pub mod user;
pub mod video;

pub use job::{Job, JobStats, JobStatus};
pub use organization::{slugify, Organization, OrganizationSettings};
pub use user::{User, UserResponse, UserRole};
pub use video::{
    Resolution, SensitivityLevel, SensitivityReport, SensitivityStatus, Video, VideoMetadata,
    VideoResponse, VideoStatus, Visibility,
};
