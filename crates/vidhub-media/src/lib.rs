//! Media adapter: the only module that talks to the external ffmpeg /
//! ffprobe toolchain, plus the pure sensitivity analyzer over probed
//! metadata.

pub mod probe;
pub mod sensitivity;
pub mod thumbnail;

pub use probe::{MediaProber, VideoProbe};
pub use sensitivity::{analyze, analysis_error_report, AnalyzerInput};
pub use thumbnail::ThumbnailGenerator;
