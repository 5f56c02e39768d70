//! Background processing of uploaded videos.

mod pipeline;

pub use pipeline::ProcessingPipeline;
