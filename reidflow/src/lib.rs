//! People Re-identification Pipeline
//!
//! Runs frames from a source through a pool of person detectors, restores
//! stream order, associates detections with tracks by appearance and
//! position, then publishes the positions of validated people.
//!
//! Detector and descriptor networks plug in through [`DetectorFactory`] and
//! [`EmbedderFactory`]; [`StubBackend`] provides colour-based stand-ins for
//! running without model files.

pub mod cancel;
pub mod config;
pub mod detector_pool;
pub mod detector_stub;
pub mod detector_trait;
pub mod error;
pub mod pipeline;
pub mod reid_stage;
pub mod sinks;
pub mod sorter;
pub mod source;
pub mod stats;
pub mod types;

pub use cancel::CancellationToken;
pub use config::{DetectorConfig, ModelFormat, ModelSpec, PipelineConfig, ReidConfig};
pub use detector_pool::DetectorPool;
pub use detector_stub::{StubBackend, SyntheticScene, Walker};
pub use detector_trait::{Detector, DetectorFactory, Embedder, EmbedderFactory};
pub use error::{PipelineError, Result};
pub use pipeline::{Pipeline, PipelineHandle};
pub use reid_stage::ReidStage;
pub use sinks::{
    ChannelPublisher, ChannelRenderSink, ExportCommand, JsonLinesPublisher, NullRenderSink,
    Publisher, RenderSink,
};
pub use sorter::Resequencer;
pub use source::{FrameSource, VecSource};
pub use stats::{StatsCollector, StatsSnapshot};
pub use types::{DetectedFrame, Frame, Image, TrackSnapshot, TrackedFrame};

/// Initialize the pipeline library
pub fn init() -> Result<()> {
    log::info!("Re-identification pipeline {} initialized", version());
    Ok(())
}

/// Get library version information
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
