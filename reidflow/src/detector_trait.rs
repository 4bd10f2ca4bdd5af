/// Model interfaces used by the pipeline
///
/// Detection and re-identification networks live behind these traits so
/// the pipeline works with any inference backend. Backends build one
/// session per worker through the factory traits, which receive the whole
/// config section: model location plus the thresholds or output layer the
/// session is built with.
use crate::config::{DetectorConfig, ReidConfig};
use crate::error::Result;
use crate::types::Image;
use reidtrack::{Bbox, Descriptor};

/// Finds people in a frame
pub trait Detector: Send {
    fn detect(&mut self, image: &Image) -> Result<Vec<Bbox>>;

    /// Detector name (for logging)
    fn name(&self) -> &str;
}

/// Computes an appearance descriptor for one person crop
pub trait Embedder: Send {
    /// `region` lies inside the image and is non-empty
    fn embed(&mut self, image: &Image, region: &Bbox) -> Result<Descriptor>;

    fn name(&self) -> &str;
}

/// Builds a detector session for one pool worker
pub trait DetectorFactory: Send + Sync {
    /// `config.model()` resolves the network; detections below
    /// `confidence_threshold` and overlaps above `nms_threshold` are the
    /// session's to suppress.
    fn create_detector(
        &self,
        config: &DetectorConfig,
        worker_id: usize,
    ) -> Result<Box<dyn Detector>>;
}

/// Builds the embedder session for the tracking stage
pub trait EmbedderFactory: Send + Sync {
    /// Descriptors are read from `config.output_layer_name`
    fn create_embedder(&self, config: &ReidConfig) -> Result<Box<dyn Embedder>>;
}
