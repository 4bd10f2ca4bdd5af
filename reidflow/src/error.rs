//! Error types for the re-identification pipeline

use thiserror::Error;

/// Result type alias for the pipeline
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors that can stop a pipeline stage
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Tracker configuration error: {0}")]
    TrackerConfig(#[from] reidtrack::ConfigError),

    #[error("Model loading failed: {0}")]
    ModelLoadError(String),

    #[error("Inference failed: {0}")]
    InferenceError(String),

    #[error("Frame source error: {0}")]
    SourceError(String),

    #[error("Stream ended")]
    StreamEnded,

    #[error("Cancelled")]
    Cancelled,

    #[error("Channel disconnected: {0}")]
    Disconnected(&'static str),

    #[error("Publish failed: {0}")]
    PublishError(String),

    #[error("Stage `{0}` panicked")]
    StagePanic(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Image processing error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("JSON serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn model_load<S: Into<String>>(msg: S) -> Self {
        Self::ModelLoadError(msg.into())
    }

    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::InferenceError(msg.into())
    }

    pub fn source<S: Into<String>>(msg: S) -> Self {
        Self::SourceError(msg.into())
    }

    pub fn publish<S: Into<String>>(msg: S) -> Self {
        Self::PublishError(msg.into())
    }

    /// Cancellation is a normal shutdown, not a failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(
            PipelineError::config("unknown model format `tflite`").to_string(),
            "Configuration error: unknown model format `tflite`"
        );
        assert!(PipelineError::Cancelled.is_cancelled());
        assert!(!PipelineError::StreamEnded.is_cancelled());

        let err: PipelineError = reidtrack::ConfigError::Zero("sma_window").into();
        assert_eq!(
            err.to_string(),
            "Tracker configuration error: `sma_window` must be greater than zero"
        );
    }
}
