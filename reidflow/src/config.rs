//! Pipeline configuration
//!
//! Every section falls back to its defaults, so a JSON file only needs the
//! keys it wants to change.

use crate::error::{PipelineError, Result};
use reidtrack::TrackerConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Network formats the inference backends can load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFormat {
    Onnx,
    OpenVino,
    Caffe,
}

impl FromStr for ModelFormat {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "onnx" => Ok(Self::Onnx),
            "openvino" => Ok(Self::OpenVino),
            "caffe" => Ok(Self::Caffe),
            other => Err(PipelineError::config(format!(
                "unknown model format `{}`, expected onnx, openvino or caffe",
                other
            ))),
        }
    }
}

impl fmt::Display for ModelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Onnx => "onnx",
            Self::OpenVino => "openvino",
            Self::Caffe => "caffe",
        };
        f.write_str(name)
    }
}

/// A network resolved from configuration, ready to hand to a backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSpec {
    Onnx { model: PathBuf },
    OpenVino { model: PathBuf, config: Option<PathBuf> },
    Caffe { model: PathBuf, config: PathBuf },
}

impl ModelSpec {
    pub fn resolve(format: &str, path: &str, config_path: Option<&str>) -> Result<Self> {
        if path.is_empty() {
            return Err(PipelineError::config("model path is empty"));
        }
        let model = PathBuf::from(path);
        let config = config_path.filter(|p| !p.is_empty()).map(PathBuf::from);

        match format.parse::<ModelFormat>()? {
            ModelFormat::Onnx => Ok(Self::Onnx { model }),
            ModelFormat::OpenVino => Ok(Self::OpenVino { model, config }),
            ModelFormat::Caffe => {
                let config = config.ok_or_else(|| {
                    PipelineError::config("caffe models require `config_path` (prototxt)")
                })?;
                Ok(Self::Caffe { model, config })
            }
        }
    }

    pub fn format(&self) -> ModelFormat {
        match self {
            Self::Onnx { .. } => ModelFormat::Onnx,
            Self::OpenVino { .. } => ModelFormat::OpenVino,
            Self::Caffe { .. } => ModelFormat::Caffe,
        }
    }

    pub fn model_path(&self) -> &Path {
        match self {
            Self::Onnx { model } | Self::OpenVino { model, .. } | Self::Caffe { model, .. } => {
                model
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// onnx, openvino or caffe
    pub format: String,

    pub path: String,

    /// Network description, required for caffe models
    pub config_path: Option<String>,

    /// Confidence threshold for person boxes (0-1)
    pub confidence_threshold: f32,

    /// Non-maximum suppression threshold (0-1)
    pub nms_threshold: f32,

    /// Detector workers, each with its own session
    pub threads: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            format: "onnx".to_string(),
            path: "models/person-detection.onnx".to_string(),
            config_path: None,
            confidence_threshold: 0.5,
            nms_threshold: 0.4,
            threads: 3,
        }
    }
}

impl DetectorConfig {
    pub fn model(&self) -> Result<ModelSpec> {
        ModelSpec::resolve(&self.format, &self.path, self.config_path.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReidConfig {
    pub format: String,
    pub path: String,
    pub config_path: Option<String>,

    /// Output layer holding the embedding, usually `reid_embedding`
    pub output_layer_name: String,
}

impl Default for ReidConfig {
    fn default() -> Self {
        Self {
            format: "onnx".to_string(),
            path: "models/person-reidentification.onnx".to_string(),
            config_path: None,
            output_layer_name: "reid_embedding".to_string(),
        }
    }
}

impl ReidConfig {
    pub fn model(&self) -> Result<ModelSpec> {
        ModelSpec::resolve(&self.format, &self.path, self.config_path.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SorterConfig {
    /// Release ticks per second
    pub tick_hz: f64,

    /// Ticks to wait for a missing frame before skipping past it (0 waits forever)
    pub max_stall_ticks: u32,
}

impl Default for SorterConfig {
    fn default() -> Self {
        Self {
            tick_hz: 30.0,
            max_stall_ticks: 15,
        }
    }
}

impl SorterConfig {
    pub fn tick_period(&self) -> Duration {
        Duration::try_from_secs_f64(1.0 / self.tick_hz).unwrap_or(Duration::from_millis(33))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Capacity of every inter-stage queue
    pub capacity: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self { capacity: 8 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Consecutive unreadable frames tolerated before the stream is given up
    pub max_consecutive_errors: u32,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_consecutive_errors: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Reported as both sender and initiator
    pub client_id: String,
    pub message_type: String,
    pub subject: String,
    pub topic_name: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            client_id: "01".to_string(),
            message_type: "command".to_string(),
            subject: "update".to_string(),
            topic_name: "tracking".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    pub period_sec: f64,
    /// Frames in the frame-time moving average
    pub window: usize,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            period_sec: 4.0,
            window: 100,
        }
    }
}

impl StatsConfig {
    pub fn period(&self) -> Duration {
        Duration::try_from_secs_f64(self.period_sec).unwrap_or(Duration::from_secs(4))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PipelineConfig {
    pub tracker: TrackerConfig,
    pub detector: DetectorConfig,
    pub reid: ReidConfig,
    pub sorter: SorterConfig,
    pub channels: ChannelConfig,
    pub ingest: IngestConfig,
    pub export: ExportConfig,
    pub stats: StatsConfig,
    pub shutdown: ShutdownConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Grace period for sinks holding network resources
    pub timeout_sec: f64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self { timeout_sec: 3.0 }
    }
}

impl ShutdownConfig {
    pub fn timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout_sec).unwrap_or(Duration::from_secs(3))
    }
}

impl PipelineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        log::info!("Loading pipeline configuration from {}", path.display());
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        self.tracker.validate()?;
        self.detector.model()?;
        self.reid.model()?;

        if self.detector.threads == 0 {
            return Err(PipelineError::config("detector.threads must be at least 1"));
        }
        if self.channels.capacity == 0 {
            return Err(PipelineError::config("channels.capacity must be at least 1"));
        }
        if !(self.sorter.tick_hz.is_finite() && self.sorter.tick_hz > 0.0) {
            return Err(PipelineError::config("sorter.tick_hz must be positive"));
        }
        if self.stats.window < reidtrack::sma::MIN_SMA_WINDOW {
            return Err(PipelineError::config(format!(
                "stats.window must be at least {}",
                reidtrack::sma::MIN_SMA_WINDOW
            )));
        }
        if !(self.stats.period_sec.is_finite() && self.stats.period_sec > 0.0) {
            return Err(PipelineError::config("stats.period_sec must be positive"));
        }
        if !(self.shutdown.timeout_sec.is_finite() && self.shutdown.timeout_sec >= 0.0) {
            return Err(PipelineError::config(
                "shutdown.timeout_sec must be non-negative",
            ));
        }
        Ok(())
    }
}
