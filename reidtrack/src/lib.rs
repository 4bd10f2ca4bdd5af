//! Multi-person re-identification tracker
//!
//! Tracks people across frames from detection boxes and appearance
//! descriptors. Each cycle the [`Associator`] scores live tracks against new
//! detections, solves a maximum-weight assignment and runs the per-track
//! lifecycle (prediction, validation, expiration).
//!
//! ```rust,ignore
//! use reidtrack::{Associator, Bbox, Detection, TrackerConfig};
//! use std::time::Instant;
//!
//! let mut associator = Associator::new(TrackerConfig::default());
//! let frame = Bbox::new(0, 0, 640, 480);
//! let detections = vec![Detection::new(Bbox::new(80, 60, 130, 136), descriptor)];
//! let report = associator.process(Instant::now(), detections, Some(&frame));
//! for event in &report.events {
//!     log::debug!("{}", event);
//! }
//! ```

pub mod associator;
pub mod bbox;
pub mod config;
pub mod export;
pub mod hungarian; // Hungarian algorithm for optimal assignment
pub mod kalman;
pub mod palette;
pub mod ring;
pub mod similarity;
pub mod sma;
pub mod track;

pub use associator::{Associator, CycleReport, Outcome, TrackEvent};
pub use bbox::{Bbox, Point};
pub use config::{ConfigError, TrackerConfig};
pub use export::ExportedPerson;
pub use hungarian::{Assignment, HungarianSolver};
pub use kalman::MotionEstimator;
pub use ring::HistoryRing;
pub use similarity::{cosine_similarity, Descriptor, DistancePenalty, Scoring};
pub use sma::{Sma, Sma2d, SmaError};
pub use track::{Detection, Track, TrackId, TrackStatus};
