//! Per-person track state and lifecycle

use crate::bbox::{Bbox, Point};
use crate::config::TrackerConfig;
use crate::kalman::MotionEstimator;
use crate::ring::HistoryRing;
use crate::similarity::{cosine_similarity, rms, Descriptor};
use crate::sma::Sma2d;
use rand::RngCore;
use serde::Serialize;
use std::fmt;
use std::fmt::Write as _;
use std::time::{Duration, Instant};

/// Random hex identity of a track, fixed for its lifetime
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TrackId(String);

impl TrackId {
    /// Hex encoding of `bytes` random bytes
    pub fn generate<R: RngCore + ?Sized>(bytes: usize, rng: &mut R) -> Self {
        let mut raw = vec![0u8; bytes];
        rng.fill_bytes(&mut raw);
        let mut token = String::with_capacity(bytes * 2);
        for b in raw {
            let _ = write!(token, "{b:02x}");
        }
        Self(token)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TrackId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TrackStatus {
    New,
    Associated,
    Lost,
    Validated,
    Expired,
    OutOfBounds,
}

impl TrackStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TrackStatus::Expired | TrackStatus::OutOfBounds)
    }
}

impl fmt::Display for TrackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TrackStatus::New => "new",
            TrackStatus::Associated => "associated",
            TrackStatus::Lost => "lost",
            TrackStatus::Validated => "validated",
            TrackStatus::Expired => "expired",
            TrackStatus::OutOfBounds => "out of bounds",
        };
        f.write_str(name)
    }
}

/// A detected person awaiting association in the current cycle
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub bbox: Bbox,
    pub descriptor: Descriptor,
    consumed: bool,
}

impl Detection {
    pub fn new(bbox: Bbox, descriptor: Descriptor) -> Self {
        Self {
            bbox,
            descriptor,
            consumed: false,
        }
    }

    pub fn is_consumed(&self) -> bool {
        self.consumed
    }

    pub(crate) fn consume(&mut self) -> Descriptor {
        self.consumed = true;
        std::mem::take(&mut self.descriptor)
    }
}

#[derive(Debug, Clone)]
pub struct Track {
    id: TrackId,
    created: Instant,
    last_update: Instant,
    estimator: MotionEstimator,
    smoother: Sma2d,
    descriptors: HistoryRing<Descriptor>,
    trajectory: HistoryRing<Point>,
    total_hits: u32,
    valid: bool,
    last_box: Option<Bbox>,
    status: TrackStatus,
    color: [u8; 3],
}

impl Track {
    pub fn new(
        id: TrackId,
        t: Instant,
        bbox: Bbox,
        descriptor: Descriptor,
        config: &TrackerConfig,
        color: [u8; 3],
    ) -> Self {
        let center = bbox.center();

        let mut descriptors = HistoryRing::new(config.total_descriptors);
        descriptors.push(descriptor);

        let mut smoother = Sma2d::new(config.sma_window);
        let mut trajectory = HistoryRing::new(config.trajectory_length);
        trajectory.push(smoother.recalc(center));

        Self {
            id,
            created: t,
            last_update: t,
            estimator: MotionEstimator::new(
                center,
                t,
                config.process_noise,
                config.measurement_noise,
            ),
            smoother,
            descriptors,
            trajectory,
            total_hits: 0,
            valid: false,
            last_box: Some(bbox),
            status: TrackStatus::New,
            color,
        }
    }

    /// Apply a matched detection
    pub fn update(&mut self, t: Instant, bbox: Bbox, descriptor: Descriptor) {
        if self.status.is_terminal() {
            return;
        }

        self.total_hits += 1;
        self.descriptors.push(descriptor);
        if let Err(e) = self.estimator.update(bbox.center(), t) {
            log::warn!("Track {}: motion correction skipped: {}", self.id, e);
        }
        self.trajectory
            .push(self.smoother.recalc(self.estimator.state()));

        self.last_update = t;
        self.last_box = Some(bbox);
        self.status = TrackStatus::Associated;
    }

    /// Carry the track through a cycle without a match.
    ///
    /// The motion model only coasts within `window` of the last update,
    /// afterwards the track holds its position until it expires.
    pub fn predict(&mut self, t: Instant, window: Duration) {
        if self.status.is_terminal() {
            return;
        }

        if self.idle_for(t) < window {
            self.estimator.predict(t);
        }
        self.trajectory
            .push(self.smoother.recalc(self.estimator.state()));

        self.last_box = None;
        self.status = TrackStatus::Lost;
    }

    /// Promote the track once it is old enough and has enough hits.
    /// Returns true only on the call that validated it.
    pub fn validate(&mut self, t: Instant, window: Duration, min_hits: u32) -> bool {
        if self.valid || self.status.is_terminal() {
            return false;
        }
        if t.saturating_duration_since(self.created) > window && self.total_hits > min_hits {
            self.valid = true;
            self.status = TrackStatus::Validated;
            return true;
        }
        false
    }

    pub(crate) fn retire(&mut self, status: TrackStatus) {
        debug_assert!(status.is_terminal());
        if !self.status.is_terminal() {
            self.status = status;
        }
    }

    /// Distance from the smoothed position to the centre of `bbox`
    pub fn distance(&self, bbox: &Bbox) -> f32 {
        self.position().distance(&bbox.center())
    }

    /// RMS of cosine similarities against every remembered descriptor
    pub fn appearance_similarity(&self, descriptor: &[f32]) -> f32 {
        rms(self
            .descriptors
            .iter()
            .map(|known| cosine_similarity(known, descriptor)))
    }

    pub fn idle_for(&self, t: Instant) -> Duration {
        t.saturating_duration_since(self.last_update)
    }

    pub fn id(&self) -> &TrackId {
        &self.id
    }

    pub fn status(&self) -> TrackStatus {
        self.status
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn total_hits(&self) -> u32 {
        self.total_hits
    }

    /// Smoothed position
    pub fn position(&self) -> Point {
        self.smoother.average()
    }

    /// Raw motion model estimate
    pub fn estimate(&self) -> Point {
        self.estimator.state()
    }

    pub fn velocity(&self) -> Point {
        self.estimator.velocity()
    }

    pub fn last_box(&self) -> Option<Bbox> {
        self.last_box
    }

    pub fn created(&self) -> Instant {
        self.created
    }

    pub fn last_update(&self) -> Instant {
        self.last_update
    }

    pub fn color(&self) -> [u8; 3] {
        self.color
    }

    pub fn descriptors(&self) -> &HistoryRing<Descriptor> {
        &self.descriptors
    }

    pub fn trajectory(&self) -> &HistoryRing<Point> {
        &self.trajectory
    }
}
