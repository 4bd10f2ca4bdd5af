//! Detection-to-track association
//!
//! Each cycle scores every live track against every detection (RMS cosine
//! similarity of appearance, penalised by distance), solves a max-weight
//! assignment and applies the resulting updates. Detections left over start
//! new tracks. A separate cleanup sweep expires idle tracks and drops tracks
//! that left the frame.

use crate::bbox::{Bbox, Point};
use crate::config::TrackerConfig;
use crate::export::ExportedPerson;
use crate::hungarian::HungarianSolver;
use crate::palette::HueCycle;
use crate::similarity::{DistancePenalty, Scoring};
use crate::track::{Detection, Track, TrackId, TrackStatus};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

/// Collisions tolerated before token length grows by one byte
const TOKEN_RETRIES: usize = 8;

/// What happened to a track during one cycle
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Associated {
        detection: usize,
        score: f32,
        distance: f32,
    },
    /// Assigned to a padding column
    Unmatched,
    LowScore {
        detection: usize,
        score: f32,
        distance: f32,
    },
    New {
        detection: usize,
    },
    Expired {
        idle: Duration,
    },
    OutOfBounds {
        position: Point,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackEvent {
    pub id: TrackId,
    pub outcome: Outcome,
    /// The track became valid in this cycle
    pub validated: bool,
}

impl fmt::Display for TrackEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ", self.id)?;
        match &self.outcome {
            Outcome::Associated {
                detection,
                score,
                distance,
            } => write!(
                f,
                "associated with detection {detection} (score {score:.4}, {distance:.1}px)"
            )?,
            Outcome::Unmatched => write!(f, "no detection assigned, predicting")?,
            Outcome::LowScore {
                detection,
                score,
                distance,
            } => write!(
                f,
                "score {score:.4} for detection {detection} too low ({distance:.1}px), predicting"
            )?,
            Outcome::New { detection } => write!(f, "new track from detection {detection}")?,
            Outcome::Expired { idle } => {
                write!(f, "deleted, no updates for {:.2}s", idle.as_secs_f32())?
            }
            Outcome::OutOfBounds { position } => {
                write!(f, "deleted, out of bounds at {position}")?
            }
        }
        if self.validated {
            write!(f, " [validated]")?;
        }
        Ok(())
    }
}

/// Per-cycle association report
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub events: Vec<TrackEvent>,
}

impl CycleReport {
    fn push(&mut self, id: TrackId, outcome: Outcome, validated: bool) {
        self.events.push(TrackEvent {
            id,
            outcome,
            validated,
        });
    }

    pub fn extend(&mut self, other: CycleReport) {
        self.events.extend(other.events);
    }

    pub fn outcome(&self, id: &TrackId) -> Option<&Outcome> {
        self.events
            .iter()
            .rev()
            .find(|e| &e.id == id)
            .map(|e| &e.outcome)
    }

    pub fn created(&self) -> impl Iterator<Item = &TrackId> {
        self.events
            .iter()
            .filter(|e| matches!(e.outcome, Outcome::New { .. }))
            .map(|e| &e.id)
    }

    pub fn removed(&self) -> impl Iterator<Item = &TrackId> {
        self.events
            .iter()
            .filter(|e| {
                matches!(
                    e.outcome,
                    Outcome::Expired { .. } | Outcome::OutOfBounds { .. }
                )
            })
            .map(|e| &e.id)
    }

    pub fn validated(&self) -> impl Iterator<Item = &TrackId> {
        self.events.iter().filter(|e| e.validated).map(|e| &e.id)
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Owns the live track set
pub struct Associator {
    config: TrackerConfig,
    penalty: DistancePenalty,
    tracks: BTreeMap<TrackId, Track>,
    palette: HueCycle,
    rng: StdRng,
}

impl Associator {
    pub fn new(config: TrackerConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Associator with reproducible track ids
    pub fn with_seed(config: TrackerConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: TrackerConfig, rng: StdRng) -> Self {
        let penalty = DistancePenalty::new(config.distance_threshold, config.distance_factor);
        Self {
            config,
            penalty,
            tracks: BTreeMap::new(),
            palette: HueCycle::new(),
            rng,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Cleanup followed by association, as run once per frame
    pub fn process(
        &mut self,
        t: Instant,
        detections: Vec<Detection>,
        bounds: Option<&Bbox>,
    ) -> CycleReport {
        let mut report = self.cleanup(t, bounds);
        report.extend(self.associate(t, detections));
        report
    }

    /// Associate with the configured distance penalty
    pub fn associate(&mut self, t: Instant, detections: Vec<Detection>) -> CycleReport {
        let penalty = self.penalty;
        self.associate_with(t, detections, &penalty)
    }

    pub fn associate_with<S>(
        &mut self,
        t: Instant,
        mut detections: Vec<Detection>,
        scoring: &S,
    ) -> CycleReport
    where
        S: Scoring + Sync + ?Sized,
    {
        let mut report = CycleReport::default();
        let prediction = self.config.prediction_window();
        let validation = self.config.validation_window();
        let min_hits = self.config.validation_min_hits;
        let threshold = self.config.score_threshold;

        if !self.tracks.is_empty() {
            let scores = self.score_matrix(&detections, scoring);
            let assignments = HungarianSolver::solve_max(scores.view());
            // Rows follow the map's key order
            let ids: Vec<TrackId> = self.tracks.keys().cloned().collect();

            for (assignment, id) in assignments.into_iter().zip(ids) {
                let Some(track) = self.tracks.get_mut(&id) else {
                    continue;
                };
                let column = assignment.column;

                let outcome = match detections.get_mut(column) {
                    Some(detection) if !detection.is_consumed() => {
                        let distance = track.distance(&detection.bbox);
                        // NaN compares false, so test for the accepted range
                        if !(assignment.score >= threshold) {
                            track.predict(t, prediction);
                            Outcome::LowScore {
                                detection: column,
                                score: assignment.score,
                                distance,
                            }
                        } else {
                            let bbox = detection.bbox;
                            track.update(t, bbox, detection.consume());
                            Outcome::Associated {
                                detection: column,
                                score: assignment.score,
                                distance,
                            }
                        }
                    }
                    _ => {
                        track.predict(t, prediction);
                        Outcome::Unmatched
                    }
                };

                let validated = track.validate(t, validation, min_hits);
                report.push(id, outcome, validated);
            }
        }

        for (index, detection) in detections.into_iter().enumerate() {
            if detection.is_consumed() {
                continue;
            }
            let id = self.spawn(t, detection);
            report.push(id, Outcome::New { detection: index }, false);
        }

        report
    }

    /// Square score matrix, live tracks as rows, zero padded.
    /// Non-finite scores become zero.
    pub fn score_matrix<S>(&self, detections: &[Detection], scoring: &S) -> Array2<f32>
    where
        S: Scoring + Sync + ?Sized,
    {
        let tracks: Vec<&Track> = self.tracks.values().collect();
        let size = tracks.len().max(detections.len());

        let rows: Vec<Vec<f32>> = tracks
            .par_iter()
            .map(|track| {
                detections
                    .iter()
                    .map(|d| {
                        let score = scoring.score(
                            track.appearance_similarity(&d.descriptor),
                            track.distance(&d.bbox),
                        );
                        if score.is_finite() {
                            score
                        } else {
                            0.0
                        }
                    })
                    .collect()
            })
            .collect();

        let mut scores = Array2::zeros((size, size));
        for (i, row) in rows.into_iter().enumerate() {
            for (j, score) in row.into_iter().enumerate() {
                scores[[i, j]] = score;
            }
        }
        scores
    }

    /// Expire idle tracks and drop tracks whose smoothed position left
    /// `bounds`. Retired tracks are reported and removed in the same sweep.
    pub fn cleanup(&mut self, t: Instant, bounds: Option<&Bbox>) -> CycleReport {
        let mut report = CycleReport::default();
        let expiration = self.config.expiration_window();
        let nonvalid_expiration = self.config.nonvalid_expiration_window();

        for (id, track) in self.tracks.iter_mut() {
            let idle = track.idle_for(t);
            let limit = if track.is_valid() {
                expiration
            } else {
                nonvalid_expiration
            };

            if idle > limit {
                track.retire(TrackStatus::Expired);
                report.push(id.clone(), Outcome::Expired { idle }, false);
                continue;
            }

            if let Some(bounds) = bounds {
                let position = track.position();
                if !bounds.contains(&position) {
                    track.retire(TrackStatus::OutOfBounds);
                    report.push(id.clone(), Outcome::OutOfBounds { position }, false);
                }
            }
        }

        self.tracks.retain(|_, track| !track.status().is_terminal());
        report
    }

    fn spawn(&mut self, t: Instant, detection: Detection) -> TrackId {
        let mut length = self.config.token_length.max(1);
        let mut attempts = 0;
        let id = loop {
            let id = TrackId::generate(length, &mut self.rng);
            if !self.tracks.contains_key(&id) {
                break id;
            }
            attempts += 1;
            if attempts % TOKEN_RETRIES == 0 {
                length += 1;
            }
        };

        let color = self.palette.next_color();
        let track = Track::new(
            id.clone(),
            t,
            detection.bbox,
            detection.descriptor,
            &self.config,
            color,
        );
        log::debug!("New track {} at {}", id, detection.bbox);
        self.tracks.insert(id.clone(), track);
        id
    }

    pub fn get(&self, id: &TrackId) -> Option<&Track> {
        self.tracks.get(id)
    }

    pub fn tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.values()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Validated live tracks in export form
    pub fn exported(&self) -> Vec<ExportedPerson> {
        self.tracks
            .values()
            .filter(|track| track.is_valid())
            .map(ExportedPerson::from_track)
            .collect()
    }
}
