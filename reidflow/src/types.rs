//! Frame payloads passed between pipeline stages

use image::RgbImage;
use reidtrack::{Bbox, ExportedPerson, Point, Track, TrackId, TrackStatus};
use std::time::Instant;

pub type Image = RgbImage;

/// A payload stamped with its position in the stream.
///
/// Ids increase by one per ingested frame. The timestamp is taken at
/// ingestion and drives the tracker clock.
#[derive(Debug, Clone)]
pub struct Frame<T> {
    pub id: u64,
    pub timestamp: Instant,
    pub payload: T,
}

impl<T> Frame<T> {
    pub fn new(id: u64, timestamp: Instant, payload: T) -> Self {
        Self {
            id,
            timestamp,
            payload,
        }
    }

    /// Replace the payload, keeping id and timestamp
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Frame<U> {
        Frame {
            id: self.id,
            timestamp: self.timestamp,
            payload: f(self.payload),
        }
    }
}

/// Image with the person boxes found in it
#[derive(Debug, Clone)]
pub struct DetectedFrame {
    pub image: Image,
    pub boxes: Vec<Bbox>,
}

impl DetectedFrame {
    /// Frame rectangle used for out-of-bounds cleanup
    pub fn bounds(&self) -> Bbox {
        Bbox::new(0, 0, self.image.width() as i32, self.image.height() as i32)
    }
}

/// Render view of one live track
#[derive(Debug, Clone, PartialEq)]
pub struct TrackSnapshot {
    pub id: TrackId,
    pub status: TrackStatus,
    pub valid: bool,
    pub position: Point,
    pub last_box: Option<Bbox>,
    pub color: [u8; 3],
    /// Smoothed positions, oldest first
    pub trajectory: Vec<Point>,
}

impl From<&Track> for TrackSnapshot {
    fn from(track: &Track) -> Self {
        Self {
            id: track.id().clone(),
            status: track.status(),
            valid: track.is_valid(),
            position: track.position(),
            last_box: track.last_box(),
            color: track.color(),
            trajectory: track.trajectory().to_vec(),
        }
    }
}

/// Tracker output for one frame
#[derive(Debug, Clone)]
pub struct TrackedFrame {
    pub image: Image,
    pub tracks: Vec<TrackSnapshot>,
    pub people: Vec<ExportedPerson>,
}
