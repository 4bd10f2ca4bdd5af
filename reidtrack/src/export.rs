//! Export view of validated tracks

use crate::track::Track;
use serde::{Deserialize, Serialize};

/// Track position as published to downstream consumers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedPerson {
    pub id: String,
    pub x: u32,
    pub y: u32,
}

impl ExportedPerson {
    /// Smoothed position truncated to whole pixels, negatives clamp to zero
    pub fn from_track(track: &Track) -> Self {
        let position = track.position();
        Self {
            id: track.id().to_string(),
            x: position.x as u32,
            y: position.y as u32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bbox::Bbox;
    use crate::config::TrackerConfig;
    use crate::track::TrackId;
    use std::time::Instant;

    #[test]
    fn test_truncates_position() {
        let track = Track::new(
            TrackId::from("c0ffee01"),
            Instant::now(),
            Bbox::new(10, 20, 31, 41),
            vec![1.0],
            &TrackerConfig::default(),
            [0, 0, 0],
        );
        let person = ExportedPerson::from_track(&track);
        assert_eq!(
            person,
            ExportedPerson {
                id: "c0ffee01".into(),
                x: 20,
                y: 30
            }
        );
    }
}
