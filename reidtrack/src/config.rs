//! Tracker tuning parameters

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("`{0}` must be greater than zero")]
    Zero(&'static str),

    #[error("`{field}` must be a finite non-negative number, got {value}")]
    OutOfRange { field: &'static str, value: f64 },
}

/// Association and lifecycle settings. Durations are in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub sma_window: usize,        // Position smoothing window
    pub total_descriptors: usize, // Descriptors remembered per track
    pub trajectory_length: usize, // Smoothed positions remembered per track
    pub prediction_duration: f64, // Coast on the motion model this long after the last update
    pub validation_duration: f64, // Minimum track age before validation
    pub expiration_duration: f64, // Idle time before a validated track expires
    pub nonvalid_expiration_duration: f64, // Idle time before an unvalidated track expires
    pub validation_min_hits: u32, // Hits required (strictly more) for validation
    pub score_threshold: f32,     // Assignments scoring below this are rejected
    pub distance_factor: f32,
    pub distance_threshold: f32, // Pixels before the distance penalty applies
    pub token_length: usize,     // Random bytes per track id
    pub process_noise: f32,
    pub measurement_noise: f32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            sma_window: 5,
            total_descriptors: 3,
            trajectory_length: 40,
            prediction_duration: 0.3,
            validation_duration: 1.0,
            expiration_duration: 2.0,
            nonvalid_expiration_duration: 1.0,
            validation_min_hits: 5,
            score_threshold: 0.001,
            distance_factor: 2.0,
            distance_threshold: 150.0,
            token_length: 4,
            process_noise: 0.01,
            measurement_noise: 600.0,
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let counts = [
            ("sma_window", self.sma_window),
            ("total_descriptors", self.total_descriptors),
            ("trajectory_length", self.trajectory_length),
            ("token_length", self.token_length),
        ];
        for (field, value) in counts {
            if value == 0 {
                return Err(ConfigError::Zero(field));
            }
        }

        let non_negative = [
            ("prediction_duration", self.prediction_duration),
            ("validation_duration", self.validation_duration),
            ("expiration_duration", self.expiration_duration),
            ("nonvalid_expiration_duration", self.nonvalid_expiration_duration),
            ("distance_threshold", self.distance_threshold as f64),
            ("process_noise", self.process_noise as f64),
            ("measurement_noise", self.measurement_noise as f64),
            ("score_threshold", self.score_threshold as f64),
        ];
        for (field, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::OutOfRange { field, value });
            }
        }

        if !self.distance_factor.is_finite() || self.distance_factor <= 0.0 {
            return Err(ConfigError::Zero("distance_factor"));
        }

        Ok(())
    }

    pub fn prediction_window(&self) -> Duration {
        seconds(self.prediction_duration)
    }

    pub fn validation_window(&self) -> Duration {
        seconds(self.validation_duration)
    }

    pub fn expiration_window(&self) -> Duration {
        seconds(self.expiration_duration)
    }

    pub fn nonvalid_expiration_window(&self) -> Duration {
        seconds(self.nonvalid_expiration_duration)
    }
}

fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = TrackerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.prediction_window(), Duration::from_millis(300));
        assert_eq!(config.expiration_window(), Duration::from_secs(2));
    }

    #[test]
    fn test_rejects_zero_and_negative() {
        let config = TrackerConfig {
            total_descriptors: 0,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::Zero("total_descriptors"))
        );

        let config = TrackerConfig {
            expiration_duration: -1.0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange {
                field: "expiration_duration",
                ..
            })
        ));
        assert_eq!(config.expiration_window(), Duration::ZERO);
    }
}
