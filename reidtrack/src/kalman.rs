//! Constant-velocity Kalman filter for 2D positions

use crate::bbox::Point;
use anyhow::Result;
use nalgebra::{Matrix2, Matrix2x4, Matrix4, Vector2, Vector4};
use std::time::Instant;

/// Motion model with state `[x, y, vx, vy]` observing `[x, y]`.
///
/// The transition is rebuilt on every step from the time elapsed since the
/// previous predict or update, so velocities are in pixels per second.
#[derive(Debug, Clone)]
pub struct MotionEstimator {
    x: Vector4<f32>,     // State
    p: Matrix4<f32>,     // State covariance
    f: Matrix4<f32>,     // State transition
    h: Matrix2x4<f32>,   // Observation
    q: Matrix4<f32>,     // Process noise covariance
    r: Matrix2<f32>,     // Observation noise covariance
    last_step: Instant,
}

impl MotionEstimator {
    pub fn new(origin: Point, t: Instant, process_noise: f32, measurement_noise: f32) -> Self {
        Self {
            x: Vector4::new(origin.x, origin.y, 0.0, 0.0),
            p: Matrix4::identity(),
            f: Matrix4::identity(),
            h: Matrix2x4::identity(),
            q: Matrix4::identity() * process_noise,
            r: Matrix2::identity() * measurement_noise,
            last_step: t,
        }
    }

    /// Advance the state to `t` and return the predicted position
    pub fn predict(&mut self, t: Instant) -> Point {
        self.transition(t);
        self.state()
    }

    /// Advance the state to `t` and correct it with a measured position
    pub fn update(&mut self, measurement: Point, t: Instant) -> Result<()> {
        self.transition(t);

        // Residual: y = z - H * x
        let z = Vector2::new(measurement.x, measurement.y);
        let y = z - self.h * self.x;

        // Innovation covariance: S = H * P * H^T + R
        let s = self.h * self.p * self.h.transpose() + self.r;
        let s_inv = s
            .try_inverse()
            .ok_or_else(|| anyhow::anyhow!("Failed to invert innovation covariance matrix"))?;

        // Kalman gain: K = P * H^T * S^-1
        let k = self.p * self.h.transpose() * s_inv;

        self.x += k * y;
        self.p = (Matrix4::identity() - k * self.h) * self.p;

        Ok(())
    }

    fn transition(&mut self, t: Instant) {
        let dt = t.saturating_duration_since(self.last_step).as_secs_f32();
        self.f[(0, 2)] = dt;
        self.f[(1, 3)] = dt;

        // x = F * x
        self.x = self.f * self.x;
        // P = F * P * F^T + Q
        self.p = self.f * self.p * self.f.transpose() + self.q;

        self.last_step = self.last_step.max(t);
    }

    /// Current position estimate
    pub fn state(&self) -> Point {
        Point::new(self.x[0], self.x[1])
    }

    /// Current velocity estimate in pixels per second
    pub fn velocity(&self) -> Point {
        Point::new(self.x[2], self.x[3])
    }

    pub fn covariance(&self) -> &Matrix4<f32> {
        &self.p
    }

    pub fn last_step(&self) -> Instant {
        self.last_step
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::time::Duration;

    #[test]
    fn test_update_pulls_towards_measurement() {
        let t0 = Instant::now();
        let mut kf = MotionEstimator::new(Point::new(100.0, 100.0), t0, 0.01, 0.1);

        kf.update(Point::new(110.0, 90.0), t0 + Duration::from_millis(100))
            .unwrap();
        let s = kf.state();
        assert!(s.x > 100.0 && s.x < 110.0);
        assert!(s.y < 100.0 && s.y > 90.0);
    }

    #[test]
    fn test_learns_velocity_and_coasts() {
        let t0 = Instant::now();
        let step = Duration::from_secs(1);
        let mut kf = MotionEstimator::new(Point::new(0.0, 0.0), t0, 1.0, 0.01);

        // 10 px per second along x
        let mut t = t0;
        for i in 1..=30 {
            t += step;
            kf.update(Point::new(10.0 * i as f32, 0.0), t).unwrap();
        }
        assert_abs_diff_eq!(kf.velocity().x, 10.0, epsilon = 0.5);
        assert_abs_diff_eq!(kf.velocity().y, 0.0, epsilon = 0.5);
        assert_abs_diff_eq!(kf.state().x, 300.0, epsilon = 0.5);

        let before = kf.state().x;
        let predicted = kf.predict(t + Duration::from_millis(500));
        assert_abs_diff_eq!(predicted.x - before, 5.0, epsilon = 0.5);
        assert_eq!(kf.last_step(), t + Duration::from_millis(500));

        // Same instant again: no further motion
        let again = kf.predict(t + Duration::from_millis(500));
        assert_abs_diff_eq!(again.x, predicted.x, epsilon = 1e-4);
    }

    #[test]
    fn test_singular_innovation_is_an_error() {
        let t0 = Instant::now();
        // P = I, R = -I makes S = 0
        let mut kf = MotionEstimator::new(Point::new(5.0, 5.0), t0, 0.0, -1.0);
        assert!(kf.update(Point::new(6.0, 6.0), t0).is_err());
        assert_eq!(kf.state(), Point::new(5.0, 5.0));
    }
}
