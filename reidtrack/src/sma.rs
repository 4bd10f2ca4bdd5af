//! Streaming simple moving averages
//!
//! Both variants update the mean incrementally: while the window fills the
//! running mean is corrected with count `n + 1`, afterwards the value evicted
//! from the window is swapped out with a fixed count `N`. No rescans.

use crate::bbox::Point;
use crate::ring::HistoryRing;
use thiserror::Error;

/// Smallest window accepted by [`Sma::new`]
pub const MIN_SMA_WINDOW: usize = 3;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SmaError {
    #[error("invalid moving average window {0}, must be at least {MIN_SMA_WINDOW}")]
    InvalidWindow(usize),
}

/// Moving average of 2D positions
#[derive(Debug, Clone)]
pub struct Sma2d {
    window: HistoryRing<Point>,
    average: Point,
}

impl Sma2d {
    pub fn new(window: usize) -> Self {
        Self {
            window: HistoryRing::new(window),
            average: Point::default(),
        }
    }

    /// Feed a new sample and return the updated average
    pub fn recalc(&mut self, p: Point) -> Point {
        if self.window.is_full() {
            if let Some(oldest) = self.window.push(p) {
                self.average = self.average + (p - oldest) / self.window.capacity() as f32;
            }
        } else {
            let n = self.window.len() as f32;
            self.average = self.average + (p - self.average) / (n + 1.0);
            self.window.push(p);
        }
        self.average
    }

    pub fn average(&self) -> Point {
        self.average
    }

    /// Most recently pushed raw sample
    pub fn newest(&self) -> Option<Point> {
        self.window.newest().copied()
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }
}

/// Moving average of scalar samples (frame times, latencies)
#[derive(Debug, Clone)]
pub struct Sma {
    window: HistoryRing<f64>,
    average: f64,
}

impl Sma {
    pub fn new(window: usize) -> Result<Self, SmaError> {
        if window < MIN_SMA_WINDOW {
            return Err(SmaError::InvalidWindow(window));
        }
        Ok(Self {
            window: HistoryRing::new(window),
            average: 0.0,
        })
    }

    pub fn recalc(&mut self, value: f64) -> f64 {
        if self.window.is_full() {
            if let Some(oldest) = self.window.push(value) {
                self.average += (value - oldest) / self.window.capacity() as f64;
            }
        } else {
            let n = self.window.len() as f64;
            self.average += (value - self.average) / (n + 1.0);
            self.window.push(value);
        }
        self.average
    }

    pub fn average(&self) -> f64 {
        self.average
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn naive_mean(points: &[Point]) -> Point {
        let sum = points.iter().fold(Point::default(), |acc, p| acc + *p);
        sum / points.len() as f32
    }

    #[test]
    fn test_sma2d_tracks_window_mean() {
        let trajectory: Vec<Point> = [0, 100, 200, 400, 500, 600, 700, 800, 900, 100, 100, 100]
            .iter()
            .map(|&v| Point::new(v as f32, v as f32 / 2.0))
            .collect();

        let mut sma = Sma2d::new(5);
        for (i, p) in trajectory.iter().enumerate() {
            let avg = sma.recalc(*p);
            let start = (i + 1).saturating_sub(5);
            let expected = naive_mean(&trajectory[start..=i]);
            assert_abs_diff_eq!(avg.x, expected.x, epsilon = 1e-2);
            assert_abs_diff_eq!(avg.y, expected.y, epsilon = 1e-2);
            assert_eq!(sma.newest(), Some(*p));
        }
        assert_eq!(sma.len(), 5);
    }

    #[test]
    fn test_sma2d_first_sample_is_average() {
        let mut sma = Sma2d::new(4);
        assert!(sma.is_empty());
        let avg = sma.recalc(Point::new(320.0, 240.0));
        assert_eq!(avg, Point::new(320.0, 240.0));
    }

    #[test]
    fn test_scalar_sma() {
        let mut sma = Sma::new(3).unwrap();
        sma.recalc(1.0);
        sma.recalc(2.0);
        assert_abs_diff_eq!(sma.recalc(3.0), 2.0, epsilon = 1e-9);
        // window now [2, 3, 10]
        assert_abs_diff_eq!(sma.recalc(10.0), 5.0, epsilon = 1e-9);
    }

    #[test]
    fn test_scalar_sma_rejects_small_window() {
        assert_eq!(Sma::new(2).unwrap_err(), SmaError::InvalidWindow(2));
    }
}
