//! Throughput statistics
//!
//! The tracking stage reports one [`FrameTiming`] per processed frame. The
//! stats stage keeps moving averages and logs a summary every period.

use crate::cancel::{recv_or_cancel, CancellationToken};
use crate::error::{PipelineError, Result};
use reidtrack::Sma;
use std::fmt;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTiming {
    pub frame_id: u64,
    /// Time spent in the tracking stage
    pub processing: Duration,
    /// Ingestion to tracker output
    pub latency: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatsSnapshot {
    pub frames: u64,
    pub fps: f64,
    pub avg_processing_ms: f64,
    pub avg_latency_ms: f64,
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} frames, {:.1} FPS, tracking {:.2} ms/frame, latency {:.1} ms",
            self.frames, self.fps, self.avg_processing_ms, self.avg_latency_ms
        )
    }
}

pub struct StatsCollector {
    processing: Sma,
    latency: Sma,
    frames: u64,
    period: Duration,
    period_start: Instant,
    period_frames: u64,
}

impl StatsCollector {
    pub fn new(window: usize, period: Duration, now: Instant) -> Result<Self> {
        let sma = || Sma::new(window).map_err(|e| PipelineError::config(e.to_string()));
        Ok(Self {
            processing: sma()?,
            latency: sma()?,
            frames: 0,
            period,
            period_start: now,
            period_frames: 0,
        })
    }

    /// Record one frame; returns a snapshot when a period has elapsed
    pub fn record(&mut self, timing: FrameTiming, now: Instant) -> Option<StatsSnapshot> {
        self.processing.recalc(timing.processing.as_secs_f64() * 1000.0);
        self.latency.recalc(timing.latency.as_secs_f64() * 1000.0);
        self.frames += 1;
        self.period_frames += 1;

        let elapsed = now.saturating_duration_since(self.period_start);
        if elapsed < self.period {
            return None;
        }

        let snapshot = StatsSnapshot {
            frames: self.frames,
            fps: self.period_frames as f64 / elapsed.as_secs_f64(),
            avg_processing_ms: self.processing.average(),
            avg_latency_ms: self.latency.average(),
        };
        self.period_start = now;
        self.period_frames = 0;
        Some(snapshot)
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

/// Stats stage: consume timings until the tracking stage closes its side
pub fn run_stats(
    mut collector: StatsCollector,
    input: crossbeam::channel::Receiver<FrameTiming>,
    cancel: &CancellationToken,
) -> Result<()> {
    while let Some(timing) = recv_or_cancel(&input, cancel)? {
        if let Some(snapshot) = collector.record(timing, Instant::now()) {
            log::info!("Pipeline stats: {}", snapshot);
        }
    }
    log::info!("Stats stopped after {} frames", collector.frames());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn timing(id: u64, ms: u64) -> FrameTiming {
        FrameTiming {
            frame_id: id,
            processing: Duration::from_millis(ms),
            latency: Duration::from_millis(ms * 10),
        }
    }

    #[test]
    fn test_reports_once_per_period() {
        let t0 = Instant::now();
        let mut stats = StatsCollector::new(3, Duration::from_secs(1), t0).unwrap();

        assert!(stats.record(timing(0, 10), t0 + Duration::from_millis(250)).is_none());
        assert!(stats.record(timing(1, 20), t0 + Duration::from_millis(500)).is_none());
        assert!(stats.record(timing(2, 30), t0 + Duration::from_millis(750)).is_none());

        let snapshot = stats
            .record(timing(3, 40), t0 + Duration::from_millis(1000))
            .unwrap();
        assert_eq!(snapshot.frames, 4);
        assert_abs_diff_eq!(snapshot.fps, 4.0, epsilon = 1e-9);
        // window of three: 20, 30, 40
        assert_abs_diff_eq!(snapshot.avg_processing_ms, 30.0, epsilon = 1e-9);
        assert_abs_diff_eq!(snapshot.avg_latency_ms, 300.0, epsilon = 1e-9);

        assert!(stats.record(timing(4, 40), t0 + Duration::from_millis(1100)).is_none());
    }

    #[test]
    fn test_small_window_rejected() {
        assert!(matches!(
            StatsCollector::new(2, Duration::from_secs(1), Instant::now()),
            Err(PipelineError::ConfigError(_))
        ));
    }
}
