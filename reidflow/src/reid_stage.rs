//! Tracking stage
//!
//! Runs strictly in frame order after the sorter. For each frame it embeds
//! every detected box, runs cleanup and association, and emits track
//! snapshots plus the export list.

use crate::cancel::{recv_or_cancel, send_or_cancel, CancellationToken};
use crate::detector_trait::Embedder;
use crate::error::Result;
use crate::stats::FrameTiming;
use crate::types::{DetectedFrame, Frame, TrackSnapshot, TrackedFrame};
use crossbeam::channel::{Receiver, Sender};
use reidtrack::{Associator, Detection};
use std::time::Instant;

pub struct ReidStage {
    associator: Associator,
    embedder: Box<dyn Embedder>,
    stats: Option<Sender<FrameTiming>>,
    frames: u64,
    embed_failures: u64,
    stats_dropped: u64,
}

impl ReidStage {
    pub fn new(associator: Associator, embedder: Box<dyn Embedder>) -> Self {
        Self {
            associator,
            embedder,
            stats: None,
            frames: 0,
            embed_failures: 0,
            stats_dropped: 0,
        }
    }

    /// Report per-frame timings; full stats queues drop samples
    pub fn with_stats(mut self, stats: Sender<FrameTiming>) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn associator(&self) -> &Associator {
        &self.associator
    }

    /// Timing samples lost to a full stats queue
    pub fn stats_dropped(&self) -> u64 {
        self.stats_dropped
    }

    /// Track one frame
    pub fn process(&mut self, frame: Frame<DetectedFrame>) -> Frame<TrackedFrame> {
        let started = Instant::now();
        let bounds = frame.payload.bounds();
        let (id, t) = (frame.id, frame.timestamp);
        let DetectedFrame { image, boxes } = frame.payload;

        let mut detections = Vec::with_capacity(boxes.len());
        for bbox in boxes {
            let Some(region) = bbox.intersect(&bounds) else {
                log::debug!("Frame {}: box {} outside the frame, ignored", id, bbox);
                continue;
            };
            match self.embedder.embed(&image, &region) {
                Ok(descriptor) => detections.push(Detection::new(region, descriptor)),
                Err(e) => {
                    self.embed_failures += 1;
                    log::warn!("Frame {}: descriptor for {} failed: {}", id, region, e);
                }
            }
        }

        let report = self.associator.process(t, detections, Some(&bounds));
        if log::log_enabled!(log::Level::Debug) {
            for event in &report.events {
                log::debug!("Frame {}: {}", id, event);
            }
        }

        let tracks = self.associator.tracks().map(TrackSnapshot::from).collect();
        let people = self.associator.exported();
        self.frames += 1;

        if let Some(stats) = &self.stats {
            let timing = FrameTiming {
                frame_id: id,
                processing: started.elapsed(),
                latency: t.elapsed(),
            };
            if stats.try_send(timing).is_err() {
                self.stats_dropped += 1;
                log::debug!(
                    "Stats queue full, timing for frame {} dropped ({} so far)",
                    id,
                    self.stats_dropped
                );
            }
        }

        Frame::new(
            id,
            t,
            TrackedFrame {
                image,
                tracks,
                people,
            },
        )
    }

    pub fn run(
        mut self,
        input: Receiver<Frame<DetectedFrame>>,
        output: Sender<Frame<TrackedFrame>>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        log::info!("Tracking stage started ({})", self.embedder.name());

        while let Some(frame) = recv_or_cancel(&input, cancel)? {
            let tracked = self.process(frame);
            send_or_cancel(&output, tracked, cancel, "tracker output")?;

            if self.frames % 100 == 0 {
                log::info!(
                    "Tracker stats: {} frames, {} live tracks, {} descriptor failures, {} stats samples dropped",
                    self.frames,
                    self.associator.len(),
                    self.embed_failures,
                    self.stats_dropped
                );
            }
        }

        log::info!("Tracking stage stopped after {} frames", self.frames);
        Ok(())
    }
}
