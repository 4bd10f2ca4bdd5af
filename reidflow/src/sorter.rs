//! Frame resequencing
//!
//! Detector workers finish frames in arbitrary order. The [`Resequencer`]
//! holds them in a min-heap keyed by frame id and releases at most one frame
//! per tick, only when it is the next expected id. Frames older than the
//! expected id arrive too late and are dropped.

use crate::cancel::{send_or_cancel, CancellationToken};
use crate::error::{PipelineError, Result};
use crate::types::Frame;
use crossbeam::channel::{select, tick, Receiver, Sender};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Duration;

struct Pending<T>(Frame<T>);

impl<T> PartialEq for Pending<T> {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl<T> Eq for Pending<T> {}

impl<T> PartialOrd for Pending<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Pending<T> {
    // Reversed so the max-heap pops the smallest id
    fn cmp(&self, other: &Self) -> Ordering {
        other.0.id.cmp(&self.0.id)
    }
}

/// What happened to a pushed frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrival {
    Queued,
    Stale { id: u64, expected: u64 },
}

pub struct Resequencer<T> {
    heap: BinaryHeap<Pending<T>>,
    expected_id: Option<u64>,
    max_stall_ticks: u32,
    stalled_ticks: u32,
    stale_dropped: u64,
    skipped: u64,
}

impl<T> Default for Resequencer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Resequencer<T> {
    /// Expects the first frame that arrives
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            expected_id: None,
            max_stall_ticks: 0,
            stalled_ticks: 0,
            stale_dropped: 0,
            skipped: 0,
        }
    }

    /// Expects `id` first
    pub fn starting_at(id: u64) -> Self {
        Self {
            expected_id: Some(id),
            ..Self::new()
        }
    }

    /// Give up on a missing frame after `ticks` consecutive stalled ticks
    /// and continue from the smallest pending id. Zero waits forever.
    pub fn with_max_stall_ticks(mut self, ticks: u32) -> Self {
        self.max_stall_ticks = ticks;
        self
    }

    pub fn push(&mut self, frame: Frame<T>) -> Arrival {
        let expected = *self.expected_id.get_or_insert(frame.id);
        if frame.id < expected {
            self.stale_dropped += 1;
            log::warn!(
                "Stale frame {} dropped, expecting {} or later",
                frame.id,
                expected
            );
            return Arrival::Stale {
                id: frame.id,
                expected,
            };
        }
        self.heap.push(Pending(frame));
        Arrival::Queued
    }

    /// Release the next frame if it is the expected one
    pub fn tick(&mut self) -> Option<Frame<T>> {
        self.discard_stale();
        let expected = self.expected_id?;
        let min = self.heap.peek()?.0.id;

        if min > expected {
            self.stalled_ticks += 1;
            if self.max_stall_ticks == 0 || self.stalled_ticks < self.max_stall_ticks {
                return None;
            }
            log::warn!(
                "Frames {}..{} never arrived, skipping ahead",
                expected,
                min
            );
            self.skipped += min - expected;
        }

        let Pending(frame) = self.heap.pop()?;
        self.expected_id = Some(frame.id + 1);
        self.stalled_ticks = 0;
        Some(frame)
    }

    /// Release everything still pending in id order, gaps included
    pub fn drain(&mut self) -> Vec<Frame<T>> {
        self.discard_stale();
        let mut frames = Vec::with_capacity(self.heap.len());
        while let Some(Pending(frame)) = self.heap.pop() {
            if self.expected_id.is_some_and(|expected| frame.id < expected) {
                self.stale_dropped += 1;
                continue;
            }
            self.expected_id = Some(frame.id + 1);
            frames.push(frame);
        }
        frames
    }

    /// Drop pending duplicates of ids that were already released
    fn discard_stale(&mut self) {
        let Some(expected) = self.expected_id else {
            return;
        };
        while self.heap.peek().is_some_and(|p| p.0.id < expected) {
            if let Some(Pending(frame)) = self.heap.pop() {
                self.stale_dropped += 1;
                log::warn!("Duplicate frame {} dropped", frame.id);
            }
        }
    }

    pub fn expected_id(&self) -> Option<u64> {
        self.expected_id
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn stale_dropped(&self) -> u64 {
        self.stale_dropped
    }

    /// Frame ids given up on after stalling
    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}

/// Sorter stage: reorder `input` onto `output` at the tick rate.
///
/// When the input closes the remaining frames are flushed in order.
pub fn run_sorter<T>(
    mut sequencer: Resequencer<T>,
    input: Receiver<Frame<T>>,
    output: Sender<Frame<T>>,
    period: Duration,
    cancel: &CancellationToken,
) -> Result<()> {
    let ticker = tick(period);
    let mut emitted = 0_u64;
    log::info!("Sorter started, releasing every {:?}", period);

    loop {
        select! {
            recv(cancel.done()) -> _ => {
                log::info!("Sorter cancelled with {} frames pending", sequencer.len());
                return Err(PipelineError::Cancelled);
            }
            recv(input) -> msg => match msg {
                Ok(frame) => {
                    sequencer.push(frame);
                }
                Err(_) => break,
            },
            recv(ticker) -> _ => {
                if let Some(frame) = sequencer.tick() {
                    send_or_cancel(&output, frame, cancel, "sorter output")?;
                    emitted += 1;
                    if emitted % 100 == 0 {
                        log::info!(
                            "Sorter stats: {} emitted, {} stale, {} skipped, {} pending",
                            emitted,
                            sequencer.stale_dropped(),
                            sequencer.skipped(),
                            sequencer.len()
                        );
                    }
                }
            }
        }
    }

    for frame in sequencer.drain() {
        send_or_cancel(&output, frame, cancel, "sorter output")?;
        emitted += 1;
    }
    log::info!(
        "Sorter stopped: {} emitted, {} stale dropped",
        emitted,
        sequencer.stale_dropped()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel::bounded;
    use std::thread;
    use std::time::Instant;

    fn frame(id: u64) -> Frame<&'static str> {
        Frame::new(id, Instant::now(), "image")
    }

    fn ticks(seq: &mut Resequencer<&'static str>, n: usize) -> Vec<u64> {
        (0..n).filter_map(|_| seq.tick()).map(|f| f.id).collect()
    }

    #[test]
    fn test_reorders() {
        let mut seq = Resequencer::starting_at(0);
        for id in [3, 1, 2, 0] {
            assert_eq!(seq.push(frame(id)), Arrival::Queued);
        }
        assert_eq!(ticks(&mut seq, 6), vec![0, 1, 2, 3]);
        assert_eq!(seq.expected_id(), Some(4));
    }

    #[test]
    fn test_waits_for_missing_frame() {
        let mut seq = Resequencer::starting_at(0);
        seq.push(frame(1));
        seq.push(frame(2));
        assert_eq!(ticks(&mut seq, 3), Vec::<u64>::new());

        seq.push(frame(0));
        assert_eq!(ticks(&mut seq, 3), vec![0, 1, 2]);
    }

    #[test]
    fn test_stale_frames_dropped() {
        let mut seq = Resequencer::starting_at(5);
        assert_eq!(
            seq.push(frame(4)),
            Arrival::Stale {
                id: 4,
                expected: 5
            }
        );
        seq.push(frame(5));
        assert_eq!(ticks(&mut seq, 1), vec![5]);
        assert!(matches!(seq.push(frame(5)), Arrival::Stale { .. }));
        assert_eq!(seq.stale_dropped(), 2);
        assert!(seq.is_empty());
    }

    #[test]
    fn test_first_arrival_sets_expectation() {
        let mut seq = Resequencer::new();
        seq.push(frame(10));
        assert_eq!(seq.expected_id(), Some(10));
        assert!(matches!(seq.push(frame(9)), Arrival::Stale { .. }));
        assert_eq!(ticks(&mut seq, 2), vec![10]);
    }

    #[test]
    fn test_duplicate_emitted_once() {
        let mut seq = Resequencer::starting_at(0);
        seq.push(frame(0));
        seq.push(frame(0));
        seq.push(frame(1));
        assert_eq!(ticks(&mut seq, 5), vec![0, 1]);
        assert_eq!(seq.stale_dropped(), 1);
    }

    #[test]
    fn test_stall_limit_skips_gap() {
        let mut seq = Resequencer::starting_at(0).with_max_stall_ticks(3);
        seq.push(frame(2));
        seq.push(frame(3));
        assert_eq!(seq.tick().map(|f| f.id), None);
        assert_eq!(seq.tick().map(|f| f.id), None);
        assert_eq!(seq.tick().map(|f| f.id), Some(2));
        assert_eq!(seq.skipped(), 2);
        assert_eq!(ticks(&mut seq, 2), vec![3]);
        // the skipped frame is now stale
        assert!(matches!(seq.push(frame(1)), Arrival::Stale { .. }));
    }

    #[test]
    fn test_drain_flushes_in_order() {
        let mut seq = Resequencer::starting_at(0);
        for id in [7, 3, 5] {
            seq.push(frame(id));
        }
        let ids: Vec<u64> = seq.drain().into_iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![3, 5, 7]);
    }

    #[test]
    fn test_stage_emits_in_order() {
        let cancel = CancellationToken::new();
        let (in_tx, in_rx) = bounded(16);
        let (out_tx, out_rx) = bounded(16);

        let stage = {
            let cancel = cancel.clone();
            thread::spawn(move || {
                run_sorter(
                    Resequencer::starting_at(0),
                    in_rx,
                    out_tx,
                    Duration::from_millis(1),
                    &cancel,
                )
            })
        };

        for id in [2, 0, 4, 1, 3, 5] {
            in_tx.send(frame(id)).unwrap();
        }
        drop(in_tx);
        stage.join().unwrap().unwrap();

        let ids: Vec<u64> = out_rx.try_iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_stage_cancellation() {
        let cancel = CancellationToken::new();
        let (_in_tx, in_rx) = bounded::<Frame<&'static str>>(4);
        let (out_tx, _out_rx) = bounded(4);

        let stage = {
            let cancel = cancel.clone();
            thread::spawn(move || {
                run_sorter(Resequencer::new(), in_rx, out_tx, Duration::from_millis(5), &cancel)
            })
        };
        cancel.cancel();
        let result = stage.join().unwrap();
        assert!(matches!(result, Err(PipelineError::Cancelled)));
    }
}
