/// Detector worker pool
///
/// Workers share one bounded input queue and each owns a detector session
/// created inside its thread. Frames complete in arbitrary order; the sorter
/// stage restores stream order downstream.
use crate::cancel::{recv_or_cancel, CancellationToken};
use crate::config::DetectorConfig;
use crate::detector_trait::DetectorFactory;
use crate::error::{PipelineError, Result};
use crate::types::{DetectedFrame, Frame, Image};
use crossbeam::channel::{Receiver, Sender, TrySendError};
use std::sync::Arc;
use std::thread;

/// Worker pool running detection in parallel
pub struct DetectorPool {
    workers: Vec<Worker>,
    cancel: CancellationToken,
}

impl DetectorPool {
    /// Start `num_workers` detector threads.
    ///
    /// A worker that fails to create its session returns the error from
    /// [`DetectorPool::join`] and cancels the rest of the pipeline.
    pub fn spawn(
        num_workers: usize,
        factory: Arc<dyn DetectorFactory>,
        config: DetectorConfig,
        input: Receiver<Frame<Image>>,
        output: Sender<Frame<DetectedFrame>>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        if num_workers == 0 {
            return Err(PipelineError::config("detector pool needs at least one worker"));
        }

        let mut workers = Vec::with_capacity(num_workers);
        for id in 0..num_workers {
            let worker = Worker::new(
                id,
                Arc::clone(&factory),
                config.clone(),
                input.clone(),
                output.clone(),
                cancel.clone(),
            )?;
            workers.push(worker);
        }

        log::info!("Detector pool started with {} workers", num_workers);
        Ok(Self { workers, cancel })
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Wait for every worker. The first error other than cancellation wins.
    pub fn join(mut self) -> Result<()> {
        let mut result = Ok(());
        for worker in &mut self.workers {
            let outcome = worker.join();
            result = merge(result, outcome);
        }
        result
    }
}

/// Keep the first real failure, let it replace an earlier cancellation
pub(crate) fn merge(current: Result<()>, next: Result<()>) -> Result<()> {
    match (current, next) {
        (Err(e), _) if !e.is_cancelled() => Err(e),
        (_, Err(e)) if !e.is_cancelled() => Err(e),
        (Err(e), _) | (_, Err(e)) => Err(e),
        _ => Ok(()),
    }
}

impl Drop for DetectorPool {
    fn drop(&mut self) {
        if self.workers.iter().any(|w| w.thread.is_some()) {
            self.cancel.cancel();
            for worker in &mut self.workers {
                let _ = worker.join();
            }
        }
    }
}

struct Worker {
    id: usize,
    thread: Option<thread::JoinHandle<Result<()>>>,
}

impl Worker {
    fn new(
        id: usize,
        factory: Arc<dyn DetectorFactory>,
        config: DetectorConfig,
        input: Receiver<Frame<Image>>,
        output: Sender<Frame<DetectedFrame>>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let thread = thread::Builder::new()
            .name(format!("detector-{}", id))
            .spawn(move || {
                let result = Self::run(id, factory.as_ref(), &config, input, output, &cancel);
                if let Err(e) = &result {
                    if !e.is_cancelled() {
                        log::error!("Detector worker {} failed: {}", id, e);
                        cancel.cancel();
                    }
                }
                result
            })?;

        Ok(Worker {
            id,
            thread: Some(thread),
        })
    }

    fn run(
        id: usize,
        factory: &dyn DetectorFactory,
        config: &DetectorConfig,
        input: Receiver<Frame<Image>>,
        output: Sender<Frame<DetectedFrame>>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut detector = factory.create_detector(config, id)?;
        log::info!("Detector worker {} started ({})", id, detector.name());

        let mut processed = 0_u64;
        let mut dropped = 0_u64;

        while let Some(frame) = recv_or_cancel(&input, cancel)? {
            let boxes = match detector.detect(&frame.payload) {
                Ok(boxes) => boxes,
                Err(e) => {
                    dropped += 1;
                    log::warn!("⚠️  Detection failed for frame {}, dropping: {}", frame.id, e);
                    continue;
                }
            };
            processed += 1;

            let detected = frame.map(|image| DetectedFrame { image, boxes });
            match output.try_send(detected) {
                Ok(()) => {}
                Err(TrySendError::Full(frame)) => {
                    dropped += 1;
                    log::debug!("⚠️  Sorter queue full, dropping frame {} (backpressure)", frame.id);
                }
                Err(TrySendError::Disconnected(_)) => {
                    log::info!("Detector worker {}: sorter closed", id);
                    break;
                }
            }

            if processed % 100 == 0 {
                log::info!(
                    "Detector worker {} stats: {} processed, {} dropped",
                    id,
                    processed,
                    dropped
                );
            }
        }

        log::info!(
            "Detector worker {} stopped after {} frames ({} dropped)",
            id,
            processed,
            dropped
        );
        Ok(())
    }

    fn join(&mut self) -> Result<()> {
        match self.thread.take() {
            Some(handle) => handle
                .join()
                .unwrap_or_else(|_| Err(PipelineError::StagePanic(format!("detector-{}", self.id)))),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector_stub::{StubBackend, SyntheticScene, Walker};
    use crate::source::FrameSource;
    use crossbeam::channel::bounded;
    use std::time::{Duration, Instant};

    fn config() -> DetectorConfig {
        DetectorConfig {
            path: "person.onnx".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_pool_detects_every_frame() {
        let cancel = CancellationToken::new();
        let (in_tx, in_rx) = bounded(16);
        let (out_tx, out_rx) = bounded(16);
        let backend = StubBackend {
            latency: Some((Duration::from_millis(1), Duration::from_millis(5))),
            ..Default::default()
        };
        let pool = DetectorPool::spawn(3, Arc::new(backend), config(), in_rx, out_tx, cancel)
            .unwrap();
        assert_eq!(pool.size(), 3);

        let mut scene = SyntheticScene::new(64, 48, 10)
            .with_walker(Walker::new([200, 50, 50], (20, 24), (2, 0)));
        for id in 0..10 {
            let image = scene.next_frame().unwrap();
            in_tx.send(Frame::new(id, Instant::now(), image)).unwrap();
        }
        drop(in_tx);
        pool.join().unwrap();

        let mut ids: Vec<u64> = out_rx.try_iter().map(|f| f.id).collect();
        ids.sort_unstable();
        assert_eq!(ids, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_full_output_drops_frames() {
        let cancel = CancellationToken::new();
        let (in_tx, in_rx) = bounded(16);
        let (out_tx, out_rx) = bounded(2);
        let pool = DetectorPool::spawn(
            1,
            Arc::new(StubBackend::default()),
            config(),
            in_rx,
            out_tx,
            cancel,
        )
        .unwrap();

        for id in 0..6 {
            in_tx.send(Frame::new(id, Instant::now(), Image::new(8, 8))).unwrap();
        }
        drop(in_tx);
        pool.join().unwrap();

        let ids: Vec<u64> = out_rx.try_iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![0, 1]);
    }

    #[test]
    fn test_session_failure_cancels() {
        let cancel = CancellationToken::new();
        let (_in_tx, in_rx) = bounded::<Frame<Image>>(4);
        let (out_tx, _out_rx) = bounded(4);
        let backend = StubBackend {
            fail_detector_load: true,
            ..Default::default()
        };
        let pool =
            DetectorPool::spawn(2, Arc::new(backend), config(), in_rx, out_tx, cancel.clone())
                .unwrap();

        let result = pool.join();
        assert!(matches!(result, Err(PipelineError::ModelLoadError(_))));
        assert!(cancel.is_cancelled());
    }

    #[test]
    fn test_merge_prefers_real_errors() {
        let cancelled = || Err(PipelineError::Cancelled);
        assert!(merge(Ok(()), Ok(())).is_ok());
        assert!(merge(cancelled(), Ok(())).unwrap_err().is_cancelled());
        assert!(matches!(
            merge(cancelled(), Err(PipelineError::StreamEnded)),
            Err(PipelineError::StreamEnded)
        ));
        assert!(matches!(
            merge(Err(PipelineError::StreamEnded), cancelled()),
            Err(PipelineError::StreamEnded)
        ));
    }
}
