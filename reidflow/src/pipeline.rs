/// Pipeline orchestration
///
/// Wires the stages with bounded channels:
///
/// ```text
/// source -> ingest -> detector pool -> sorter -> tracker -> sinks
///                     (N workers)                  \-> stats
/// ```
///
/// Sends into the pool and into the sorter never block; a full queue drops
/// the frame. From the sorter on, sends block until there is room or the
/// pipeline is cancelled. The first stage to fail cancels all the others.
use crate::cancel::CancellationToken;
use crate::config::PipelineConfig;
use crate::detector_pool::{merge, DetectorPool};
use crate::detector_trait::{DetectorFactory, EmbedderFactory};
use crate::error::{PipelineError, Result};
use crate::reid_stage::ReidStage;
use crate::sinks::{Publisher, RenderSink, SinkStage};
use crate::sorter::{run_sorter, Resequencer};
use crate::source::FrameSource;
use crate::stats::{run_stats, StatsCollector};
use crate::types::{Frame, Image};
use crossbeam::channel::{bounded, Sender, TrySendError};
use reidtrack::Associator;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

pub struct Pipeline {
    config: PipelineConfig,
    detectors: Arc<dyn DetectorFactory>,
    embedders: Arc<dyn EmbedderFactory>,
}

impl Pipeline {
    /// Validate `config`; configuration errors surface here, before any thread starts
    pub fn new(
        config: PipelineConfig,
        detectors: Arc<dyn DetectorFactory>,
        embedders: Arc<dyn EmbedderFactory>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            detectors,
            embedders,
        })
    }

    /// Pipeline whose detector and embedder come from the same backend
    pub fn with_backend<B>(config: PipelineConfig, backend: B) -> Result<Self>
    where
        B: DetectorFactory + EmbedderFactory + 'static,
    {
        let backend = Arc::new(backend);
        Self::new(config, backend.clone(), backend)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Start every stage and return immediately
    pub fn start(
        self,
        source: Box<dyn FrameSource>,
        publisher: Box<dyn Publisher>,
        renderer: Box<dyn RenderSink>,
    ) -> Result<PipelineHandle> {
        let config = self.config;
        let cancel = CancellationToken::new();
        let capacity = config.channels.capacity;

        let (frames_tx, frames_rx) = bounded::<Frame<Image>>(capacity);
        let (detected_tx, detected_rx) = bounded(capacity);
        let (ordered_tx, ordered_rx) = bounded(capacity);
        let (tracked_tx, tracked_rx) = bounded(capacity);
        let (stats_tx, stats_rx) = bounded(capacity * 4);

        let mut handle = PipelineHandle {
            cancel: cancel.clone(),
            stages: Vec::new(),
            pool: None,
        };

        log::info!(
            "Starting pipeline: {} detector workers, queue capacity {}",
            config.detector.threads,
            capacity
        );

        let sink = SinkStage::new(
            publisher,
            renderer,
            config.export.clone(),
            config.shutdown.timeout(),
        );
        handle.spawn("sinks", move |cancel| sink.run(tracked_rx, cancel))?;

        let collector =
            StatsCollector::new(config.stats.window, config.stats.period(), Instant::now())?;
        handle.spawn("stats", move |cancel| run_stats(collector, stats_rx, cancel))?;

        let embedders = self.embedders;
        let tracker_config = config.tracker.clone();
        let reid_config = config.reid.clone();
        handle.spawn("tracker", move |cancel| {
            let embedder = embedders.create_embedder(&reid_config)?;
            ReidStage::new(Associator::new(tracker_config), embedder)
                .with_stats(stats_tx)
                .run(ordered_rx, tracked_tx, cancel)
        })?;

        let sequencer =
            Resequencer::starting_at(0).with_max_stall_ticks(config.sorter.max_stall_ticks);
        let period = config.sorter.tick_period();
        handle.spawn("sorter", move |cancel| {
            run_sorter(sequencer, detected_rx, ordered_tx, period, cancel)
        })?;

        handle.pool = Some(DetectorPool::spawn(
            config.detector.threads,
            self.detectors,
            config.detector.clone(),
            frames_rx,
            detected_tx,
            cancel.clone(),
        )?);

        let max_errors = config.ingest.max_consecutive_errors;
        handle.spawn("ingest", move |cancel| {
            run_ingest(source, frames_tx, max_errors, cancel)
        })?;

        Ok(handle)
    }

    /// Start and wait for completion
    pub fn run(
        self,
        source: Box<dyn FrameSource>,
        publisher: Box<dyn Publisher>,
        renderer: Box<dyn RenderSink>,
    ) -> Result<()> {
        self.start(source, publisher, renderer)?.wait()
    }
}

struct Stage {
    name: String,
    thread: thread::JoinHandle<Result<()>>,
}

/// Running pipeline
pub struct PipelineHandle {
    cancel: CancellationToken,
    stages: Vec<Stage>,
    pool: Option<DetectorPool>,
}

impl PipelineHandle {
    fn spawn<F>(&mut self, name: &str, stage: F) -> Result<()>
    where
        F: FnOnce(&CancellationToken) -> Result<()> + Send + 'static,
    {
        let cancel = self.cancel.clone();
        let stage_name = name.to_string();
        let spawned = thread::Builder::new().name(name.to_string()).spawn(move || {
            let result = stage(&cancel);
            if let Err(e) = &result {
                if !e.is_cancelled() {
                    log::error!("Stage {} failed: {}", stage_name, e);
                    cancel.cancel();
                }
            }
            result
        });

        match spawned {
            Ok(thread) => {
                self.stages.push(Stage {
                    name: name.to_string(),
                    thread,
                });
                Ok(())
            }
            Err(e) => {
                self.cancel.cancel();
                Err(e.into())
            }
        }
    }

    pub fn cancel(&self) {
        log::info!("Pipeline cancellation requested");
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Join every stage. The first error other than cancellation is the
    /// result; if every failure was a cancellation the result is `Cancelled`.
    pub fn wait(mut self) -> Result<()> {
        let result = self.join_all();
        match &result {
            Ok(()) => log::info!("Pipeline finished"),
            Err(e) if e.is_cancelled() => log::info!("Pipeline cancelled"),
            Err(e) => log::error!("Pipeline failed: {}", e),
        }
        result
    }

    fn join_all(&mut self) -> Result<()> {
        let mut result = Ok(());
        if let Some(pool) = self.pool.take() {
            result = merge(result, pool.join());
        }
        for stage in self.stages.drain(..) {
            let outcome = stage
                .thread
                .join()
                .unwrap_or_else(|_| Err(PipelineError::StagePanic(stage.name)));
            result = merge(result, outcome);
        }
        result
    }
}

impl Drop for PipelineHandle {
    fn drop(&mut self) {
        if !self.stages.is_empty() || self.pool.is_some() {
            self.cancel.cancel();
            let _ = self.join_all();
        }
    }
}

/// Ingestion stage: stamp frames and offer them to the detector pool
fn run_ingest(
    mut source: Box<dyn FrameSource>,
    output: Sender<Frame<Image>>,
    max_consecutive_errors: u32,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut next_id = 0_u64;
    let mut dropped = 0_u64;
    let mut failures = 0_u32;
    log::info!("Ingestion started ({})", source.name());

    loop {
        cancel.check()?;

        let image = match source.next_frame() {
            Ok(image) => {
                failures = 0;
                image
            }
            Err(PipelineError::StreamEnded) => {
                log::info!(
                    "Stream ended after {} frames ({} dropped)",
                    next_id,
                    dropped
                );
                return Ok(());
            }
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                failures += 1;
                log::warn!("Unreadable frame skipped: {}", e);
                if max_consecutive_errors > 0 && failures >= max_consecutive_errors {
                    return Err(PipelineError::source(format!(
                        "{} consecutive unreadable frames",
                        failures
                    )));
                }
                continue;
            }
        };

        // Ids are only consumed by frames that enter the pool
        match output.try_send(Frame::new(next_id, Instant::now(), image)) {
            Ok(()) => next_id += 1,
            Err(TrySendError::Full(frame)) => {
                dropped += 1;
                log::debug!("⚠️  Detector queue full, dropping frame (backpressure)");
                drop(frame);
            }
            Err(TrySendError::Disconnected(_)) => {
                log::info!("Detector pool closed, stopping ingestion");
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector_stub::{StubBackend, SyntheticScene, Walker};
    use crate::sinks::{ChannelPublisher, ChannelRenderSink, ExportCommand, NullRenderSink};
    use crate::source::VecSource;
    use crossbeam::channel::unbounded;
    use std::time::Duration;

    fn test_config() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.detector.threads = 3;
        config.channels.capacity = 64;
        config.sorter.tick_hz = 2000.0;
        config.tracker.validation_duration = 0.05;
        config.tracker.validation_min_hits = 3;
        config
    }

    /// Scene paced like a camera so ingestion does not outrun the pool
    fn paced(mut scene: SyntheticScene, interval: Duration) -> Box<dyn FrameSource> {
        let mut first = true;
        Box::new(move || {
            if !first {
                thread::sleep(interval);
            }
            first = false;
            scene.next_frame()
        })
    }

    #[test]
    fn test_end_to_end_ordered_and_tracked() {
        let scene = SyntheticScene::new(320, 240, 60)
            .with_walker(Walker::new([220, 40, 40], (60, 120), (1, 0)))
            .with_walker(Walker::new([40, 200, 60], (260, 120), (-1, 0)));
        let backend = StubBackend {
            latency: Some((Duration::from_millis(0), Duration::from_millis(4))),
            ..Default::default()
        };
        let (pub_tx, pub_rx) = unbounded();
        let (render_tx, render_rx) = unbounded();

        Pipeline::with_backend(test_config(), backend)
            .unwrap()
            .run(
                paced(scene, Duration::from_millis(5)),
                Box::new(ChannelPublisher::new(pub_tx)),
                Box::new(ChannelRenderSink::new(render_tx)),
            )
            .unwrap();

        let rendered: Vec<_> = render_rx.try_iter().collect();
        assert!(!rendered.is_empty());
        assert!(rendered.windows(2).all(|w| w[0].id < w[1].id));

        let commands: Vec<ExportCommand> = pub_rx
            .try_iter()
            .map(|p| serde_json::from_slice(&p).unwrap())
            .collect();
        assert_eq!(commands.len(), rendered.len());

        let last = rendered.last().unwrap();
        assert_eq!(last.payload.tracks.len(), 2);
        assert_eq!(commands.last().unwrap().message.people.len(), 2);
    }

    #[test]
    fn test_model_load_failure_stops_pipeline() {
        let backend = StubBackend {
            fail_detector_load: true,
            ..Default::default()
        };
        let scene = SyntheticScene::new(64, 48, 1_000_000);
        let result = Pipeline::with_backend(test_config(), backend)
            .unwrap()
            .run(
                paced(scene, Duration::from_millis(1)),
                Box::new(ChannelPublisher::new(unbounded().0)),
                Box::<NullRenderSink>::default(),
            );
        assert!(matches!(result, Err(PipelineError::ModelLoadError(_))));
    }

    #[test]
    fn test_cancel_returns_cancelled() {
        let scene = SyntheticScene::new(64, 48, 1_000_000);
        let (pub_tx, _pub_rx) = unbounded();
        let handle = Pipeline::with_backend(test_config(), StubBackend::default())
            .unwrap()
            .start(
                paced(scene, Duration::from_millis(1)),
                Box::new(ChannelPublisher::new(pub_tx)),
                Box::<NullRenderSink>::default(),
            )
            .unwrap();

        thread::sleep(Duration::from_millis(50));
        handle.cancel();
        assert!(matches!(handle.wait(), Err(PipelineError::Cancelled)));
    }

    #[test]
    fn test_invalid_config_fails_before_start() {
        let mut config = test_config();
        config.detector.format = "darknet".to_string();
        assert!(matches!(
            Pipeline::with_backend(config, StubBackend::default()),
            Err(PipelineError::ConfigError(_))
        ));
    }

    #[test]
    fn test_unreadable_frames_are_skipped() {
        let mut frames = VecSource::new(vec![Image::new(32, 32); 3]);
        let mut calls = 0;
        let flaky = move || {
            calls += 1;
            if calls % 2 == 0 {
                Err(PipelineError::source("corrupt frame"))
            } else {
                frames.next_frame()
            }
        };
        let (render_tx, render_rx) = unbounded();

        Pipeline::with_backend(test_config(), StubBackend::default())
            .unwrap()
            .run(
                Box::new(flaky),
                Box::new(ChannelPublisher::new(unbounded().0)),
                Box::new(ChannelRenderSink::new(render_tx)),
            )
            .unwrap();

        let ids: Vec<u64> = render_rx.try_iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }
}
