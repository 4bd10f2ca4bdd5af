//! Output sinks: track export and rendering
//!
//! Once per tracked frame the sink stage publishes an [`ExportCommand`]
//! and hands the annotated frame to the render sink.

use crate::cancel::{recv_or_cancel, CancellationToken};
use crate::config::ExportConfig;
use crate::error::{PipelineError, Result};
use crate::types::{Frame, Image, TrackSnapshot, TrackedFrame};
use crossbeam::channel::{bounded, Receiver, Sender};
use image::Rgb;
use reidtrack::{Bbox, ExportedPerson};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

/// Message envelope for exported tracks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportCommand {
    pub id: u64,
    pub sender: String,
    #[serde(rename = "type")]
    pub message_type: String,
    pub initiator: String,
    pub subject: String,
    pub message: ExportMessage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportMessage {
    pub people: Vec<ExportedPerson>,
}

impl ExportCommand {
    pub fn new(config: &ExportConfig, frame_id: u64, people: Vec<ExportedPerson>) -> Self {
        Self {
            id: frame_id,
            sender: config.client_id.clone(),
            message_type: config.message_type.clone(),
            initiator: config.client_id.clone(),
            subject: config.subject.clone(),
            message: ExportMessage { people },
        }
    }

    pub fn to_payload(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Transport for export payloads (MQTT client, file, socket)
pub trait Publisher: Send {
    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<()>;

    /// Release network resources within `timeout`. The sink stage stops
    /// waiting once the timeout has passed and leaves the call running on
    /// its shutdown thread.
    fn shutdown(&mut self, _timeout: Duration) -> Result<()> {
        Ok(())
    }
}

/// Consumer of ordered, annotated frames (display, MJPEG server, recorder)
pub trait RenderSink: Send {
    fn render(&mut self, frame: Frame<TrackedFrame>) -> Result<()>;

    /// Flush within `timeout`, bounded by the sink stage like
    /// [`Publisher::shutdown`]
    fn shutdown(&mut self, _timeout: Duration) -> Result<()> {
        Ok(())
    }
}

/// Writes one JSON payload per line
pub struct JsonLinesPublisher<W: Write + Send> {
    writer: W,
}

impl<W: Write + Send> JsonLinesPublisher<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> Publisher for JsonLinesPublisher<W> {
    fn publish(&mut self, _topic: &str, payload: &[u8]) -> Result<()> {
        self.writer.write_all(payload)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    fn shutdown(&mut self, _timeout: Duration) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Forwards payloads into a channel
pub struct ChannelPublisher {
    tx: Sender<Vec<u8>>,
}

impl ChannelPublisher {
    pub fn new(tx: Sender<Vec<u8>>) -> Self {
        Self { tx }
    }
}

impl Publisher for ChannelPublisher {
    fn publish(&mut self, _topic: &str, payload: &[u8]) -> Result<()> {
        self.tx
            .send(payload.to_vec())
            .map_err(|_| PipelineError::publish("export receiver dropped"))
    }
}

/// Discards frames, counting them
#[derive(Debug, Default)]
pub struct NullRenderSink {
    pub frames: u64,
}

impl RenderSink for NullRenderSink {
    fn render(&mut self, _frame: Frame<TrackedFrame>) -> Result<()> {
        self.frames += 1;
        Ok(())
    }
}

/// Forwards frames into a channel
pub struct ChannelRenderSink {
    tx: Sender<Frame<TrackedFrame>>,
}

impl ChannelRenderSink {
    pub fn new(tx: Sender<Frame<TrackedFrame>>) -> Self {
        Self { tx }
    }
}

impl RenderSink for ChannelRenderSink {
    fn render(&mut self, frame: Frame<TrackedFrame>) -> Result<()> {
        self.tx
            .send(frame)
            .map_err(|_| PipelineError::Disconnected("render sink"))
    }
}

/// Keeps the most recent annotated frame and writes it as an image file
/// on shutdown
pub struct SnapshotRenderSink {
    path: PathBuf,
    latest: Option<Image>,
}

impl SnapshotRenderSink {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            latest: None,
        }
    }
}

impl RenderSink for SnapshotRenderSink {
    fn render(&mut self, frame: Frame<TrackedFrame>) -> Result<()> {
        let TrackedFrame { mut image, tracks, .. } = frame.payload;
        annotate(&mut image, &tracks);
        self.latest = Some(image);
        Ok(())
    }

    fn shutdown(&mut self, _timeout: Duration) -> Result<()> {
        if let Some(image) = self.latest.take() {
            image.save(&self.path)?;
            log::info!("Saved last annotated frame to {}", self.path.display());
        }
        Ok(())
    }
}

/// Draw each track's box and trajectory in its colour. Validated tracks
/// get a thicker outline.
pub fn annotate(image: &mut Image, tracks: &[TrackSnapshot]) {
    for track in tracks {
        let color = Rgb(track.color);
        if let Some(bbox) = track.last_box {
            let thickness = if track.valid { 2 } else { 1 };
            draw_rect(image, &bbox, color, thickness);
        }
        for point in &track.trajectory {
            put_pixel(image, point.x.round() as i32, point.y.round() as i32, color);
        }
    }
}

fn draw_rect(image: &mut Image, bbox: &Bbox, color: Rgb<u8>, thickness: i32) {
    for offset in 0..thickness {
        let (x0, y0) = (bbox.xmin + offset, bbox.ymin + offset);
        let (x1, y1) = (bbox.xmax - 1 - offset, bbox.ymax - 1 - offset);
        for x in x0..=x1 {
            put_pixel(image, x, y0, color);
            put_pixel(image, x, y1, color);
        }
        for y in y0..=y1 {
            put_pixel(image, x0, y, color);
            put_pixel(image, x1, y, color);
        }
    }
}

fn put_pixel(image: &mut Image, x: i32, y: i32, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < image.width() && (y as u32) < image.height() {
        image.put_pixel(x as u32, y as u32, color);
    }
}

/// Final stage: export then render every tracked frame
pub struct SinkStage {
    publisher: Box<dyn Publisher>,
    renderer: Box<dyn RenderSink>,
    export: ExportConfig,
    shutdown_timeout: Duration,
}

impl SinkStage {
    pub fn new(
        publisher: Box<dyn Publisher>,
        renderer: Box<dyn RenderSink>,
        export: ExportConfig,
        shutdown_timeout: Duration,
    ) -> Self {
        Self {
            publisher,
            renderer,
            export,
            shutdown_timeout,
        }
    }

    pub fn run(mut self, input: Receiver<Frame<TrackedFrame>>, cancel: &CancellationToken) -> Result<()> {
        let result = self.consume(&input, cancel);
        let shutdown = self.shutdown();
        result?;
        shutdown
    }

    /// Shut both sinks down on a helper thread and wait at most
    /// `shutdown_timeout` for them
    fn shutdown(self) -> Result<()> {
        let Self {
            mut publisher,
            mut renderer,
            shutdown_timeout,
            ..
        } = self;
        let (done_tx, done_rx) = bounded(1);
        let started = Instant::now();

        thread::Builder::new()
            .name("sink-shutdown".to_string())
            .spawn(move || {
                let publisher = publisher.shutdown(shutdown_timeout);
                let renderer = renderer.shutdown(shutdown_timeout);
                let _ = done_tx.send((publisher, renderer));
            })?;

        match done_rx.recv_timeout(shutdown_timeout) {
            Ok((publisher, renderer)) => {
                log::info!("Sinks shut down in {:?}", started.elapsed());
                publisher?;
                renderer
            }
            Err(_) => {
                log::warn!(
                    "⚠️  Sinks did not shut down within {:?}, leaving them behind",
                    shutdown_timeout
                );
                Ok(())
            }
        }
    }

    fn consume(
        &mut self,
        input: &Receiver<Frame<TrackedFrame>>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut published = 0_u64;
        while let Some(frame) = recv_or_cancel(input, cancel)? {
            let command = ExportCommand::new(&self.export, frame.id, frame.payload.people.clone());
            let payload = command.to_payload()?;
            self.publisher
                .publish(&self.export.topic_name, &payload)
                .map_err(|e| {
                    log::error!("Can't publish frame {}: {}", frame.id, e);
                    e
                })?;
            published += 1;

            let id = frame.id;
            if let Err(e) = self.renderer.render(frame) {
                log::warn!("Render failed for frame {}: {}", id, e);
            }
        }
        log::info!("Sink stage stopped after {} frames", published);
        Ok(())
    }
}
