//! Deterministic stand-ins for the neural networks
//!
//! [`SyntheticScene`] renders people as solid rectangles on a dark
//! background. [`ColorBlobDetector`] finds those rectangles again and
//! [`ColorHistogramEmbedder`] describes each crop by its colour histogram,
//! so every synthetic person has a stable, distinct appearance.

use crate::config::{DetectorConfig, ReidConfig};
use crate::detector_trait::{Detector, DetectorFactory, Embedder, EmbedderFactory};
use crate::error::{PipelineError, Result};
use crate::source::FrameSource;
use crate::types::Image;
use image::Rgb;
use rand::Rng;
use reidtrack::{Bbox, Descriptor};
use std::collections::HashMap;
use std::thread;
use std::time::Duration;

pub const BACKGROUND: [u8; 3] = [16, 16, 16];

/// A rectangle moving at constant speed
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Walker {
    pub color: [u8; 3],
    pub start: (i32, i32),
    /// Pixels per frame
    pub velocity: (i32, i32),
    pub size: (i32, i32),
}

impl Walker {
    pub fn new(color: [u8; 3], start: (i32, i32), velocity: (i32, i32)) -> Self {
        Self {
            color,
            start,
            velocity,
            size: (30, 70),
        }
    }

    pub fn bbox_at(&self, frame: u64) -> Bbox {
        let n = frame as i32;
        Bbox::centered(
            self.start.0 + self.velocity.0 * n,
            self.start.1 + self.velocity.1 * n,
            self.size.0,
            self.size.1,
        )
    }
}

/// Frame source drawing walkers for a fixed number of frames
pub struct SyntheticScene {
    width: u32,
    height: u32,
    walkers: Vec<Walker>,
    frame: u64,
    total_frames: u64,
}

impl SyntheticScene {
    pub fn new(width: u32, height: u32, total_frames: u64) -> Self {
        Self {
            width,
            height,
            walkers: Vec::new(),
            frame: 0,
            total_frames,
        }
    }

    pub fn with_walker(mut self, walker: Walker) -> Self {
        self.walkers.push(walker);
        self
    }

    pub fn bounds(&self) -> Bbox {
        Bbox::new(0, 0, self.width as i32, self.height as i32)
    }

    /// Visible walker boxes, clipped to the frame
    pub fn boxes_at(&self, frame: u64) -> Vec<Bbox> {
        let bounds = self.bounds();
        self.walkers
            .iter()
            .filter_map(|w| w.bbox_at(frame).intersect(&bounds))
            .collect()
    }

    pub fn render(&self, frame: u64) -> Image {
        let mut image = Image::from_pixel(self.width, self.height, Rgb(BACKGROUND));
        let bounds = self.bounds();
        for walker in &self.walkers {
            if let Some(b) = walker.bbox_at(frame).intersect(&bounds) {
                for y in b.ymin..b.ymax {
                    for x in b.xmin..b.xmax {
                        image.put_pixel(x as u32, y as u32, Rgb(walker.color));
                    }
                }
            }
        }
        image
    }
}

impl FrameSource for SyntheticScene {
    fn next_frame(&mut self) -> Result<Image> {
        if self.frame >= self.total_frames {
            return Err(PipelineError::StreamEnded);
        }
        let image = self.render(self.frame);
        self.frame += 1;
        Ok(image)
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}

/// Bounding boxes of solid-colour regions that differ from the background.
///
/// A blob's confidence is the share of its box covered by its colour, so a
/// partly occluded person scores lower.
pub struct ColorBlobDetector {
    background: [u8; 3],
    min_area: i64,
    confidence_threshold: f32,
    nms_threshold: f32,
    latency: Option<(Duration, Duration)>,
}

impl ColorBlobDetector {
    /// Keeps every blob; see [`ColorBlobDetector::with_thresholds`]
    pub fn new(background: [u8; 3]) -> Self {
        Self {
            background,
            min_area: 16,
            confidence_threshold: 0.0,
            nms_threshold: 1.0,
            latency: None,
        }
    }

    /// Drop blobs below `confidence` and suppress blobs overlapping a more
    /// confident one by more than `nms` IoU
    pub fn with_thresholds(mut self, confidence: f32, nms: f32) -> Self {
        self.confidence_threshold = confidence;
        self.nms_threshold = nms;
        self
    }

    /// Sleep a random time in `min..=max` per frame, so parallel workers
    /// finish out of order
    pub fn with_latency(mut self, min: Duration, max: Duration) -> Self {
        self.latency = Some((min, max.max(min)));
        self
    }
}

impl Detector for ColorBlobDetector {
    fn detect(&mut self, image: &Image) -> Result<Vec<Bbox>> {
        if let Some((min, max)) = self.latency {
            thread::sleep(rand::thread_rng().gen_range(min..=max));
        }

        let mut blobs: HashMap<[u8; 3], (Bbox, i64)> = HashMap::new();
        for (x, y, pixel) in image.enumerate_pixels() {
            if pixel.0 == self.background {
                continue;
            }
            let (x, y) = (x as i32, y as i32);
            blobs
                .entry(pixel.0)
                .and_modify(|(b, pixels)| {
                    b.xmin = b.xmin.min(x);
                    b.ymin = b.ymin.min(y);
                    b.xmax = b.xmax.max(x + 1);
                    b.ymax = b.ymax.max(y + 1);
                    *pixels += 1;
                })
                .or_insert((Bbox::new(x, y, x + 1, y + 1), 1));
        }

        let mut candidates: Vec<(Bbox, f32)> = blobs
            .into_values()
            .filter(|(b, _)| b.area() >= self.min_area)
            .map(|(b, pixels)| (b, pixels as f32 / b.area() as f32))
            .filter(|(_, confidence)| *confidence >= self.confidence_threshold)
            .collect();
        candidates.sort_by(|a, b| b.1.total_cmp(&a.1));

        let mut boxes: Vec<Bbox> = Vec::with_capacity(candidates.len());
        for (bbox, _) in candidates {
            if boxes.iter().all(|kept| iou(kept, &bbox) <= self.nms_threshold) {
                boxes.push(bbox);
            }
        }
        boxes.sort_by_key(|b| (b.xmin, b.ymin, b.xmax, b.ymax));
        Ok(boxes)
    }

    fn name(&self) -> &str {
        "color-blob"
    }
}

fn iou(a: &Bbox, b: &Bbox) -> f32 {
    let Some(overlap) = a.intersect(b) else {
        return 0.0;
    };
    let union = a.area() + b.area() - overlap.area();
    if union <= 0 {
        0.0
    } else {
        overlap.area() as f32 / union as f32
    }
}

/// Normalised per-channel histogram of the crop
pub struct ColorHistogramEmbedder {
    bins: usize,
}

impl ColorHistogramEmbedder {
    pub fn new(bins: usize) -> Self {
        Self { bins: bins.max(1) }
    }
}

impl Embedder for ColorHistogramEmbedder {
    fn embed(&mut self, image: &Image, region: &Bbox) -> Result<Descriptor> {
        if region.is_empty() {
            return Err(PipelineError::inference(format!("empty crop {}", region)));
        }
        let crop = image::imageops::crop_imm(
            image,
            region.xmin.max(0) as u32,
            region.ymin.max(0) as u32,
            region.width() as u32,
            region.height() as u32,
        )
        .to_image();

        let mut histogram = vec![0.0f32; self.bins * 3];
        for pixel in crop.pixels() {
            for (channel, value) in pixel.0.iter().enumerate() {
                let bin = (*value as usize * self.bins) / 256;
                histogram[channel * self.bins + bin] += 1.0;
            }
        }

        let total = (crop.width() * crop.height()).max(1) as f32;
        histogram.iter_mut().for_each(|v| *v /= total);
        Ok(histogram)
    }

    fn name(&self) -> &str {
        "color-histogram"
    }
}

/// Factory for the stub networks
#[derive(Debug, Clone)]
pub struct StubBackend {
    pub background: [u8; 3],
    pub histogram_bins: usize,
    /// Per-frame detector latency range
    pub latency: Option<(Duration, Duration)>,
    /// Make detector creation fail, as a missing model file would
    pub fail_detector_load: bool,
}

impl Default for StubBackend {
    fn default() -> Self {
        Self {
            background: BACKGROUND,
            histogram_bins: 8,
            latency: None,
            fail_detector_load: false,
        }
    }
}

impl DetectorFactory for StubBackend {
    fn create_detector(
        &self,
        config: &DetectorConfig,
        worker_id: usize,
    ) -> Result<Box<dyn Detector>> {
        let model = config.model()?;
        if self.fail_detector_load {
            return Err(PipelineError::model_load(format!(
                "cannot read {} model {}",
                model.format(),
                model.model_path().display()
            )));
        }
        log::info!(
            "Creating stub detector for worker {} (in place of {})",
            worker_id,
            model.model_path().display()
        );
        let mut detector = ColorBlobDetector::new(self.background)
            .with_thresholds(config.confidence_threshold, config.nms_threshold);
        if let Some((min, max)) = self.latency {
            detector = detector.with_latency(min, max);
        }
        Ok(Box::new(detector))
    }
}

impl EmbedderFactory for StubBackend {
    fn create_embedder(&self, config: &ReidConfig) -> Result<Box<dyn Embedder>> {
        let model = config.model()?;
        log::info!(
            "Creating stub embedder (in place of {}, layer {})",
            model.model_path().display(),
            config.output_layer_name
        );
        Ok(Box::new(ColorHistogramEmbedder::new(self.histogram_bins)))
    }
}
