//! Frame sources feeding the ingestion stage

use crate::error::{PipelineError, Result};
use crate::types::Image;
use std::collections::VecDeque;

/// Produces decoded frames.
///
/// Returns [`PipelineError::StreamEnded`] once exhausted. Any other error
/// counts as an unreadable frame and is skipped by the ingestion stage.
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> Result<Image>;

    fn name(&self) -> &str {
        "source"
    }
}

/// Replays a fixed list of images
pub struct VecSource {
    frames: VecDeque<Image>,
}

impl VecSource {
    pub fn new(frames: Vec<Image>) -> Self {
        Self {
            frames: frames.into(),
        }
    }
}

impl FrameSource for VecSource {
    fn next_frame(&mut self) -> Result<Image> {
        self.frames.pop_front().ok_or(PipelineError::StreamEnded)
    }

    fn name(&self) -> &str {
        "vec"
    }
}

impl<F> FrameSource for F
where
    F: FnMut() -> Result<Image> + Send,
{
    fn next_frame(&mut self) -> Result<Image> {
        self()
    }
}
