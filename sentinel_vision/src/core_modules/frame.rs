// THEORY:
// A `Frame` is the smallest unit the engine moves around: one decoded RGB image
// plus the 1-based position it held in the source video. Frames are immutable
// once read and are moved (never copied) into the sliding window buffer.
//
// A `Window` is a read-only view over the buffer at the instant it is full. It
// can only be obtained from `SlidingWindowBuffer::window`, which refuses to
// hand one out before the buffer holds its full capacity, so no classifier can
// ever see a short window.

use crate::incident::FrameNumber;
use image::RgbImage;
use std::collections::VecDeque;

/// One decoded frame: `height x width x 3` samples and its ordinal.
#[derive(Debug, Clone)]
pub struct Frame {
    /// 1-based ordinal in the source video.
    pub number: FrameNumber,
    pub image: RgbImage,
}

impl Frame {
    pub fn new(number: FrameNumber, image: RgbImage) -> Self {
        Self { number, image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// An ordered, full-length view of consecutive frames, oldest first.
#[derive(Debug, Clone, Copy)]
pub struct Window<'a> {
    frames: &'a VecDeque<Frame>,
}

impl<'a> Window<'a> {
    pub(crate) fn new(frames: &'a VecDeque<Frame>) -> Self {
        Self { frames }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a Frame> + 'a {
        self.frames.iter()
    }

    /// The most recently decoded frame. This is the frame snapshotted when the
    /// window turns out positive.
    pub fn newest(&self) -> Option<&'a Frame> {
        self.frames.back()
    }

    pub fn oldest(&self) -> Option<&'a Frame> {
        self.frames.front()
    }
}
