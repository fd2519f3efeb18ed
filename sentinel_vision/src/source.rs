// THEORY:
// Decoding belongs to whoever hosts the engine (the runner uses OpenCV). The
// engine only needs a sequential reader that knows the container's frame
// count and frame rate, plus an opener that can fail before any frame is
// read. That split is what lets an unopenable video fail the run without a
// single write to the store.
//
// `SyntheticVideo` is a deterministic, in-memory stand-in for a decoded file:
// a dark background with a block that drifts during calm scenes and jitters
// hard during three "violent" scenes. It can lie about its own metadata and
// inject a decode error, which is how the edge cases get exercised.

use crate::error::SourceError;
use image::{Rgb, RgbImage};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Container metadata reported at open time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub frame_count: u64,
}

impl VideoInfo {
    pub fn has_valid_fps(&self) -> bool {
        self.fps.is_finite() && self.fps > 0.0
    }

    pub fn duration_seconds(&self) -> f64 {
        if self.has_valid_fps() { self.frame_count as f64 / self.fps } else { 0.0 }
    }

    pub fn resolution(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

/// A sequential frame reader over one opened video.
pub trait FrameSource: Send {
    fn info(&self) -> VideoInfo;

    /// The next frame, `Ok(None)` at end of stream.
    fn next_frame(&mut self) -> Result<Option<RgbImage>, SourceError>;
}

pub trait VideoOpener: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn FrameSource>, SourceError>;
}

/// Fraction-of-duration ranges rendered as violent scenes.
const VIOLENT_SCENES: [(f64, f64); 3] = [(0.20, 0.30), (0.60, 0.65), (0.85, 0.90)];

#[derive(Debug, Clone)]
pub struct SyntheticVideo {
    width: u32,
    height: u32,
    fps: f64,
    total_frames: u64,
    reported_frames: u64,
    reported_fps: f64,
    fail_at: Option<u64>,
    emitted: u64,
}

impl SyntheticVideo {
    pub fn new(seconds: f64, fps: f64) -> Self {
        let total_frames = if seconds > 0.0 && fps > 0.0 { (seconds * fps).round() as u64 } else { 0 };
        Self {
            width: 160,
            height: 120,
            fps,
            total_frames,
            reported_frames: total_frames,
            reported_fps: fps,
            fail_at: None,
            emitted: 0,
        }
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width.max(1);
        self.height = height.max(1);
        self
    }

    /// Makes the container report a different frame count than it yields.
    pub fn reporting_frames(mut self, frames: u64) -> Self {
        self.reported_frames = frames;
        self
    }

    pub fn reporting_fps(mut self, fps: f64) -> Self {
        self.reported_fps = fps;
        self
    }

    /// Fails decoding of the given 1-based frame.
    pub fn failing_at(mut self, frame: u64) -> Self {
        self.fail_at = Some(frame);
        self
    }

    pub fn is_violent_at(&self, seconds: f64) -> bool {
        let duration = self.total_frames as f64 / self.fps;
        if duration <= 0.0 {
            return false;
        }
        let progress = seconds / duration;
        VIOLENT_SCENES.iter().any(|(start, end)| (*start..=*end).contains(&progress))
    }

    fn render(&self, index: u64) -> RgbImage {
        let mut image = RgbImage::from_pixel(self.width, self.height, Rgb([50, 50, 50]));
        let seconds = index as f64 / self.fps;
        let side = (self.width.min(self.height) / 4).max(1);
        let span_x = self.width.saturating_sub(side).max(1);
        let span_y = self.height.saturating_sub(side).max(1);

        let (x, y, color) = if self.is_violent_at(seconds) {
            // Hash-like jitter keeps frames deterministic but erratic.
            let jitter = index.wrapping_mul(2_654_435_761) >> 7;
            ((jitter % span_x as u64) as u32, ((jitter >> 11) % span_y as u64) as u32, Rgb([220, 30, 30]))
        } else {
            let drift = (seconds * 10.0) as u32;
            (drift % span_x, span_y / 2, Rgb([60, 160, 60]))
        };

        for dy in 0..side.min(self.height - y) {
            for dx in 0..side.min(self.width - x) {
                image.put_pixel(x + dx, y + dy, color);
            }
        }
        image
    }
}

impl FrameSource for SyntheticVideo {
    fn info(&self) -> VideoInfo {
        VideoInfo {
            width: self.width,
            height: self.height,
            fps: self.reported_fps,
            frame_count: self.reported_frames,
        }
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>, SourceError> {
        if self.emitted >= self.total_frames {
            return Ok(None);
        }
        self.emitted += 1;
        if self.fail_at == Some(self.emitted) {
            return Err(SourceError::Decode(format!("corrupt packet at frame {}", self.emitted)));
        }
        Ok(Some(self.render(self.emitted - 1)))
    }
}

/// Opens `SyntheticVideo`s registered under a path; any other path fails to open.
#[derive(Debug, Default, Clone)]
pub struct SyntheticOpener {
    videos: HashMap<PathBuf, SyntheticVideo>,
}

impl SyntheticOpener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_video(mut self, path: impl Into<PathBuf>, video: SyntheticVideo) -> Self {
        self.videos.insert(path.into(), video);
        self
    }
}

impl VideoOpener for SyntheticOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn FrameSource>, SourceError> {
        self.videos
            .get(path)
            .cloned()
            .map(|video| Box::new(video) as Box<dyn FrameSource>)
            .ok_or_else(|| SourceError::Unopenable {
                path: path.to_path_buf(),
                reason: "no such video".into(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_frame_count_and_order() {
        let mut video = SyntheticVideo::new(2.0, 30.0);
        assert_eq!(video.info().frame_count, 60);
        let mut yielded = 0;
        while let Some(frame) = video.next_frame().unwrap() {
            assert_eq!(frame.dimensions(), (160, 120));
            yielded += 1;
        }
        assert_eq!(yielded, 60);
        assert!(video.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_synthetic_frames_are_deterministic() {
        let mut a = SyntheticVideo::new(1.0, 30.0);
        let mut b = SyntheticVideo::new(1.0, 30.0);
        for _ in 0..30 {
            assert_eq!(a.next_frame().unwrap(), b.next_frame().unwrap());
        }
    }

    #[test]
    fn test_violent_scenes() {
        let video = SyntheticVideo::new(20.0, 30.0);
        assert!(!video.is_violent_at(1.0));
        assert!(video.is_violent_at(5.0));
        assert!(video.is_violent_at(12.5));
        assert!(video.is_violent_at(17.5));
    }

    #[test]
    fn test_video_info_helpers() {
        let info = VideoInfo { width: 640, height: 480, fps: 30.0, frame_count: 450 };
        assert_eq!(info.duration_seconds(), 15.0);
        assert_eq!(info.resolution(), "640x480");
        let broken = VideoInfo { fps: 0.0, ..info };
        assert_eq!(broken.duration_seconds(), 0.0);
    }

    #[test]
    fn test_decode_error_injection() {
        let mut video = SyntheticVideo::new(1.0, 30.0).failing_at(3);
        assert!(video.next_frame().unwrap().is_some());
        assert!(video.next_frame().unwrap().is_some());
        assert!(matches!(video.next_frame(), Err(SourceError::Decode(_))));
    }

    #[test]
    fn test_unknown_path_is_unopenable() {
        let opener = SyntheticOpener::new().with_video("a.mp4", SyntheticVideo::new(1.0, 30.0));
        assert!(opener.open(Path::new("a.mp4")).is_ok());
        assert!(matches!(opener.open(Path::new("b.mp4")), Err(SourceError::Unopenable { .. })));
    }
}
