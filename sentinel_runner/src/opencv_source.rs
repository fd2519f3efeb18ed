use image::RgbImage;
use opencv::{
    core::Mat,
    imgproc,
    prelude::*,
    videoio::{self, VideoCapture},
};
use sentinel_vision::error::SourceError;
use sentinel_vision::source::{FrameSource, VideoInfo, VideoOpener};
use std::path::Path;

/// Opens video containers through OpenCV's `videoio`.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenCvOpener;

impl VideoOpener for OpenCvOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn FrameSource>, SourceError> {
        let unopenable = |reason: String| SourceError::Unopenable { path: path.to_path_buf(), reason };

        let path_str = path.to_str().ok_or_else(|| unopenable("path is not valid UTF-8".into()))?;
        let cap = VideoCapture::from_file(path_str, videoio::CAP_ANY).map_err(|e| unopenable(e.to_string()))?;
        if !cap.is_opened().map_err(|e| unopenable(e.to_string()))? {
            return Err(unopenable("no decoder accepted the container".into()));
        }

        let prop = |id: i32| cap.get(id).map_err(|e| unopenable(e.to_string()));
        let info = VideoInfo {
            width: prop(videoio::CAP_PROP_FRAME_WIDTH)? as u32,
            height: prop(videoio::CAP_PROP_FRAME_HEIGHT)? as u32,
            fps: prop(videoio::CAP_PROP_FPS)?,
            // Containers without an index report -1 or 0.
            frame_count: prop(videoio::CAP_PROP_FRAME_COUNT)?.max(0.0) as u64,
        };
        log::info!("Opened {} ({}, {:.2} fps, {} frames)", path.display(), info.resolution(), info.fps, info.frame_count);

        Ok(Box::new(OpenCvSource { cap, info, bgr: Mat::default(), rgb: Mat::default() }))
    }
}

pub struct OpenCvSource {
    cap: VideoCapture,
    info: VideoInfo,
    bgr: Mat,
    rgb: Mat,
}

impl FrameSource for OpenCvSource {
    fn info(&self) -> VideoInfo {
        self.info
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>, SourceError> {
        let decode = |e: opencv::Error| SourceError::Decode(e.to_string());

        if !self.cap.read(&mut self.bgr).map_err(decode)? || self.bgr.empty() {
            return Ok(None);
        }

        // OpenCV decodes to BGR; the engine works in RGB.
        imgproc::cvt_color(&self.bgr, &mut self.rgb, imgproc::COLOR_BGR2RGB, 0).map_err(decode)?;
        let width = self.rgb.cols() as u32;
        let height = self.rgb.rows() as u32;
        let samples = self.rgb.data_bytes().map_err(decode)?.to_vec();

        RgbImage::from_raw(width, height, samples)
            .map(Some)
            .ok_or_else(|| SourceError::Decode(format!("frame buffer does not match {}x{}", width, height)))
    }
}
