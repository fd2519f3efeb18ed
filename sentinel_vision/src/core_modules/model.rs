// THEORY:
// The model-backed classifier owns everything between a `Window` and a trained
// network, and nothing about the network itself:
//
// 1.  **Preprocessing**: each frame is resized on its own to 64x64 and its
//     samples are rescaled from 0..255 to 0..1. The 16 frames are stacked in
//     temporal order into one `[1, 16, 64, 64, 3]` tensor (batch, time,
//     height, width, channel), which is the layout the violence model was
//     exported with.
// 2.  **Inference**: delegated to a `ViolenceModel`, which returns the two
//     class probabilities `{NonViolence, Violence}`.
// 3.  **Degradation**: any failure in 1 or 2 is logged and replaced by a
//     negative result. One unreadable window never aborts a run.

use crate::core_modules::classifier::{ClassificationResult, Classifier};
use crate::core_modules::frame::Window;
use crate::core_modules::window_buffer::WINDOW_CAPACITY;
use crate::error::ClassifierError;
use crate::incident::Confidence;
use image::imageops::{self, FilterType};

pub const MODEL_INPUT_SIZE: u32 = 64;
pub const MODEL_CHANNELS: usize = 3;
pub const CLASS_NAMES: [&str; 2] = ["NonViolence", "Violence"];
const CLASS_VIOLENCE: usize = 1;

/// Channel order fed to the model. The shipped model was trained on frames
/// straight out of OpenCV, which are BGR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelOrder {
    Rgb,
    #[default]
    Bgr,
}

/// A dense, row-major `f32` tensor holding one preprocessed window.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowTensor {
    pub shape: [usize; 5],
    pub data: Vec<f32>,
}

impl WindowTensor {
    pub fn frames(&self) -> usize {
        self.shape[1]
    }
}

/// A trained two-class sequence model.
pub trait ViolenceModel: Send {
    /// Returns `[p(NonViolence), p(Violence)]` for one window.
    fn predict(&mut self, input: &WindowTensor) -> Result<Vec<f32>, ClassifierError>;
}

pub fn preprocess_window(window: &Window<'_>, order: ChannelOrder) -> Result<WindowTensor, ClassifierError> {
    if window.len() != WINDOW_CAPACITY {
        return Err(ClassifierError::Preprocess(format!(
            "window holds {} frames, model expects {}",
            window.len(),
            WINDOW_CAPACITY
        )));
    }

    let side = MODEL_INPUT_SIZE as usize;
    let per_frame = side * side * MODEL_CHANNELS;
    let mut data = Vec::with_capacity(WINDOW_CAPACITY * per_frame);

    for frame in window.iter() {
        if frame.width() == 0 || frame.height() == 0 {
            return Err(ClassifierError::Preprocess(format!("frame {} is empty", frame.number)));
        }
        let resized = imageops::resize(&frame.image, MODEL_INPUT_SIZE, MODEL_INPUT_SIZE, FilterType::Triangle);
        for pixel in resized.pixels() {
            let [r, g, b] = pixel.0;
            let ordered = match order {
                ChannelOrder::Rgb => [r, g, b],
                ChannelOrder::Bgr => [b, g, r],
            };
            data.extend(ordered.iter().map(|&sample| sample as f32 / 255.0));
        }
    }

    Ok(WindowTensor {
        shape: [1, WINDOW_CAPACITY, side, side, MODEL_CHANNELS],
        data,
    })
}

pub struct ModelBackedClassifier {
    model: Box<dyn ViolenceModel>,
    channel_order: ChannelOrder,
}

impl ModelBackedClassifier {
    pub fn new(model: Box<dyn ViolenceModel>) -> Self {
        Self { model, channel_order: ChannelOrder::default() }
    }

    pub fn with_channel_order(mut self, order: ChannelOrder) -> Self {
        self.channel_order = order;
        self
    }

    /// Violence probability for one window, or the reason it could not be scored.
    pub fn score(&mut self, window: &Window<'_>) -> Result<Confidence, ClassifierError> {
        let input = preprocess_window(window, self.channel_order)?;
        let probabilities = self.model.predict(&input)?;
        if probabilities.len() != CLASS_NAMES.len() {
            return Err(ClassifierError::OutputShape {
                expected: CLASS_NAMES.len(),
                actual: probabilities.len(),
            });
        }
        let confidence = probabilities[CLASS_VIOLENCE];
        if !confidence.is_finite() {
            return Err(ClassifierError::Inference(format!("non-finite violence probability {}", confidence)));
        }
        Ok(confidence)
    }
}

impl Classifier for ModelBackedClassifier {
    fn classify(&mut self, window: &Window<'_>, threshold: Confidence) -> ClassificationResult {
        match self.score(window) {
            Ok(confidence) => ClassificationResult::from_confidence(confidence, threshold),
            Err(e) => {
                let frame = window.newest().map(|f| f.number).unwrap_or_default();
                log::warn!("Detection error at frame {}: {}", frame, e);
                ClassificationResult::negative()
            }
        }
    }

    fn name(&self) -> &'static str {
        "model"
    }
}
