// THEORY:
// Classification is a capability, not a concrete model: anything that can turn
// a full `Window` into a `ClassificationResult` can drive the pipeline. Two
// variants ship with the engine and are wrapped in the `ViolenceClassifier`
// tagged enum so callers pick one explicitly:
//
// - `ModelBacked`: preprocesses the window into a tensor and asks a trained
//   model for `{NonViolence, Violence}` probabilities.
// - `Simulated`: draws from an injected roll source. It exists so the whole
//   pipeline is exercisable without a model artifact, deterministically when
//   the rolls are seeded or scripted.
//
// The decision threshold is passed in per call. The driver resolves it once
// per run from the owning user's settings, so the threshold a user configures
// is the one that gates detections.

use crate::core_modules::frame::Window;
use crate::core_modules::model::ModelBackedClassifier;
use crate::core_modules::simulated::SimulatedClassifier;
use crate::error::ClassifierError;
use crate::incident::Confidence;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_CONFIDENCE_THRESHOLD: Confidence = 0.8;

/// Output of one classified window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassificationResult {
    pub is_positive: bool,
    pub confidence: Confidence,
}

impl ClassificationResult {
    pub fn new(is_positive: bool, confidence: Confidence) -> Self {
        Self { is_positive, confidence: confidence.clamp(0.0, 1.0) }
    }

    /// The result substituted for any window the model could not score.
    pub fn negative() -> Self {
        Self { is_positive: false, confidence: 0.0 }
    }

    pub fn from_confidence(confidence: Confidence, threshold: Confidence) -> Self {
        Self::new(confidence > threshold, confidence)
    }
}

pub trait Classifier: Send {
    fn classify(&mut self, window: &Window<'_>, threshold: Confidence) -> ClassificationResult;

    fn name(&self) -> &'static str;
}

/// How the caller wants windows classified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClassifierKind {
    ModelBacked { model_path: PathBuf },
    Simulated { seed: Option<u64> },
}

pub enum ViolenceClassifier {
    ModelBacked(ModelBackedClassifier),
    Simulated(SimulatedClassifier),
}

impl Classifier for ViolenceClassifier {
    fn classify(&mut self, window: &Window<'_>, threshold: Confidence) -> ClassificationResult {
        match self {
            ViolenceClassifier::ModelBacked(classifier) => classifier.classify(window, threshold),
            ViolenceClassifier::Simulated(classifier) => classifier.classify(window, threshold),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            ViolenceClassifier::ModelBacked(classifier) => classifier.name(),
            ViolenceClassifier::Simulated(classifier) => classifier.name(),
        }
    }
}

/// Builds the classifier the caller asked for. A model that fails to load is
/// an error here; falling back to simulation is the caller's decision.
pub fn build_classifier(kind: &ClassifierKind) -> Result<ViolenceClassifier, ClassifierError> {
    match kind {
        ClassifierKind::Simulated { seed } => {
            let classifier = match seed {
                Some(seed) => SimulatedClassifier::seeded(*seed),
                None => SimulatedClassifier::from_entropy(),
            };
            Ok(ViolenceClassifier::Simulated(classifier))
        }
        ClassifierKind::ModelBacked { model_path } => load_model_backed(model_path),
    }
}

#[cfg(feature = "onnx")]
fn load_model_backed(model_path: &std::path::Path) -> Result<ViolenceClassifier, ClassifierError> {
    let model = crate::core_modules::onnx_model::OnnxViolenceModel::load(model_path)?;
    Ok(ViolenceClassifier::ModelBacked(ModelBackedClassifier::new(Box::new(model))))
}

#[cfg(not(feature = "onnx"))]
fn load_model_backed(model_path: &std::path::Path) -> Result<ViolenceClassifier, ClassifierError> {
    Err(ClassifierError::ModelLoad(format!(
        "{} requires the `onnx` feature of sentinel_vision",
        model_path.display()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_confidence_is_strictly_greater() {
        assert!(!ClassificationResult::from_confidence(0.8, 0.8).is_positive);
        assert!(ClassificationResult::from_confidence(0.81, 0.8).is_positive);
        assert!(ClassificationResult::from_confidence(0.61, 0.6).is_positive);
    }

    #[test]
    fn test_confidence_is_clamped() {
        assert_eq!(ClassificationResult::new(true, 1.4).confidence, 1.0);
        assert_eq!(ClassificationResult::new(false, -0.2).confidence, 0.0);
    }

    #[test]
    fn test_build_simulated_classifier() {
        let classifier = build_classifier(&ClassifierKind::Simulated { seed: Some(7) }).unwrap();
        assert_eq!(classifier.name(), "simulated");
    }

    #[cfg(not(feature = "onnx"))]
    #[test]
    fn test_model_backed_without_onnx_feature_fails() {
        let kind = ClassifierKind::ModelBacked { model_path: PathBuf::from("models/violence.onnx") };
        assert!(matches!(build_classifier(&kind), Err(ClassifierError::ModelLoad(_))));
    }
}
