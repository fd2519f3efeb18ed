// THEORY:
// This file is the main entry point for the `sentinel_vision` library crate.
// It defines the public API exposed to hosts such as `sentinel_runner`.
//
// The engine scans an uploaded video as a stream of frames. It keeps the most
// recent 16 frames in a sliding window, classifies that window at a fixed
// sampling cadence, and turns every positive window into an `Incident` with a
// timestamp, a confidence and a snapshot of the frame that closed it. When the
// stream ends, the video is finalized in the store and the owner is alerted.
//
// The high-level interface is `PipelineDriver` (one video, one run),
// `VideoAnalysisService` (upload-to-report) and `BatchAnalyzer` (many videos
// at once). Decoding, persistence, notification and progress reporting are
// capabilities the host injects, so the engine itself holds no global state.

pub mod core_modules;
pub mod error;
pub mod incident;
pub mod notify;
pub mod parallel_pipeline;
pub mod pipeline;
pub mod progress;
pub mod source;
pub mod store;

pub use core_modules::classifier::{
    ClassificationResult, Classifier, ClassifierKind, ViolenceClassifier, build_classifier,
};
pub use error::{ClassifierError, PipelineError, SourceError, StoreError};
pub use incident::{Incident, format_timestamp};
pub use parallel_pipeline::{BatchAnalyzer, Submission};
pub use pipeline::{
    AnalysisJob, CancelToken, Collaborators, PipelineConfig, PipelineDriver, PipelineState, RunReport,
    VideoAnalysisService,
};
