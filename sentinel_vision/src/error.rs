// THEORY:
// Every failure the engine can meet falls into one of four families, and each
// family has exactly one place where it is either recovered or surfaced:
//
// - `SourceError` belongs to the frame source. Only a source that cannot be
//   opened is fatal; a decode error mid-stream ends the stream like EOF does.
// - `ClassifierError` never leaves the classifier. The model-backed variant
//   degrades it to a negative result so a single bad window cannot stop a run.
// - `StoreError` comes back from the persistence collaborator. Per-incident
//   write failures are counted and logged; the run keeps going.
// - `PipelineError` is what the driver hands to its caller.

use crate::incident::VideoId;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("cannot open video source {path}: {reason}")]
    Unopenable { path: PathBuf, reason: String },
    #[error("frame decode failed: {0}")]
    Decode(String),
}

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("preprocessing failed: {0}")]
    Preprocess(String),
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("model produced {actual} outputs, expected {expected}")]
    OutputShape { expected: usize, actual: usize },
    #[error("failed to load model: {0}")]
    ModelLoad(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),
    #[error("unknown video id {0}")]
    UnknownVideo(VideoId),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("video source {path} could not be opened")]
    SourceUnopenable {
        path: PathBuf,
        #[source]
        source: SourceError,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("pipeline worker failed: {0}")]
    Worker(String),
    #[error("a pipeline driver runs exactly one analysis")]
    AlreadyRan,
}
