// The building blocks of one analysis pass, leaf-first: frames and the
// sliding window they are buffered in, the sampling schedule, the classifier
// variants, and the recorder that turns a positive window into an incident.

pub mod frame;
pub mod window_buffer;
pub mod scheduler;
pub mod classifier;
pub mod model;
#[cfg(feature = "onnx")]
pub mod onnx_model;
pub mod simulated;
pub mod recorder;
