use crate::core_modules::model::{ViolenceModel, WindowTensor};
use crate::error::ClassifierError;
use ndarray::{ArrayD, IxDyn};
use ort::{inputs, session::Session, value::TensorRef};
use std::path::Path;

/// The violence sequence model exported to ONNX, run on the CPU provider.
pub struct OnnxViolenceModel {
    session: Session,
    input_name: String,
    output_name: String,
}

impl OnnxViolenceModel {
    pub fn load(path: &Path) -> Result<Self, ClassifierError> {
        let builder = Session::builder()
            .map_err(|e| ClassifierError::ModelLoad(format!("failed to create session builder: {}", e)))?;
        let session = builder
            .commit_from_file(path)
            .map_err(|e| ClassifierError::ModelLoad(format!("failed to load {}: {}", path.display(), e)))?;

        let input_name = session
            .inputs()
            .first()
            .map(|input| input.name().to_string())
            .ok_or_else(|| ClassifierError::ModelLoad("model declares no inputs".into()))?;
        let output_name = session
            .outputs()
            .first()
            .map(|output| output.name().to_string())
            .ok_or_else(|| ClassifierError::ModelLoad("model declares no outputs".into()))?;

        log::info!("Loaded violence model {} (input {}, output {})", path.display(), input_name, output_name);

        Ok(Self { session, input_name, output_name })
    }
}

impl ViolenceModel for OnnxViolenceModel {
    fn predict(&mut self, input: &WindowTensor) -> Result<Vec<f32>, ClassifierError> {
        let array = ArrayD::from_shape_vec(IxDyn(&input.shape), input.data.clone())
            .map_err(|e| ClassifierError::Preprocess(format!("tensor shape mismatch: {}", e)))?;
        let tensor_ref = TensorRef::from_array_view(array.view())
            .map_err(|e| ClassifierError::Inference(format!("failed to create tensor ref: {}", e)))?;

        let outputs = self
            .session
            .run(inputs![self.input_name.as_str() => tensor_ref])
            .map_err(|e| ClassifierError::Inference(e.to_string()))?;

        let probabilities = outputs[self.output_name.as_str()]
            .try_extract_array::<f32>()
            .map_err(|e| ClassifierError::Inference(format!("output is not f32: {}", e)))?;

        Ok(probabilities.iter().copied().collect())
    }
}
