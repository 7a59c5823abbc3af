use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::{
    errors::{CtSegError, Result},
    traits::SegmentationModel,
};
use ndarray::prelude::*;
use ort::value::TensorRef;
use ort::{
    execution_providers::{CUDAExecutionProvider, TensorRTExecutionProvider},
    session::{builder::SessionBuilder, Session},
};
use parking_lot::Mutex;
use tracing::{debug, info};

/// Channel count assumed when the model declares a dynamic channel axis.
const FALLBACK_CHANNELS: usize = 3;

/// SwinUNETR exported to ONNX and executed with ONNX Runtime.
pub struct OnnxModel {
    image_size: u32,
    channels: usize,
    input_name: String,
    output_name: String,
    session: Mutex<Session>,
}

impl OnnxModel {
    /// Opens the model at `model_path` and validates it with a warm-up run.
    ///
    /// `fallback_size` is used when the model declares dynamic spatial axes.
    ///
    /// # Errors
    ///
    /// `FileAccess` when the file is missing, `ModelLoad` when ONNX Runtime
    /// rejects the artifact or the warm-up run fails.
    pub fn new(model_path: &Path, device_id: i32, fallback_size: u32) -> Result<Self> {
        if !model_path.is_file() {
            return Err(CtSegError::FileAccess {
                path: model_path.to_path_buf(),
                source: Box::new(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "model file does not exist",
                )),
            });
        }

        let started = Instant::now();
        let session = SessionBuilder::new()
            .map_err(load_error(model_path, "session builder initialization"))?
            .with_execution_providers([
                TensorRTExecutionProvider::default()
                    .with_device_id(device_id)
                    .build(),
                CUDAExecutionProvider::default()
                    .with_device_id(device_id)
                    .build(),
            ])
            .map_err(load_error(model_path, "execution provider registration"))?
            .with_memory_pattern(true)
            .map_err(load_error(model_path, "memory pattern configuration"))?
            .commit_from_file(model_path)
            .map_err(load_error(model_path, "model file deserialization"))?;

        let input = session
            .inputs
            .first()
            .ok_or_else(|| missing_io(model_path, "input"))?;
        let output = session
            .outputs
            .first()
            .ok_or_else(|| missing_io(model_path, "output"))?;

        let shape = input
            .input_type
            .tensor_shape()
            .ok_or_else(|| CtSegError::ModelLoad {
                path: model_path.to_path_buf(),
                operation: "input shape lookup".to_string(),
                source: "model input is not a tensor".into(),
            })?;
        let channels = static_dim(shape.get(1).copied()).unwrap_or(FALLBACK_CHANNELS);
        let image_size = static_dim(shape.get(2).copied()).map_or(fallback_size, |d| d as u32);
        let input_name = input.name.clone();
        let output_name = output.name.clone();

        let model = Self {
            image_size,
            channels,
            input_name,
            output_name,
            session: Mutex::new(session),
        };
        model.warm_up(model_path)?;

        info!(
            path = %model_path.display(),
            image_size,
            channels,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "model loaded"
        );
        Ok(model)
    }

    fn warm_up(&self, model_path: &Path) -> Result<()> {
        let size = self.image_size as usize;
        let data = Array4::<f32>::zeros((1, self.channels, size, size));
        self.predict(data.view()).map_err(|e| CtSegError::ModelLoad {
            path: model_path.to_path_buf(),
            operation: "warm-up inference".to_string(),
            source: Box::new(e),
        })?;
        debug!("warm-up inference succeeded");
        Ok(())
    }
}

impl SegmentationModel for OnnxModel {
    fn image_size(&self) -> u32 {
        self.image_size
    }

    fn input_channels(&self) -> usize {
        self.channels
    }

    fn predict(&self, tensor: ArrayView4<f32>) -> Result<Array4<f32>> {
        let mut binding = self.session.lock();
        let outputs = binding.run(ort::inputs![
            self.input_name.as_str() => TensorRef::from_array_view(&tensor.as_standard_layout())?
        ])?;
        Ok(outputs[self.output_name.as_str()]
            .try_extract_array::<f32>()?
            .into_dimensionality::<Ix4>()?
            .to_owned())
    }
}

fn load_error<E>(model_path: &Path, operation: &str) -> impl FnOnce(E) -> CtSegError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let path = model_path.to_path_buf();
    let operation = operation.to_string();
    move |e| CtSegError::ModelLoad {
        path,
        operation,
        source: Box::new(e),
    }
}

fn static_dim(dim: Option<i64>) -> Option<usize> {
    dim.filter(|d| *d > 0).map(|d| d as usize)
}

fn missing_io(model_path: &Path, kind: &str) -> CtSegError {
    CtSegError::ModelLoad {
        path: PathBuf::from(model_path),
        operation: format!("{kind} lookup"),
        source: format!("model declares no {kind}").into(),
    }
}
