use std::path::PathBuf;
use thiserror::Error;

/// Boxed source error carried by the pipeline variants.
///
/// `Send + Sync` is required because pipeline runs happen on a worker thread
/// and their results travel back to the window over a channel.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Structured error types for the segmentation pipeline and its front ends.
///
/// Every variant names what failed (a path, an operation or a field) so the
/// window can show a useful dialog without parsing strings.
#[derive(Error, Debug)]
pub enum CtSegError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("File access error: cannot read {path:?}")]
    FileAccess {
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    #[error("Model load error: {operation} failed for {path:?}")]
    ModelLoad {
        path: PathBuf,
        operation: String,
        #[source]
        source: BoxError,
    },

    #[error("Inference error: {operation} failed")]
    Inference {
        operation: String,
        #[source]
        source: BoxError,
    },

    #[error("Validation error: {field} {reason}")]
    Validation { field: String, reason: String },
}

pub type Result<T> = std::result::Result<T, CtSegError>;

impl CtSegError {
    pub(crate) fn inference(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        let reason: String = reason.into();
        Self::Inference {
            operation: operation.into(),
            source: reason.into(),
        }
    }

    /// Renders the error with its whole `source` chain, one cause per line.
    pub fn report(&self) -> String {
        let mut report = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            report.push_str("\n  caused by: ");
            report.push_str(&cause.to_string());
            source = cause.source();
        }
        report
    }
}

/// Convert ONNX Runtime errors raised while running a session.
///
/// Session construction maps its errors to `ModelLoad` explicitly, so anything
/// reaching this conversion happened during the forward pass.
impl From<ort::Error> for CtSegError {
    fn from(err: ort::Error) -> Self {
        Self::Inference {
            operation: "ort session run".to_string(),
            source: Box::new(err),
        }
    }
}

/// Convert ndarray shape errors to inference errors.
impl From<ndarray::ShapeError> for CtSegError {
    fn from(err: ndarray::ShapeError) -> Self {
        Self::Inference {
            operation: "tensor shape conversion".to_string(),
            source: Box::new(err),
        }
    }
}
