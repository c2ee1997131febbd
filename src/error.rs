//! Error taxonomy for start-up and per-request pipeline stages

use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors raised while building the model registry.
///
/// Any of these prevents the service from serving requests.
#[derive(Error, Debug)]
pub enum StartupError {
    #[error("failed to read artifact {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse artifact {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to load model {model}: {reason}")]
    ModelLoad { model: String, reason: String },

    #[error("model {0} exposes no probability output")]
    NotProbabilistic(String),

    #[error("start-up probe failed for {model}: {reason}")]
    Probe { model: String, reason: String },

    #[error("invalid scaler: {0}")]
    InvalidScaler(String),

    #[error("invalid feature schema: {0}")]
    InvalidSchema(String),

    #[error("no base models registered")]
    NoBaseModels,

    #[error("base model {0} registered more than once")]
    DuplicateModel(String),

    #[error("risk threshold {0} outside [0, 1]")]
    InvalidThreshold(f64),
}

/// Client-caused rejection of a patient record.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<String>),

    #[error("invalid value for {column}: {value}")]
    InvalidCategory { column: String, value: String },
}

impl ValidationError {
    /// Names of the fields this error refers to.
    pub fn fields(&self) -> Vec<&str> {
        match self {
            ValidationError::MissingFields(fields) => fields.iter().map(String::as_str).collect(),
            ValidationError::InvalidCategory { column, .. } => vec![column.as_str()],
        }
    }
}

/// Server-side failure while running the base models.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InferenceError {
    #[error("prediction failed for model {model}: {reason}")]
    ModelFailed { model: String, reason: String },

    #[error("unexpected {what} width: expected {expected}, got {actual}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
}

/// Server-side failure while running the meta-learner.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CombinerError {
    #[error("meta-learner failed: {0}")]
    Failed(String),

    #[error("meta-learner returned malformed output: {0}")]
    Malformed(String),
}

/// Any per-request failure of the pipeline.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error(transparent)]
    Combiner(#[from] CombinerError),
}

impl PipelineError {
    /// Whether the caller, rather than the service, caused the failure.
    pub fn is_client_error(&self) -> bool {
        matches!(self, PipelineError::Validation(_))
    }

    /// HTTP-style status code carried in error replies.
    pub fn status_code(&self) -> u16 {
        if self.is_client_error() {
            400
        } else {
            500
        }
    }

    /// Base model that failed, if any.
    pub fn failing_model(&self) -> Option<&str> {
        match self {
            PipelineError::Inference(InferenceError::ModelFailed { model, .. }) => Some(model),
            _ => None,
        }
    }

    /// Message safe to return to callers. Never includes internal detail.
    pub fn public_message(&self) -> String {
        match self {
            PipelineError::Validation(_) => "Invalid input data".to_string(),
            PipelineError::Inference(InferenceError::ModelFailed { model, .. }) => {
                format!("Prediction failed for model {}", model)
            }
            PipelineError::Inference(InferenceError::ShapeMismatch { .. }) => {
                "Internal server error: Invalid meta-features shape".to_string()
            }
            PipelineError::Combiner(_) => "Internal server error".to_string(),
        }
    }
}
