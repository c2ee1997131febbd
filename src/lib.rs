//! Stroke Risk Pipeline Library
//!
//! Two-level stacked ensemble inference for stroke risk: five base
//! classifiers score a normalized patient record, a meta-learner combines
//! their probabilities, and the result is thresholded into a risk label.

pub mod config;
pub mod consumer;
pub mod error;
pub mod feature_normalizer;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod producer;
pub mod scaler;
pub mod schema;
pub mod types;

pub use config::AppConfig;
pub use error::{CombinerError, InferenceError, PipelineError, StartupError, ValidationError};
pub use feature_normalizer::{FeatureNormalizer, FeatureVector};
pub use models::{
    EnsemblePredictor, MetaLearner, ModelRegistry, ProbabilityClassifier, ProbabilityVector,
    StackingCombiner,
};
pub use pipeline::RiskPipeline;
pub use scaler::StandardScaler;
pub use schema::FeatureSchema;
pub use types::{PatientRecord, PredictionResult, RiskClassifier, RiskLevel};
