//! Type definitions for the risk pipeline

pub mod prediction;
pub mod record;

pub use prediction::{
    ErrorResponse, ModelScore, PredictionResponse, PredictionResult, Reply, RiskClassifier,
    RiskLevel,
};
pub use record::{PatientRecord, REQUIRED_FIELDS};
