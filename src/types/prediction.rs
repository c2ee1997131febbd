//! Prediction results and reply payloads

use crate::error::PipelineError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Default decision threshold on the combined probability.
pub const DEFAULT_RISK_THRESHOLD: f64 = 0.5;

/// Risk label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "Low",
            RiskLevel::High => "High",
        }
    }
}

/// Thresholds the combined probability into a risk label.
#[derive(Debug, Clone, Copy)]
pub struct RiskClassifier {
    threshold: f64,
}

impl RiskClassifier {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// `High` iff the probability is strictly above the threshold.
    pub fn classify(&self, probability: f64) -> RiskLevel {
        if probability > self.threshold {
            RiskLevel::High
        } else {
            RiskLevel::Low
        }
    }
}

impl Default for RiskClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_RISK_THRESHOLD)
    }
}

/// Positive-class probability produced by one base model.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelScore {
    pub model: String,
    pub probability: f64,
    pub elapsed: Duration,
}

/// Output of one pipeline run
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionResult {
    /// Meta-learner probability (0.0 - 1.0)
    pub probability: f64,
    pub label: RiskLevel,
    /// Base model scores in registration order
    pub model_scores: Vec<ModelScore>,
}

/// Successful reply sent back to the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub request_id: Uuid,
    pub risk_probability: f64,
    pub risk_level: RiskLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl PredictionResponse {
    pub fn new(request_id: Uuid, result: &PredictionResult) -> Self {
        Self {
            request_id,
            risk_probability: result.probability,
            risk_level: result.label,
            message: "Prediction successful".to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// Error reply. `status` follows HTTP semantics: 4xx client, 5xx server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub request_id: Uuid,
    pub error: String,
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl ErrorResponse {
    pub fn from_pipeline_error(request_id: Uuid, err: &PipelineError) -> Self {
        Self {
            request_id,
            error: err.public_message(),
            status: err.status_code(),
            model: err.failing_model().map(str::to_string),
        }
    }

    /// Rejection of a payload that never reached the pipeline.
    pub fn bad_request(request_id: Uuid, error: &str) -> Self {
        Self {
            request_id,
            error: error.to_string(),
            status: 400,
            model: None,
        }
    }

    pub fn internal(request_id: Uuid) -> Self {
        Self {
            request_id,
            error: "Internal server error".to_string(),
            status: 500,
            model: None,
        }
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }
}

/// Any reply published for a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reply {
    Prediction(PredictionResponse),
    Error(ErrorResponse),
}

impl Reply {
    pub fn request_id(&self) -> Uuid {
        match self {
            Reply::Prediction(p) => p.request_id,
            Reply::Error(e) => e.request_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{InferenceError, ValidationError};

    #[test]
    fn test_threshold_boundary() {
        let classifier = RiskClassifier::default();

        assert_eq!(classifier.classify(0.5), RiskLevel::Low);
        assert_eq!(classifier.classify(0.50001), RiskLevel::High);
        assert_eq!(classifier.classify(0.0), RiskLevel::Low);
        assert_eq!(classifier.classify(1.0), RiskLevel::High);
    }

    #[test]
    fn test_prediction_response_serialization() {
        let result = PredictionResult {
            probability: 0.73,
            label: RiskLevel::High,
            model_scores: Vec::new(),
        };
        let response = PredictionResponse::new(Uuid::new_v4(), &result);

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["risk_level"], "High");
        assert_eq!(json["risk_probability"], 0.73);
        assert_eq!(json["message"], "Prediction successful");
    }

    #[test]
    fn test_error_response_hides_internal_detail() {
        let err: PipelineError = ValidationError::InvalidCategory {
            column: "work_type".to_string(),
            value: "Invalid".to_string(),
        }
        .into();
        let response = ErrorResponse::from_pipeline_error(Uuid::new_v4(), &err);

        assert_eq!(response.status, 400);
        assert_eq!(response.error, "Invalid input data");
        assert!(response.model.is_none());
        assert!(response.is_client_error());

        let err: PipelineError = InferenceError::ModelFailed {
            model: "LightGBM".to_string(),
            reason: "session poisoned".to_string(),
        }
        .into();
        let json = serde_json::to_string(&ErrorResponse::from_pipeline_error(Uuid::new_v4(), &err))
            .unwrap();
        assert!(json.contains("LightGBM"));
        assert!(!json.contains("poisoned"));
    }

    #[test]
    fn test_reply_untagged_round_trip() {
        let reply = Reply::Error(ErrorResponse::bad_request(
            Uuid::new_v4(),
            "No input data provided",
        ));
        let json = serde_json::to_string(&reply).unwrap();
        let parsed: Reply = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.request_id(), reply.request_id());
        assert!(matches!(parsed, Reply::Error(e) if e.status == 400));
    }
}
