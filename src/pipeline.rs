//! End-to-end stroke risk pipeline:
//! normalize -> base models -> meta-learner -> risk label.

use crate::error::PipelineError;
use crate::feature_normalizer::{FeatureNormalizer, FeatureVector};
use crate::models::{EnsemblePredictor, ModelRegistry, StackingCombiner};
use crate::types::prediction::{PredictionResult, RiskClassifier};
use crate::types::record::PatientRecord;
use std::sync::Arc;
use tracing::debug;

/// Stateless composition of the four stages over a shared registry.
///
/// Each call runs synchronously and fails fast; nothing is cached or retried.
#[derive(Clone)]
pub struct RiskPipeline {
    registry: Arc<ModelRegistry>,
    classifier: RiskClassifier,
}

impl RiskPipeline {
    pub fn new(registry: Arc<ModelRegistry>, classifier: RiskClassifier) -> Self {
        Self {
            registry,
            classifier,
        }
    }

    /// Score one patient record.
    pub fn predict(&self, record: &PatientRecord) -> Result<PredictionResult, PipelineError> {
        let registry = self.registry.as_ref();
        let features = FeatureNormalizer::new().normalize(record, registry)?;
        self.score(&features, registry)
    }

    /// Score a batch; numeric imputation uses batch medians. The first
    /// failure aborts the whole batch.
    pub fn predict_batch(
        &self,
        records: &[PatientRecord],
    ) -> Result<Vec<PredictionResult>, PipelineError> {
        let registry = self.registry.as_ref();
        FeatureNormalizer::new()
            .normalize_batch(records, registry)?
            .iter()
            .map(|features| self.score(features, registry))
            .collect()
    }

    fn score(
        &self,
        features: &FeatureVector,
        registry: &ModelRegistry,
    ) -> Result<PredictionResult, PipelineError> {
        let probabilities = EnsemblePredictor::new().predict(features, registry)?;
        let probability = StackingCombiner::new().combine(&probabilities, registry)?;
        let label = self.classifier.classify(probability);

        debug!(probability = probability, label = label.as_str(), "Prediction complete");

        Ok(PredictionResult {
            probability,
            label,
            model_scores: probabilities.into_scores(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use crate::models::registry::testing::identity_registry;
    use crate::types::prediction::RiskLevel;
    use serde_json::json;

    fn example_record() -> PatientRecord {
        PatientRecord::try_from(json!({
            "age": 67,
            "gender": "Male",
            "hypertension": 0,
            "heart_disease": 1,
            "ever_married": "Yes",
            "work_type": "Private",
            "Residence_type": "Urban",
            "avg_glucose_level": 228.69,
            "bmi": 36.6,
            "smoking_status": "formerly smoked"
        }))
        .unwrap()
    }

    fn pipeline() -> RiskPipeline {
        RiskPipeline::new(Arc::new(identity_registry()), RiskClassifier::default())
    }

    #[test]
    fn test_end_to_end_example() {
        let result = pipeline().predict(&example_record()).unwrap();

        // Mean of 0.9, 0.7, 0.6, 0.4, 0.2
        assert!((result.probability - 0.56).abs() < 1e-5);
        assert_eq!(result.label, RiskLevel::High);
        assert_eq!(result.model_scores.len(), 5);
    }

    #[test]
    fn test_deterministic() {
        let pipeline = pipeline();
        let first = pipeline.predict(&example_record()).unwrap();
        for _ in 0..10 {
            let again = pipeline.predict(&example_record()).unwrap();
            assert_eq!(again.probability, first.probability);
            assert_eq!(again.label, first.label);
        }
    }

    #[test]
    fn test_missing_bmi_rejected() {
        let mut record = example_record();
        record.remove("bmi");

        let err = pipeline().predict(&record).unwrap_err();
        assert_eq!(
            err,
            PipelineError::Validation(ValidationError::MissingFields(vec!["bmi".to_string()]))
        );
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_batch_fails_as_a_whole() {
        let records = vec![example_record(), example_record().with("smoking_status", "vapes")];
        assert!(pipeline().predict_batch(&records).is_err());

        let ok = pipeline()
            .predict_batch(&[example_record(), example_record()])
            .unwrap();
        assert_eq!(ok.len(), 2);
    }
}
