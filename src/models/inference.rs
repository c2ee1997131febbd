//! Level-0 ensemble inference

use crate::error::InferenceError;
use crate::feature_normalizer::FeatureVector;
use crate::models::registry::ModelRegistry;
use crate::types::prediction::ModelScore;
use std::time::Instant;
use tracing::{debug, error};

/// Base model probabilities in registration order.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbabilityVector {
    scores: Vec<ModelScore>,
}

impl ProbabilityVector {
    pub fn new(scores: Vec<ModelScore>) -> Self {
        Self { scores }
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn scores(&self) -> &[ModelScore] {
        &self.scores
    }

    pub fn into_scores(self) -> Vec<ModelScore> {
        self.scores
    }

    /// Meta-learner input row: one probability per model, same order.
    pub fn meta_features(&self) -> Vec<f32> {
        self.scores.iter().map(|s| s.probability as f32).collect()
    }
}

/// Runs every registered base model on a feature vector.
pub struct EnsemblePredictor;

impl EnsemblePredictor {
    pub fn new() -> Self {
        Self
    }

    /// Score the vector with each base model, in registration order.
    ///
    /// The first failing model aborts the whole run; nothing partial is returned.
    pub fn predict(
        &self,
        features: &FeatureVector,
        registry: &ModelRegistry,
    ) -> Result<ProbabilityVector, InferenceError> {
        let width = registry.schema().len();
        if features.len() != width {
            return Err(InferenceError::ShapeMismatch {
                what: "feature vector",
                expected: width,
                actual: features.len(),
            });
        }

        let mut scores = Vec::with_capacity(registry.base_model_count());
        for model in registry.base_models() {
            let started = Instant::now();
            let probability = model
                .predict_proba(features.as_slice())
                .map_err(|e| {
                    error!(model = %model.name(), error = %format!("{:#}", e), "Model inference failed");
                    InferenceError::ModelFailed {
                        model: model.name().to_string(),
                        reason: format!("{:#}", e),
                    }
                })?;

            if !probability.is_finite() || !(0.0..=1.0).contains(&probability) {
                error!(model = %model.name(), probability = probability, "Probability out of range");
                return Err(InferenceError::ModelFailed {
                    model: model.name().to_string(),
                    reason: format!("probability {} outside [0, 1]", probability),
                });
            }

            scores.push(ModelScore {
                model: model.name().to_string(),
                probability,
                elapsed: started.elapsed(),
            });
        }

        if scores.len() != registry.base_model_count() {
            error!(
                expected = registry.base_model_count(),
                actual = scores.len(),
                "Unexpected meta-features shape"
            );
            return Err(InferenceError::ShapeMismatch {
                what: "meta-feature",
                expected: registry.base_model_count(),
                actual: scores.len(),
            });
        }

        debug!(
            scores = ?scores.iter().map(|s| (s.model.as_str(), s.probability)).collect::<Vec<_>>(),
            "Ensemble inference complete"
        );

        Ok(ProbabilityVector::new(scores))
    }
}

impl Default for EnsemblePredictor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::registry::testing::*;
    use crate::models::registry::ProbabilityClassifier;
    use crate::scaler::StandardScaler;
    use crate::schema::FeatureSchema;

    fn registry_with(models: Vec<Box<dyn ProbabilityClassifier>>) -> ModelRegistry {
        ModelRegistry::new(
            FeatureSchema::from_columns(STROKE_COLUMNS).unwrap(),
            StandardScaler::new(vec![0.0; 3], vec![1.0; 3]).unwrap(),
            models,
            Box::new(MeanMetaLearner { ordered: false }),
        )
        .unwrap()
    }

    #[test]
    fn test_scores_in_registration_order() {
        let registry = identity_registry();
        let features = FeatureVector::zeros(registry.schema().len());

        let probs = EnsemblePredictor::new().predict(&features, &registry).unwrap();
        let names: Vec<&str> = probs.scores().iter().map(|s| s.model.as_str()).collect();

        assert_eq!(names, vec!["RandomForest", "XGBoost", "LightGBM", "CatBoost", "MLP"]);
        assert_eq!(probs.meta_features(), vec![0.9, 0.7, 0.6, 0.4, 0.2]);
    }

    #[test]
    fn test_model_failure_aborts_request() {
        let registry = registry_with(vec![
            FixedModel::boxed("RandomForest", 0.9),
            Box::new(FixedModel {
                name: "XGBoost".to_string(),
                probability: 0.7,
                fail_above: Some(100.0),
            }),
            FixedModel::boxed("MLP", 0.2),
        ]);
        let mut row = vec![0.0; registry.schema().len()];
        row[0] = 150.0;

        let err = EnsemblePredictor::new()
            .predict(&FeatureVector::from(row), &registry)
            .unwrap_err();
        assert!(matches!(err, InferenceError::ModelFailed { ref model, .. } if model == "XGBoost"));
    }

    #[test]
    fn test_out_of_range_probability_rejected() {
        let registry = registry_with(vec![FixedModel::boxed("CatBoost", 1.2)]);
        let features = FeatureVector::zeros(registry.schema().len());

        let err = EnsemblePredictor::new().predict(&features, &registry).unwrap_err();
        assert!(matches!(err, InferenceError::ModelFailed { ref model, .. } if model == "CatBoost"));
    }

    #[test]
    fn test_feature_width_checked() {
        let registry = identity_registry();
        let err = EnsemblePredictor::new()
            .predict(&FeatureVector::zeros(3), &registry)
            .unwrap_err();

        assert_eq!(
            err,
            InferenceError::ShapeMismatch {
                what: "feature vector",
                expected: 17,
                actual: 3,
            }
        );
    }
}
