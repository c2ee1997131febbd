//! Level-1 stacking over the base model probabilities

use crate::error::CombinerError;
use crate::models::inference::ProbabilityVector;
use crate::models::registry::ModelRegistry;
use tracing::{debug, error};

/// Feeds ordered base model probabilities into the meta-learner.
pub struct StackingCombiner;

impl StackingCombiner {
    pub fn new() -> Self {
        Self
    }

    /// Combined probability in [0, 1].
    ///
    /// Width was already checked by the ensemble predictor; only the
    /// meta-learner output is validated here.
    pub fn combine(
        &self,
        probabilities: &ProbabilityVector,
        registry: &ModelRegistry,
    ) -> Result<f64, CombinerError> {
        let meta_features = probabilities.meta_features();

        let output = registry
            .meta_learner()
            .predict(&meta_features)
            .map_err(|e| {
                error!(error = %format!("{:#}", e), "Meta-learner inference failed");
                CombinerError::Failed(format!("{:#}", e))
            })?;

        let probability = match output.as_slice() {
            [p] if p.is_finite() && (0.0..=1.0).contains(p) => *p as f64,
            [p] => {
                return Err(CombinerError::Malformed(format!(
                    "probability {} outside [0, 1]",
                    p
                )))
            }
            values => {
                return Err(CombinerError::Malformed(format!(
                    "expected one value, got {}",
                    values.len()
                )))
            }
        };

        debug!(meta_features = ?meta_features, probability = probability, "Stacking complete");
        Ok(probability)
    }
}

impl Default for StackingCombiner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::registry::testing::*;
    use crate::models::registry::MetaLearner;
    use crate::scaler::StandardScaler;
    use crate::schema::FeatureSchema;
    use crate::types::prediction::ModelScore;
    use std::time::Duration;

    struct RawOutput(Vec<f32>);

    impl MetaLearner for RawOutput {
        fn predict(&self, _meta_features: &[f32]) -> anyhow::Result<Vec<f32>> {
            Ok(self.0.clone())
        }
    }

    struct Broken;

    impl MetaLearner for Broken {
        fn predict(&self, _meta_features: &[f32]) -> anyhow::Result<Vec<f32>> {
            anyhow::bail!("tensor shape mismatch")
        }
    }

    fn registry_with(meta: Box<dyn MetaLearner>) -> ModelRegistry {
        ModelRegistry::new(
            FeatureSchema::from_columns(STROKE_COLUMNS).unwrap(),
            StandardScaler::new(vec![0.0; 3], vec![1.0; 3]).unwrap(),
            five_models(),
            meta,
        )
        .unwrap()
    }

    fn probs(values: &[f64]) -> ProbabilityVector {
        ProbabilityVector::new(
            values
                .iter()
                .enumerate()
                .map(|(i, p)| ModelScore {
                    model: format!("model{}", i),
                    probability: *p,
                    elapsed: Duration::ZERO,
                })
                .collect(),
        )
    }

    #[test]
    fn test_combine_is_order_sensitive() {
        let registry = registry_with(Box::new(MeanMetaLearner { ordered: true }));
        let combiner = StackingCombiner::new();

        let forward = combiner.combine(&probs(&[0.9, 0.1]), &registry).unwrap();
        let reversed = combiner.combine(&probs(&[0.1, 0.9]), &registry).unwrap();
        assert!(forward > reversed);
    }

    #[test]
    fn test_single_scalar_returned() {
        let registry = registry_with(Box::new(RawOutput(vec![0.25])));
        let p = StackingCombiner::new()
            .combine(&probs(&[0.1, 0.2, 0.3, 0.4, 0.5]), &registry)
            .unwrap();
        assert_eq!(p, 0.25);
    }

    #[test]
    fn test_malformed_outputs_rejected() {
        let combiner = StackingCombiner::new();
        let input = probs(&[0.1, 0.2, 0.3, 0.4, 0.5]);

        for output in [vec![], vec![0.2, 0.8], vec![f32::NAN], vec![1.5]] {
            let registry = registry_with(Box::new(RawOutput(output)));
            assert!(matches!(
                combiner.combine(&input, &registry),
                Err(CombinerError::Malformed(_))
            ));
        }
    }

    #[test]
    fn test_meta_learner_failure() {
        let registry = registry_with(Box::new(Broken));
        let err = StackingCombiner::new()
            .combine(&probs(&[0.5; 5]), &registry)
            .unwrap_err();
        assert!(matches!(err, CombinerError::Failed(msg) if msg.contains("shape mismatch")));
    }
}
