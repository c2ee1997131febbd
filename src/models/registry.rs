//! Process-wide model registry, built once at start-up

use crate::config::ModelsConfig;
use crate::error::StartupError;
use crate::feature_normalizer::{FeatureLayout, NUMERIC_FIELDS};
use crate::models::loader::ModelLoader;
use crate::scaler::StandardScaler;
use crate::schema::FeatureSchema;
use std::collections::HashSet;
use tracing::info;

/// A base classifier that scores one feature row.
pub trait ProbabilityClassifier: Send + Sync {
    fn name(&self) -> &str;

    /// Positive-class probability for a single row aligned to the feature schema.
    fn predict_proba(&self, features: &[f32]) -> anyhow::Result<f64>;
}

/// Level-1 model over the ordered base-model probabilities.
pub trait MetaLearner: Send + Sync {
    /// Raw output values for one row. A well-formed model returns exactly one.
    fn predict(&self, meta_features: &[f32]) -> anyhow::Result<Vec<f32>>;
}

/// Immutable collection of everything the pipeline reads.
///
/// Base model order is the order the meta-learner was trained on and is
/// never changed after construction.
pub struct ModelRegistry {
    schema: FeatureSchema,
    layout: FeatureLayout,
    scaler: StandardScaler,
    base_models: Vec<Box<dyn ProbabilityClassifier>>,
    meta_learner: Box<dyn MetaLearner>,
}

impl ModelRegistry {
    /// Assemble a registry, checking that the parts fit together.
    pub fn new(
        schema: FeatureSchema,
        scaler: StandardScaler,
        base_models: Vec<Box<dyn ProbabilityClassifier>>,
        meta_learner: Box<dyn MetaLearner>,
    ) -> Result<Self, StartupError> {
        if base_models.is_empty() {
            return Err(StartupError::NoBaseModels);
        }

        let mut seen = HashSet::new();
        for model in &base_models {
            if !seen.insert(model.name().to_string()) {
                return Err(StartupError::DuplicateModel(model.name().to_string()));
            }
        }

        scaler.check_columns(&NUMERIC_FIELDS)?;
        let layout = FeatureLayout::resolve(&schema);

        Ok(Self {
            schema,
            layout,
            scaler,
            base_models,
            meta_learner,
        })
    }

    /// Load every artifact named in the configuration, then probe the models.
    pub fn load(config: &ModelsConfig) -> Result<Self, StartupError> {
        let dir = config.artifacts_dir();
        let scaler = StandardScaler::load(dir.join(&config.scaler_file))?;
        let schema = FeatureSchema::load(dir.join(&config.feature_columns_file))?;

        let loader = ModelLoader::with_threads(config.onnx_threads)?;
        let mut base_models: Vec<Box<dyn ProbabilityClassifier>> =
            Vec::with_capacity(config.base.len());
        for entry in &config.base {
            let model = loader.load_classifier(dir.join(&entry.file), &entry.name)?;
            base_models.push(Box::new(model));
        }
        let meta_learner = loader.load_meta_learner(dir.join(&config.meta_learner_file))?;

        let registry = Self::new(schema, scaler, base_models, Box::new(meta_learner))?;
        registry.probe()?;

        info!(
            base_models = ?registry.base_model_names(),
            features = registry.schema.len(),
            "Model registry loaded"
        );
        Ok(registry)
    }

    /// Run every model once on a neutral input.
    ///
    /// Catches models whose outputs cannot be read as probabilities and a
    /// meta-learner whose input width differs from the base model count or
    /// whose output is not a single probability.
    pub fn probe(&self) -> Result<(), StartupError> {
        let row = vec![0.0_f32; self.schema.len()];
        for model in &self.base_models {
            let p = model
                .predict_proba(&row)
                .map_err(|e| StartupError::Probe {
                    model: model.name().to_string(),
                    reason: format!("{:#}", e),
                })?;
            if !(0.0..=1.0).contains(&p) {
                return Err(StartupError::Probe {
                    model: model.name().to_string(),
                    reason: format!("probability {} outside [0, 1]", p),
                });
            }
        }

        let meta_row = vec![0.5_f32; self.base_models.len()];
        let output = self
            .meta_learner
            .predict(&meta_row)
            .map_err(|e| StartupError::Probe {
                model: "meta_learner".to_string(),
                reason: format!("{:#}", e),
            })?;
        match output.as_slice() {
            [p] if (0.0..=1.0).contains(p) => Ok(()),
            [p] => Err(StartupError::Probe {
                model: "meta_learner".to_string(),
                reason: format!("probability {} outside [0, 1]", p),
            }),
            _ => Err(StartupError::Probe {
                model: "meta_learner".to_string(),
                reason: format!("expected one output value, got {}", output.len()),
            }),
        }
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn layout(&self) -> &FeatureLayout {
        &self.layout
    }

    pub fn scaler(&self) -> &StandardScaler {
        &self.scaler
    }

    /// Base models in registration order.
    pub fn base_models(&self) -> &[Box<dyn ProbabilityClassifier>] {
        &self.base_models
    }

    pub fn base_model_count(&self) -> usize {
        self.base_models.len()
    }

    pub fn base_model_names(&self) -> Vec<String> {
        self.base_models.iter().map(|m| m.name().to_string()).collect()
    }

    pub fn meta_learner(&self) -> &dyn MetaLearner {
        self.meta_learner.as_ref()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn test_registration_order_preserved() {
        let registry = identity_registry();
        assert_eq!(
            registry.base_model_names(),
            vec!["RandomForest", "XGBoost", "LightGBM", "CatBoost", "MLP"]
        );
        assert_eq!(registry.base_model_count(), 5);
    }

    #[test]
    fn test_rejects_empty_and_duplicate_models() {
        let schema = FeatureSchema::from_columns(STROKE_COLUMNS).unwrap();
        let err = ModelRegistry::new(
            schema.clone(),
            identity_scaler(),
            Vec::new(),
            Box::new(MeanMetaLearner { ordered: false }),
        )
        .err()
        .unwrap();
        assert!(matches!(err, StartupError::NoBaseModels));

        let err = ModelRegistry::new(
            schema,
            identity_scaler(),
            vec![FixedModel::boxed("MLP", 0.1), FixedModel::boxed("MLP", 0.2)],
            Box::new(MeanMetaLearner { ordered: false }),
        )
        .err()
        .unwrap();
        assert!(matches!(err, StartupError::DuplicateModel(name) if name == "MLP"));
    }

    #[test]
    fn test_rejects_scaler_of_wrong_width() {
        let err = ModelRegistry::new(
            FeatureSchema::from_columns(STROKE_COLUMNS).unwrap(),
            StandardScaler::new(vec![0.0; 2], vec![1.0; 2]).unwrap(),
            five_models(),
            Box::new(MeanMetaLearner { ordered: false }),
        )
        .err()
        .unwrap();
        assert!(matches!(err, StartupError::InvalidScaler(_)));
    }

    #[test]
    fn test_probe_rejects_failing_model() {
        let registry = ModelRegistry::new(
            FeatureSchema::from_columns(STROKE_COLUMNS).unwrap(),
            identity_scaler(),
            vec![Box::new(FixedModel {
                name: "XGBoost".to_string(),
                probability: 0.5,
                fail_above: Some(-1.0),
            })],
            Box::new(MeanMetaLearner { ordered: false }),
        )
        .unwrap();

        let err = registry.probe().unwrap_err();
        assert!(matches!(err, StartupError::Probe { model, .. } if model == "XGBoost"));
    }

    #[test]
    fn test_probe_passes_for_healthy_registry() {
        assert!(identity_registry().probe().is_ok());
    }

    /// Meta-learner that ignores its input.
    struct ConstMeta(Vec<f32>);

    impl MetaLearner for ConstMeta {
        fn predict(&self, _meta_features: &[f32]) -> anyhow::Result<Vec<f32>> {
            Ok(self.0.clone())
        }
    }

    fn registry_with_meta(output: Vec<f32>) -> ModelRegistry {
        ModelRegistry::new(
            FeatureSchema::from_columns(STROKE_COLUMNS).unwrap(),
            identity_scaler(),
            five_models(),
            Box::new(ConstMeta(output)),
        )
        .unwrap()
    }

    #[test]
    fn test_probe_rejects_meta_learner_outside_unit_range() {
        for output in [vec![f32::NAN], vec![1.5], vec![-0.1], vec![f32::INFINITY]] {
            let err = registry_with_meta(output).probe().unwrap_err();
            assert!(matches!(err, StartupError::Probe { model, .. } if model == "meta_learner"));
        }
    }

    #[test]
    fn test_probe_rejects_meta_learner_with_several_outputs() {
        let err = registry_with_meta(vec![0.3, 0.7]).probe().unwrap_err();
        assert!(matches!(err, StartupError::Probe { model, .. } if model == "meta_learner"));
        assert!(registry_with_meta(vec![1.0]).probe().is_ok());
    }

    fn write_artifact(dir: &std::path::Path, name: &str, contents: &str) {
        std::fs::write(dir.join(name), contents).unwrap();
    }

    fn models_config(dir: &std::path::Path) -> ModelsConfig {
        ModelsConfig {
            artifacts_dir: dir.to_string_lossy().into_owned(),
            ..crate::config::AppConfig::default().models
        }
    }

    #[test]
    fn test_load_fails_on_empty_artifacts_dir() {
        let dir = tempfile::tempdir().unwrap();
        let err = ModelRegistry::load(&models_config(dir.path())).err().unwrap();
        assert!(matches!(err, StartupError::Io { path, .. } if path.ends_with("scaler.json")));
    }

    #[test]
    fn test_load_fails_on_malformed_scaler() {
        let dir = tempfile::tempdir().unwrap();
        write_artifact(dir.path(), "scaler.json", "{\"mean\": [1.0, 2.0");
        let err = ModelRegistry::load(&models_config(dir.path())).err().unwrap();
        assert!(matches!(err, StartupError::Parse { path, .. } if path.ends_with("scaler.json")));
    }

    #[test]
    fn test_load_fails_on_missing_model_file() {
        let dir = tempfile::tempdir().unwrap();
        write_artifact(
            dir.path(),
            "scaler.json",
            r#"{"feature_names": ["age", "avg_glucose_level", "bmi"], "mean": [43.2, 106.1, 28.9], "scale": [22.6, 45.3, 7.7]}"#,
        );
        write_artifact(
            dir.path(),
            "feature_columns.json",
            &serde_json::to_string(&STROKE_COLUMNS).unwrap(),
        );

        let err = ModelRegistry::load(&models_config(dir.path())).err().unwrap();
        assert!(matches!(err, StartupError::ModelLoad { model, .. } if model == "RandomForest"));
    }
}
