//! Configuration management for the stroke risk service

use crate::error::StartupError;
use crate::types::prediction::{RiskClassifier, DEFAULT_RISK_THRESHOLD};
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub nats: NatsConfig,
    pub models: ModelsConfig,
    #[serde(default)]
    pub classification: ClassificationConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// NATS connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct NatsConfig {
    /// NATS server URL
    pub url: String,
    /// Subject prediction requests arrive on
    pub request_subject: String,
    /// Where replies go when a request carries no reply inbox
    pub response_subject: String,
}

/// Artifact locations, relative to `artifacts_dir`
#[derive(Debug, Clone, Deserialize)]
pub struct ModelsConfig {
    pub artifacts_dir: String,
    #[serde(default = "default_scaler_file")]
    pub scaler_file: String,
    #[serde(default = "default_feature_columns_file")]
    pub feature_columns_file: String,
    #[serde(default = "default_meta_learner_file")]
    pub meta_learner_file: String,
    /// Base models in the order the meta-learner was trained on
    #[serde(default = "default_base_models")]
    pub base: Vec<BaseModelConfig>,
    /// Number of intra-op threads per ONNX session (default: 1)
    #[serde(default = "default_onnx_threads")]
    pub onnx_threads: usize,
}

impl ModelsConfig {
    pub fn artifacts_dir(&self) -> PathBuf {
        PathBuf::from(&self.artifacts_dir)
    }
}

/// One base model entry
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct BaseModelConfig {
    pub name: String,
    pub file: String,
}

fn default_scaler_file() -> String {
    "scaler.json".to_string()
}

fn default_feature_columns_file() -> String {
    "feature_columns.json".to_string()
}

fn default_meta_learner_file() -> String {
    "stacking_stroke_model.onnx".to_string()
}

fn default_onnx_threads() -> usize {
    1
}

fn default_base_models() -> Vec<BaseModelConfig> {
    ["RandomForest", "XGBoost", "LightGBM", "CatBoost", "MLP"]
        .iter()
        .map(|name| BaseModelConfig {
            name: name.to_string(),
            file: format!("base_model_{}.onnx", name),
        })
        .collect()
}

/// Risk labelling
#[derive(Debug, Clone, Deserialize)]
pub struct ClassificationConfig {
    /// Probabilities strictly above this are labelled High
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

fn default_threshold() -> f64 {
    DEFAULT_RISK_THRESHOLD
}

impl ClassificationConfig {
    pub fn classifier(&self) -> Result<RiskClassifier, StartupError> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(StartupError::InvalidThreshold(self.threshold));
        }
        Ok(RiskClassifier::new(self.threshold))
    }
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_RISK_THRESHOLD,
        }
    }
}

/// Request processing
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Maximum requests scored concurrently
    pub workers: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { workers: 4 }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Seconds between summary reports; 0 disables them
    pub report_interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            report_interval_secs: 30,
        }
    }
}

impl AppConfig {
    /// Load configuration from a file, with `STROKE_RISK__SECTION__KEY`
    /// environment overrides.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(Environment::with_prefix("STROKE_RISK").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            nats: NatsConfig {
                url: "nats://localhost:4222".to_string(),
                request_subject: "stroke.predict".to_string(),
                response_subject: "stroke.predictions".to_string(),
            },
            models: ModelsConfig {
                artifacts_dir: "outputs".to_string(),
                scaler_file: default_scaler_file(),
                feature_columns_file: default_feature_columns_file(),
                meta_learner_file: default_meta_learner_file(),
                base: default_base_models(),
                onnx_threads: 1,
            },
            classification: ClassificationConfig::default(),
            pipeline: PipelineConfig::default(),
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}
