//! Pre-fit standard scaler for the numeric features

use crate::error::StartupError;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::info;

/// Affine per-column transform `(x - mean) / scale`, exported from training.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StandardScaler {
    /// Column names the scaler was fit on, when exported.
    #[serde(default)]
    pub feature_names: Vec<String>,
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    pub fn new(mean: Vec<f64>, scale: Vec<f64>) -> Result<Self, StartupError> {
        let scaler = Self {
            feature_names: Vec::new(),
            mean,
            scale,
        };
        scaler.validate()?;
        Ok(scaler)
    }

    /// Load a scaler exported as `{"feature_names": [...], "mean": [...], "scale": [...]}`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, StartupError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| StartupError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let scaler: Self = serde_json::from_str(&raw).map_err(|source| StartupError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        scaler.validate()?;

        info!(path = %path.display(), columns = scaler.width(), "Scaler loaded");
        Ok(scaler)
    }

    fn validate(&self) -> Result<(), StartupError> {
        if self.mean.is_empty() || self.mean.len() != self.scale.len() {
            return Err(StartupError::InvalidScaler(format!(
                "mean has {} values, scale has {}",
                self.mean.len(),
                self.scale.len()
            )));
        }
        if !self.feature_names.is_empty() && self.feature_names.len() != self.mean.len() {
            return Err(StartupError::InvalidScaler(format!(
                "{} feature names for {} columns",
                self.feature_names.len(),
                self.mean.len()
            )));
        }
        if self
            .mean
            .iter()
            .chain(self.scale.iter())
            .any(|v| !v.is_finite())
        {
            return Err(StartupError::InvalidScaler("non-finite parameter".to_string()));
        }
        Ok(())
    }

    /// Ensure the scaler was fit on exactly these columns, in this order.
    pub fn check_columns(&self, expected: &[&str]) -> Result<(), StartupError> {
        if self.width() != expected.len() {
            return Err(StartupError::InvalidScaler(format!(
                "expected {} columns, scaler has {}",
                expected.len(),
                self.width()
            )));
        }
        if !self.feature_names.is_empty() && self.feature_names.iter().ne(expected.iter()) {
            return Err(StartupError::InvalidScaler(format!(
                "column order {:?} does not match {:?}",
                self.feature_names, expected
            )));
        }
        Ok(())
    }

    pub fn width(&self) -> usize {
        self.mean.len()
    }

    /// Scale values in place. Zero scale is treated as 1, as at fit time.
    pub fn transform(&self, values: &mut [f64]) {
        for ((v, mean), scale) in values.iter_mut().zip(&self.mean).zip(&self.scale) {
            let scale = if *scale == 0.0 { 1.0 } else { *scale };
            *v = (*v - mean) / scale;
        }
    }
}
