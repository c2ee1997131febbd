//! Canonical feature schema the trained models expect

use crate::error::StartupError;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::info;

/// Ordered, immutable list of feature column names.
#[derive(Debug, Clone)]
pub struct FeatureSchema {
    columns: Vec<String>,
    positions: HashMap<String, usize>,
}

impl FeatureSchema {
    /// Build a schema from column names, rejecting empty or duplicated lists.
    pub fn from_columns<I, S>(columns: I) -> Result<Self, StartupError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        if columns.is_empty() {
            return Err(StartupError::InvalidSchema("no feature columns".to_string()));
        }

        let mut positions = HashMap::with_capacity(columns.len());
        for (i, name) in columns.iter().enumerate() {
            if positions.insert(name.clone(), i).is_some() {
                return Err(StartupError::InvalidSchema(format!(
                    "duplicate column {}",
                    name
                )));
            }
        }

        Ok(Self { columns, positions })
    }

    /// Load the column list from a JSON array of strings.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, StartupError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| StartupError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let columns: Vec<String> =
            serde_json::from_str(&raw).map_err(|source| StartupError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        let schema = Self::from_columns(columns)?;
        info!(path = %path.display(), columns = schema.len(), "Feature schema loaded");
        Ok(schema)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Position of a column, if the schema carries it.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }
}
