//! Feature normalization for the stacked stroke-risk models.
//!
//! Turns raw patient records into feature vectors that match the
//! preprocessing done when the scaler and models were trained:
//! numeric imputation and scaling, binary and one-hot categorical
//! encoding, then alignment to the canonical feature schema.

use crate::error::ValidationError;
use crate::models::registry::ModelRegistry;
use crate::schema::FeatureSchema;
use crate::types::record::PatientRecord;
use serde_json::Value;
use tracing::{debug, warn};

/// Numeric columns, in the order the scaler was fit on.
pub const NUMERIC_FIELDS: [&str; 3] = ["age", "avg_glucose_level", "bmi"];

/// Imputation defaults used when a whole batch lacks a numeric value.
pub const NUMERIC_DEFAULTS: [f64; 3] = [40.0, 100.0, 25.0];

/// 0/1 flag columns. Unparseable values count as 0.
pub const FLAG_FIELDS: [&str; 2] = ["hypertension", "heart_disease"];

const GENDER_MAP: [(&str, f32); 4] = [("male", 0.0), ("female", 1.0), ("Male", 0.0), ("Female", 1.0)];
const EVER_MARRIED_MAP: [(&str, f32); 4] = [("no", 0.0), ("yes", 1.0), ("No", 0.0), ("Yes", 1.0)];
const RESIDENCE_TYPE_MAP: [(&str, f32); 4] =
    [("rural", 0.0), ("urban", 1.0), ("Rural", 0.0), ("Urban", 1.0)];

/// Two-valued categorical columns and their lookup tables.
pub const BINARY_FIELDS: [(&str, &[(&str, f32)]); 3] = [
    ("gender", &GENDER_MAP),
    ("ever_married", &EVER_MARRIED_MAP),
    ("Residence_type", &RESIDENCE_TYPE_MAP),
];

pub const WORK_TYPE_OPTIONS: [&str; 5] =
    ["Govt_job", "Never_worked", "Private", "Self-employed", "children"];

pub const SMOKING_STATUS_OPTIONS: [&str; 4] = ["formerly smoked", "never smoked", "smokes", "Unknown"];

/// Fixed-width model input aligned to the feature schema.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector(Vec<f32>);

impl FeatureVector {
    pub fn zeros(len: usize) -> Self {
        Self(vec![0.0; len])
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<f32> {
        self.0.get(index).copied()
    }

    fn set(&mut self, slot: Option<usize>, value: f32) {
        if let Some(i) = slot {
            self.0[i] = value;
        }
    }
}

impl From<Vec<f32>> for FeatureVector {
    fn from(values: Vec<f32>) -> Self {
        Self(values)
    }
}

/// Schema position of every column the normalizer produces.
///
/// `None` means the schema does not carry the column and its value is dropped.
#[derive(Debug, Clone)]
pub struct FeatureLayout {
    width: usize,
    numeric: [Option<usize>; 3],
    binary: [Option<usize>; 3],
    flags: [Option<usize>; 2],
    work_type: [Option<usize>; 5],
    smoking_status: [Option<usize>; 4],
    produced: Vec<String>,
}

impl FeatureLayout {
    /// Resolve produced columns against the schema once, at registry build time.
    pub fn resolve(schema: &FeatureSchema) -> Self {
        let work_type_columns = WORK_TYPE_OPTIONS.map(|opt| indicator_column("work_type", opt));
        let smoking_columns =
            SMOKING_STATUS_OPTIONS.map(|opt| indicator_column("smoking_status", opt));

        let layout = Self {
            width: schema.len(),
            numeric: NUMERIC_FIELDS.map(|name| schema.position(name)),
            binary: BINARY_FIELDS.map(|(name, _)| schema.position(name)),
            flags: FLAG_FIELDS.map(|name| schema.position(name)),
            work_type: work_type_columns.each_ref().map(|name| schema.position(name)),
            smoking_status: smoking_columns.each_ref().map(|name| schema.position(name)),
            produced: NUMERIC_FIELDS
                .iter()
                .chain(BINARY_FIELDS.iter().map(|(name, _)| name))
                .chain(FLAG_FIELDS.iter())
                .map(|name| name.to_string())
                .chain(work_type_columns)
                .chain(smoking_columns)
                .collect(),
        };

        let dropped: Vec<&str> = layout
            .produced
            .iter()
            .filter(|name| schema.position(name).is_none())
            .map(String::as_str)
            .collect();
        if !dropped.is_empty() {
            warn!(columns = ?dropped, "Produced columns absent from feature schema will be dropped");
        }
        let zero_filled = schema.len() - (layout.produced.len() - dropped.len());
        if zero_filled > 0 {
            warn!(count = zero_filled, "Schema columns never produced will be zero-filled");
        }

        layout
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Every column the normalizer produces, before schema alignment.
    pub fn produced_columns(&self) -> &[String] {
        &self.produced
    }
}

fn indicator_column(field: &str, option: &str) -> String {
    format!("{}_{}", field, option)
}

/// Validates, imputes, scales and encodes patient records.
pub struct FeatureNormalizer;

impl FeatureNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Normalize a single record (a batch of one).
    pub fn normalize(
        &self,
        record: &PatientRecord,
        registry: &ModelRegistry,
    ) -> Result<FeatureVector, ValidationError> {
        check_presence(record)?;
        let parsed = parse_numeric_fields(record);
        let numeric: [f64; 3] =
            std::array::from_fn(|i| parsed[i].unwrap_or(NUMERIC_DEFAULTS[i]));

        self.encode(record, numeric, registry)
    }

    /// Normalize a batch. Missing numeric values are imputed with the
    /// batch median of that column, or its default when the whole batch
    /// lacks it.
    pub fn normalize_batch(
        &self,
        records: &[PatientRecord],
        registry: &ModelRegistry,
    ) -> Result<Vec<FeatureVector>, ValidationError> {
        for record in records {
            check_presence(record)?;
        }

        let parsed: Vec<[Option<f64>; 3]> = records.iter().map(parse_numeric_fields).collect();
        let fill: [f64; 3] = std::array::from_fn(|col| {
            let present: Vec<f64> = parsed.iter().filter_map(|row| row[col]).collect();
            median(present).unwrap_or(NUMERIC_DEFAULTS[col])
        });

        records
            .iter()
            .zip(&parsed)
            .map(|(record, row)| {
                let numeric: [f64; 3] = std::array::from_fn(|i| row[i].unwrap_or(fill[i]));
                self.encode(record, numeric, registry)
            })
            .collect()
    }

    /// Encode one record whose numeric values are already imputed.
    fn encode(
        &self,
        record: &PatientRecord,
        mut numeric: [f64; 3],
        registry: &ModelRegistry,
    ) -> Result<FeatureVector, ValidationError> {
        let layout = registry.layout();
        let mut features = FeatureVector::zeros(layout.width());

        registry.scaler().transform(&mut numeric);
        for (slot, value) in layout.numeric.iter().zip(numeric) {
            features.set(*slot, value as f32);
        }

        for (slot, (field, table)) in layout.binary.iter().zip(BINARY_FIELDS) {
            features.set(*slot, lookup_binary(record, field, table)?);
        }

        for (slot, field) in layout.flags.iter().zip(FLAG_FIELDS) {
            let flag = field_value(record, field)
                .and_then(parse_numeric)
                .unwrap_or(0.0)
                .trunc() as i64;
            features.set(*slot, flag as f32);
        }

        let work = option_index(record, "work_type", &WORK_TYPE_OPTIONS)?;
        features.set(layout.work_type[work], 1.0);

        let smoking = option_index(record, "smoking_status", &SMOKING_STATUS_OPTIONS)?;
        features.set(layout.smoking_status[smoking], 1.0);

        debug!(
            columns = ?layout.produced_columns(),
            width = features.len(),
            "Processed input columns"
        );

        Ok(features)
    }
}

impl Default for FeatureNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

fn check_presence(record: &PatientRecord) -> Result<(), ValidationError> {
    let missing = record.missing_fields();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::MissingFields(missing))
    }
}

fn field_value<'a>(record: &'a PatientRecord, field: &str) -> Option<&'a Value> {
    record.get(field)
}

fn parse_numeric_fields(record: &PatientRecord) -> [Option<f64>; 3] {
    NUMERIC_FIELDS.map(|field| field_value(record, field).and_then(parse_numeric))
}

/// Lenient numeric coercion: numbers, numeric strings and booleans.
/// Null, garbage and non-finite values are treated as missing.
fn parse_numeric(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

fn median(mut values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));

    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

fn invalid(field: &str, value: Option<&Value>) -> ValidationError {
    let value = match value {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => "null".to_string(),
    };
    ValidationError::InvalidCategory {
        column: field.to_string(),
        value,
    }
}

fn lookup_binary(
    record: &PatientRecord,
    field: &str,
    table: &[(&str, f32)],
) -> Result<f32, ValidationError> {
    let value = field_value(record, field);
    value
        .and_then(Value::as_str)
        .and_then(|s| table.iter().find(|(key, _)| *key == s))
        .map(|(_, code)| *code)
        .ok_or_else(|| invalid(field, value))
}

fn option_index(
    record: &PatientRecord,
    field: &str,
    options: &[&str],
) -> Result<usize, ValidationError> {
    let value = field_value(record, field);
    value
        .and_then(Value::as_str)
        .and_then(|s| options.iter().position(|opt| *opt == s))
        .ok_or_else(|| invalid(field, value))
}
