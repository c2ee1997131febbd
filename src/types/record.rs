//! Patient record as received at the request boundary

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Fields every record must carry, in reporting order.
pub const REQUIRED_FIELDS: [&str; 10] = [
    "age",
    "gender",
    "hypertension",
    "heart_disease",
    "ever_married",
    "work_type",
    "Residence_type",
    "avg_glucose_level",
    "bmi",
    "smoking_status",
];

/// Raw patient record: field name to untyped JSON value.
///
/// Values are kept as received; coercion and validation happen in the
/// normalizer. Unknown fields are carried along and ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatientRecord(Map<String, Value>);

impl PatientRecord {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Builder-style insert, mostly for fixtures and the test requester.
    pub fn with(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.0.insert(field.to_string(), value.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.0.remove(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Required fields absent from this record, in `REQUIRED_FIELDS` order.
    pub fn missing_fields(&self) -> Vec<String> {
        REQUIRED_FIELDS
            .iter()
            .filter(|field| !self.0.contains_key(**field))
            .map(|field| field.to_string())
            .collect()
    }
}

impl From<Map<String, Value>> for PatientRecord {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl TryFrom<Value> for PatientRecord {
    type Error = Value;

    /// Accepts JSON objects only; anything else is handed back.
    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(other),
        }
    }
}
