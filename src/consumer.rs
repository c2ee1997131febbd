//! NATS subscriber for incoming prediction requests

use crate::types::record::PatientRecord;
use anyhow::Result;
use async_nats::{Client, Subscriber};
use serde_json::Value;
use tracing::info;

/// Consumer for receiving patient records from NATS
pub struct RequestConsumer {
    client: Client,
    subject: String,
}

impl RequestConsumer {
    pub fn new(client: Client, subject: &str) -> Self {
        Self {
            client,
            subject: subject.to_string(),
        }
    }

    /// Subscribe to the request subject
    pub async fn subscribe(&self) -> Result<Subscriber> {
        let subscriber = self.client.subscribe(self.subject.clone()).await?;
        info!(subject = %self.subject, "Subscribed to request subject");
        Ok(subscriber)
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }
}

/// Why a payload never reached the pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadError {
    /// Empty body, JSON null or an empty object
    Empty,
    /// Not JSON, or JSON that is not an object
    Malformed(String),
}

impl PayloadError {
    /// Message returned to the caller
    pub fn public_message(&self) -> &'static str {
        match self {
            PayloadError::Empty => "No input data provided",
            PayloadError::Malformed(_) => "Invalid input data",
        }
    }
}

/// Decode a request body into a patient record.
pub fn decode_record(payload: &[u8]) -> Result<PatientRecord, PayloadError> {
    if payload.iter().all(u8::is_ascii_whitespace) {
        return Err(PayloadError::Empty);
    }

    let value: Value =
        serde_json::from_slice(payload).map_err(|e| PayloadError::Malformed(e.to_string()))?;
    match value {
        Value::Null => Err(PayloadError::Empty),
        Value::Object(map) if map.is_empty() => Err(PayloadError::Empty),
        Value::Object(map) => Ok(PatientRecord::from(map)),
        other => Err(PayloadError::Malformed(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_object() {
        let record = decode_record(br#"{"age": 50, "gender": "Female"}"#).unwrap();
        assert!(record.contains("gender"));
    }

    #[test]
    fn test_decode_empty_payloads() {
        assert_eq!(decode_record(b""), Err(PayloadError::Empty));
        assert_eq!(decode_record(b"  \n"), Err(PayloadError::Empty));
        assert_eq!(decode_record(b"null"), Err(PayloadError::Empty));
        assert_eq!(decode_record(b"{}"), Err(PayloadError::Empty));
    }

    #[test]
    fn test_decode_malformed() {
        let err = decode_record(b"[1, 2]").unwrap_err();
        assert_eq!(err, PayloadError::Malformed("expected a JSON object, got array".to_string()));
        assert!(matches!(decode_record(b"{not json"), Err(PayloadError::Malformed(_))));
        assert_eq!(err.public_message(), "Invalid input data");
    }
}
