//! Candidate OCSF documents
//!
//! A candidate is an arbitrary JSON object. Schema enforcement is delegated to the
//! external validator, so the only structure known here is the handful of legacy
//! fields that get normalized before submission.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Pointer to the event timestamp
pub const TIME_FIELD: &str = "/time";
/// Pointers to process identifiers that may arrive hex-encoded
pub const PID_FIELDS: &[&str] = &["/actor/process/pid", "/process/pid"];
/// Pointer to the schema version
pub const VERSION_FIELD: &str = "/metadata/version";

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("expected a JSON object, found {0}")]
    NotAnObject(&'static str),
}

/// One security event in OCSF shape
///
/// Always wraps a JSON object. Corrections and normalization produce new
/// documents; nothing mutates a candidate after it has been handed out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct CandidateDocument(Map<String, Value>);

impl CandidateDocument {
    /// Parse raw bytes read from disk
    pub fn from_slice(bytes: &[u8]) -> Result<Self, DocumentError> {
        let value: Value = serde_json::from_slice(bytes)?;
        Self::try_from(value)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Look up a field by JSON pointer (`/actor/process/pid`)
    pub fn get(&self, pointer: &str) -> Option<&Value> {
        let (first, rest) = split_pointer(pointer)?;
        let head = self.0.get(first)?;
        if rest.is_empty() {
            Some(head)
        } else {
            head.pointer(rest)
        }
    }

    /// Return a copy with the field at `pointer` replaced
    ///
    /// Only existing fields are replaced; a missing path leaves the copy unchanged.
    pub fn with_field(&self, pointer: &str, value: Value) -> Self {
        let mut copy = self.0.clone();
        if let Some((first, rest)) = split_pointer(pointer) {
            let slot = match copy.get_mut(first) {
                Some(head) if rest.is_empty() => Some(head),
                Some(head) => head.pointer_mut(rest),
                None => None,
            };
            if let Some(slot) = slot {
                *slot = value;
            }
        }
        Self(copy)
    }

    pub fn to_pretty_json(&self) -> Result<String, DocumentError> {
        Ok(serde_json::to_string_pretty(&self.0)?)
    }
}

impl TryFrom<Value> for CandidateDocument {
    type Error = DocumentError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(DocumentError::NotAnObject(json_type_name(&other))),
        }
    }
}

impl From<Map<String, Value>> for CandidateDocument {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<CandidateDocument> for Value {
    fn from(doc: CandidateDocument) -> Self {
        doc.into_value()
    }
}

/// Split `/a/b/c` into (`a`, `/b/c`)
fn split_pointer(pointer: &str) -> Option<(&str, &str)> {
    let trimmed = pointer.strip_prefix('/')?;
    match trimmed.find('/') {
        Some(idx) => Some((&trimmed[..idx], &trimmed[idx..])),
        None => Some((trimmed, "")),
    }
}

pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// SHA-256 of the raw input bytes, used to key a document within a run
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
