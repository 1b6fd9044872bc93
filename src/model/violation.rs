use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Fallback kind for validator errors that carry no classification
pub const UNKNOWN_KIND: &str = "unknown";

/// Keys the validator uses for the violation kind, in order of preference
const KIND_KEYS: &[&str] = &["kind", "error", "type"];
/// Keys the validator uses for the attribute path
const PATH_KEYS: &[&str] = &["path", "attribute_path"];

/// One structured complaint from the schema validator
///
/// The validator is not consistent about field names: the kind arrives as
/// `kind`, `error` or `type` and the path as `path` or `attribute_path`,
/// sometimes several at once. The first non-null key wins; everything else it
/// sends along is kept in `extra` so reports echo it back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value")]
pub struct Violation {
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub message: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Violation {
    pub fn new(kind: impl Into<String>, path: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            path: path.map(str::to_string),
            message: message.into(),
            extra: Map::new(),
        }
    }
}

impl From<Value> for Violation {
    fn from(value: Value) -> Self {
        let mut fields = match value {
            Value::Object(fields) => fields,
            Value::String(message) => return Self::new(UNKNOWN_KIND, None, message),
            other => return Self::new(UNKNOWN_KIND, None, other.to_string()),
        };

        let kind = take_first(&mut fields, KIND_KEYS).unwrap_or_else(|| UNKNOWN_KIND.to_string());
        let path = take_first(&mut fields, PATH_KEYS);
        let message = match fields.remove("message") {
            None | Some(Value::Null) => String::new(),
            Some(value) => text_of(value),
        };

        Self {
            kind,
            path,
            message,
            extra: fields,
        }
    }
}

/// Remove and return the first non-null entry among `keys`
///
/// Null entries are dropped; later non-null aliases stay in `fields`.
fn take_first(fields: &mut Map<String, Value>, keys: &[&str]) -> Option<String> {
    let mut found = None;
    for key in keys {
        let is_null = match fields.get(*key) {
            Some(value) => value.is_null(),
            None => continue,
        };
        if is_null {
            fields.remove(*key);
        } else if found.is_none() {
            found = fields.remove(*key).map(text_of);
        }
    }
    found
}

fn text_of(value: Value) -> String {
    match value {
        Value::String(text) => text,
        other => other.to_string(),
    }
}

/// Verdict of the schema validator for one document
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationOutcome {
    Valid,
    Invalid(Vec<Violation>),
}

impl ValidationOutcome {
    /// Build an outcome from the validator's `errors` list
    pub fn from_violations(violations: Vec<Violation>) -> Self {
        if violations.is_empty() {
            Self::Valid
        } else {
            Self::Invalid(violations)
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    pub fn violations(&self) -> &[Violation] {
        match self {
            Self::Valid => &[],
            Self::Invalid(violations) => violations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_aliases() {
        let v: Violation = serde_json::from_value(json!({
            "error": "attribute_required",
            "attribute_path": "actor.user",
            "message": "missing",
            "severity": "error"
        }))
        .unwrap();
        assert_eq!(v.kind, "attribute_required");
        assert_eq!(v.path.as_deref(), Some("actor.user"));
        assert_eq!(v.extra.get("severity"), Some(&json!("error")));

        let bare: Violation = serde_json::from_value(json!({"message": "?"})).unwrap();
        assert_eq!(bare.kind, UNKNOWN_KIND);
        assert!(bare.path.is_none());
    }

    #[test]
    fn test_tolerates_duplicate_aliases_and_null_message() {
        let v: Violation = serde_json::from_value(json!({
            "kind": "attribute_required",
            "error": "legacy_label",
            "path": null,
            "attribute_path": "severity_id",
            "message": null
        }))
        .unwrap();
        assert_eq!(v.kind, "attribute_required");
        assert_eq!(v.path.as_deref(), Some("severity_id"));
        assert_eq!(v.message, "");
        assert_eq!(v.extra.get("error"), Some(&json!("legacy_label")));

        let odd: Violation = serde_json::from_value(json!({"type": 42, "message": ["a", "b"]})).unwrap();
        assert_eq!(odd.kind, "42");
        assert_eq!(odd.message, r#"["a","b"]"#);

        let bare: Violation = serde_json::from_value(json!("time must be a long")).unwrap();
        assert_eq!(bare.kind, UNKNOWN_KIND);
        assert_eq!(bare.message, "time must be a long");
    }

    #[test]
    fn test_serialize_keeps_extra_fields() {
        let mut v = Violation::new("type_mismatch", Some("time"), "expected long");
        v.extra.insert("value".into(), json!("2024-01-01"));
        let out = serde_json::to_value(&v).unwrap();
        assert_eq!(
            out,
            json!({"kind": "type_mismatch", "path": "time", "message": "expected long", "value": "2024-01-01"})
        );
    }

    #[test]
    fn test_outcome_from_violations() {
        assert!(ValidationOutcome::from_violations(vec![]).is_valid());
        let invalid = ValidationOutcome::from_violations(vec![Violation::new("x", None, "y")]);
        assert_eq!(invalid.violations().len(), 1);
    }
}
