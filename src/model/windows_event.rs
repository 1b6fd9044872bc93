use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Raw Windows Security event as shipped by the log collector
///
/// Collectors disagree on field types (numeric task categories, epoch or
/// string timestamps, string levels), so everything but `event_data` is kept
/// as raw JSON and interpreted by the accessors.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WindowsEvent {
    #[serde(default)]
    pub event_id: Option<Value>,
    #[serde(default)]
    pub timestamp: Option<Value>,
    #[serde(default)]
    pub message: Option<Value>,
    #[serde(default)]
    pub level: Option<Value>,
    #[serde(default)]
    pub keywords: Option<Value>,
    #[serde(default)]
    pub task_category: Option<Value>,
    #[serde(default)]
    pub computer: Option<Value>,
    #[serde(default)]
    pub version: Option<Value>,
    #[serde(default)]
    pub event_data: Map<String, Value>,
}

impl WindowsEvent {
    /// Numeric event id, accepting `4624` and `"4624"`
    pub fn event_id(&self) -> Option<u32> {
        self.event_id.as_ref().and_then(integer_like)
    }

    /// Numeric level, accepting `4` and `"4"`
    pub fn level(&self) -> Option<u32> {
        self.level.as_ref().and_then(integer_like)
    }

    /// Keywords as text; collectors sometimes send a list
    pub fn keywords(&self) -> Option<String> {
        match self.keywords.as_ref()? {
            Value::String(text) => Some(text.clone()),
            Value::Array(items) => Some(
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>()
                    .join(", "),
            ),
            _ => None,
        }
    }

    pub fn computer(&self) -> Option<&str> {
        self.computer.as_ref().and_then(Value::as_str)
    }

    /// Value of an `event_data` entry, `null` when absent
    pub fn data(&self, key: &str) -> Value {
        self.event_data.get(key).cloned().unwrap_or(Value::Null)
    }
}

fn integer_like(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Criticality of a Windows event id for triage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventCriticality {
    High,
    Medium,
    Low,
}

impl EventCriticality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}
