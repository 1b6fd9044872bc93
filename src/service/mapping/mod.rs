//! Windows Security events to candidate OCSF documents
//!
//! The mapping is table driven: the event id picks the OCSF class, and the
//! well-known `event_data` keys fill the actor, target, device, process and
//! authentication objects. Events that cannot be read become error events so
//! every input produces exactly one document.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::model::{CandidateDocument, EventCriticality, WindowsEvent};
use crate::service::refinement::CancelFlag;
use crate::service::store::{DocumentStore, StoreError};

pub mod criticality;

pub use criticality::event_criticality;

/// `type_uid` given to every mapped Windows event log record
pub const WINDOWS_EVENT_TYPE_UID: u32 = 400001;

/// OCSF class chosen for a Windows event id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventClass {
    pub uid: u32,
    pub name: &'static str,
    pub activity: &'static str,
}

impl EventClass {
    const UNKNOWN: Self = Self::new(0, "Unknown", "Unknown");

    const fn new(uid: u32, name: &'static str, activity: &'static str) -> Self {
        Self { uid, name, activity }
    }
}

pub fn event_class(event_id: Option<u32>) -> EventClass {
    match event_id {
        Some(4624) => EventClass::new(1001, "Authentication", "User Logon"),
        Some(4625) => EventClass::new(1001, "Authentication", "User Logon Failure"),
        Some(4634) => EventClass::new(1001, "Authentication", "User Logoff"),
        Some(4688) => EventClass::new(1002, "Process Activity", "Process Creation"),
        Some(4689) => EventClass::new(1002, "Process Activity", "Process Termination"),
        Some(4656) => EventClass::new(1003, "Object Access", "Handle Requested"),
        Some(4663) => EventClass::new(1003, "Object Access", "Object Access Attempt"),
        Some(4719) => EventClass::new(1004, "Policy Change", "System Audit Policy Changed"),
        Some(4739) => EventClass::new(1004, "Policy Change", "Domain Policy Changed"),
        _ => EventClass::UNKNOWN,
    }
}

/// Windows event level to OCSF severity label
pub fn severity_label(level: Option<u32>) -> &'static str {
    match level {
        Some(1) => "CRITICAL",
        Some(2) => "HIGH",
        Some(3) => "MEDIUM",
        Some(4) => "LOW",
        Some(5) => "INFO",
        _ => "UNKNOWN",
    }
}

/// Audit keywords to OCSF status label
pub fn status_label(keywords: Option<&str>) -> &'static str {
    match keywords {
        Some(k) if k.contains("Audit Success") => "SUCCESS",
        Some(k) if k.contains("Audit Failure") => "FAILURE",
        _ => "UNKNOWN",
    }
}

/// Result of mapping one raw event
#[derive(Debug, Clone)]
pub struct MappedEvent {
    pub document: CandidateDocument,
    pub class: EventClass,
    pub criticality: EventCriticality,
    /// Set when the raw event could not be read and an error event was produced
    pub error: Option<String>,
}

/// Map a raw JSON event, falling back to an error event
pub fn map_raw_event(raw: &Value) -> MappedEvent {
    match serde_json::from_value::<WindowsEvent>(raw.clone()) {
        Ok(event) => {
            let class = event_class(event.event_id());
            let criticality = event
                .event_id()
                .map(event_criticality)
                .unwrap_or(EventCriticality::Low);

            if criticality == EventCriticality::High {
                tracing::warn!(
                    event_id = event.event_id(),
                    class = class.name,
                    computer = event.computer(),
                    "High criticality event"
                );
            }

            MappedEvent {
                document: map_event(&event, raw, criticality),
                class,
                criticality,
                error: None,
            }
        }
        Err(e) => {
            let error = e.to_string();
            tracing::error!(error = %error, "Error mapping event to OCSF");
            MappedEvent {
                document: error_event(raw, &error),
                class: EventClass::UNKNOWN,
                criticality: EventCriticality::Low,
                error: Some(error),
            }
        }
    }
}

/// Build the OCSF document for a parsed event; `raw` is embedded as the original
pub fn map_event(event: &WindowsEvent, raw: &Value, criticality: EventCriticality) -> CandidateDocument {
    let class = event_class(event.event_id());
    let mut doc = Map::new();

    doc.insert("type_uid".into(), json!(WINDOWS_EVENT_TYPE_UID));
    doc.insert("class_uid".into(), json!(class.uid));
    doc.insert("class_name".into(), json!(class.name));
    doc.insert("activity_id".into(), json!(event.event_id));
    doc.insert("activity_name".into(), json!(class.activity));
    doc.insert("time".into(), json!(event.timestamp));
    doc.insert("message".into(), json!(event.message));
    doc.insert("severity".into(), json!(severity_label(event.level())));
    doc.insert("status".into(), json!(status_label(event.keywords().as_deref())));
    doc.insert("category".into(), json!(event.task_category));

    doc.insert(
        "actor".into(),
        json!({
            "user": {
                "name": event.data("SubjectUserName"),
                "uid": event.data("SubjectUserSid"),
                "domain": event.data("SubjectDomainName"),
                "type": "Windows",
                "session_uid": event.data("SubjectLogonId"),
            },
            "session": {"uid": event.data("SubjectLogonId")},
        }),
    );
    doc.insert(
        "target".into(),
        json!({
            "user": {
                "name": event.data("TargetUserName"),
                "uid": event.data("TargetUserSid"),
                "domain": event.data("TargetDomainName"),
                "type": "Windows",
            },
            "process": {
                "name": event.data("TargetProcessName"),
                "pid": event.data("TargetProcessId"),
            },
            "resource": {
                "name": event.data("ObjectName"),
                "type": event.data("ObjectType"),
            },
        }),
    );
    doc.insert(
        "device".into(),
        json!({
            "hostname": event.computer,
            "uid": event.data("WorkstationName"),
            "ip": event.data("IpAddress"),
            "port": event.data("IpPort"),
            "os": {"name": "Windows", "type": "Windows"},
        }),
    );
    doc.insert(
        "process".into(),
        json!({
            "name": event.data("ProcessName"),
            "pid": event.data("ProcessId"),
            "cmd_line": event.data("CommandLine"),
            "parent_process": {
                "pid": event.data("ParentProcessId"),
                "name": event.data("ParentProcessName"),
            },
        }),
    );
    doc.insert(
        "authentication".into(),
        json!({
            "protocol": event.data("AuthenticationPackageName"),
            "logon_type": event.data("LogonType"),
            "process": event.data("LogonProcessName"),
            "session": {"uid": event.data("LogonID")},
        }),
    );
    doc.insert(
        "metadata".into(),
        json!({
            "version": event.version,
            "criticality": criticality.as_str(),
            "product": {
                "name": "Microsoft Windows",
                "vendor_name": "Microsoft",
                "feature": {"name": "Security Auditing"},
            },
            "original_event": raw,
        }),
    );

    CandidateDocument::from(doc)
}

/// Placeholder document for an event that could not be mapped
pub fn error_event(raw: &Value, error: &str) -> CandidateDocument {
    let mut doc = Map::new();
    doc.insert("class_uid".into(), json!(0));
    doc.insert("class_name".into(), json!("Unknown"));
    doc.insert("time".into(), json!(Utc::now().to_rfc3339()));
    doc.insert("message".into(), json!(format!("Failed to map event: {error}")));
    doc.insert("severity".into(), json!("ERROR"));
    doc.insert(
        "metadata".into(),
        json!({"error": error, "original_event": raw}),
    );
    CandidateDocument::from(doc)
}

#[derive(Debug, thiserror::Error)]
pub enum MappingError {
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

/// Counters of a finished mapping run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MappingSummary {
    pub files: u64,
    pub failed_files: u64,
    pub events: u64,
    pub mapping_errors: u64,
    pub high_criticality: u64,
    pub classes: BTreeMap<String, u64>,
}

/// Converts every raw event file of a directory into candidate documents
pub struct MappingRun {
    store: DocumentStore,
}

impl MappingRun {
    pub fn new(store: DocumentStore) -> Self {
        Self { store }
    }

    pub async fn run(&self, cancel: &CancelFlag) -> Result<MappingSummary, MappingError> {
        self.store.prepare().await?;
        let filenames = self.store.list_inputs().await?;

        tracing::info!(
            input_dir = %self.store.input_dir().display(),
            output_dir = %self.store.output_dir().display(),
            files = filenames.len(),
            "Starting event mapping"
        );

        let mut summary = MappingSummary::default();
        for filename in &filenames {
            if cancel.is_cancelled() {
                tracing::warn!("Mapping cancelled");
                break;
            }

            summary.files += 1;
            if let Err(e) = self.map_file(filename, &mut summary).await {
                summary.failed_files += 1;
                tracing::error!(filename = %filename, error = %e, "Failed to map file");
            }
        }

        tracing::info!(
            files = summary.files,
            failed_files = summary.failed_files,
            events = summary.events,
            mapping_errors = summary.mapping_errors,
            high_criticality = summary.high_criticality,
            "Event mapping completed"
        );

        Ok(summary)
    }

    async fn map_file(&self, filename: &str, summary: &mut MappingSummary) -> Result<(), FileError> {
        let bytes = self.store.read_input(filename).await?;
        let events = match serde_json::from_slice::<Value>(&bytes)? {
            Value::Array(events) => events,
            event @ Value::Object(_) => vec![event],
            other => return Err(FileError::Shape(crate::model::document::json_type_name(&other))),
        };

        let stem = Path::new(filename)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(filename);
        let single = events.len() == 1;

        for (idx, raw) in events.iter().enumerate() {
            let mapped = map_raw_event(raw);
            let output_name = if single {
                format!("{stem}.json")
            } else {
                format!("{stem}-{}.json", idx + 1)
            };
            self.store.write_document(&output_name, &mapped.document).await?;

            summary.events += 1;
            if mapped.error.is_some() {
                summary.mapping_errors += 1;
            }
            if mapped.criticality == EventCriticality::High {
                summary.high_criticality += 1;
            }
            *summary.classes.entry(mapped.class.name.to_string()).or_insert(0) += 1;
        }

        tracing::debug!(filename = %filename, events = events.len(), "Mapped file");
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
enum FileError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("expected an event object or an array of events, found {0}")]
    Shape(&'static str),
}
