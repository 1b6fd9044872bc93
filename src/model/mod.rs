pub mod config;
pub mod document;
pub mod outcome;
pub mod report;
pub mod violation;
pub mod windows_event;

pub use config::{
    Config, ConfigError, CorrectorConfig, RetrySettings, ValidatorConfig, WorkflowConfig,
};
pub use document::CandidateDocument;
pub use outcome::*;
pub use report::{ErrorDetail, RunReport, RunStats, ValidationReport};
pub use violation::{ValidationOutcome, Violation};
pub use windows_event::{EventCriticality, WindowsEvent};
