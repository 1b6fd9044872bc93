//! Per-document records produced by the refinement workflow

use serde::{Deserialize, Serialize};

use super::{CandidateDocument, Violation};

/// Terminal state of one input document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalStatus {
    /// Valid as submitted, copied to the output directory
    Accepted,
    /// Corrected once and the correction validated
    RefinedAndAccepted,
    /// Corrected once but the correction still has violations
    RefinementExhausted,
    /// Correction could not be obtained, or an unexpected error stopped processing
    Errored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionFailureReason {
    /// The correction service never answered within the retry budget
    TransportExhausted,
    /// The correction service answered but no JSON document could be recovered
    ExtractionFailed,
}

impl CorrectionFailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TransportExhausted => "transport_exhausted",
            Self::ExtractionFailed => "extraction_failed",
        }
    }
}

/// Why a correction round produced no document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionFailure {
    pub reason: CorrectionFailureReason,
    pub detail: String,
    /// Raw corrector output, kept for diagnostics when extraction failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_output: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CorrectionResult {
    Corrected { document: CandidateDocument },
    Failed { failure: CorrectionFailure },
}

/// One round of asking the corrector to fix a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionAttempt {
    /// 1-based
    pub attempt: u32,
    pub targeted_violations: Vec<Violation>,
    pub result: CorrectionResult,
}

impl CorrectionAttempt {
    pub fn failure(&self) -> Option<&CorrectionFailure> {
        match &self.result {
            CorrectionResult::Failed { failure } => Some(failure),
            CorrectionResult::Corrected { .. } => None,
        }
    }
}

/// Unexpected error that stopped a document, tallied by kind in the report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentFailure {
    pub kind: String,
    pub message: String,
}

/// Terminal record for one input document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentResult {
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    pub final_status: FinalStatus,
    pub initial_violations: Vec<Violation>,
    pub remaining_violations: Vec<Violation>,
    pub attempts: Vec<CorrectionAttempt>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<DocumentFailure>,
}

impl DocumentResult {
    /// Whether the validator reported violations on the original document
    pub fn had_validation_errors(&self) -> bool {
        !self.initial_violations.is_empty()
    }

    /// The correction failure that ended this document, if any
    pub fn correction_failure(&self) -> Option<&CorrectionFailure> {
        self.attempts.iter().rev().find_map(CorrectionAttempt::failure)
    }
}
