//! Run-level accounting and the `validation_report.json` artifact

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CorrectionFailure, DocumentResult, FinalStatus, Violation};

/// Failure details recorded for every document whose refinement failed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub initial_errors: Vec<Violation>,
    pub remaining_errors: Vec<Violation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correction_failure: Option<CorrectionFailure>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    pub processed: u64,
    pub validation_errors: u64,
    pub refinement_success: u64,
    pub refinement_failure: u64,
    pub error_details: BTreeMap<String, ErrorDetail>,
    pub exception_types: BTreeMap<String, u64>,
}

/// Serialized form of a finished run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub timestamp: String,
    pub stats: RunStats,
    pub success_rate: f64,
    pub error_distribution: BTreeMap<String, u64>,
    pub exception_distribution: BTreeMap<String, u64>,
}

/// Accumulates document results for a single run
///
/// Only the workflow's aggregating loop writes to it. `finalize` consumes the
/// accumulator, so a report cannot change after it has been produced.
#[derive(Debug)]
pub struct RunReport {
    started_at: DateTime<Utc>,
    stats: RunStats,
}

impl RunReport {
    pub fn new() -> Self {
        Self::started_at(Utc::now())
    }

    pub fn started_at(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            stats: RunStats::default(),
        }
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    /// Fold one terminal document result into the counters
    pub fn record(&mut self, result: &DocumentResult) {
        self.stats.processed += 1;

        if result.had_validation_errors() {
            self.stats.validation_errors += 1;

            if result.final_status == FinalStatus::RefinedAndAccepted {
                self.stats.refinement_success += 1;
            } else {
                self.stats.refinement_failure += 1;
                self.stats.error_details.insert(
                    result.filename.clone(),
                    ErrorDetail {
                        initial_errors: result.initial_violations.clone(),
                        remaining_errors: result.remaining_violations.clone(),
                        correction_failure: result.correction_failure().cloned(),
                    },
                );
            }
        }

        if let Some(ref error) = result.error {
            self.record_exception(&error.kind);
        }
    }

    /// Tally an unexpected error by kind
    pub fn record_exception(&mut self, kind: &str) {
        *self
            .stats
            .exception_types
            .entry(kind.to_string())
            .or_insert(0) += 1;
    }

    /// Percentage of documents with validation errors that were repaired
    pub fn success_rate(&self) -> f64 {
        success_rate(self.stats.refinement_success, self.stats.validation_errors)
    }

    /// Count violation kinds that survived refinement
    pub fn error_distribution(&self) -> BTreeMap<String, u64> {
        let mut distribution = BTreeMap::new();
        for detail in self.stats.error_details.values() {
            for violation in &detail.remaining_errors {
                *distribution.entry(violation.kind.clone()).or_insert(0) += 1;
            }
        }
        distribution
    }

    pub fn finalize(self) -> ValidationReport {
        let success_rate = self.success_rate();
        let error_distribution = self.error_distribution();
        let exception_distribution = self.stats.exception_types.clone();

        ValidationReport {
            timestamp: self.started_at.to_rfc3339(),
            stats: self.stats,
            success_rate,
            error_distribution,
            exception_distribution,
        }
    }
}

impl Default for RunReport {
    fn default() -> Self {
        Self::new()
    }
}

/// `success / attempted * 100`, or 100 when nothing needed refinement
pub fn success_rate(success: u64, attempted: u64) -> f64 {
    if attempted == 0 {
        100.0
    } else {
        success as f64 / attempted as f64 * 100.0
    }
}
