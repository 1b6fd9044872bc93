//! Validation and refinement workflow
//!
//! Drives every document of an input directory through
//! validate → correct (one round) → re-validate, writes accepted documents to
//! the output directory and produces the run report. A failing document is
//! recorded and the run moves on; only problems with the directories
//! themselves abort a run.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use futures::StreamExt;
use serde::Serialize;
use tracing::Instrument;
use uuid::Uuid;

use crate::model::document::{DocumentError, content_hash};
use crate::model::{
    CandidateDocument, CorrectionAttempt, CorrectionResult, DocumentFailure, DocumentResult,
    FinalStatus, RunReport, ValidationOutcome, ValidationReport, Violation,
};
use crate::service::corrector::CorrectionService;
use crate::service::store::{DECISIONS_FILE, DocumentStore, REPORT_FILE, StoreError};
use crate::service::validator::{SchemaValidationService, ValidationError};

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

/// Unexpected per-document error, caught before it can stop the run
#[derive(Debug, thiserror::Error)]
enum DocumentProcessingError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("malformed input document: {0}")]
    Malformed(#[from] DocumentError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl DocumentProcessingError {
    fn kind(&self) -> &'static str {
        match self {
            Self::Store(StoreError::Io { .. }) => "io_error",
            Self::Store(StoreError::Serialization(_)) => "serialization_error",
            Self::Malformed(DocumentError::Json(_)) => "malformed_json",
            Self::Malformed(DocumentError::NotAnObject(_)) => "not_an_object",
            Self::Validation(e) => e.kind(),
        }
    }

    fn to_failure(&self) -> DocumentFailure {
        DocumentFailure {
            kind: self.kind().to_string(),
            message: self.to_string(),
        }
    }
}

/// Cooperative cancellation shared with the caller
///
/// Checked before each document starts; documents already in flight finish.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything a finished run produced
#[derive(Debug)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub report: ValidationReport,
    pub results: Vec<DocumentResult>,
    pub cancelled: bool,
}

/// Contents of the decision log
#[derive(Debug, Serialize)]
struct DecisionLog<'a> {
    run_id: Uuid,
    cancelled: bool,
    documents: &'a [DocumentResult],
}

pub struct RefinementWorkflow {
    validator: SchemaValidationService,
    corrector: CorrectionService,
    store: DocumentStore,
    max_concurrency: usize,
}

impl RefinementWorkflow {
    pub fn new(
        validator: SchemaValidationService,
        corrector: CorrectionService,
        store: DocumentStore,
    ) -> Self {
        Self {
            validator,
            corrector,
            store,
            max_concurrency: 1,
        }
    }

    /// Process up to `limit` documents at once (at least one)
    pub fn with_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = limit.max(1);
        self
    }

    /// Process the whole input directory and persist the report
    pub async fn run(&self, cancel: &CancelFlag) -> Result<RunSummary, WorkflowError> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("refinement_run", run_id = %run_id);
        self.run_inner(run_id, cancel).instrument(span).await
    }

    async fn run_inner(&self, run_id: Uuid, cancel: &CancelFlag) -> Result<RunSummary, WorkflowError> {
        let start_time = Instant::now();
        self.store.prepare().await?;
        let filenames = self.store.list_inputs().await?;

        tracing::info!(
            input_dir = %self.store.input_dir().display(),
            output_dir = %self.store.output_dir().display(),
            documents = filenames.len(),
            max_concurrency = self.max_concurrency,
            "Starting validation workflow"
        );

        let mut report = RunReport::new();
        let mut results = Vec::with_capacity(filenames.len());

        // Results come back in input order; this loop is the only writer of the report.
        let mut documents = futures::stream::iter(filenames.iter())
            .map(|filename| async move {
                if cancel.is_cancelled() {
                    return None;
                }
                let span = tracing::info_span!("document", filename = %filename);
                Some(self.process_document(filename).instrument(span).await)
            })
            .buffered(self.max_concurrency);

        let mut skipped = 0usize;
        while let Some(result) = documents.next().await {
            match result {
                Some(result) => {
                    report.record(&result);
                    results.push(result);
                }
                None => skipped += 1,
            }
        }
        drop(documents);

        let cancelled = cancel.is_cancelled() && skipped > 0;
        if cancelled {
            tracing::warn!(skipped = skipped, "Run cancelled before all documents were processed");
        }

        let report = report.finalize();
        let report_path = self.store.write_json(REPORT_FILE, &report).await?;
        self.store
            .write_json(
                DECISIONS_FILE,
                &DecisionLog {
                    run_id,
                    cancelled,
                    documents: &results,
                },
            )
            .await?;

        log_summary(&report, start_time);
        tracing::info!(path = %report_path.display(), "Validation report written");

        Ok(RunSummary {
            run_id,
            report,
            results,
            cancelled,
        })
    }

    /// Run one document to a terminal result, never failing the run
    async fn process_document(&self, filename: &str) -> DocumentResult {
        tracing::info!("Processing file");

        let bytes = match self.store.read_input(filename).await {
            Ok(bytes) => bytes,
            Err(e) => return DocumentTrace::new(filename, None).errored(e.into()),
        };
        let mut trace = DocumentTrace::new(filename, Some(content_hash(&bytes)));

        let document = match CandidateDocument::from_slice(&bytes) {
            Ok(document) => document,
            Err(e) => return trace.errored(e.into()),
        };

        let initial = match self.validator.validate(&document).await {
            Ok(validated) => validated,
            Err(e) => return trace.errored(e.into()),
        };

        let violations = match initial.outcome {
            ValidationOutcome::Valid => {
                return match self.store.copy_to_output(filename, &bytes).await {
                    Ok(path) => {
                        tracing::info!(output = %path.display(), "Validation passed, copied to output");
                        trace.finish(FinalStatus::Accepted, Vec::new())
                    }
                    Err(e) => trace.errored(e.into()),
                };
            }
            ValidationOutcome::Invalid(violations) => violations,
        };

        tracing::info!(
            violations = violations.len(),
            "Validation errors found, attempting refinement"
        );
        trace.initial_violations = violations.clone();

        // One correction round, built from the submitted (normalized) form.
        let corrected = match self.corrector.correct(&initial.document, &violations).await {
            Ok(corrected) => {
                trace.attempts.push(CorrectionAttempt {
                    attempt: 1,
                    targeted_violations: violations,
                    result: CorrectionResult::Corrected {
                        document: corrected.clone(),
                    },
                });
                corrected
            }
            Err(e) => {
                let failure = e.to_failure();
                tracing::error!(
                    reason = failure.reason.as_str(),
                    error = %e,
                    "Refinement failed"
                );
                trace.attempts.push(CorrectionAttempt {
                    attempt: 1,
                    targeted_violations: violations,
                    result: CorrectionResult::Failed { failure },
                });
                return trace.finish(FinalStatus::Errored, Vec::new());
            }
        };

        let revalidated = match self.validator.validate(&corrected).await {
            Ok(validated) => validated,
            Err(e) => return trace.errored(e.into()),
        };

        match revalidated.outcome {
            ValidationOutcome::Valid => {
                match self.store.write_document(filename, &revalidated.document).await {
                    Ok(path) => {
                        tracing::info!(output = %path.display(), "Successfully refined and saved");
                        trace.finish(FinalStatus::RefinedAndAccepted, Vec::new())
                    }
                    Err(e) => trace.errored(e.into()),
                }
            }
            ValidationOutcome::Invalid(remaining) => {
                tracing::warn!(
                    remaining = remaining.len(),
                    kinds = ?remaining.iter().map(|v| v.kind.as_str()).collect::<Vec<_>>(),
                    "Refinement did not fix all validation errors"
                );
                trace.finish(FinalStatus::RefinementExhausted, remaining)
            }
        }
    }
}

/// What is known about a document so far
struct DocumentTrace {
    filename: String,
    content_hash: Option<String>,
    initial_violations: Vec<Violation>,
    attempts: Vec<CorrectionAttempt>,
}

impl DocumentTrace {
    fn new(filename: &str, content_hash: Option<String>) -> Self {
        Self {
            filename: filename.to_string(),
            content_hash,
            initial_violations: Vec::new(),
            attempts: Vec::new(),
        }
    }

    fn finish(self, final_status: FinalStatus, remaining_violations: Vec<Violation>) -> DocumentResult {
        DocumentResult {
            filename: self.filename,
            content_hash: self.content_hash,
            final_status,
            initial_violations: self.initial_violations,
            remaining_violations,
            attempts: self.attempts,
            error: None,
        }
    }

    fn errored(self, error: DocumentProcessingError) -> DocumentResult {
        tracing::error!(kind = error.kind(), error = %error, "Error processing file");
        let failure = error.to_failure();
        let mut result = self.finish(FinalStatus::Errored, Vec::new());
        result.error = Some(failure);
        result
    }
}

fn log_summary(report: &ValidationReport, start_time: Instant) {
    let stats = &report.stats;
    tracing::info!(
        processed = stats.processed,
        validation_errors = stats.validation_errors,
        refinement_success = stats.refinement_success,
        refinement_failure = stats.refinement_failure,
        success_rate = format!("{:.2}%", report.success_rate),
        elapsed_ms = start_time.elapsed().as_millis() as u64,
        "Validation workflow completed"
    );

    for (kind, count) in &report.exception_distribution {
        tracing::info!(kind = %kind, count = count, "Exception distribution");
    }
}
