//! Application state and service initialization
//!
//! Centralizes client construction and dependency wiring so the subcommands
//! only decide which directories to work on.

use std::path::PathBuf;
use std::sync::Arc;

use crate::model::{Config, ConfigError};
use crate::service::mapping::MappingError;
use crate::service::refinement::WorkflowError;
use crate::service::{
    CancelFlag, CorrectionService, DocumentStore, HttpCorrectorClient, MappingRun,
    OcsfValidatorClient, RefinementWorkflow, SchemaValidationService,
};

/// Validated configuration plus the run-wide cancellation flag
pub struct AppState {
    pub config: Config,
    pub cancel: CancelFlag,
}

impl AppState {
    /// Validate the configuration and build application state
    pub fn new(config: Config) -> Result<Self, AppError> {
        config.validate()?;
        Ok(Self {
            config,
            cancel: CancelFlag::new(),
        })
    }

    /// Build the refinement workflow with HTTP-backed services
    ///
    /// Directory and concurrency overrides come from the command line.
    pub fn refinement_workflow(
        &self,
        input_dir: Option<PathBuf>,
        output_dir: Option<PathBuf>,
        max_concurrency: Option<usize>,
    ) -> Result<RefinementWorkflow, AppError> {
        let workflow = &self.config.workflow;
        let store = DocumentStore::new(
            input_dir.unwrap_or_else(|| workflow.input_dir.clone()),
            output_dir.unwrap_or_else(|| workflow.output_dir.clone()),
        );

        Ok(RefinementWorkflow::new(
            self.build_validation_service()?,
            self.build_correction_service()?,
            store,
        )
        .with_concurrency(max_concurrency.unwrap_or(workflow.max_concurrency)))
    }

    pub fn mapping_run(&self, input_dir: PathBuf, output_dir: PathBuf) -> MappingRun {
        MappingRun::new(DocumentStore::new(input_dir, output_dir))
    }

    fn build_validation_service(&self) -> Result<SchemaValidationService, AppError> {
        let config = &self.config.validator;
        let url = self.config.validator_url()?;
        let client = OcsfValidatorClient::from_config(config, &url)
            .map_err(|e| AppError::ClientInit("validator", e.to_string()))?;

        tracing::info!(url = %url, timeout_secs = config.timeout_secs, "Schema validator configured");
        Ok(SchemaValidationService::new(
            Arc::new(client),
            config.retry.policy(),
        ))
    }

    fn build_correction_service(&self) -> Result<CorrectionService, AppError> {
        let config = &self.config.corrector;
        let url = self.config.corrector_url()?;
        let client = HttpCorrectorClient::from_config(config, url.clone())
            .map_err(|e| AppError::ClientInit("corrector", e.to_string()))?;

        tracing::info!(url = %url, timeout_secs = config.timeout_secs, "Correction service configured");
        Ok(CorrectionService::new(
            Arc::new(client),
            config.retry.policy(),
        ))
    }
}

/// Application-level errors
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum AppError {
    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    /// An HTTP client could not be built
    #[error("Failed to initialize {0} client: {1}")]
    ClientInit(&'static str, String),

    #[error("Refinement run failed: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("Mapping run failed: {0}")]
    Mapping(#[from] MappingError),
}
