pub mod corrector;
pub mod mapping;
pub mod refinement;
pub mod retry;
pub mod store;
pub mod transport;
pub mod validator;

pub use corrector::{CorrectionEndpoint, CorrectionService, HttpCorrectorClient};
pub use mapping::MappingRun;
pub use refinement::{CancelFlag, RefinementWorkflow};
pub use retry::RetryPolicy;
pub use store::DocumentStore;
pub use validator::{OcsfValidatorClient, SchemaValidationService, ValidationEndpoint};
