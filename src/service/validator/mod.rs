//! OCSF schema validation
//!
//! Documents are normalized, posted to the schema server, and the server's
//! answer is classified into [`ValidationOutcome`]. Transport problems are
//! retried; a list of violations is a normal answer and is never retried.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::model::{CandidateDocument, ValidationOutcome, ValidatorConfig, Violation};
use crate::service::retry::{RetryError, RetryPolicy};
use crate::service::transport::{MAX_BODY_SNIPPET, TransportError, truncate};

pub mod normalize;

pub use normalize::{NormalizationError, PINNED_SCHEMA_VERSION};

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error(transparent)]
    Normalization(#[from] NormalizationError),

    #[error("validator unavailable after {attempts} attempts: {last_error}")]
    Unavailable {
        attempts: u32,
        last_error: TransportError,
    },

    #[error("validator call failed: {0}")]
    Transport(TransportError),
}

impl ValidationError {
    /// Stable label used in the report's exception histogram
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Normalization(NormalizationError::MalformedTimestamp(_)) => "malformed_timestamp",
            Self::Normalization(NormalizationError::MalformedPid { .. }) => "malformed_pid",
            Self::Unavailable { .. } => "validator_unavailable",
            Self::Transport(_) => "validator_transport",
        }
    }
}

impl From<RetryError<TransportError>> for ValidationError {
    fn from(e: RetryError<TransportError>) -> Self {
        match e {
            RetryError::ExhaustedRetries { attempts, last_error } => {
                Self::Unavailable { attempts, last_error }
            }
            RetryError::Fatal(e) => Self::Transport(e),
        }
    }
}

/// Remote schema validator
#[async_trait]
pub trait ValidationEndpoint: Send + Sync {
    /// Submit an already-normalized document, one attempt
    async fn submit(&self, document: &CandidateDocument) -> Result<ValidationOutcome, TransportError>;
}

/// A validated document in the form that was submitted
#[derive(Debug, Clone)]
pub struct Validated {
    pub document: CandidateDocument,
    pub outcome: ValidationOutcome,
}

/// Normalizes, submits and retries
#[derive(Clone)]
pub struct SchemaValidationService {
    endpoint: Arc<dyn ValidationEndpoint>,
    retry: RetryPolicy,
}

impl SchemaValidationService {
    pub fn new(endpoint: Arc<dyn ValidationEndpoint>, retry: RetryPolicy) -> Self {
        Self { endpoint, retry }
    }

    pub async fn validate(&self, document: &CandidateDocument) -> Result<Validated, ValidationError> {
        let normalized = normalize::normalize(document)?;

        let outcome = self
            .retry
            .execute(
                "schema_validation",
                || self.endpoint.submit(&normalized),
                TransportError::is_retryable,
            )
            .await?;

        Ok(Validated {
            document: normalized,
            outcome,
        })
    }
}

/// Response body of the schema server
#[derive(Debug, Default, Deserialize)]
struct ValidationResponse {
    #[serde(default)]
    errors: Option<Vec<Violation>>,
    #[serde(default)]
    warnings: Option<Vec<Value>>,
}

/// HTTP client for the OCSF schema server
pub struct OcsfValidatorClient {
    client: Client,
    endpoint: Url,
}

impl OcsfValidatorClient {
    /// `base_url` is the API root; documents go to `<base_url>/validate`
    pub fn new(base_url: &Url, timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("ocsf-refinery/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            endpoint: validate_endpoint(base_url),
        })
    }

    pub fn from_config(config: &ValidatorConfig, base_url: &Url) -> Result<Self, TransportError> {
        Self::new(base_url, Duration::from_secs(config.timeout_secs))
    }
}

/// `<base>/validate`, tolerating a trailing slash on the base
fn validate_endpoint(base_url: &Url) -> Url {
    let mut endpoint = base_url.clone();
    let path = format!("{}/validate", base_url.path().trim_end_matches('/'));
    endpoint.set_path(&path);
    endpoint
}

#[async_trait]
impl ValidationEndpoint for OcsfValidatorClient {
    async fn submit(&self, document: &CandidateDocument) -> Result<ValidationOutcome, TransportError> {
        tracing::debug!(url = %self.endpoint, "Submitting document for schema validation");

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(document)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: truncate(&body, MAX_BODY_SNIPPET),
            });
        }

        let outcome = parse_validation_response(&body)?;
        tracing::debug!(
            status = status.as_u16(),
            violations = outcome.violations().len(),
            "Schema validation response received"
        );
        Ok(outcome)
    }
}

/// Classify a 2xx body from the schema server
fn parse_validation_response(body: &str) -> Result<ValidationOutcome, TransportError> {
    let parsed: ValidationResponse = if body.trim().is_empty() {
        ValidationResponse::default()
    } else {
        serde_json::from_str(body).map_err(|e| {
            TransportError::Decode(format!("{}: {}", e, truncate(body, MAX_BODY_SNIPPET)))
        })?
    };

    if let Some(ref warnings) = parsed.warnings {
        if !warnings.is_empty() {
            tracing::debug!(warnings = warnings.len(), "Validator reported warnings");
        }
    }

    Ok(ValidationOutcome::from_violations(
        parsed.errors.unwrap_or_default(),
    ))
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;

    /// Answers from a script, then falls back to a rule
    pub struct ScriptedValidator {
        script: Mutex<VecDeque<Result<ValidationOutcome, TransportError>>>,
        fallback: Box<dyn Fn(&CandidateDocument) -> ValidationOutcome + Send + Sync>,
        pub submitted: Mutex<Vec<CandidateDocument>>,
    }

    impl ScriptedValidator {
        pub fn new(
            fallback: impl Fn(&CandidateDocument) -> ValidationOutcome + Send + Sync + 'static,
        ) -> Self {
            Self {
                script: Mutex::new(VecDeque::new()),
                fallback: Box::new(fallback),
                submitted: Mutex::new(Vec::new()),
            }
        }

        pub fn with_answer(self, answer: Result<ValidationOutcome, TransportError>) -> Self {
            self.script.lock().unwrap().push_back(answer);
            self
        }
    }

    #[async_trait]
    impl ValidationEndpoint for ScriptedValidator {
        async fn submit(
            &self,
            document: &CandidateDocument,
        ) -> Result<ValidationOutcome, TransportError> {
            self.submitted.lock().unwrap().push(document.clone());
            if let Some(answer) = self.script.lock().unwrap().pop_front() {
                return answer;
            }
            Ok((self.fallback)(document))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ScriptedValidator;
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> CandidateDocument {
        CandidateDocument::try_from(value).unwrap()
    }

    fn instant_retry(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::ZERO, 2.0)
    }

    fn unavailable() -> TransportError {
        TransportError::Status {
            status: 503,
            body: "down".into(),
        }
    }

    #[test]
    fn test_parse_response_variants() {
        assert!(parse_validation_response("").unwrap().is_valid());
        assert!(parse_validation_response(r#"{"errors": []}"#).unwrap().is_valid());
        assert!(parse_validation_response(r#"{"warnings": [{"message": "x"}]}"#).unwrap().is_valid());

        let invalid = parse_validation_response(
            r#"{"errors": [{"error": "attribute_required", "attribute_path": "severity_id", "message": "required"}]}"#,
        )
        .unwrap();
        let violations = invalid.violations();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind, "attribute_required");
        assert_eq!(violations[0].path.as_deref(), Some("severity_id"));

        assert!(matches!(
            parse_validation_response("<html>oops</html>"),
            Err(TransportError::Decode(_))
        ));
    }

    #[test]
    fn test_lenient_error_objects_are_violations() {
        let outcome = parse_validation_response(
            r#"{"errors": [
                {"kind": "attribute_required", "error": "attribute_required", "message": "m"},
                {"error": "type_mismatch", "attribute_path": "time", "message": null}
            ]}"#,
        )
        .unwrap();

        let violations = outcome.violations();
        assert_eq!(violations.len(), 2);
        assert_eq!(violations[0].kind, "attribute_required");
        assert_eq!(violations[0].message, "m");
        assert_eq!(violations[1].kind, "type_mismatch");
        assert_eq!(violations[1].path.as_deref(), Some("time"));
        assert_eq!(violations[1].message, "");
    }

    #[test]
    fn test_validate_endpoint_path() {
        let base = Url::parse("http://localhost:8085/api/v2").unwrap();
        assert_eq!(validate_endpoint(&base).as_str(), "http://localhost:8085/api/v2/validate");
        let slash = Url::parse("http://localhost:8085/api/v2/").unwrap();
        assert_eq!(validate_endpoint(&slash).as_str(), "http://localhost:8085/api/v2/validate");
    }

    #[tokio::test]
    async fn test_submits_normalized_document() {
        let endpoint = Arc::new(ScriptedValidator::new(|_| ValidationOutcome::Valid));
        let service = SchemaValidationService::new(endpoint.clone(), instant_retry(3));

        let validated = service
            .validate(&doc(json!({"time": "1970-01-01T00:00:01Z", "metadata": {"version": "1.0.0"}})))
            .await
            .unwrap();

        assert!(validated.outcome.is_valid());
        assert_eq!(validated.document.get("/time"), Some(&json!(1000)));
        let submitted = endpoint.submitted.lock().unwrap();
        assert_eq!(submitted[0].get("/metadata/version"), Some(&json!("1.3.0")));
    }

    #[tokio::test]
    async fn test_transport_errors_are_retried() {
        let endpoint = Arc::new(
            ScriptedValidator::new(|_| ValidationOutcome::Valid)
                .with_answer(Err(unavailable()))
                .with_answer(Err(unavailable())),
        );
        let service = SchemaValidationService::new(endpoint.clone(), instant_retry(3));

        let validated = service.validate(&doc(json!({}))).await.unwrap();
        assert!(validated.outcome.is_valid());
        assert_eq!(endpoint.submitted.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_violations_are_not_retried() {
        let endpoint = Arc::new(ScriptedValidator::new(|_| {
            ValidationOutcome::Invalid(vec![Violation::new("attribute_required", Some("class_uid"), "missing")])
        }));
        let service = SchemaValidationService::new(endpoint.clone(), instant_retry(3));

        let validated = service.validate(&doc(json!({}))).await.unwrap();
        assert_eq!(validated.outcome.violations().len(), 1);
        assert_eq!(endpoint.submitted.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_exhaustion_reports_unavailable() {
        let endpoint = Arc::new(
            ScriptedValidator::new(|_| ValidationOutcome::Valid)
                .with_answer(Err(unavailable()))
                .with_answer(Err(unavailable())),
        );
        let service = SchemaValidationService::new(endpoint, instant_retry(2));

        let err = service.validate(&doc(json!({}))).await.unwrap_err();
        assert!(matches!(err, ValidationError::Unavailable { attempts: 2, .. }));
        assert_eq!(err.kind(), "validator_unavailable");
    }

    #[tokio::test]
    async fn test_malformed_timestamp_never_reaches_endpoint() {
        let endpoint = Arc::new(ScriptedValidator::new(|_| ValidationOutcome::Valid));
        let service = SchemaValidationService::new(endpoint.clone(), instant_retry(3));

        let err = service.validate(&doc(json!({"time": "not-a-time"}))).await.unwrap_err();
        assert_eq!(err.kind(), "malformed_timestamp");
        assert!(endpoint.submitted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    #[ignore] // Requires a running OCSF schema server
    async fn test_live_validator() {
        let base = Url::parse("http://localhost:8085/api/v2").unwrap();
        let client = OcsfValidatorClient::new(&base, Duration::from_secs(10)).unwrap();
        let result = client.submit(&doc(json!({"class_uid": 1001}))).await;
        assert!(result.is_ok());
    }
}
