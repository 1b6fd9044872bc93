//! Document correction through an external generative service
//!
//! One correction round: send the document and its violations, retry the call
//! on transport failures, then dig a JSON document out of whatever came back.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Serialize;
use serde_json::Value;
use url::Url;

use crate::model::{
    CandidateDocument, CorrectionFailure, CorrectionFailureReason, CorrectorConfig, Violation,
};
use crate::service::retry::{RetryError, RetryPolicy};
use crate::service::transport::{MAX_BODY_SNIPPET, TransportError, truncate};

pub mod extraction;
pub mod prompts;

pub use extraction::{CorrectorOutput, ExtractionFailure, extract_document};

use extraction::extract_with_strategy;
use prompts::{CORRECTION_SYSTEM_PROMPT, build_correction_prompt};

/// Header carrying the dataset the correction service should ground on
const DATASET_HEADER: &str = "tr-dataset";

#[derive(Debug, thiserror::Error)]
pub enum CorrectionError {
    #[error("correction service unavailable after {attempts} attempts: {last_error}")]
    Unavailable {
        attempts: u32,
        last_error: TransportError,
    },

    #[error("correction call failed: {0}")]
    Transport(TransportError),

    #[error(transparent)]
    Extraction(#[from] ExtractionFailure),

    #[error("invalid corrector configuration: {0}")]
    Configuration(String),
}

impl CorrectionError {
    /// Record form kept on the correction attempt
    pub fn to_failure(&self) -> CorrectionFailure {
        match self {
            Self::Extraction(e) => CorrectionFailure {
                reason: CorrectionFailureReason::ExtractionFailed,
                detail: e.to_string(),
                raw_output: Some(truncate(&e.raw_text, MAX_BODY_SNIPPET * 8)),
            },
            Self::Unavailable { .. } | Self::Transport(_) | Self::Configuration(_) => {
                CorrectionFailure {
                    reason: CorrectionFailureReason::TransportExhausted,
                    detail: self.to_string(),
                    raw_output: None,
                }
            }
        }
    }
}

impl From<RetryError<TransportError>> for CorrectionError {
    fn from(e: RetryError<TransportError>) -> Self {
        match e {
            RetryError::ExhaustedRetries { attempts, last_error } => {
                Self::Unavailable { attempts, last_error }
            }
            RetryError::Fatal(e) => Self::Transport(e),
        }
    }
}

/// Remote correction service
#[async_trait]
pub trait CorrectionEndpoint: Send + Sync {
    /// Ask for a corrected version of `document`, one attempt
    async fn request_correction(
        &self,
        document: &CandidateDocument,
        violations: &[Violation],
    ) -> Result<CorrectorOutput, TransportError>;
}

/// Retries the correction call and extracts the corrected document
#[derive(Clone)]
pub struct CorrectionService {
    endpoint: Arc<dyn CorrectionEndpoint>,
    retry: RetryPolicy,
}

impl CorrectionService {
    pub fn new(endpoint: Arc<dyn CorrectionEndpoint>, retry: RetryPolicy) -> Self {
        Self { endpoint, retry }
    }

    pub async fn correct(
        &self,
        document: &CandidateDocument,
        violations: &[Violation],
    ) -> Result<CandidateDocument, CorrectionError> {
        let start_time = Instant::now();

        let output = self
            .retry
            .execute(
                "document_correction",
                || self.endpoint.request_correction(document, violations),
                TransportError::is_retryable,
            )
            .await?;

        let (corrected, strategy) = extract_with_strategy(&output)?;

        tracing::debug!(
            strategy = ?strategy,
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            violations = violations.len(),
            "Extracted corrected document"
        );

        Ok(corrected)
    }
}

/// Request body sent to the correction service
#[derive(Debug, Serialize)]
struct CorrectionRequest<'a> {
    original_document: &'a CandidateDocument,
    violations: &'a [Violation],
    instructions: &'static str,
    prompt: String,
    temperature: f32,
    stream_response: bool,
}

/// HTTP client for a generative correction service
pub struct HttpCorrectorClient {
    client: Client,
    url: Url,
    temperature: f32,
}

impl HttpCorrectorClient {
    pub fn new(
        url: Url,
        api_key: Option<&str>,
        dataset_id: Option<&str>,
        timeout: Duration,
        temperature: f32,
    ) -> Result<Self, CorrectionError> {
        let mut headers = HeaderMap::new();
        if let Some(key) = api_key {
            let value = HeaderValue::from_str(&format!("Bearer {}", key))
                .map_err(|e| CorrectionError::Configuration(format!("api key: {}", e)))?;
            headers.insert(AUTHORIZATION, value);
        }
        if let Some(dataset) = dataset_id {
            let value = HeaderValue::from_str(dataset)
                .map_err(|e| CorrectionError::Configuration(format!("dataset id: {}", e)))?;
            headers.insert(DATASET_HEADER, value);
        }

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .user_agent(concat!("ocsf-refinery/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CorrectionError::Transport(TransportError::Http(e)))?;

        Ok(Self {
            client,
            url,
            temperature,
        })
    }

    pub fn from_config(config: &CorrectorConfig, url: Url) -> Result<Self, CorrectionError> {
        if config.api_key.is_none() {
            tracing::warn!("No corrector API key configured, sending unauthenticated requests");
        }

        Self::new(
            url,
            config.api_key.as_deref(),
            config.dataset_id.as_deref(),
            Duration::from_secs(config.timeout_secs),
            config.temperature,
        )
    }
}

#[async_trait]
impl CorrectionEndpoint for HttpCorrectorClient {
    async fn request_correction(
        &self,
        document: &CandidateDocument,
        violations: &[Violation],
    ) -> Result<CorrectorOutput, TransportError> {
        let request = CorrectionRequest {
            original_document: document,
            violations,
            instructions: CORRECTION_SYSTEM_PROMPT,
            prompt: build_correction_prompt(document, violations),
            temperature: self.temperature,
            stream_response: false,
        };

        tracing::debug!(
            url = %self.url,
            violations = violations.len(),
            "Requesting document correction"
        );

        let response = self
            .client
            .post(self.url.clone())
            .json(&request)
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

        Ok(interpret_response_body(body))
    }
}

/// Map a correction response body onto [`CorrectorOutput`]
///
/// Chat-style services wrap the answer in a `message` field; anything else that
/// parses as JSON is taken as the answer itself, and everything else is text.
fn interpret_response_body(body: String) -> CorrectorOutput {
    match serde_json::from_str::<Value>(&body) {
        Ok(Value::Object(mut map)) => match map.remove("message") {
            Some(Value::String(text)) => CorrectorOutput::Text(text),
            Some(message) => CorrectorOutput::Structured(message),
            None => CorrectorOutput::Structured(Value::Object(map)),
        },
        Ok(Value::String(text)) => CorrectorOutput::Text(text),
        Ok(other) => CorrectorOutput::Structured(other),
        Err(_) => CorrectorOutput::Text(body),
    }
}
