//! Recovering a JSON document from corrector output
//!
//! Generative services wrap their answer in prose or markdown often enough
//! that a strict parse alone loses most corrections.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::model::CandidateDocument;

static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json|JSON)?[ \t]*\r?\n(.*?)\r?\n[ \t]*```")
        .expect("fenced block pattern is valid")
});

/// What the correction service handed back
#[derive(Debug, Clone, PartialEq)]
pub enum CorrectorOutput {
    /// Already-parsed JSON
    Structured(Value),
    /// Free text that may embed JSON
    Text(String),
}

impl CorrectorOutput {
    /// Text form for diagnostics
    pub fn raw_text(&self) -> String {
        match self {
            Self::Structured(value) => value.to_string(),
            Self::Text(text) => text.clone(),
        }
    }
}

/// Which strategy produced the document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStrategy {
    Structured,
    StrictJson,
    FencedBlock,
    BraceScan,
}

#[derive(Debug, thiserror::Error)]
#[error("no JSON document found in corrector output")]
pub struct ExtractionFailure {
    pub raw_text: String,
}

/// Extract the corrected document from corrector output
pub fn extract_document(output: &CorrectorOutput) -> Result<CandidateDocument, ExtractionFailure> {
    extract_with_strategy(output).map(|(document, _)| document)
}

/// Extract and report which strategy matched
pub fn extract_with_strategy(
    output: &CorrectorOutput,
) -> Result<(CandidateDocument, ExtractionStrategy), ExtractionFailure> {
    let text = match output {
        CorrectorOutput::Structured(Value::Object(map)) => {
            return Ok((
                CandidateDocument::try_from(Value::Object(map.clone()))
                    .map_err(|_| failure(output))?,
                ExtractionStrategy::Structured,
            ));
        }
        CorrectorOutput::Structured(Value::String(text)) => text.as_str(),
        CorrectorOutput::Structured(_) => return Err(failure(output)),
        CorrectorOutput::Text(text) => text.as_str(),
    };

    if let Some(document) = parse_object(text) {
        return Ok((document, ExtractionStrategy::StrictJson));
    }

    if let Some(document) = FENCED_BLOCK
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|block| parse_object(block.as_str()))
    {
        return Ok((document, ExtractionStrategy::FencedBlock));
    }

    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            if let Some(document) = parse_object(&text[start..=end]) {
                return Ok((document, ExtractionStrategy::BraceScan));
            }
        }
    }

    Err(failure(output))
}

fn parse_object(text: &str) -> Option<CandidateDocument> {
    serde_json::from_str::<Value>(text.trim())
        .ok()
        .and_then(|value| CandidateDocument::try_from(value).ok())
}

fn failure(output: &CorrectorOutput) -> ExtractionFailure {
    ExtractionFailure {
        raw_text: output.raw_text(),
    }
}
