//! Instructions sent with every correction request

use crate::model::{CandidateDocument, Violation};

/// Standing instructions for the correction service
pub const CORRECTION_SYSTEM_PROMPT: &str = r#"You are an expert at fixing OCSF schema violations. Given the original JSON and validation errors, fix the specific fields to make the JSON fully compliant with the OCSF schema.

Follow these rules:
1. Only modify fields mentioned in validation errors
2. Preserve all other fields exactly as they are
3. Ensure all required fields are present
4. Match data types exactly as specified in the schema

Return only the corrected JSON with no additional text or explanation."#;

/// Render the per-document request text
pub fn build_correction_prompt(document: &CandidateDocument, violations: &[Violation]) -> String {
    let document_json = serde_json::to_string_pretty(document.as_map()).unwrap_or_default();
    let violations_json = serde_json::to_string_pretty(violations).unwrap_or_default();

    format!(
        r#"Fix the following OCSF JSON based on the validation errors.

Original JSON:
{document_json}

Validation Errors:
{violations_json}

Return the corrected JSON."#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_prompt_embeds_document_and_violations() {
        let doc = CandidateDocument::try_from(json!({"class_uid": 1001})).unwrap();
        let violations = vec![Violation::new("attribute_required", Some("severity_id"), "missing")];
        let prompt = build_correction_prompt(&doc, &violations);
        assert!(prompt.contains("\"class_uid\": 1001"));
        assert!(prompt.contains("severity_id"));
        assert!(prompt.ends_with("Return the corrected JSON."));
    }
}
