//! Errors shared by the HTTP clients of external services

/// Longest response body echoed into error messages
pub const MAX_BODY_SNIPPET: usize = 512;

/// Failure to get an answer out of a remote endpoint
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode response: {0}")]
    Decode(String),
}

impl TransportError {
    /// Retry predicate for external calls
    ///
    /// Non-2xx answers and undecodable bodies are treated like network
    /// failures: the next attempt may well get a usable answer.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_) | Self::Status { .. } | Self::Decode(_) => true,
        }
    }
}

/// Cut `text` to `max_chars` characters, marking the cut
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let mut out: String = text.chars().take(max_chars).collect();
        out.push('…');
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 3), "abc…");
        assert_eq!(truncate("ééé", 2), "éé…");
    }

    #[test]
    fn test_status_errors_are_retryable() {
        let err = TransportError::Status { status: 502, body: String::new() };
        assert!(err.is_retryable());
        assert!(TransportError::Decode("bad".into()).is_retryable());
    }
}
