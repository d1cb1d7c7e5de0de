//! LLM error type and retry classification.

use thiserror::Error;

/// Errors from LLM access.
#[derive(Debug, Clone, Error)]
pub enum LlmError {
    #[error("Model not configured: {0}")]
    ModelNotConfigured(String),

    #[error("LLM call failed: {0}")]
    Call(String),

    #[error("LLM stream failed: {0}")]
    Stream(String),
}

impl LlmError {
    /// Whether the think loop may retry this failure with backoff.
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::ModelNotConfigured(_) => false,
            LlmError::Call(msg) | LlmError::Stream(msg) => is_retryable_llm_error(msg),
        }
    }
}

/// Network-level failures are retryable: DNS resolution, connection
/// errors, and timeouts. Anything else aborts the retry loop.
pub fn is_retryable_llm_error(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    let retryable = [
        "failed to resolve",
        "dns",
        "timeout",
        "timed out",
        "connection",
    ];
    retryable.iter().any(|p| lower.contains(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_errors_are_retryable() {
        assert!(is_retryable_llm_error("Failed to resolve host"));
        assert!(is_retryable_llm_error("DnsNameResolverTimeoutException"));
        assert!(is_retryable_llm_error("read timeout after 30s"));
        assert!(is_retryable_llm_error("Connection reset by peer"));
    }

    #[test]
    fn provider_errors_are_not_retryable() {
        assert!(!is_retryable_llm_error("401 unauthorized"));
        assert!(!is_retryable_llm_error("invalid request body"));
        assert!(!is_retryable_llm_error(""));
    }

    #[test]
    fn error_variants_classify() {
        assert!(LlmError::Call("connection refused".into()).is_retryable());
        assert!(!LlmError::Call("bad request".into()).is_retryable());
        assert!(!LlmError::ModelNotConfigured("x".into()).is_retryable());
    }
}
