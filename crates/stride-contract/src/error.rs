//! Error kinds crossing step and plan boundaries.
//!
//! Errors are materialized as data: steps carry an `error_message`, plan
//! results carry an `error_message`, and tool failures travel as result
//! envelopes. This enum exists for the paths where the agent loop itself
//! must distinguish failure classes.

use thiserror::Error;

/// Failure classes of the agent loop.
#[derive(Debug, Clone, Error)]
pub enum AgentError {
    /// User cancellation; propagates to step and plan result, never retried.
    #[error("Execution interrupted by user: {0}")]
    Interrupted(String),

    /// Network/timeout/DNS failure; retried with exponential backoff.
    #[error("LLM call failed: {0}")]
    LlmTransient(String),

    /// The LLM repeatedly answered without tool calls.
    #[error(
        "Early termination threshold reached: LLM returned thinking-only responses without tool calls {attempts} times. The model must call tools to proceed."
    )]
    LlmToolless { attempts: u32 },

    /// Non-retryable LLM error.
    #[error("LLM error: {0}")]
    LlmFatal(String),

    /// Form input wait elapsed.
    #[error("Input timeout occurred")]
    FormTimeout,

    /// Uncaught failure bubbling out of the step loop.
    #[error("Plan execution failed: {0}")]
    PlanFatal(String),
}

impl AgentError {
    /// Only transient LLM failures are eligible for retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AgentError::LlmTransient(_))
    }
}
