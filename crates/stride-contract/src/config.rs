//! Workspace configuration.

/// Runtime configuration for the agent execution core.
///
/// Defaults reproduce the documented values; individual agents may
/// override `max_steps` through their definition.
#[derive(Debug, Clone)]
pub struct StrideConfig {
    /// Per-agent step budget.
    pub max_steps: u32,
    /// If true, the system prompt invites multi-tool turns.
    pub parallel_tool_calls: bool,
    /// If true, requests reasoning text before each tool call.
    pub debug_detail: bool,
    /// Gate on conversation-memory retrieval.
    pub enable_conversation_memory: bool,
    /// Compression threshold over the combined serialized message lists.
    pub conversation_memory_max_chars: usize,
    /// Max messages retained by the window store before compression.
    pub max_memory: usize,
    /// Form-input wait, seconds.
    pub user_input_timeout_secs: u64,
    /// Form state poll interval.
    pub form_poll_interval_ms: u64,
    /// Interruption recheck interval while waiting on a form.
    pub interruption_recheck_ms: u64,
    /// Exclusive form-slot acquisition timeout.
    pub form_lock_timeout_ms: u64,
    /// LLM retry attempts per think.
    pub llm_max_retries: u32,
    /// Exponential backoff base.
    pub retry_base_ms: u64,
    /// Exponential backoff cap.
    pub retry_max_ms: u64,
    /// Consecutive tool-free responses before the step fails.
    pub early_termination_threshold: u32,
    /// Identical consecutive tool results before forced compression.
    pub repeated_result_threshold: usize,
    /// Share of characters kept as recent rounds during compression.
    pub retention_ratio: f64,
    pub summary_min_chars: usize,
    pub summary_max_chars: usize,
    /// Floor hint for the newest kept round; not a hard bound.
    pub recent_chars_hint: usize,
    /// Number of depth-isolated executor pools.
    pub pool_levels: usize,
    /// Worker threads per pool level.
    pub pool_threads_per_level: usize,
}

impl Default for StrideConfig {
    fn default() -> Self {
        Self {
            max_steps: 10,
            parallel_tool_calls: true,
            debug_detail: false,
            enable_conversation_memory: true,
            conversation_memory_max_chars: 30_000,
            max_memory: 100,
            user_input_timeout_secs: 300,
            form_poll_interval_ms: 500,
            interruption_recheck_ms: 2_000,
            form_lock_timeout_ms: 10_000,
            llm_max_retries: 3,
            retry_base_ms: 2_000,
            retry_max_ms: 60_000,
            early_termination_threshold: 3,
            repeated_result_threshold: 3,
            retention_ratio: 0.4,
            summary_min_chars: 3_000,
            summary_max_chars: 4_000,
            recent_chars_hint: 5_000,
            pool_levels: 4,
            pool_threads_per_level: 4,
        }
    }
}

impl StrideConfig {
    #[must_use]
    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    #[must_use]
    pub fn with_parallel_tool_calls(mut self, enabled: bool) -> Self {
        self.parallel_tool_calls = enabled;
        self
    }

    #[must_use]
    pub fn with_debug_detail(mut self, enabled: bool) -> Self {
        self.debug_detail = enabled;
        self
    }

    #[must_use]
    pub fn with_conversation_memory(mut self, enabled: bool) -> Self {
        self.enable_conversation_memory = enabled;
        self
    }

    #[must_use]
    pub fn with_memory_max_chars(mut self, max_chars: usize) -> Self {
        self.conversation_memory_max_chars = max_chars;
        self
    }

    #[must_use]
    pub fn with_user_input_timeout_secs(mut self, secs: u64) -> Self {
        self.user_input_timeout_secs = secs;
        self
    }

    /// Exponential backoff delay for a 1-based attempt number:
    /// `min(base · 2^(attempt-1), cap)`.
    pub fn retry_backoff_ms(&self, attempt: u32) -> u64 {
        let shift = attempt.saturating_sub(1).min(20);
        let factor = 1u64 << shift;
        self.retry_base_ms
            .saturating_mul(factor)
            .min(self.retry_max_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = StrideConfig::default();
        assert_eq!(config.max_steps, 10);
        assert_eq!(config.conversation_memory_max_chars, 30_000);
        assert_eq!(config.llm_max_retries, 3);
        assert_eq!(config.early_termination_threshold, 3);
        assert_eq!(config.repeated_result_threshold, 3);
        assert!((config.retention_ratio - 0.4).abs() < f64::EPSILON);
        assert_eq!(config.summary_min_chars, 3_000);
        assert_eq!(config.summary_max_chars, 4_000);
        assert_eq!(config.form_poll_interval_ms, 500);
        assert_eq!(config.interruption_recheck_ms, 2_000);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let config = StrideConfig::default();
        assert_eq!(config.retry_backoff_ms(1), 2_000);
        assert_eq!(config.retry_backoff_ms(2), 4_000);
        assert_eq!(config.retry_backoff_ms(3), 8_000);
        assert_eq!(config.retry_backoff_ms(10), 60_000);
    }
}
