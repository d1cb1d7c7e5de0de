//! Cooperative interruption, keyed by root plan id.
//!
//! Interruption is a per-root-plan cancellation token checked at step
//! start, think start, act start, around tool batches, and on each form
//! poll. Tool executions already in flight run to completion; their
//! results are discarded by the caller.

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
pub struct InterruptionRegistry {
    tokens: DashMap<String, CancellationToken>,
}

impl InterruptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token for a root plan, created on first use.
    pub fn token(&self, root_plan_id: &str) -> CancellationToken {
        self.tokens
            .entry(root_plan_id.to_string())
            .or_default()
            .clone()
    }

    /// Request interruption of a root plan and all of its sub-plans.
    pub fn interrupt(&self, root_plan_id: &str) {
        self.token(root_plan_id).cancel();
    }

    /// Returns `true` when execution may continue.
    pub fn check_and_continue(&self, root_plan_id: &str) -> bool {
        match self.tokens.get(root_plan_id) {
            Some(token) => !token.is_cancelled(),
            None => true,
        }
    }

    /// Drop state for a finished root plan.
    pub fn clear(&self, root_plan_id: &str) {
        self.tokens.remove(root_plan_id);
    }
}
