//! Identifier dispatch for plans, steps, and tool calls.

use uuid::Uuid;

/// Generates prefixed, time-ordered identifiers.
#[derive(Debug, Default, Clone)]
pub struct IdDispatcher;

impl IdDispatcher {
    pub fn new() -> Self {
        Self
    }

    fn next(prefix: &str) -> String {
        format!("{prefix}-{}", Uuid::now_v7().simple())
    }

    pub fn plan_id(&self) -> String {
        Self::next("plan")
    }

    pub fn sub_plan_id(&self) -> String {
        Self::next("sub")
    }

    pub fn step_id(&self) -> String {
        Self::next("step")
    }

    pub fn tool_call_id(&self) -> String {
        Self::next("toolcall")
    }

    pub fn think_act_id(&self) -> String {
        Self::next("thinkact")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_prefixed_and_unique() {
        let ids = IdDispatcher::new();
        let a = ids.tool_call_id();
        let b = ids.tool_call_id();
        assert!(a.starts_with("toolcall-"));
        assert_ne!(a, b);
        assert!(ids.plan_id().starts_with("plan-"));
        assert!(ids.think_act_id().starts_with("thinkact-"));
    }
}
