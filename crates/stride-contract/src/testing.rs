//! Test doubles shared across the workspace's suites.

use crate::tool::{Tool, ToolCallContext, ToolDescriptor, ToolError, ToolExecuteResult};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Mutex;

/// Tool that records every invocation and answers with a fixed output.
pub struct RecordingTool {
    name: String,
    output: String,
    calls: Mutex<Vec<(Value, ToolCallContext)>>,
}

impl RecordingTool {
    pub fn new(name: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            output: output.into(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(Value, ToolCallContext)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }
}

#[async_trait]
impl Tool for RecordingTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new(self.name.clone(), "records invocations")
    }

    fn execute(&self, args: Value, ctx: &ToolCallContext) -> Result<ToolExecuteResult, ToolError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((args, ctx.clone()));
        }
        Ok(ToolExecuteResult::new(self.output.clone()))
    }
}

/// Tool that records which plan ids its `cleanup` was invoked with.
pub struct CleanupProbeTool {
    cleaned: Mutex<Vec<String>>,
}

impl CleanupProbeTool {
    pub fn new() -> Self {
        Self {
            cleaned: Mutex::new(Vec::new()),
        }
    }

    pub fn cleaned_plans(&self) -> Vec<String> {
        self.cleaned.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl Default for CleanupProbeTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for CleanupProbeTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new("cleanup_probe", "records cleanup calls")
    }

    fn execute(
        &self,
        _args: Value,
        _ctx: &ToolCallContext,
    ) -> Result<ToolExecuteResult, ToolError> {
        Ok(ToolExecuteResult::new("ok"))
    }

    fn cleanup(&self, plan_id: &str) {
        if let Ok(mut cleaned) = self.cleaned.lock() {
            cleaned.push(plan_id.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn recording_tool_captures_args_and_context() {
        let tool = RecordingTool::new("probe", "answer");
        let ctx = ToolCallContext::new("tc-1", 2);
        let out = tool.execute(json!({"q": "x"}), &ctx).unwrap();
        assert_eq!(out.output, "answer");
        let calls = tool.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0["q"], "x");
        assert_eq!(calls[0].1.plan_depth, 2);
    }

    #[test]
    fn cleanup_probe_records_plan_ids() {
        let tool = CleanupProbeTool::new();
        tool.cleanup("plan-1");
        tool.cleanup("plan-2");
        assert_eq!(tool.cleaned_plans(), vec!["plan-1", "plan-2"]);
    }
}
