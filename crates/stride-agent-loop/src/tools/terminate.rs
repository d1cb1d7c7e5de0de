//! Terminator tool: ends the current step with a closing message.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use stride_contract::tool::{
    Tool, ToolCallContext, ToolDescriptor, ToolError, ToolExecuteResult, ToolKind,
};

pub const TERMINATE_TOOL_NAME: &str = "terminate";

/// Ends the step. In a multi-tool turn it is scheduled strictly after all
/// non-terminator tools complete.
#[derive(Default)]
pub struct TerminateTool {
    terminated: AtomicBool,
    last_message: Mutex<Option<String>>,
}

impl TerminateTool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    pub fn last_message(&self) -> Option<String> {
        self.last_message.lock().ok().and_then(|m| m.clone())
    }
}

#[async_trait]
impl Tool for TerminateTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new(
            TERMINATE_TOOL_NAME,
            "Terminate the current step and report its final message. Call this when the \
             current step requirements are fulfilled.",
        )
        .with_parameters(json!({
            "type": "object",
            "properties": {
                "message": {
                    "type": "string",
                    "description": "Final message summarizing the completed step"
                }
            },
            "required": ["message"]
        }))
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Terminate
    }

    fn terminable(&self) -> bool {
        true
    }

    fn can_terminate(&self) -> bool {
        true
    }

    fn execute(&self, args: Value, _ctx: &ToolCallContext) -> Result<ToolExecuteResult, ToolError> {
        let message = match args.get("message") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        };
        self.terminated.store(true, Ordering::SeqCst);
        if let Ok(mut last) = self.last_message.lock() {
            *last = Some(message.clone());
        }
        Ok(ToolExecuteResult::new(message))
    }

    fn current_state_string(&self) -> Option<String> {
        self.last_message()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminate_reports_message_and_flags() {
        let tool = TerminateTool::new();
        assert!(!tool.terminated());
        let out = tool
            .execute(
                json!({"message": "all done"}),
                &ToolCallContext::new("tc", 0),
            )
            .unwrap();
        assert_eq!(out.output, "all done");
        assert!(tool.terminated());
        assert!(tool.can_terminate());
        assert_eq!(tool.kind(), ToolKind::Terminate);
    }
}
