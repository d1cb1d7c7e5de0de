//! Error reporting tools.
//!
//! Both tools emit `{"errorMessage": …}` JSON. The agent extracts the
//! field onto the step so the failure is visible in the UI.
//! `ErrorReportTool` is chosen by the LLM and terminates the step;
//! `SystemErrorReportTool` is invoked by the runtime to surface internal
//! failures and leaves termination to the caller.

use async_trait::async_trait;
use serde_json::{json, Value};
use stride_contract::tool::{
    Tool, ToolCallContext, ToolDescriptor, ToolError, ToolExecuteResult, ToolKind,
};

pub const ERROR_REPORT_TOOL_NAME: &str = "error_report";
pub const SYSTEM_ERROR_REPORT_TOOL_NAME: &str = "system_error_report";

fn error_payload(args: &Value) -> String {
    let message = args
        .get("errorMessage")
        .and_then(Value::as_str)
        .unwrap_or_default();
    json!({ "errorMessage": message }).to_string()
}

/// Reports an error the LLM has decided cannot be worked around.
#[derive(Default)]
pub struct ErrorReportTool;

impl ErrorReportTool {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Tool for ErrorReportTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new(
            ERROR_REPORT_TOOL_NAME,
            "Report an unrecoverable error encountered while working on the current step.",
        )
        .with_parameters(json!({
            "type": "object",
            "properties": {
                "errorMessage": {
                    "type": "string",
                    "description": "Description of the error"
                }
            },
            "required": ["errorMessage"]
        }))
    }

    fn kind(&self) -> ToolKind {
        ToolKind::ErrorReport
    }

    fn terminable(&self) -> bool {
        true
    }

    fn can_terminate(&self) -> bool {
        true
    }

    fn execute(&self, args: Value, _ctx: &ToolCallContext) -> Result<ToolExecuteResult, ToolError> {
        Ok(ToolExecuteResult::new(error_payload(&args)))
    }
}

/// Reports an internal runtime failure through the normal tool flow so
/// the UI renders it like any other tool response.
#[derive(Default)]
pub struct SystemErrorReportTool;

impl SystemErrorReportTool {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Tool for SystemErrorReportTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new(
            SYSTEM_ERROR_REPORT_TOOL_NAME,
            "Report a system-level execution error.",
        )
        .with_parameters(json!({
            "type": "object",
            "properties": {
                "errorMessage": {
                    "type": "string",
                    "description": "Description of the system error"
                }
            },
            "required": ["errorMessage"]
        }))
    }

    fn kind(&self) -> ToolKind {
        ToolKind::SystemErrorReport
    }

    fn execute(&self, args: Value, _ctx: &ToolCallContext) -> Result<ToolExecuteResult, ToolError> {
        Ok(ToolExecuteResult::new(error_payload(&args)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_is_structured_json() {
        let tool = ErrorReportTool::new();
        let out = tool
            .execute(
                json!({"errorMessage": "disk full"}),
                &ToolCallContext::new("tc", 0),
            )
            .unwrap();
        let value: Value = serde_json::from_str(&out.output).unwrap();
        assert_eq!(value["errorMessage"], "disk full");
        assert!(tool.can_terminate());
    }

    #[test]
    fn system_variant_does_not_terminate() {
        let tool = SystemErrorReportTool::new();
        assert_eq!(tool.kind(), ToolKind::SystemErrorReport);
        assert!(!tool.terminable());
        let out = tool
            .execute(json!({}), &ToolCallContext::new("tc", 0))
            .unwrap();
        assert_eq!(out.output, r#"{"errorMessage":""}"#);
    }
}
