//! Form input tool: renders a form definition and waits for the user.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Mutex;
use stride_contract::tool::{
    GateStatus, Tool, ToolCallContext, ToolDescriptor, ToolError, ToolExecuteResult, ToolKind,
    UserInputGate,
};

pub const FORM_INPUT_TOOL_NAME: &str = "form_input";

/// Presents a form to the user and blocks the step on their submission.
/// Never allowed inside a multi-tool turn.
#[derive(Default)]
pub struct FormInputTool {
    gate: UserInputGate,
    definition: Mutex<Option<Value>>,
}

impl FormInputTool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input_state(&self) -> GateStatus {
        self.gate.status()
    }

    /// Record a form definition and start awaiting input.
    pub fn open_form(&self, definition: Value) {
        if let Ok(mut stored) = self.definition.lock() {
            *stored = Some(definition);
        }
        self.gate.open();
    }

    /// Deliver the user's submitted values.
    pub fn receive_input(&self, values: Value) {
        self.gate.receive(values);
    }

    /// Transition an awaiting form to timeout.
    pub fn handle_input_timeout(&self) {
        self.gate.timeout();
    }

    /// Clear the stored form definition (after timeout or cleanup).
    pub fn clear_form(&self) {
        if let Ok(mut stored) = self.definition.lock() {
            *stored = None;
        }
        self.gate.reset();
    }

    fn state_string(&self) -> String {
        let label = match self.gate.status() {
            GateStatus::AwaitingUserInput => "AWAITING_USER_INPUT",
            GateStatus::InputReceived => "INPUT_RECEIVED",
            GateStatus::InputTimeout => "INPUT_TIMEOUT",
            GateStatus::Idle => "IDLE",
        };
        let mut out = Map::new();
        out.insert("state".to_string(), Value::String(label.to_string()));
        if let Some(definition) = self.definition.lock().ok().and_then(|d| d.clone()) {
            out.insert("form".to_string(), definition);
        }
        if let Some(submitted) = self.gate.submitted() {
            out.insert("submitted".to_string(), submitted);
        }
        Value::Object(out).to_string()
    }
}

#[async_trait]
impl Tool for FormInputTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new(
            FORM_INPUT_TOOL_NAME,
            "Present an input form to the user and wait for the submitted values. Use this \
             when required information can only come from the user.",
        )
        .with_parameters(json!({
            "type": "object",
            "properties": {
                "title": {"type": "string"},
                "description": {"type": "string"},
                "inputs": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "name": {"type": "string"},
                            "label": {"type": "string"},
                            "type": {
                                "type": "string",
                                "enum": ["text", "number", "email", "password",
                                         "textarea", "select", "checkbox", "radio"]
                            },
                            "required": {"type": "boolean"},
                            "placeholder": {"type": "string"},
                            "options": {"type": "array", "items": {"type": "string"}}
                        },
                        "required": ["name", "label"]
                    }
                }
            },
            "required": ["inputs", "description"]
        }))
    }

    fn kind(&self) -> ToolKind {
        ToolKind::FormInput
    }

    fn execute(&self, args: Value, _ctx: &ToolCallContext) -> Result<ToolExecuteResult, ToolError> {
        if !args.get("inputs").map(Value::is_array).unwrap_or(false) {
            return Err(ToolError::InvalidArguments(
                "form definition requires an inputs array".to_string(),
            ));
        }
        self.open_form(args);
        Ok(ToolExecuteResult::new(self.state_string()))
    }

    fn cleanup(&self, _plan_id: &str) {
        self.clear_form();
    }

    fn current_state_string(&self) -> Option<String> {
        Some(self.state_string())
    }

    fn input_gate(&self) -> Option<&UserInputGate> {
        Some(&self.gate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition() -> Value {
        json!({
            "title": "login",
            "description": "enter credentials",
            "inputs": [{"name": "user", "label": "User", "type": "text"}]
        })
    }

    #[test]
    fn execute_opens_the_form() {
        let tool = FormInputTool::new();
        let out = tool
            .execute(definition(), &ToolCallContext::new("tc", 0))
            .unwrap();
        assert_eq!(tool.input_state(), GateStatus::AwaitingUserInput);
        assert!(out.output.contains("AWAITING_USER_INPUT"));
        assert!(out.output.contains("enter credentials"));
    }

    #[test]
    fn submission_transitions_to_received() {
        let tool = FormInputTool::new();
        tool.open_form(definition());
        tool.receive_input(json!({"user": "alice"}));
        assert_eq!(tool.input_state(), GateStatus::InputReceived);
        let state = tool.current_state_string().unwrap();
        assert!(state.contains("INPUT_RECEIVED"));
        assert!(state.contains("alice"));
    }

    #[test]
    fn timeout_only_applies_while_awaiting() {
        let tool = FormInputTool::new();
        tool.open_form(definition());
        tool.receive_input(json!({}));
        tool.handle_input_timeout();
        assert_eq!(tool.input_state(), GateStatus::InputReceived);
    }

    #[test]
    fn missing_inputs_is_invalid() {
        let tool = FormInputTool::new();
        let err = tool
            .execute(json!({"description": "x"}), &ToolCallContext::new("tc", 0))
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[test]
    fn cleanup_clears_the_form() {
        let tool = FormInputTool::new();
        tool.open_form(definition());
        tool.cleanup("plan-1");
        assert_eq!(tool.input_state(), GateStatus::Idle);
    }
}
