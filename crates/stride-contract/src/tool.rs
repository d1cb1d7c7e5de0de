//! Tool contract for agent actions.
//!
//! Tools are registered under qualified keys (`serviceGroup_toolName`) and
//! invoked by the agent loop. A tool declares its behavioral role through
//! [`ToolKind`] and its termination behavior through
//! [`Tool::terminable`]/[`Tool::can_terminate`] instead of subtype checks.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Tool execution errors.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result of one tool execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolExecuteResult {
    /// Raw output string handed back to the LLM.
    pub output: String,
}

impl ToolExecuteResult {
    pub fn new(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
        }
    }
}

/// Behavioral role of a tool, replacing instance-of dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    /// Regular tool with no protocol meaning.
    Standard,
    /// Ends the current step when called.
    Terminate,
    /// Renders a form and waits for user input.
    FormInput,
    /// Reports a recoverable error chosen by the LLM.
    ErrorReport,
    /// Reports an internal system error on behalf of the runtime.
    SystemErrorReport,
}

/// How the dispatcher should hand arguments to the tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolInputKind {
    /// Tool consumes the parsed argument object directly.
    #[default]
    Mapping,
    /// Tool deserializes a typed input; arguments go through an ordered
    /// JSON round-trip before the call.
    Structured,
}

/// Tool descriptor containing metadata and the parameter schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Unqualified tool name.
    pub name: String,
    /// Tool description shown to the LLM.
    pub description: String,
    /// Service group this tool belongs to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_group: Option<String>,
    /// JSON schema for parameters.
    pub parameters: Value,
    /// Argument handling declared by the tool.
    #[serde(default)]
    pub input: ToolInputKind,
}

impl ToolDescriptor {
    /// Create a new tool descriptor with an empty object schema.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            service_group: None,
            parameters: serde_json::json!({"type": "object", "properties": {}}),
            input: ToolInputKind::Mapping,
        }
    }

    /// Set the parameter schema.
    #[must_use]
    pub fn with_parameters(mut self, schema: Value) -> Self {
        self.parameters = schema;
        self
    }

    /// Set the service group.
    #[must_use]
    pub fn with_service_group(mut self, group: impl Into<String>) -> Self {
        self.service_group = Some(group.into());
        self
    }

    /// Set the argument handling kind.
    #[must_use]
    pub fn with_input(mut self, input: ToolInputKind) -> Self {
        self.input = input;
        self
    }

    /// Qualified registry key: `serviceGroup_toolName`, or the bare name.
    pub fn qualified_key(&self) -> String {
        match &self.service_group {
            Some(group) => format!("{group}_{}", self.name),
            None => self.name.clone(),
        }
    }
}

/// Per-call context passed to every tool execution.
///
/// Sub-plans spawned by a tool inherit `tool_call_id` for lineage and run
/// at `plan_depth + 1`.
#[derive(Debug, Clone, Default)]
pub struct ToolCallContext {
    /// Correlation id of the originating tool call.
    pub tool_call_id: String,
    /// Recursion depth of the calling plan (0 = top-level).
    pub plan_depth: usize,
    /// Plan that issued the call.
    pub current_plan_id: Option<String>,
    /// Root plan of the call's lineage.
    pub root_plan_id: Option<String>,
}

impl ToolCallContext {
    pub fn new(tool_call_id: impl Into<String>, plan_depth: usize) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            plan_depth,
            current_plan_id: None,
            root_plan_id: None,
        }
    }

    #[must_use]
    pub fn with_plan_ids(
        mut self,
        current_plan_id: impl Into<String>,
        root_plan_id: impl Into<String>,
    ) -> Self {
        self.current_plan_id = Some(current_plan_id.into());
        self.root_plan_id = Some(root_plan_id.into());
        self
    }
}

/// Wait states of a user-input gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GateStatus {
    #[default]
    Idle,
    AwaitingUserInput,
    InputReceived,
    InputTimeout,
}

#[derive(Debug, Default)]
struct GateState {
    status: GateStatus,
    submitted: Option<Value>,
}

/// Rendezvous state machine for tools that block on user input.
///
/// The owning tool opens the gate when it renders its request; the
/// runtime polls [`GateStatus`] until input arrives or the wait times
/// out. Interruption uses the timeout transition.
#[derive(Debug, Default)]
pub struct UserInputGate {
    inner: std::sync::Mutex<GateState>,
}

impl UserInputGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> GateStatus {
        self.inner.lock().map(|s| s.status).unwrap_or_default()
    }

    /// Start awaiting user input.
    pub fn open(&self) {
        if let Ok(mut state) = self.inner.lock() {
            state.status = GateStatus::AwaitingUserInput;
            state.submitted = None;
        }
    }

    /// Deliver submitted values; only valid while awaiting.
    pub fn receive(&self, values: Value) {
        if let Ok(mut state) = self.inner.lock() {
            if state.status == GateStatus::AwaitingUserInput {
                state.submitted = Some(values);
                state.status = GateStatus::InputReceived;
            }
        }
    }

    /// Transition an awaiting gate to timeout.
    pub fn timeout(&self) {
        if let Ok(mut state) = self.inner.lock() {
            if state.status == GateStatus::AwaitingUserInput {
                state.status = GateStatus::InputTimeout;
            }
        }
    }

    /// Reset to idle, dropping any submission.
    pub fn reset(&self) {
        if let Ok(mut state) = self.inner.lock() {
            *state = GateState::default();
        }
    }

    pub fn submitted(&self) -> Option<Value> {
        self.inner.lock().ok().and_then(|s| s.submitted.clone())
    }
}

/// Tool trait implemented by every registered tool.
///
/// `execute` is the synchronous entry point; it runs on the level pool for
/// the caller's depth. Tools that are naturally asynchronous override
/// `execute_async` and return `true` from `is_async` so the dispatcher
/// awaits them directly instead of occupying a pool worker.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool descriptor.
    fn descriptor(&self) -> ToolDescriptor;

    /// Behavioral role of this tool.
    fn kind(&self) -> ToolKind {
        ToolKind::Standard
    }

    /// Whether this tool participates in the terminable protocol.
    fn terminable(&self) -> bool {
        false
    }

    /// Post-call termination predicate, read after `execute` returns.
    fn can_terminate(&self) -> bool {
        false
    }

    /// True when `execute_async` is the preferred entry point.
    fn is_async(&self) -> bool {
        false
    }

    /// Execute the tool synchronously.
    fn execute(&self, args: Value, ctx: &ToolCallContext) -> Result<ToolExecuteResult, ToolError>;

    /// Execute the tool asynchronously. Defaults to the sync path.
    async fn execute_async(
        &self,
        args: Value,
        ctx: &ToolCallContext,
    ) -> Result<ToolExecuteResult, ToolError> {
        self.execute(args, ctx)
    }

    /// Release per-plan resources held by the tool.
    fn cleanup(&self, _plan_id: &str) {}

    /// Current state string surfaced into the step environment snapshot.
    fn current_state_string(&self) -> Option<String> {
        None
    }

    /// User-input gate for tools that block on the user, `None` otherwise.
    fn input_gate(&self) -> Option<&UserInputGate> {
        None
    }
}

/// State string with unified error handling: a panic-free wrapper used when
/// building environment snapshots.
pub fn current_state_string_or_empty(tool: &dyn Tool) -> String {
    tool.current_state_string().unwrap_or_default()
}
