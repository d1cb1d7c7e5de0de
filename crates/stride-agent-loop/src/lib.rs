//! ReAct agent loop.
//!
//! Per plan step the agent alternates think (one streaming LLM call) and
//! act (execute the tool calls the LLM chose). The loop ends when a
//! terminator tool fires, the step budget is exhausted (final-summary
//! path), the user interrupts, or a final failure occurs.

pub mod agent;
pub mod definition;
pub mod dispatch;
pub mod form;
pub mod prompt;
pub mod result;
pub mod services;
pub mod tools;

pub use agent::{AgentExecResult, AgentRunContext, DynamicAgent};
pub use definition::AgentDefinition;
pub use dispatch::{EnvelopeStatus, ExecutionRequest, ToolDispatcher, ToolEnvelope};
pub use form::{wait_for_input_or_timeout, FormInputService};
pub use result::process_tool_result;
pub use services::AgentServices;
