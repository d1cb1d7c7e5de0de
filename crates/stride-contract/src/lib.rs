//! Core contracts for the stride agent execution runtime.
//!
//! This crate defines the shared vocabulary of the workspace: the message
//! model, the tool contract, the plan/step data model, the collaborator
//! traits (recorder, template store, model registry, directory manager),
//! runtime primitives (level pools, interruption, id dispatch), and the
//! workspace configuration.

pub mod config;
pub mod error;
pub mod message;
pub mod plan;
pub mod record;
pub mod registry;
pub mod runtime;
pub mod store;
pub mod testing;
pub mod tool;

pub use config::StrideConfig;
pub use error::AgentError;
pub use message::{Message, MessageMetadata, Role, ToolCall};
pub use plan::{
    AgentState, ExecutionContext, Plan, PlanExecutionResult, PlanTemplate, Step, StepResult,
    INTERRUPTED_MARKER,
};
pub use record::{ActToolParam, InMemoryRecorder, NoopRecorder, Recorder, ThinkActRecord};
pub use registry::{ServiceGroupIndex, ToolRegistry};
pub use runtime::{IdDispatcher, InterruptionRegistry, LevelPools};
pub use store::{
    DirectoryManager, InMemoryTemplateStore, ModelChanged, ModelConfig, ModelRegistry,
    NoopDirectoryManager, PlanTemplateStore, StaticModelRegistry,
};
pub use tool::{
    GateStatus, Tool, ToolCallContext, ToolDescriptor, ToolError, ToolExecuteResult,
    ToolInputKind, ToolKind, UserInputGate,
};
