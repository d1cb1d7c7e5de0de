//! Agent variant definitions.

use serde::{Deserialize, Serialize};

/// One configurable agent variant: a name, a next-step prompt, the tool
/// keys it may use, and optional model / step-budget overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDefinition {
    pub name: String,
    pub description: String,
    /// Prompt template for the next step. The placeholder
    /// `{current_step_env_data}` is replaced with the rendered
    /// environment block.
    pub next_step_prompt: String,
    /// Qualified keys of the tools this agent may call.
    pub available_tool_keys: Vec<String>,
    /// Bound model name; `None` uses the registry default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    /// Per-agent step budget override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_steps: Option<u32>,
}

impl AgentDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            next_step_prompt: String::new(),
            available_tool_keys: Vec::new(),
            model_name: None,
            max_steps: None,
        }
    }

    #[must_use]
    pub fn with_next_step_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.next_step_prompt = prompt.into();
        self
    }

    #[must_use]
    pub fn with_tool_keys(mut self, keys: Vec<String>) -> Self {
        self.available_tool_keys = keys;
        self
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model_name = Some(model.into());
        self
    }

    #[must_use]
    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = Some(max_steps);
        self
    }
}
