//! Plan and step data model.
//!
//! A plan is an ordered sequence of steps, each bound to an agent variant
//! through an optional `[TAG]` prefix on the requirement text. Plans are
//! mutated only by their owning executor.

use serde::{Deserialize, Serialize};

/// Canonical marker placed in step results when the user interrupts.
pub const INTERRUPTED_MARKER: &str = "Execution interrupted by user";

/// Agent / step execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Idle,
    InProgress,
    Completed,
    Failed,
    Interrupted,
}

impl AgentState {
    /// Terminal states end the agent round loop.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AgentState::Completed | AgentState::Failed | AgentState::Interrupted
        )
    }
}

/// One unit of work inside a plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub step_id: String,
    pub step_index: usize,
    /// Requirement text, optionally starting with a `[TAG]` agent selector.
    pub step_requirement: String,
    /// Name of the agent that executed this step, once assigned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
    pub status: AgentState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl Step {
    pub fn new(step_id: impl Into<String>, step_requirement: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            step_index: 0,
            step_requirement: step_requirement.into(),
            agent_name: None,
            status: AgentState::Idle,
            result: None,
            error_message: None,
        }
    }
}

/// An ordered sequence of steps with identity and lineage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub current_plan_id: String,
    /// Equals `current_plan_id` iff the plan is top-level.
    pub root_plan_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_plan_id: Option<String>,
    pub title: String,
    /// Recursion depth; 0 = top-level.
    pub depth: usize,
    pub steps: Vec<Step>,
    /// Final result, set on successful completion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

impl Plan {
    /// Create a top-level plan (root id = own id, depth 0).
    pub fn new(plan_id: impl Into<String>, title: impl Into<String>) -> Self {
        let id = plan_id.into();
        Self {
            root_plan_id: id.clone(),
            current_plan_id: id,
            parent_plan_id: None,
            title: title.into(),
            depth: 0,
            steps: Vec::new(),
            result: None,
        }
    }

    /// Create a sub-plan under an existing lineage.
    pub fn sub_plan(
        plan_id: impl Into<String>,
        root_plan_id: impl Into<String>,
        parent_plan_id: impl Into<String>,
        depth: usize,
        title: impl Into<String>,
    ) -> Self {
        Self {
            current_plan_id: plan_id.into(),
            root_plan_id: root_plan_id.into(),
            parent_plan_id: Some(parent_plan_id.into()),
            title: title.into(),
            depth,
            steps: Vec::new(),
            result: None,
        }
    }

    #[must_use]
    pub fn with_steps(mut self, steps: Vec<Step>) -> Self {
        self.steps = steps;
        self.update_step_indices();
        self
    }

    pub fn is_root(&self) -> bool {
        self.root_plan_id == self.current_plan_id
    }

    /// Renumber step indices to match list order.
    pub fn update_step_indices(&mut self) {
        for (i, step) in self.steps.iter_mut().enumerate() {
            step.step_index = i;
        }
    }
}

/// Outcome of one step, collected into the plan result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub step_index: usize,
    pub step_requirement: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    pub status: AgentState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
}

/// Final outcome of a plan run. Failures are conveyed here, never thrown.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanExecutionResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_result: Option<String>,
    pub step_results: Vec<StepResult>,
}

impl PlanExecutionResult {
    /// The final result if set, otherwise the last step's result.
    pub fn effective_result(&self) -> Option<&str> {
        self.final_result
            .as_deref()
            .or_else(|| self.step_results.last().and_then(|s| s.result.as_deref()))
    }
}

/// A stored plan template: requirements only, instantiated per request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanTemplate {
    pub id: String,
    pub title: String,
    pub step_requirements: Vec<String>,
}

impl PlanTemplate {
    /// Instantiate the template into a top-level plan.
    pub fn instantiate(&self, plan_id: impl Into<String>, step_ids: Vec<String>) -> Plan {
        let steps = self
            .step_requirements
            .iter()
            .zip(step_ids)
            .map(|(req, id)| Step::new(id, req))
            .collect();
        Plan::new(plan_id, self.title.clone()).with_steps(steps)
    }
}

/// Everything a plan run carries across the executor and its agents.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub plan: Plan,
    /// Cross-plan user-visible conversation, if memory is enabled.
    pub conversation_id: Option<String>,
    /// Upload batch to sync into the plan directory before execution.
    pub upload_key: Option<String>,
    /// Tool call that spawned this plan, for sub-plan lineage.
    pub tool_call_id: Option<String>,
    /// User-facing request title.
    pub title: Option<String>,
    pub success: bool,
}

impl ExecutionContext {
    pub fn new(plan: Plan) -> Self {
        Self {
            plan,
            conversation_id: None,
            upload_key: None,
            tool_call_id: None,
            title: None,
            success: false,
        }
    }

    #[must_use]
    pub fn with_conversation_id(mut self, id: impl Into<String>) -> Self {
        self.conversation_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_upload_key(mut self, key: impl Into<String>) -> Self {
        self.upload_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn with_tool_call_id(mut self, id: impl Into<String>) -> Self {
        self.tool_call_id = Some(id.into());
        self
    }

    pub fn current_plan_id(&self) -> &str {
        &self.plan.current_plan_id
    }

    pub fn root_plan_id(&self) -> &str {
        &self.plan.root_plan_id
    }

    pub fn depth(&self) -> usize {
        self.plan.depth
    }
}
