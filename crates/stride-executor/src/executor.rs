//! The plan executor.

use crate::resolver::AgentTemplateRegistry;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use stride_agent_loop::{AgentRunContext, AgentServices, DynamicAgent};
use stride_contract::{
    AgentState, DirectoryManager, ExecutionContext, PlanExecutionResult, Step, StepResult,
    INTERRUPTED_MARKER,
};
use tokio::task::JoinHandle;

/// Realizes a plan end-to-end: step loop, agent resolution, interruption,
/// recording, and cleanup. Cheap to clone; all state is shared.
#[derive(Clone)]
pub struct PlanExecutor {
    services: Arc<AgentServices>,
    agents: Arc<AgentTemplateRegistry>,
    directories: Arc<dyn DirectoryManager>,
}

impl PlanExecutor {
    pub fn new(
        services: Arc<AgentServices>,
        agents: Arc<AgentTemplateRegistry>,
        directories: Arc<dyn DirectoryManager>,
    ) -> Self {
        Self {
            services,
            agents,
            directories,
        }
    }

    pub fn services(&self) -> &Arc<AgentServices> {
        &self.services
    }

    /// Execute every step of the plan on the pool for the plan's depth.
    ///
    /// The returned handle always resolves to a result: failures are
    /// conveyed inside [`PlanExecutionResult`], never as task errors.
    pub fn execute_all(&self, ctx: ExecutionContext) -> JoinHandle<PlanExecutionResult> {
        let depth = ctx.depth();
        let executor = self.clone();
        let plan_id = ctx.current_plan_id().to_string();
        let root_plan_id = ctx.root_plan_id().to_string();
        let is_root = ctx.plan.is_root();

        self.services.pools.spawn(depth, async move {
            match AssertUnwindSafe(executor.run_plan(ctx)).catch_unwind().await {
                Ok(result) => result,
                Err(_) => {
                    tracing::error!(plan_id, "uncaught panic during plan execution");
                    if is_root {
                        if let Err(e) = executor.directories.remove_external_folder_link(&root_plan_id)
                        {
                            tracing::error!(root_plan_id, error = %e, "cleanup after panic failed");
                        }
                    }
                    PlanExecutionResult {
                        success: false,
                        error_message: Some("Unexpected error occurred during plan execution".into()),
                        final_result: None,
                        step_results: Vec::new(),
                    }
                }
            }
        })
    }

    async fn run_plan(&self, mut ctx: ExecutionContext) -> PlanExecutionResult {
        let mut result = PlanExecutionResult::default();
        let mut last_agent: Option<DynamicAgent> = None;

        ctx.plan.update_step_indices();
        self.initialize_plan_execution(&ctx);
        self.sync_uploaded_files(&ctx);
        self.services.recorder.record_plan_start(&ctx.plan);

        for index in 0..ctx.plan.steps.len() {
            if !self
                .services
                .interruption
                .check_and_continue(ctx.root_plan_id())
            {
                tracing::info!(
                    step = index + 1,
                    total = ctx.plan.steps.len(),
                    root_plan_id = %ctx.root_plan_id(),
                    "plan execution interrupted"
                );
                ctx.success = false;
                result.success = false;
                result.error_message = Some("Plan execution interrupted by user".to_string());
                break;
            }

            let step = ctx.plan.steps[index].clone();
            let (agent, step) = self.execute_step(step, &ctx).await;
            ctx.plan.steps[index] = step;
            let step = &ctx.plan.steps[index];

            result.step_results.push(StepResult {
                step_index: step.step_index,
                step_requirement: step.step_requirement.clone(),
                result: step.result.clone(),
                status: step.status,
                agent_name: step.agent_name.clone(),
            });

            if let Some(agent) = agent {
                last_agent = Some(agent);
            }

            let interrupted = step.status == AgentState::Interrupted
                || step
                    .result
                    .as_deref()
                    .map(|r| r.starts_with(INTERRUPTED_MARKER))
                    .unwrap_or(false);
            if interrupted {
                tracing::info!("step execution was interrupted, stopping plan execution");
                ctx.success = false;
                result.success = false;
                result.error_message = Some("Plan execution interrupted by user".to_string());
                break;
            }

            if step.status == AgentState::Failed {
                tracing::error!("step execution failed, stopping plan execution");
                ctx.success = false;
                result.success = false;
                result.error_message = Some(match &step.error_message {
                    Some(message) if !message.is_empty() => message.clone(),
                    _ => format!(
                        "Agent execution failed: {}",
                        step.result.as_deref().unwrap_or_default()
                    ),
                });
                break;
            }
        }

        if result.error_message.is_none() {
            ctx.success = true;
            result.success = true;
            ctx.plan.result = ctx
                .plan
                .steps
                .last()
                .and_then(|step| step.result.clone());
            result.final_result = ctx.plan.result.clone();
        }

        self.perform_cleanup(&ctx, last_agent.as_ref());
        result
    }

    /// Run a single step through its resolved agent. The returned step
    /// carries result, status, and error message.
    async fn execute_step(
        &self,
        mut step: Step,
        ctx: &ExecutionContext,
    ) -> (Option<DynamicAgent>, Step) {
        let tag = crate::resolver::parse_step_tag(&step.step_requirement);
        let Some(definition) = self.agents.find(&tag) else {
            let message = format!("No executor found for step type: {tag}");
            tracing::error!("{message}");
            step.result = Some(message.clone());
            step.status = AgentState::Failed;
            step.error_message = Some(message);
            return (None, step);
        };

        step.agent_name = Some(definition.name.clone());
        self.services
            .recorder
            .record_step_start(&step, ctx.current_plan_id());

        let run_ctx = AgentRunContext {
            current_plan_id: ctx.current_plan_id().to_string(),
            root_plan_id: ctx.root_plan_id().to_string(),
            depth: ctx.depth(),
            conversation_id: ctx.conversation_id.clone(),
        };
        let mut agent = DynamicAgent::new(definition, self.services.clone(), run_ctx, step.clone());

        step.status = AgentState::InProgress;
        let exec_result = agent.run().await;

        step.result = Some(exec_result.result);
        step.status = exec_result.state;
        step.error_message = agent.step().error_message.clone();

        match step.status {
            AgentState::Interrupted => {
                tracing::info!(agent = %agent.name(), "agent was interrupted during step execution");
            }
            AgentState::Completed => {
                tracing::info!(agent = %agent.name(), "agent completed step execution");
            }
            AgentState::Failed => {
                tracing::error!(agent = %agent.name(), "agent failed during step execution");
            }
            _ => {}
        }

        self.services
            .recorder
            .record_step_end(&step, ctx.current_plan_id());
        (Some(agent), step)
    }

    /// Top-level plans get their external folder link before execution.
    /// Link failures log a warning and never abort the plan.
    fn initialize_plan_execution(&self, ctx: &ExecutionContext) {
        if !ctx.plan.is_root() {
            return;
        }
        if let Err(e) = self
            .directories
            .ensure_external_folder_link(ctx.root_plan_id())
        {
            tracing::warn!(
                root_plan_id = %ctx.root_plan_id(),
                error = %e,
                "failed to initialize external folder link"
            );
        }
    }

    fn sync_uploaded_files(&self, ctx: &ExecutionContext) {
        let Some(upload_key) = ctx.upload_key.as_deref().filter(|k| !k.trim().is_empty()) else {
            tracing::debug!("no upload key provided, skipping file synchronization");
            return;
        };
        match self
            .directories
            .sync_uploaded_files(upload_key, ctx.root_plan_id())
        {
            Ok(()) => tracing::info!(upload_key, "synchronized uploaded files"),
            Err(e) => tracing::warn!(
                upload_key,
                error = %e,
                "failed to synchronize uploaded files, continuing without them"
            ),
        }
    }

    /// Cleanup runs on every terminal path. Errors are logged, never
    /// propagated.
    fn perform_cleanup(&self, ctx: &ExecutionContext, last_agent: Option<&DynamicAgent>) {
        let plan_id = ctx.current_plan_id();
        if let Some(agent) = last_agent {
            agent.cleanup(plan_id);
        }

        if ctx.plan.is_root() {
            let root_plan_id = ctx.root_plan_id();
            if let Err(e) = self.directories.remove_external_folder_link(root_plan_id) {
                tracing::error!(
                    root_plan_id,
                    error = %e,
                    "failed to remove external folder link"
                );
            }
            self.services.interruption.clear(root_plan_id);
        } else {
            tracing::debug!(
                plan_id,
                "skipping external link cleanup for sub-plan"
            );
        }
    }
}
