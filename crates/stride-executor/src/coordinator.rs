//! Request entry point: template to running plan.
//!
//! A user request selects a stored plan template; the coordinator
//! instantiates it with fresh identifiers, threads the conversation and
//! upload context through, and runs it. When conversation memory is
//! enabled, the user request is appended before execution and the final
//! result afterwards, keeping the cross-plan dialog alternating
//! user/assistant.

use crate::executor::PlanExecutor;
use std::sync::Arc;
use stride_contract::{ExecutionContext, Message, PlanExecutionResult, PlanTemplateStore};
use thiserror::Error;
use tokio::task::JoinHandle;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("Plan template not found: {0}")]
    TemplateNotFound(String),
}

/// Options accompanying one user request.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub conversation_id: Option<String>,
    pub upload_key: Option<String>,
}

impl RunOptions {
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
}

/// Accepts user requests and turns them into running plans.
#[derive(Clone)]
pub struct PlanCoordinator {
    executor: PlanExecutor,
    templates: Arc<dyn PlanTemplateStore>,
}

impl PlanCoordinator {
    pub fn new(executor: PlanExecutor, templates: Arc<dyn PlanTemplateStore>) -> Self {
        Self {
            executor,
            templates,
        }
    }

    pub fn executor(&self) -> &PlanExecutor {
        &self.executor
    }

    /// Instantiate a stored template and run it as a top-level plan.
    pub fn run_template(
        &self,
        template_id: &str,
        user_request: &str,
        options: RunOptions,
    ) -> Result<JoinHandle<PlanExecutionResult>, CoordinatorError> {
        let template = self
            .templates
            .load_template(template_id)
            .ok_or_else(|| CoordinatorError::TemplateNotFound(template_id.to_string()))?;

        let services = self.executor.services();
        let plan_id = services.ids.plan_id();
        let step_ids = template
            .step_requirements
            .iter()
            .map(|_| services.ids.step_id())
            .collect();
        let plan = template.instantiate(plan_id.clone(), step_ids);
        tracing::info!(
            template_id,
            plan_id = %plan_id,
            steps = plan.steps.len(),
            "accepted user request"
        );

        let mut ctx = ExecutionContext::new(plan);
        ctx.title = Some(user_request.to_string());
        ctx.conversation_id = options.conversation_id;
        ctx.upload_key = options.upload_key;

        let memory_enabled = services.config.enable_conversation_memory;
        let conversation_id = ctx.conversation_id.clone();
        let store = services.compressor.store().clone();
        let request = user_request.to_string();
        let executor = self.executor.clone();
        let depth = ctx.depth();

        Ok(services.pools.spawn(depth, async move {
            if memory_enabled {
                if let Some(id) = &conversation_id {
                    store.append(id, Message::user(request)).await;
                }
            }

            let result = match executor.execute_all(ctx).await {
                Ok(result) => result,
                Err(e) => {
                    tracing::error!(error = %e, "plan task failed");
                    PlanExecutionResult {
                        success: false,
                        error_message: Some(e.to_string()),
                        final_result: None,
                        step_results: Vec::new(),
                    }
                }
            };

            // The final result joins the user-visible dialog so follow-up
            // requests in the same conversation see it.
            if memory_enabled && result.success {
                if let (Some(id), Some(final_result)) =
                    (&conversation_id, result.effective_result())
                {
                    store.append(id, Message::assistant(final_result)).await;
                }
            }

            result
        }))
    }
}
