//! End-to-end plan execution scenarios against a scripted model.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex, OnceLock};
use stride_agent_loop::tools::TerminateTool;
use stride_agent_loop::{AgentDefinition, AgentServices};
use stride_contract::tool::{Tool, ToolCallContext, ToolDescriptor, ToolError, ToolExecuteResult};
use stride_contract::{
    AgentState, ExecutionContext, InMemoryRecorder, InterruptionRegistry, LevelPools, ModelConfig,
    NoopDirectoryManager, Plan, StaticModelRegistry, Step, StrideConfig, ToolRegistry,
};
use stride_contract::{InMemoryTemplateStore, PlanTemplate, PlanTemplateStore};
use stride_executor::{AgentTemplateRegistry, PlanCoordinator, PlanExecutor, RunOptions};
use stride_llm::testing::{ScriptedChatClient, ScriptedResponse};
use stride_llm::{ChatClient, ClientFactory, LlmService};
use stride_memory::{ConversationStore, MemoryCompressor};

struct EchoTool {
    name: &'static str,
    output: &'static str,
}

#[async_trait]
impl Tool for EchoTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new(self.name, "echoes a fixed output")
    }

    fn execute(&self, _args: Value, _ctx: &ToolCallContext) -> Result<ToolExecuteResult, ToolError> {
        Ok(ToolExecuteResult::new(self.output))
    }
}

/// Echo tool that also ends the step, like a summarizing terminable.
struct TerminableEchoTool {
    name: &'static str,
    output: &'static str,
}

#[async_trait]
impl Tool for TerminableEchoTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new(self.name, "answers and ends the step")
    }

    fn terminable(&self) -> bool {
        true
    }

    fn can_terminate(&self) -> bool {
        true
    }

    fn execute(&self, _args: Value, _ctx: &ToolCallContext) -> Result<ToolExecuteResult, ToolError> {
        Ok(ToolExecuteResult::new(self.output))
    }
}

/// Sync tool that records which pool thread ran it, then ends the step.
struct ThreadProbeTool {
    seen: Arc<Mutex<Option<String>>>,
}

#[async_trait]
impl Tool for ThreadProbeTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new("probe", "records its worker thread")
    }

    fn terminable(&self) -> bool {
        true
    }

    fn can_terminate(&self) -> bool {
        true
    }

    fn execute(&self, _args: Value, _ctx: &ToolCallContext) -> Result<ToolExecuteResult, ToolError> {
        let name = std::thread::current()
            .name()
            .unwrap_or_default()
            .to_string();
        if let Ok(mut seen) = self.seen.lock() {
            *seen = Some(name.clone());
        }
        Ok(ToolExecuteResult::new(name))
    }
}

/// Async tool that spawns a sub-plan one level deeper and waits for it.
struct SpawnSubPlanTool {
    executor: OnceLock<PlanExecutor>,
    parent_thread: Arc<Mutex<Option<String>>>,
}

#[async_trait]
impl Tool for SpawnSubPlanTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new("spawn_sub", "runs a nested plan")
    }

    fn is_async(&self) -> bool {
        true
    }

    fn execute(&self, _args: Value, _ctx: &ToolCallContext) -> Result<ToolExecuteResult, ToolError> {
        Err(ToolError::Internal("async-only tool".to_string()))
    }

    async fn execute_async(
        &self,
        _args: Value,
        ctx: &ToolCallContext,
    ) -> Result<ToolExecuteResult, ToolError> {
        if let Ok(mut seen) = self.parent_thread.lock() {
            *seen = Some(
                std::thread::current()
                    .name()
                    .unwrap_or_default()
                    .to_string(),
            );
        }
        let executor = self
            .executor
            .get()
            .cloned()
            .ok_or_else(|| ToolError::Internal("executor not wired".to_string()))?;

        let root = ctx
            .root_plan_id
            .clone()
            .ok_or_else(|| ToolError::Internal("missing root plan id".to_string()))?;
        let parent = ctx
            .current_plan_id
            .clone()
            .ok_or_else(|| ToolError::Internal("missing plan id".to_string()))?;
        let plan = Plan::sub_plan("sub-1", root, parent, ctx.plan_depth + 1, "nested probe")
            .with_steps(vec![Step::new("sub-step-1", "probe the pool")]);
        let sub_ctx = ExecutionContext::new(plan).with_tool_call_id(ctx.tool_call_id.clone());

        let result = executor
            .execute_all(sub_ctx)
            .await
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
        Ok(ToolExecuteResult::new(
            result.effective_result().unwrap_or_default().to_string(),
        ))
    }
}

/// Tool that flips the interruption flag for its own root plan.
struct InterruptSelfTool {
    interruption: Arc<InterruptionRegistry>,
}

#[async_trait]
impl Tool for InterruptSelfTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new("interrupt_self", "requests cancellation")
    }

    fn execute(&self, _args: Value, ctx: &ToolCallContext) -> Result<ToolExecuteResult, ToolError> {
        if let Some(root) = &ctx.root_plan_id {
            self.interruption.interrupt(root);
        }
        Ok(ToolExecuteResult::new("interruption requested"))
    }
}

struct Harness {
    executor: PlanExecutor,
    scripted: Arc<ScriptedChatClient>,
    recorder: Arc<InMemoryRecorder>,
    interruption: Arc<InterruptionRegistry>,
    services: Arc<AgentServices>,
}

fn harness(
    responses: Vec<ScriptedResponse>,
    registry: ToolRegistry,
    agents: AgentTemplateRegistry,
) -> Harness {
    let config = StrideConfig {
        retry_base_ms: 1,
        retry_max_ms: 5,
        ..StrideConfig::default()
    };
    let model_registry = Arc::new(StaticModelRegistry::new(ModelConfig::new("main")));
    let scripted = Arc::new(ScriptedChatClient::new("main", responses));
    let scripted_clone = scripted.clone();
    let factory: ClientFactory = Arc::new(move |_| scripted_clone.clone() as Arc<dyn ChatClient>);
    let llm = Arc::new(LlmService::new(model_registry, factory));
    let store = Arc::new(ConversationStore::new(config.max_memory));
    let compressor = Arc::new(MemoryCompressor::new(store, llm.clone(), config.clone()));
    let recorder = Arc::new(InMemoryRecorder::new());
    let interruption = Arc::new(InterruptionRegistry::new());
    let pools = Arc::new(LevelPools::new(4, 2).unwrap());

    let services = Arc::new(AgentServices::new(
        config,
        llm,
        compressor,
        Arc::new(registry),
        recorder.clone(),
        interruption.clone(),
        pools,
    ));
    let executor = PlanExecutor::new(
        services.clone(),
        Arc::new(agents),
        Arc::new(NoopDirectoryManager),
    );
    Harness {
        executor,
        scripted,
        recorder,
        interruption,
        services,
    }
}

fn plan(steps: Vec<&str>) -> ExecutionContext {
    let steps = steps
        .into_iter()
        .enumerate()
        .map(|(i, req)| Step::new(format!("step-{i}"), req))
        .collect();
    ExecutionContext::new(Plan::new("plan-1", "test plan").with_steps(steps))
}

fn tool_call(name: &str, args: Value) -> ScriptedResponse {
    ScriptedResponse::text("").with_tool_call(format!("call-{name}"), name, args)
}

#[tokio::test]
async fn two_tagged_steps_complete_with_final_result() {
    let registry = ToolRegistry::new();
    registry.register(Arc::new(EchoTool {
        name: "search",
        output: "hits:3",
    }));
    registry.register(Arc::new(TerminableEchoTool {
        name: "summarize",
        output: "summary of hits:3",
    }));
    registry.register(Arc::new(TerminateTool::new()));

    let agents = AgentTemplateRegistry::new();
    agents.register(
        AgentDefinition::new("SEARCH", "looks things up")
            .with_tool_keys(vec!["search".to_string(), "terminate".to_string()]),
    );
    agents.register(
        AgentDefinition::new("SUMMARIZE", "wraps up")
            .with_tool_keys(vec!["summarize".to_string(), "terminate".to_string()]),
    );

    let h = harness(
        vec![
            tool_call("search", json!({"query": "X"})),
            tool_call("terminate", json!({"message": "found hits:3"})),
            tool_call("summarize", json!({})),
        ],
        registry,
        agents,
    );

    let ctx = plan(vec!["[SEARCH] look up X", "[SUMMARIZE] summarize"]);
    let result = h.executor.execute_all(ctx).await.unwrap();

    assert!(result.success, "error: {:?}", result.error_message);
    assert_eq!(result.step_results.len(), 2);
    assert!(result
        .step_results
        .iter()
        .all(|s| s.status == AgentState::Completed));
    assert!(result.effective_result().unwrap().contains("hits:3"));
    assert_eq!(h.scripted.call_count(), 3);
    assert!(h.recorder.think_act_count() >= 3);
}

#[tokio::test]
async fn empty_plan_succeeds_with_no_steps() {
    let h = harness(vec![], ToolRegistry::new(), AgentTemplateRegistry::new());
    let result = h.executor.execute_all(plan(vec![])).await.unwrap();
    assert!(result.success);
    assert!(result.step_results.is_empty());
    assert!(result.final_result.is_none());
    assert_eq!(h.scripted.call_count(), 0);
}

#[tokio::test]
async fn missing_agent_fails_the_plan() {
    let h = harness(vec![], ToolRegistry::new(), AgentTemplateRegistry::new());
    let result = h
        .executor
        .execute_all(plan(vec!["[GHOST] haunt the build"]))
        .await
        .unwrap();
    assert!(!result.success);
    assert_eq!(result.step_results.len(), 1);
    assert_eq!(result.step_results[0].status, AgentState::Failed);
    assert!(result
        .error_message
        .unwrap()
        .contains("No executor found for step type: GHOST"));
}

#[tokio::test]
async fn interruption_mid_plan_skips_remaining_steps() {
    let registry = ToolRegistry::new();
    registry.register(Arc::new(TerminateTool::new()));

    let agents = AgentTemplateRegistry::new();
    agents.register(
        AgentDefinition::new("DEFAULT_AGENT", "default")
            .with_tool_keys(vec!["interrupt_self".to_string(), "terminate".to_string()]),
    );

    let h = harness(
        vec![tool_call("interrupt_self", json!({}))],
        registry,
        agents,
    );
    // The interrupting tool needs the live interruption registry, so it
    // registers after the harness is built.
    h.services.tools.register(Arc::new(InterruptSelfTool {
        interruption: h.interruption.clone(),
    }));

    let result = h
        .executor
        .execute_all(plan(vec!["first step", "second step"]))
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(
        result.error_message.as_deref(),
        Some("Plan execution interrupted by user")
    );
    // Only the first step ran; the second was skipped.
    assert_eq!(result.step_results.len(), 1);
    assert_eq!(result.step_results[0].status, AgentState::Interrupted);
    // Exactly one LLM call: round two aborted before thinking.
    assert_eq!(h.scripted.call_count(), 1);
}

#[tokio::test]
async fn cleanup_runs_on_every_terminal_path() {
    // Success path: tool cleanup sees the plan id.
    let registry = ToolRegistry::new();
    let probe = Arc::new(stride_contract::testing::CleanupProbeTool::new());
    registry.register(probe.clone());
    registry.register(Arc::new(TerminateTool::new()));
    let agents = AgentTemplateRegistry::new();
    agents.register(
        AgentDefinition::new("DEFAULT_AGENT", "default")
            .with_tool_keys(vec!["cleanup_probe".to_string(), "terminate".to_string()]),
    );
    let h = harness(
        vec![tool_call("terminate", json!({"message": "done"}))],
        registry,
        agents,
    );
    let result = h.executor.execute_all(plan(vec!["just finish"])).await.unwrap();
    assert!(result.success);
    assert_eq!(probe.cleaned_plans(), vec!["plan-1".to_string()]);

    // Failure path: cleanup still runs after a failed step.
    let registry = ToolRegistry::new();
    let probe = Arc::new(stride_contract::testing::CleanupProbeTool::new());
    registry.register(probe.clone());
    registry.register(Arc::new(TerminateTool::new()));
    let agents = AgentTemplateRegistry::new();
    agents.register(
        AgentDefinition::new("DEFAULT_AGENT", "default")
            .with_tool_keys(vec!["cleanup_probe".to_string(), "terminate".to_string()]),
    );
    let h = harness(
        vec![
            ScriptedResponse::text("thinking only"),
            ScriptedResponse::text("still thinking"),
            ScriptedResponse::text("hmm"),
        ],
        registry,
        agents,
    );
    let result = h.executor.execute_all(plan(vec!["never acts"])).await.unwrap();
    assert!(!result.success);
    assert_eq!(probe.cleaned_plans(), vec!["plan-1".to_string()]);
}

#[tokio::test]
async fn coordinator_runs_template_and_updates_conversation() {
    let registry = ToolRegistry::new();
    registry.register(Arc::new(TerminableEchoTool {
        name: "answer",
        output: "the capital is Paris",
    }));
    registry.register(Arc::new(TerminateTool::new()));

    let agents = AgentTemplateRegistry::new();
    agents.register(
        AgentDefinition::new("DEFAULT_AGENT", "default")
            .with_tool_keys(vec!["answer".to_string(), "terminate".to_string()]),
    );

    let h = harness(vec![tool_call("answer", json!({}))], registry, agents);

    let templates = Arc::new(InMemoryTemplateStore::new());
    templates.save_template(PlanTemplate {
        id: "tpl-capitals".into(),
        title: "answer a question".into(),
        step_requirements: vec!["answer the user's question".into()],
    });
    let coordinator = PlanCoordinator::new(h.executor.clone(), templates);

    let handle = coordinator
        .run_template(
            "tpl-capitals",
            "What is the capital of France?",
            RunOptions::default().with_conversation_id("conv-1"),
        )
        .unwrap();
    let result = handle.await.unwrap();

    assert!(result.success, "error: {:?}", result.error_message);
    assert_eq!(result.effective_result(), Some("the capital is Paris"));

    // The dialog keeps user/assistant alternation across the plan.
    let conversation = h
        .services
        .compressor
        .store()
        .get("conv-1")
        .await;
    assert_eq!(conversation.len(), 2);
    assert_eq!(conversation[0].content, "What is the capital of France?");
    assert_eq!(conversation[1].content, "the capital is Paris");

    // Unknown templates are rejected up front.
    assert!(coordinator
        .run_template("missing", "request", RunOptions::default())
        .is_err());
}

#[tokio::test]
async fn sub_plan_runs_on_its_own_depth_pool() {
    let probe_thread = Arc::new(Mutex::new(None));
    let parent_thread = Arc::new(Mutex::new(None));

    let registry = ToolRegistry::new();
    registry.register(Arc::new(ThreadProbeTool {
        seen: probe_thread.clone(),
    }));
    let spawn_tool = Arc::new(SpawnSubPlanTool {
        executor: OnceLock::new(),
        parent_thread: parent_thread.clone(),
    });
    registry.register(spawn_tool.clone());
    registry.register(Arc::new(TerminateTool::new()));

    let agents = AgentTemplateRegistry::new();
    agents.register(
        AgentDefinition::new("DEFAULT_AGENT", "default").with_tool_keys(vec![
            "spawn_sub".to_string(),
            "probe".to_string(),
            "terminate".to_string(),
        ]),
    );

    let h = harness(
        vec![
            // Parent round 1: spawn the sub-plan and wait for it.
            tool_call("spawn_sub", json!({})),
            // Sub-plan round 1: probe the pool, which also ends its step.
            tool_call("probe", json!({})),
            // Parent round 2: finish.
            tool_call("terminate", json!({"message": "nested done"})),
        ],
        registry,
        agents,
    );
    spawn_tool
        .executor
        .set(h.executor.clone())
        .ok()
        .expect("executor wired once");

    // A depth-2 plan that is its own root.
    let mut parent_plan = Plan::new("plan-parent", "parent")
        .with_steps(vec![Step::new("step-0", "spawn nested work")]);
    parent_plan.depth = 2;
    let ctx = ExecutionContext::new(parent_plan);

    let result = h.executor.execute_all(ctx).await.unwrap();

    assert!(result.success, "error: {:?}", result.error_message);
    // The sub-plan's sync tool ran on the depth-3 pool.
    assert_eq!(
        probe_thread.lock().unwrap().as_deref(),
        Some("plan-depth-3")
    );
    // The parent's async tool stayed on the depth-2 pool.
    assert_eq!(
        parent_thread.lock().unwrap().as_deref(),
        Some("plan-depth-2")
    );
    assert_eq!(result.step_results[0].status, AgentState::Completed);
}
