//! The dynamic ReAct agent.
//!
//! One agent drives one plan step through up to `max_steps` think/act
//! rounds. Think issues a streaming LLM call with retry and
//! early-termination detection; act routes the chosen tool calls through
//! the single-tool or multi-tool path. Agent memory holds the step's
//! reasoning trail (assistant turns and tool responses only); the
//! conversation store holds the user-facing dialog.

use crate::definition::AgentDefinition;
use crate::dispatch::{ensure_object, ExecutionRequest, ToolDispatcher};
use crate::form::wait_for_input_or_timeout;
use crate::prompt;
use crate::result::process_tool_result;
use crate::services::AgentServices;
use crate::tools::{SystemErrorReportTool, TerminateTool};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use stride_contract::tool::{current_state_string_or_empty, GateStatus, Tool, ToolCallContext, ToolKind};
use stride_contract::{
    ActToolParam, AgentError, AgentState, Message, Role, Step, ThinkActRecord, ToolCall,
    INTERRUPTED_MARKER,
};
use stride_llm::{build_request, chat_text, collect_stream, serialized_char_count, StreamOutcome};

/// Identity and lineage of the agent's plan run.
#[derive(Debug, Clone)]
pub struct AgentRunContext {
    pub current_plan_id: String,
    pub root_plan_id: String,
    pub depth: usize,
    pub conversation_id: Option<String>,
}

/// Result of one round or of the whole `run()`.
#[derive(Debug, Clone)]
pub struct AgentExecResult {
    pub result: String,
    pub state: AgentState,
}

impl AgentExecResult {
    pub fn new(result: impl Into<String>, state: AgentState) -> Self {
        Self {
            result: result.into(),
            state,
        }
    }
}

enum ThinkOutcome {
    /// Tool calls chosen; proceed to act.
    Act,
    /// Retries exhausted without tool calls and without a hard failure.
    NoTools,
    Failed(AgentError),
    Interrupted,
}

pub struct DynamicAgent {
    definition: AgentDefinition,
    services: Arc<AgentServices>,
    dispatcher: ToolDispatcher,
    run_ctx: AgentRunContext,
    step: Step,
    max_steps: u32,
    current_step: u32,
    env_data: HashMap<String, String>,
    agent_messages: Vec<Message>,
    recent_tool_results: Vec<String>,
    prompt_messages: Vec<Message>,
    last_outcome: Option<StreamOutcome>,
    act_tool_params: Vec<ActToolParam>,
}

impl DynamicAgent {
    pub fn new(
        definition: AgentDefinition,
        services: Arc<AgentServices>,
        run_ctx: AgentRunContext,
        step: Step,
    ) -> Self {
        let max_steps = definition
            .max_steps
            .unwrap_or(services.config.max_steps)
            .max(1);
        let dispatcher = ToolDispatcher::new(
            services.tools.clone(),
            services.pools.clone(),
            services.ids.clone(),
        );
        Self {
            definition,
            services,
            dispatcher,
            run_ctx,
            step,
            max_steps,
            current_step: 0,
            env_data: HashMap::new(),
            agent_messages: Vec::new(),
            recent_tool_results: Vec::new(),
            prompt_messages: Vec::new(),
            last_outcome: None,
            act_tool_params: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn step(&self) -> &Step {
        &self.step
    }

    pub fn current_step(&self) -> u32 {
        self.current_step
    }

    /// Drive the round loop to a terminal state.
    pub async fn run(&mut self) -> AgentExecResult {
        self.current_step = 0;
        let mut last: Option<AgentExecResult> = None;

        while self.current_step < self.max_steps {
            self.current_step += 1;
            tracing::info!(
                agent = %self.definition.name,
                round = self.current_step,
                max = self.max_steps,
                "executing round"
            );

            let result = self.run_step_cycle().await;
            let terminal = result.state.is_terminal();
            let state = result.state;
            last = Some(result);

            if terminal {
                match state {
                    AgentState::Completed => {
                        // Transient errors recovered during execution must
                        // not surface on a completed step.
                        if self.step.error_message.is_some() {
                            tracing::info!("clearing error message for completed execution");
                            self.step.error_message = None;
                        }
                    }
                    AgentState::Interrupted => {
                        tracing::info!(agent = %self.definition.name, "execution interrupted");
                    }
                    AgentState::Failed => {
                        tracing::error!(agent = %self.definition.name, "execution failed");
                    }
                    _ => {}
                }
                break;
            }
        }

        let terminal = last
            .as_ref()
            .map(|r| r.state.is_terminal())
            .unwrap_or(false);
        if self.current_step >= self.max_steps && !terminal {
            tracing::info!(
                max = self.max_steps,
                "agent reached max rounds, generating final summary and terminating"
            );
            let summary = self.generate_final_summary().await;
            let result = self.terminate_with_summary(summary);
            last = Some(AgentExecResult::new(result, AgentState::Completed));
        }

        self.services.recorder.record_complete(&self.step);

        last.unwrap_or_else(|| AgentExecResult::new(String::new(), AgentState::Completed))
    }

    /// Run a single reason/act round, for fine-grained control. `run()`
    /// drives this in a loop with the round budget and final summary.
    pub async fn step_once(&mut self) -> AgentExecResult {
        self.run_step_cycle().await
    }

    /// One reason/act cycle.
    async fn run_step_cycle(&mut self) -> AgentExecResult {
        match self.think().await {
            ThinkOutcome::Act => self.act().await,
            ThinkOutcome::Interrupted => AgentExecResult::new(
                format!("{INTERRUPTED_MARKER}: agent thinking interrupted"),
                AgentState::Interrupted,
            ),
            ThinkOutcome::NoTools => AgentExecResult::new(
                "No tools were selected. You must select and call at least one tool to \
                 proceed. Please retry with tool calls.",
                AgentState::InProgress,
            ),
            ThinkOutcome::Failed(AgentError::LlmToolless { attempts }) => {
                let err = AgentError::LlmToolless { attempts };
                self.step.error_message = Some(err.to_string());
                AgentExecResult::new(
                    format!(
                        "Agent failed: LLM repeatedly returned thinking-only responses \
                         without tool calls. Please ensure the model is configured to call \
                         tools. {err}"
                    ),
                    AgentState::Failed,
                )
            }
            ThinkOutcome::Failed(err) => self.handle_llm_failure_with_system_report(err),
        }
    }

    /// One streaming LLM call with retry, backoff, and early-termination
    /// accounting.
    async fn think(&mut self) -> ThinkOutcome {
        if !self.check_interruption() {
            return ThinkOutcome::Interrupted;
        }

        self.collect_env_data();

        let max_retries = self.services.config.llm_max_retries.max(1);
        let early_threshold = self.services.config.early_termination_threshold.max(1);
        let mut early_terminations = 0u32;
        let mut last_error: Option<String> = None;

        let mut attempt = 0u32;
        while attempt < max_retries {
            attempt += 1;
            if !self.check_interruption() {
                return ThinkOutcome::Interrupted;
            }
            tracing::info!(attempt, max_retries, "executing agent thinking process");

            // Memory pre-check: compress conversation and agent memory
            // when the combined serialized size exceeds the limit.
            let conversation_for_memory = if self.services.config.enable_conversation_memory {
                self.run_ctx.conversation_id.as_deref()
            } else {
                None
            };
            let agent_messages = std::mem::take(&mut self.agent_messages);
            self.agent_messages = self
                .services
                .compressor
                .check_and_compress_if_needed(conversation_for_memory, agent_messages)
                .await;

            let env_block =
                prompt::render_env_data(&self.definition.available_tool_keys, &self.env_data);
            let system_message = Message::system(prompt::think_message(
                &self.services.config,
                &self.definition,
                &self.step.step_requirement,
                &env_block,
            ));
            let mut env_text = prompt::current_step_env_message(&env_block);
            if early_terminations > 0 {
                env_text.push_str(&prompt::tool_call_nudge(early_terminations));
                tracing::info!(
                    early_terminations,
                    "added explicit tool call requirement to retry message"
                );
            }
            let env_message = Message::user(env_text);
            let think_input =
                serde_json::to_string(&[&system_message, &env_message]).unwrap_or_default();

            let mut messages = Vec::new();
            messages.push(system_message);
            if self.services.config.enable_conversation_memory {
                if let Some(conversation_id) = self.run_ctx.conversation_id.clone() {
                    self.services.compressor.check_and_limit(&conversation_id).await;
                    let history = self.services.compressor.store().get(&conversation_id).await;
                    if !history.is_empty() {
                        tracing::debug!(
                            count = history.len(),
                            conversation_id,
                            "adding conversation history messages"
                        );
                        messages.extend(history);
                    }
                }
            }
            messages.extend(self.agent_messages.iter().cloned());
            messages.push(env_message);

            let input_chars = serialized_char_count(&messages);
            tracing::info!(input_chars, "prompt character count");

            let catalog: Vec<_> = self
                .definition
                .available_tool_keys
                .iter()
                .filter_map(|key| match self.services.tools.resolve(key) {
                    Some((_, tool)) => Some(tool.descriptor()),
                    None => {
                        tracing::warn!(key = %key, "tool not found in the registry");
                        None
                    }
                })
                .collect();
            let request = build_request(&messages, &catalog);
            let toolcall_id = self.services.ids.tool_call_id();

            let client = match self
                .services
                .llm
                .client_for(self.definition.model_name.as_deref())
            {
                Ok(client) => client,
                Err(e) => return ThinkOutcome::Failed(AgentError::LlmFatal(e.to_string())),
            };

            let outcome = match client.exec_chat_stream_events(request, None).await {
                Ok(stream) => match collect_stream(stream, input_chars).await {
                    Ok(outcome) => Ok(outcome),
                    Err(e) => Err(e.to_string()),
                },
                Err(e) => Err(e.to_string()),
            };

            let outcome = match outcome {
                Ok(outcome) => outcome,
                Err(message) => {
                    tracing::warn!(attempt, error = %message, "LLM attempt failed");
                    if stride_llm::is_retryable_llm_error(&message) {
                        last_error = Some(message.clone());
                        if attempt < max_retries {
                            let wait = self.services.config.retry_backoff_ms(attempt);
                            tracing::info!(wait_ms = wait, "retrying after retryable error");
                            tokio::time::sleep(Duration::from_millis(wait)).await;
                        }
                        continue;
                    }
                    return ThinkOutcome::Failed(AgentError::LlmFatal(message));
                }
            };

            tracing::info!(
                agent = %self.definition.name,
                tools = outcome.tool_calls.len(),
                "thought: {}",
                outcome.text
            );

            if !outcome.tool_calls.is_empty() {
                let think_act_id = self.services.ids.think_act_id();
                let multiple = outcome.tool_calls.len() > 1;
                self.act_tool_params = outcome
                    .tool_calls
                    .iter()
                    .map(|call| {
                        // Each tool of a multi-tool turn gets its own id so
                        // spawned sub-plans link to the right call.
                        let id = if multiple {
                            self.services.ids.tool_call_id()
                        } else {
                            toolcall_id.clone()
                        };
                        ActToolParam::new(call.name.clone(), call.arguments.to_string(), id)
                    })
                    .collect();

                self.services.recorder.record_thinking_and_action(
                    &self.step,
                    ThinkActRecord {
                        think_act_id,
                        step_id: self.step.step_id.clone(),
                        think_input,
                        think_output: outcome.text.clone(),
                        error_message: None,
                        input_chars: outcome.input_chars,
                        output_chars: outcome.output_chars,
                        tools: self.act_tool_params.clone(),
                    },
                );

                self.prompt_messages = messages;
                self.last_outcome = Some(outcome);
                return ThinkOutcome::Act;
            }

            if outcome.early_terminated() {
                early_terminations += 1;
                tracing::warn!(
                    attempt,
                    early_terminations,
                    threshold = early_threshold,
                    "early termination detected: thinking-only response with no tool calls"
                );
                if early_terminations >= early_threshold {
                    return ThinkOutcome::Failed(AgentError::LlmToolless {
                        attempts: early_terminations,
                    });
                }
            } else {
                tracing::warn!(attempt, "no tools selected, retrying");
            }
        }

        match last_error {
            Some(message) => {
                tracing::error!(
                    max_retries,
                    error = %message,
                    "all retry attempts failed"
                );
                ThinkOutcome::Failed(AgentError::LlmTransient(message))
            }
            None => ThinkOutcome::NoTools,
        }
    }

    /// Route the chosen tool calls.
    async fn act(&mut self) -> AgentExecResult {
        if !self.check_interruption() {
            return AgentExecResult::new(
                format!("{INTERRUPTED_MARKER}: action interrupted"),
                AgentState::Interrupted,
            );
        }

        let calls = self
            .last_outcome
            .as_ref()
            .map(|o| o.tool_calls.clone())
            .unwrap_or_default();

        match calls.len() {
            0 => AgentExecResult::new("tool call is empty, please retry", AgentState::InProgress),
            1 => {
                let call = calls.into_iter().next().unwrap_or_else(|| {
                    ToolCall::new(String::new(), String::new(), Value::Null)
                });
                self.process_single_tool(call).await
            }
            _ => self.process_multiple_tools(calls).await,
        }
    }

    /// Single-tool path: execute, update memory, and apply the tool's
    /// protocol behavior.
    async fn process_single_tool(&mut self, call: ToolCall) -> AgentExecResult {
        if !self.check_interruption() {
            return AgentExecResult::new(
                format!("{INTERRUPTED_MARKER}: tool execution interrupted"),
                AgentState::Interrupted,
            );
        }

        let tool_call_id = self
            .act_tool_params
            .first()
            .map(|p| p.tool_call_id.clone())
            .unwrap_or_else(|| self.services.ids.tool_call_id());
        let ctx = ToolCallContext::new(tool_call_id, self.run_ctx.depth).with_plan_ids(
            self.run_ctx.current_plan_id.clone(),
            self.run_ctx.root_plan_id.clone(),
        );

        let envelope = self
            .dispatcher
            .execute_tool(&call.name, call.arguments.clone(), &ctx, None)
            .await;
        let raw = if envelope.is_success() {
            envelope.output.unwrap_or_default()
        } else {
            format!(
                "Error: {}",
                envelope.error.unwrap_or_else(|| "Unknown error".to_string())
            )
        };
        let mut result = process_tool_result(&raw);
        if let Some(param) = self.act_tool_params.first_mut() {
            param.result = Some(result.clone());
        }

        // Memory first, then protocol behavior: the reasoning trail must
        // contain the assistant turn and the tool response even when the
        // tool ends the step.
        let assistant = self
            .last_outcome
            .as_ref()
            .map(StreamOutcome::assistant_message)
            .unwrap_or_else(|| Message::assistant(""));
        let mut post_call = self.prompt_messages.clone();
        post_call.push(assistant);
        post_call.push(Message::tool(call.id.clone(), result.clone()));
        self.update_agent_memory(post_call).await;

        let mut should_terminate = false;
        if let Some((_, tool)) = self.services.tools.resolve(&call.name) {
            if tool.kind() == ToolKind::FormInput {
                let form_result = self.handle_form_input(tool.clone()).await;
                if let Some(param) = self.act_tool_params.first_mut() {
                    param.result = Some(form_result.result.clone());
                }
                self.services
                    .recorder
                    .record_action_result(&self.act_tool_params);
                self.check_and_handle_repeated_result(&form_result.result).await;
                return form_result;
            }

            if tool.terminable() {
                if tool.kind() == ToolKind::Terminate {
                    tracing::info!(plan_id = %self.run_ctx.current_plan_id, "terminate tool called");
                    should_terminate = true;
                } else if tool.kind() == ToolKind::ErrorReport {
                    let error_message = self.extract_and_set_error_message(&result, "ErrorReportTool");
                    self.record_error_tool_thinking_and_action(
                        "Error occurred during execution",
                        "ErrorReportTool called to report error",
                        &error_message,
                    );
                }

                if tool.can_terminate() {
                    tracing::info!(
                        plan_id = %self.run_ctx.current_plan_id,
                        "terminable tool can terminate"
                    );
                    self.services.forms.remove(&self.run_ctx.root_plan_id);
                    should_terminate = true;
                }
            } else if tool.kind() == ToolKind::SystemErrorReport {
                let error_message =
                    self.extract_and_set_error_message(&result, "SystemErrorReportTool");
                self.record_error_tool_thinking_and_action(
                    "System error occurred during execution",
                    "SystemErrorReportTool called to report system error",
                    &error_message,
                );
            } else {
                tracing::info!(
                    tool = %call.name,
                    plan_id = %self.run_ctx.current_plan_id,
                    "tool executed"
                );
            }
        } else {
            tracing::error!(tool = %call.name, "tool callback not found");
            result = format!("Tool not found: {}. Tool response: {result}", call.name);
        }

        self.services
            .recorder
            .record_action_result(&self.act_tool_params);
        self.check_and_handle_repeated_result(&result).await;

        AgentExecResult::new(
            result,
            if should_terminate {
                AgentState::Completed
            } else {
                AgentState::InProgress
            },
        )
    }

    /// Multi-tool path: reject user-interactive tools, then run the batch
    /// with the terminator happen-before rule.
    async fn process_multiple_tools(&mut self, calls: Vec<ToolCall>) -> AgentExecResult {
        if !self.check_interruption() {
            return AgentExecResult::new(
                format!("{INTERRUPTED_MARKER}: tool execution interrupted"),
                AgentState::Interrupted,
            );
        }

        let mut restricted = Vec::new();
        for call in &calls {
            if let Some((_, tool)) = self.services.tools.resolve(&call.name) {
                if tool.kind() == ToolKind::FormInput {
                    restricted.push(call.name.clone());
                }
            }
        }
        if !restricted.is_empty() {
            let message = format!(
                "Multiple tools execution does not support form input tools (they require \
                 user interaction). Found restricted tools: {}. Please retry by calling tools \
                 separately, excluding form input from multiple tool calls.",
                restricted.join(", ")
            );
            tracing::warn!("multiple tools execution rejected: {message}");
            return AgentExecResult::new(message, AgentState::InProgress);
        }

        if self.act_tool_params.len() != calls.len() {
            let message = format!(
                "Size mismatch: recorded {} tool params but {} tool calls. This indicates an \
                 inconsistency in tool call tracking.",
                self.act_tool_params.len(),
                calls.len()
            );
            tracing::error!("{message}");
            return AgentExecResult::new(message, AgentState::InProgress);
        }

        let requests: Vec<ExecutionRequest> = calls
            .iter()
            .zip(&self.act_tool_params)
            .map(|(call, param)| {
                ExecutionRequest::new(call.name.clone(), ensure_object(call.arguments.clone()))
                    .with_tool_call_id(param.tool_call_id.clone())
            })
            .collect();

        let parent_ctx = ToolCallContext::new(String::new(), self.run_ctx.depth).with_plan_ids(
            self.run_ctx.current_plan_id.clone(),
            self.run_ctx.root_plan_id.clone(),
        );
        let envelopes = self.dispatcher.execute_batch(requests, &parent_ctx).await;
        tracing::info!(count = envelopes.len(), "executed tools in parallel");

        if envelopes.len() != calls.len() {
            let message = format!(
                "Size mismatch: {} results for {} tool calls.",
                envelopes.len(),
                calls.len()
            );
            tracing::error!("{message}");
            return AgentExecResult::new(message, AgentState::InProgress);
        }

        let mut results = Vec::with_capacity(envelopes.len());
        for (i, envelope) in envelopes.iter().enumerate() {
            let processed = if envelope.is_success() {
                match &envelope.output {
                    Some(output) => process_tool_result(output),
                    None => "No output".to_string(),
                }
            } else {
                format!(
                    "Error: {}",
                    envelope
                        .error
                        .clone()
                        .unwrap_or_else(|| "Unknown error".to_string())
                )
            };
            self.act_tool_params[i].result = Some(processed.clone());
            results.push(processed);
        }

        self.services
            .recorder
            .record_action_result(&self.act_tool_params);

        // Synthetic tool responses keep the assistant/tool sequence in the
        // LLM's original order.
        let assistant = self
            .last_outcome
            .as_ref()
            .map(StreamOutcome::assistant_message)
            .unwrap_or_else(|| Message::assistant(""));
        let mut post_call = self.prompt_messages.clone();
        post_call.push(assistant);
        for (call, processed) in calls.iter().zip(&results) {
            post_call.push(Message::tool(call.id.clone(), processed.clone()));
        }
        self.update_agent_memory(post_call).await;

        // A terminator in the batch ends the step; it already ran after
        // every other tool completed.
        let terminated = calls.iter().any(|call| {
            self.services
                .tools
                .resolve(&call.name)
                .map(|(_, tool)| tool.kind() == ToolKind::Terminate)
                .unwrap_or(false)
        });

        let rendered = serde_json::to_string(&results).unwrap_or_else(|_| results.join(", "));
        AgentExecResult::new(
            rendered,
            if terminated {
                AgentState::Completed
            } else {
                AgentState::InProgress
            },
        )
    }

    /// Rendezvous with the user through the form slot for this root plan.
    async fn handle_form_input(&mut self, tool: Arc<dyn Tool>) -> AgentExecResult {
        let root_plan_id = self.run_ctx.root_plan_id.clone();
        let current_plan_id = self.run_ctx.current_plan_id.clone();

        let awaiting = tool
            .input_gate()
            .map(|gate| gate.status() == GateStatus::AwaitingUserInput)
            .unwrap_or(false);
        if !awaiting {
            tracing::error!(root_plan_id, "form input tool is not awaiting user input");
            return AgentExecResult::new(
                "Form input tool is not in the awaiting-input state",
                AgentState::InProgress,
            );
        }

        tracing::info!(root_plan_id, current_plan_id, "form input awaiting user");
        let stored = self
            .services
            .forms
            .store_exclusive(&root_plan_id, tool.clone(), &current_plan_id)
            .await;
        if !stored {
            tracing::error!(
                root_plan_id,
                current_plan_id,
                "failed to store form due to lock timeout"
            );
            return AgentExecResult::new(
                "Failed to store form due to system timeout",
                AgentState::Completed,
            );
        }

        wait_for_input_or_timeout(
            tool.as_ref(),
            self.services.interruption.as_ref(),
            &root_plan_id,
            &self.services.config,
        )
        .await;

        let status = tool
            .input_gate()
            .map(|gate| gate.status())
            .unwrap_or(GateStatus::InputTimeout);
        match status {
            GateStatus::InputReceived => {
                tracing::info!(root_plan_id, "user input received");
                let state = tool.current_state_string().unwrap_or_default();
                self.agent_messages
                    .push(Message::user(format!("User input received for form: {state}")));
                AgentExecResult::new(state, AgentState::InProgress)
            }
            _ => {
                tracing::warn!(root_plan_id, "input timeout occurred");
                self.agent_messages
                    .push(Message::user("Input timeout occurred for form: "));
                self.services.forms.remove(&root_plan_id);
                AgentExecResult::new("Input timeout occurred.", AgentState::InProgress)
            }
        }
    }

    /// Replace agent memory with the step's reasoning trail: the post-call
    /// conversation minus anything already in conversation memory, minus
    /// system and user messages.
    async fn update_agent_memory(&mut self, post_call: Vec<Message>) {
        let conversation = match (
            self.services.config.enable_conversation_memory,
            self.run_ctx.conversation_id.as_deref(),
        ) {
            (true, Some(id)) if !id.trim().is_empty() => {
                self.services.compressor.store().get(id).await
            }
            _ => Vec::new(),
        };

        self.agent_messages = post_call
            .into_iter()
            .filter(|m| !conversation.contains(m))
            .filter(|m| m.role != Role::System && m.role != Role::User)
            .collect();
    }

    /// Track the rolling result window and force-compress agent memory
    /// when the same result repeats enough times.
    async fn check_and_handle_repeated_result(&mut self, result: &str) {
        if result.trim().is_empty() {
            return;
        }

        let threshold = self.services.config.repeated_result_threshold.max(1);
        self.recent_tool_results.push(result.to_string());
        if self.recent_tool_results.len() > threshold {
            self.recent_tool_results.remove(0);
        }

        if self.recent_tool_results.len() >= threshold {
            let first = &self.recent_tool_results[0];
            if self.recent_tool_results.iter().all(|r| r == first) {
                tracing::warn!(
                    threshold,
                    plan_id = %self.run_ctx.current_plan_id,
                    "repeated tool result detected, forcing memory compression"
                );
                let agent_messages = std::mem::take(&mut self.agent_messages);
                self.agent_messages = self
                    .services
                    .compressor
                    .force_compress_agent_memory(agent_messages)
                    .await;
                self.recent_tool_results.clear();
                tracing::info!(
                    plan_id = %self.run_ctx.current_plan_id,
                    "forced memory compression completed"
                );
            }
        }
    }

    /// Summarize the reasoning trail when the round budget runs out.
    async fn generate_final_summary(&mut self) -> String {
        if self.agent_messages.is_empty() {
            return "No memory entries found for final summary".to_string();
        }

        let env_block =
            prompt::render_env_data(&self.definition.available_tool_keys, &self.env_data);
        let mut messages = self.agent_messages.clone();
        messages.push(Message::system(prompt::think_message(
            &self.services.config,
            &self.definition,
            &self.step.step_requirement,
            &env_block,
        )));
        messages.push(Message::user(prompt::current_step_env_message(&env_block)));
        messages.push(Message::user(prompt::SUMMARY_REQUEST));

        let client = match self
            .services
            .llm
            .client_for(self.definition.model_name.as_deref())
        {
            Ok(client) => client,
            Err(e) => return format!("Summary generation failed: {e}"),
        };
        match chat_text(client.as_ref(), &messages).await {
            Ok(summary) => {
                tracing::info!("generated final summary");
                summary
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to generate final summary");
                format!("Summary generation failed: {e}")
            }
        }
    }

    /// Invoke the terminate tool with the final summary.
    fn terminate_with_summary(&self, summary: String) -> String {
        let message = format!(
            "Agent execution terminated due to max rounds reached. Summary: {summary}"
        );
        let terminate = TerminateTool::new();
        let ctx = ToolCallContext::new(self.services.ids.tool_call_id(), self.run_ctx.depth)
            .with_plan_ids(
                self.run_ctx.current_plan_id.clone(),
                self.run_ctx.root_plan_id.clone(),
            );
        match terminate.execute(json!({ "message": message }), &ctx) {
            Ok(result) => result.output,
            Err(e) => format!("Terminate failed: {e}"),
        }
    }

    /// Surface an LLM failure through the system error report flow so the
    /// UI renders it like a normal tool response, then fail the step.
    fn handle_llm_failure_with_system_report(&mut self, err: AgentError) -> AgentExecResult {
        tracing::error!(error = %err, "handling LLM failure with system error report");
        let error_message = format!(
            "LLM call failed after all retry attempts at round {}. Latest error: {err}",
            self.current_step
        );

        let tool = SystemErrorReportTool::new();
        let tool_call_id = self.services.ids.tool_call_id();
        let ctx = ToolCallContext::new(tool_call_id.clone(), self.run_ctx.depth);
        let args = json!({ "errorMessage": error_message });
        let output = match tool.execute(args.clone(), &ctx) {
            Ok(result) => result.output,
            Err(e) => format!(r#"{{"errorMessage":"{e}"}}"#),
        };

        let extracted = self.extract_and_set_error_message(&output, "SystemErrorReportTool");

        let mut param = ActToolParam::new(
            crate::tools::SYSTEM_ERROR_REPORT_TOOL_NAME,
            args.to_string(),
            tool_call_id,
        );
        param.result = Some(output.clone());
        self.services.recorder.record_action_result(std::slice::from_ref(&param));
        self.record_error_tool_thinking_and_action_with(
            param,
            "LLM call failed after retries",
            "SystemErrorReportTool called to report LLM error",
            &extracted,
        );

        AgentExecResult::new(output, AgentState::Failed)
    }

    /// Pull `errorMessage` from a tool result onto the step.
    fn extract_and_set_error_message(&mut self, result: &str, tool_label: &str) -> String {
        let extracted = serde_json::from_str::<Value>(result)
            .ok()
            .and_then(|v| {
                v.get("errorMessage")
                    .and_then(Value::as_str)
                    .map(String::from)
            })
            .filter(|s| !s.is_empty());

        match extracted {
            Some(message) => {
                tracing::info!(
                    tool = tool_label,
                    step_id = %self.step.step_id,
                    "extracted error message: {message}"
                );
                self.step.error_message = Some(message.clone());
                message
            }
            None => {
                tracing::warn!(tool = tool_label, "failed to parse errorMessage from result");
                self.step.error_message = Some(result.to_string());
                result.to_string()
            }
        }
    }

    fn record_error_tool_thinking_and_action(
        &mut self,
        think_input: &str,
        think_output: &str,
        error_message: &str,
    ) {
        let param = self
            .act_tool_params
            .first()
            .cloned()
            .unwrap_or_else(|| ActToolParam::new("unknown", "{}", self.services.ids.tool_call_id()));
        self.record_error_tool_thinking_and_action_with(
            param,
            think_input,
            think_output,
            error_message,
        );
    }

    fn record_error_tool_thinking_and_action_with(
        &mut self,
        param: ActToolParam,
        think_input: &str,
        think_output: &str,
        error_message: &str,
    ) {
        let final_error = self
            .step
            .error_message
            .clone()
            .unwrap_or_else(|| error_message.to_string());
        self.services.recorder.record_thinking_and_action(
            &self.step,
            ThinkActRecord {
                think_act_id: self.services.ids.think_act_id(),
                step_id: self.step.step_id.clone(),
                think_input: think_input.to_string(),
                think_output: think_output.to_string(),
                error_message: Some(final_error),
                input_chars: 0,
                output_chars: 0,
                tools: vec![param],
            },
        );
    }

    /// Refresh the round-scoped environment snapshot from each permitted
    /// tool's current state string.
    fn collect_env_data(&mut self) {
        for key in &self.definition.available_tool_keys {
            let value = self
                .services
                .tools
                .resolve(key)
                .map(|(_, tool)| current_state_string_or_empty(tool.as_ref()))
                .unwrap_or_default();
            self.env_data.insert(key.clone(), value);
        }
    }

    fn check_interruption(&self) -> bool {
        self.services
            .interruption
            .check_and_continue(&self.run_ctx.root_plan_id)
    }

    /// Release tool resources for this plan and drop any live form.
    pub fn cleanup(&self, plan_id: &str) {
        self.services.tools.cleanup_all(plan_id);
        self.services.forms.remove(&self.run_ctx.root_plan_id);
    }
}
