//! Tool dispatch and parallel execution.
//!
//! Resolution goes direct key → dot-to-underscore via the group index →
//! suffix after the last `_`. Misses and failures become `ERROR`
//! envelopes; no exception crosses the dispatch boundary.
//!
//! Ordering contract for a batch: non-terminators run concurrently and
//! all complete before any terminator starts; results come back sorted
//! by original request index.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use stride_contract::tool::{Tool, ToolCallContext, ToolInputKind, ToolKind};
use stride_contract::{IdDispatcher, LevelPools, ToolRegistry};

/// One tool invocation request inside a batch.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub tool_name: String,
    /// Parsed arguments; always a JSON object.
    pub params: Value,
    /// Correlation id; generated when absent.
    pub tool_call_id: Option<String>,
}

impl ExecutionRequest {
    pub fn new(tool_name: impl Into<String>, params: Value) -> Self {
        Self {
            tool_name: tool_name.into(),
            params,
            tool_call_id: None,
        }
    }

    #[must_use]
    pub fn with_tool_call_id(mut self, id: impl Into<String>) -> Self {
        self.tool_call_id = Some(id.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnvelopeStatus {
    Success,
    Error,
}

/// Result envelope of one dispatched tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolEnvelope {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    pub status: EnvelopeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolEnvelope {
    pub fn success(index: Option<usize>, output: impl Into<String>) -> Self {
        Self {
            index,
            status: EnvelopeStatus::Success,
            output: Some(output.into()),
            error: None,
        }
    }

    pub fn error(index: Option<usize>, error: impl Into<String>) -> Self {
        Self {
            index,
            status: EnvelopeStatus::Error,
            output: None,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == EnvelopeStatus::Success
    }
}

/// Dispatcher owning resolution, conversion, and pool submission.
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    pools: Arc<LevelPools>,
    ids: Arc<IdDispatcher>,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>, pools: Arc<LevelPools>, ids: Arc<IdDispatcher>) -> Self {
        Self {
            registry,
            pools,
            ids,
        }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Execute one tool. Sync tools run on the pool for the caller's
    /// depth; async tools are awaited directly.
    pub async fn execute_tool(
        &self,
        tool_name: &str,
        params: Value,
        parent_ctx: &ToolCallContext,
        index: Option<usize>,
    ) -> ToolEnvelope {
        let Some((_, tool)) = self.registry.resolve(tool_name) else {
            return ToolEnvelope::error(index, format!("Tool not found: {tool_name}"));
        };

        let descriptor = tool.descriptor();
        let mut params = ensure_object(params);
        fill_missing_parameters(&mut params, &required_parameter_names(&descriptor.parameters));

        // Structured inputs take an ordered JSON round-trip so the tool
        // deserializes exactly what the envelope records.
        let args = match descriptor.input {
            ToolInputKind::Mapping => params,
            ToolInputKind::Structured => {
                match serde_json::to_string(&params)
                    .ok()
                    .and_then(|s| serde_json::from_str(&s).ok())
                {
                    Some(value) => value,
                    None => {
                        return ToolEnvelope::error(
                            index,
                            format!("Error converting input for tool {tool_name}"),
                        )
                    }
                }
            }
        };

        let tool_call_id = parent_ctx
            .tool_call_id
            .is_empty()
            .then(|| self.ids.tool_call_id())
            .unwrap_or_else(|| parent_ctx.tool_call_id.clone());
        let mut ctx = ToolCallContext::new(tool_call_id, parent_ctx.plan_depth);
        ctx.current_plan_id = parent_ctx.current_plan_id.clone();
        ctx.root_plan_id = parent_ctx.root_plan_id.clone();

        if tool.is_async() {
            match tool.execute_async(args, &ctx).await {
                Ok(result) => ToolEnvelope::success(index, result.output),
                Err(e) => {
                    tracing::error!(tool = tool_name, error = %e, "tool execution failed");
                    ToolEnvelope::error(index, e.to_string())
                }
            }
        } else {
            let depth = ctx.plan_depth;
            let handle = self
                .pools
                .spawn_blocking(depth, move || tool.execute(args, &ctx));
            match handle.await {
                Ok(Ok(result)) => ToolEnvelope::success(index, result.output),
                Ok(Err(e)) => {
                    tracing::error!(tool = tool_name, error = %e, "tool execution failed");
                    ToolEnvelope::error(index, e.to_string())
                }
                Err(e) => {
                    tracing::error!(tool = tool_name, error = %e, "tool task failed");
                    ToolEnvelope::error(index, e.to_string())
                }
            }
        }
    }

    /// Execute a batch with the terminator happen-before rule, returning
    /// envelopes sorted by original request index.
    pub async fn execute_batch(
        &self,
        requests: Vec<ExecutionRequest>,
        parent_ctx: &ToolCallContext,
    ) -> Vec<ToolEnvelope> {
        let mut terminators = Vec::new();
        let mut others = Vec::new();
        for (index, request) in requests.into_iter().enumerate() {
            let is_terminator = self
                .registry
                .resolve(&request.tool_name)
                .map(|(_, tool)| tool.kind() == ToolKind::Terminate)
                .unwrap_or(false);
            if is_terminator {
                terminators.push((index, request));
            } else {
                others.push((index, request));
            }
        }

        let mut results = self.run_group(others, parent_ctx).await;

        if !terminators.is_empty() {
            tracing::info!(
                count = terminators.len(),
                "executing terminator tool(s) after all other parallel operations completed"
            );
            results.extend(self.run_group(terminators, parent_ctx).await);
        }

        results.sort_by_key(|envelope| envelope.index.unwrap_or(usize::MAX));
        results
    }

    async fn run_group(
        &self,
        group: Vec<(usize, ExecutionRequest)>,
        parent_ctx: &ToolCallContext,
    ) -> Vec<ToolEnvelope> {
        let futures = group.into_iter().map(|(index, request)| {
            let mut ctx = parent_ctx.clone();
            if let Some(id) = &request.tool_call_id {
                ctx.tool_call_id = id.clone();
            } else {
                ctx.tool_call_id = String::new();
            }
            async move {
                self.execute_tool(&request.tool_name, request.params, &ctx, Some(index))
                    .await
            }
        });
        futures::future::join_all(futures).await
    }
}

/// Coerce arguments into an object: strings are parsed, other scalars are
/// wrapped under a `value` key.
pub fn ensure_object(args: Value) -> Value {
    match args {
        Value::Object(_) => args,
        Value::Null => Value::Object(Map::new()),
        Value::String(s) => match serde_json::from_str::<Value>(&s) {
            Ok(Value::Object(map)) => Value::Object(map),
            Ok(other) => wrap_value(other),
            Err(_) => {
                if s.trim().is_empty() {
                    Value::Object(Map::new())
                } else {
                    wrap_value(Value::String(s))
                }
            }
        },
        other => wrap_value(other),
    }
}

fn wrap_value(value: Value) -> Value {
    let mut map = Map::new();
    map.insert("value".to_string(), value);
    Value::Object(map)
}

/// Required parameter names from a JSON schema `required` list, or the
/// union across `oneOf` variants.
pub fn required_parameter_names(schema: &Value) -> Vec<String> {
    fn names_of(value: Option<&Value>) -> Vec<String> {
        value
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default()
    }

    if let Some(variants) = schema.get("oneOf").and_then(Value::as_array) {
        let mut all = Vec::new();
        for variant in variants {
            all.extend(names_of(variant.get("required")));
        }
        return all;
    }

    names_of(schema.get("required"))
}

/// Fill required fields missing from the arguments with an empty string.
pub fn fill_missing_parameters(params: &mut Value, required: &[String]) {
    let Value::Object(map) = params else {
        return;
    };
    for name in required {
        if !map.contains_key(name) {
            map.insert(name.clone(), Value::String(String::new()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;
    use stride_contract::tool::{ToolDescriptor, ToolError, ToolExecuteResult};

    struct SleepTool {
        name: &'static str,
        sleep_ms: u64,
        finished_at: Arc<AtomicU64>,
        epoch: std::time::Instant,
    }

    #[async_trait]
    impl Tool for SleepTool {
        fn descriptor(&self) -> ToolDescriptor {
            ToolDescriptor::new(self.name, "sleeps then answers")
        }

        fn execute(
            &self,
            _args: Value,
            _ctx: &ToolCallContext,
        ) -> Result<ToolExecuteResult, ToolError> {
            std::thread::sleep(Duration::from_millis(self.sleep_ms));
            self.finished_at
                .store(self.epoch.elapsed().as_millis() as u64, Ordering::SeqCst);
            Ok(ToolExecuteResult::new(format!("{} done", self.name)))
        }
    }

    struct RecordingTerminate {
        started_at: Arc<AtomicU64>,
        epoch: std::time::Instant,
    }

    #[async_trait]
    impl Tool for RecordingTerminate {
        fn descriptor(&self) -> ToolDescriptor {
            ToolDescriptor::new("terminate", "ends the step")
        }

        fn kind(&self) -> ToolKind {
            ToolKind::Terminate
        }

        fn terminable(&self) -> bool {
            true
        }

        fn can_terminate(&self) -> bool {
            true
        }

        fn execute(
            &self,
            args: Value,
            _ctx: &ToolCallContext,
        ) -> Result<ToolExecuteResult, ToolError> {
            self.started_at
                .store(self.epoch.elapsed().as_millis() as u64, Ordering::SeqCst);
            Ok(ToolExecuteResult::new(
                args.get("message")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            ))
        }
    }

    struct RequiredEchoTool;

    #[async_trait]
    impl Tool for RequiredEchoTool {
        fn descriptor(&self) -> ToolDescriptor {
            ToolDescriptor::new("strict", "echoes required fields").with_parameters(json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string"},
                    "mode": {"type": "string"}
                },
                "required": ["path", "mode"]
            }))
        }

        fn execute(
            &self,
            args: Value,
            _ctx: &ToolCallContext,
        ) -> Result<ToolExecuteResult, ToolError> {
            Ok(ToolExecuteResult::new(args.to_string()))
        }
    }

    struct FailingTool;

    #[async_trait]
    impl Tool for FailingTool {
        fn descriptor(&self) -> ToolDescriptor {
            ToolDescriptor::new("broken", "always fails")
        }

        fn execute(
            &self,
            _args: Value,
            _ctx: &ToolCallContext,
        ) -> Result<ToolExecuteResult, ToolError> {
            Err(ToolError::ExecutionFailed("kaput".into()))
        }
    }

    fn dispatcher(registry: ToolRegistry) -> ToolDispatcher {
        ToolDispatcher::new(
            Arc::new(registry),
            Arc::new(LevelPools::new(2, 2).unwrap()),
            Arc::new(IdDispatcher::new()),
        )
    }

    #[tokio::test]
    async fn missing_tool_becomes_error_envelope() {
        let dispatcher = dispatcher(ToolRegistry::new());
        let ctx = ToolCallContext::new("tc", 0);
        let envelope = dispatcher
            .execute_tool("ghost", json!({}), &ctx, Some(0))
            .await;
        assert_eq!(envelope.status, EnvelopeStatus::Error);
        assert!(envelope.error.unwrap().contains("Tool not found: ghost"));
    }

    #[tokio::test]
    async fn tool_failure_becomes_error_envelope() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(FailingTool));
        let dispatcher = dispatcher(registry);
        let ctx = ToolCallContext::new("tc", 0);
        let envelope = dispatcher
            .execute_tool("broken", json!({}), &ctx, None)
            .await;
        assert_eq!(envelope.status, EnvelopeStatus::Error);
        assert!(envelope.error.unwrap().contains("kaput"));
    }

    #[tokio::test]
    async fn missing_required_fields_are_filled_empty() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(RequiredEchoTool));
        let dispatcher = dispatcher(registry);
        let ctx = ToolCallContext::new("tc", 0);
        let envelope = dispatcher
            .execute_tool("strict", json!({"path": "/tmp/x"}), &ctx, None)
            .await;
        let output: Value = serde_json::from_str(&envelope.output.unwrap()).unwrap();
        assert_eq!(output["path"], "/tmp/x");
        assert_eq!(output["mode"], "");
    }

    #[tokio::test]
    async fn batch_orders_results_by_request_index() {
        let epoch = std::time::Instant::now();
        let registry = ToolRegistry::new();
        registry.register(Arc::new(SleepTool {
            name: "slow",
            sleep_ms: 120,
            finished_at: Arc::new(AtomicU64::new(0)),
            epoch,
        }));
        registry.register(Arc::new(SleepTool {
            name: "fast",
            sleep_ms: 10,
            finished_at: Arc::new(AtomicU64::new(0)),
            epoch,
        }));
        let dispatcher = dispatcher(registry);
        let ctx = ToolCallContext::new("tc", 0);
        let results = dispatcher
            .execute_batch(
                vec![
                    ExecutionRequest::new("slow", json!({})),
                    ExecutionRequest::new("fast", json!({})),
                ],
                &ctx,
            )
            .await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].index, Some(0));
        assert_eq!(results[0].output.as_deref(), Some("slow done"));
        assert_eq!(results[1].index, Some(1));
    }

    #[tokio::test]
    async fn terminator_starts_after_all_others_complete() {
        let epoch = std::time::Instant::now();
        let slow_finish = Arc::new(AtomicU64::new(0));
        let fast_finish = Arc::new(AtomicU64::new(0));
        let terminate_start = Arc::new(AtomicU64::new(0));

        let registry = ToolRegistry::new();
        registry.register(Arc::new(SleepTool {
            name: "a",
            sleep_ms: 200,
            finished_at: slow_finish.clone(),
            epoch,
        }));
        registry.register(Arc::new(SleepTool {
            name: "b",
            sleep_ms: 50,
            finished_at: fast_finish.clone(),
            epoch,
        }));
        registry.register(Arc::new(RecordingTerminate {
            started_at: terminate_start.clone(),
            epoch,
        }));

        let dispatcher = dispatcher(registry);
        let ctx = ToolCallContext::new("tc", 0);
        let results = dispatcher
            .execute_batch(
                vec![
                    ExecutionRequest::new("a", json!({})),
                    ExecutionRequest::new("b", json!({})),
                    ExecutionRequest::new("terminate", json!({"message": "bye"})),
                ],
                &ctx,
            )
            .await;

        // Results land at their original positions.
        assert_eq!(results[0].output.as_deref(), Some("a done"));
        assert_eq!(results[1].output.as_deref(), Some("b done"));
        assert_eq!(results[2].output.as_deref(), Some("bye"));

        // complete(a), complete(b) happen-before start(terminate).
        let term_start = terminate_start.load(Ordering::SeqCst);
        assert!(term_start >= slow_finish.load(Ordering::SeqCst));
        assert!(term_start >= fast_finish.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn batch_interleaves_errors_and_successes() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(FailingTool));
        registry.register(Arc::new(RequiredEchoTool));
        let dispatcher = dispatcher(registry);
        let ctx = ToolCallContext::new("tc", 0);
        let results = dispatcher
            .execute_batch(
                vec![
                    ExecutionRequest::new("broken", json!({})),
                    ExecutionRequest::new("strict", json!({"path": "p", "mode": "m"})),
                    ExecutionRequest::new("ghost", json!({})),
                ],
                &ctx,
            )
            .await;
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].status, EnvelopeStatus::Error);
        assert_eq!(results[1].status, EnvelopeStatus::Success);
        assert_eq!(results[2].status, EnvelopeStatus::Error);
    }

    struct AsyncDelayTool;

    #[async_trait]
    impl Tool for AsyncDelayTool {
        fn descriptor(&self) -> ToolDescriptor {
            ToolDescriptor::new("delayed", "answers after an async delay")
        }

        fn is_async(&self) -> bool {
            true
        }

        fn execute(
            &self,
            _args: Value,
            _ctx: &ToolCallContext,
        ) -> Result<ToolExecuteResult, ToolError> {
            Err(ToolError::Internal("async-only tool".to_string()))
        }

        async fn execute_async(
            &self,
            _args: Value,
            _ctx: &ToolCallContext,
        ) -> Result<ToolExecuteResult, ToolError> {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(ToolExecuteResult::new("delayed done"))
        }
    }

    #[tokio::test]
    async fn async_tools_run_through_their_async_entry() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(AsyncDelayTool));
        let dispatcher = dispatcher(registry);
        let ctx = ToolCallContext::new("tc", 0);
        let envelope = dispatcher
            .execute_tool("delayed", json!({}), &ctx, Some(0))
            .await;
        assert_eq!(envelope.output.as_deref(), Some("delayed done"));
    }

    #[tokio::test]
    async fn batch_mixes_async_and_sync_tools() {
        let epoch = std::time::Instant::now();
        let registry = ToolRegistry::new();
        registry.register(Arc::new(AsyncDelayTool));
        registry.register(Arc::new(SleepTool {
            name: "sync",
            sleep_ms: 10,
            finished_at: Arc::new(AtomicU64::new(0)),
            epoch,
        }));
        let dispatcher = dispatcher(registry);
        let ctx = ToolCallContext::new("tc", 0);
        let results = dispatcher
            .execute_batch(
                vec![
                    ExecutionRequest::new("delayed", json!({})),
                    ExecutionRequest::new("sync", json!({})),
                ],
                &ctx,
            )
            .await;
        assert_eq!(results[0].output.as_deref(), Some("delayed done"));
        assert_eq!(results[1].output.as_deref(), Some("sync done"));
    }

    #[test]
    fn envelope_wire_shape() {
        let envelope = ToolEnvelope::success(Some(2), "out");
        let json = serde_json::to_string(&envelope).unwrap();
        assert_eq!(json, r#"{"index":2,"status":"SUCCESS","output":"out"}"#);

        let envelope = ToolEnvelope::error(None, "boom");
        let json = serde_json::to_string(&envelope).unwrap();
        assert_eq!(json, r#"{"status":"ERROR","error":"boom"}"#);
    }

    #[test]
    fn ensure_object_handles_all_shapes() {
        assert_eq!(ensure_object(json!({"a": 1})), json!({"a": 1}));
        assert_eq!(ensure_object(Value::Null), json!({}));
        assert_eq!(
            ensure_object(Value::String(r#"{"a":1}"#.into())),
            json!({"a": 1})
        );
        assert_eq!(
            ensure_object(Value::String("plain".into())),
            json!({"value": "plain"})
        );
        assert_eq!(ensure_object(json!(7)), json!({"value": 7}));
    }

    #[test]
    fn one_of_unions_required_fields() {
        let schema = json!({
            "oneOf": [
                {"required": ["a", "b"]},
                {"required": ["c"]}
            ]
        });
        assert_eq!(required_parameter_names(&schema), vec!["a", "b", "c"]);
    }
}
