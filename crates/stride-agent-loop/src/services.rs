//! Shared service bundle handed to executors and agents at construction.
//!
//! Replaces service singletons: the model resolver, memory compressor,
//! tool registry, recorder, interruption registry, form slots, level
//! pools, and id dispatch all travel together.

use crate::form::FormInputService;
use std::sync::Arc;
use stride_contract::{
    IdDispatcher, InterruptionRegistry, LevelPools, Recorder, StrideConfig, ToolRegistry,
};
use stride_llm::LlmService;
use stride_memory::MemoryCompressor;

pub struct AgentServices {
    pub config: StrideConfig,
    pub llm: Arc<LlmService>,
    pub compressor: Arc<MemoryCompressor>,
    pub tools: Arc<ToolRegistry>,
    pub recorder: Arc<dyn Recorder>,
    pub interruption: Arc<InterruptionRegistry>,
    pub forms: Arc<FormInputService>,
    pub pools: Arc<LevelPools>,
    pub ids: Arc<IdDispatcher>,
}

impl AgentServices {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: StrideConfig,
        llm: Arc<LlmService>,
        compressor: Arc<MemoryCompressor>,
        tools: Arc<ToolRegistry>,
        recorder: Arc<dyn Recorder>,
        interruption: Arc<InterruptionRegistry>,
        pools: Arc<LevelPools>,
    ) -> Self {
        let forms = Arc::new(FormInputService::new(config.form_lock_timeout_ms));
        Self {
            config,
            llm,
            compressor,
            tools,
            recorder,
            interruption,
            forms,
            pools,
            ids: Arc::new(IdDispatcher::new()),
        }
    }
}
