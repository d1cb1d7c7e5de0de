//! Collaborator traits: plan templates, model registry, directories.
//!
//! The core consumes these through narrow interfaces; persistence and
//! filesystem policy stay outside. In-memory implementations back tests
//! and simple embeddings.

use crate::plan::PlanTemplate;
use dashmap::DashMap;
use std::collections::HashMap;
use std::path::PathBuf;

/// Configuration of one LLM model as stored by the registry.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    pub name: String,
    pub api_base: Option<String>,
    pub temperature: Option<f64>,
}

impl ModelConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            api_base: None,
            temperature: None,
        }
    }
}

/// Event emitted when a model configuration changes.
#[derive(Debug, Clone)]
pub struct ModelChanged {
    pub config: ModelConfig,
}

/// Read access to dynamic model configurations.
pub trait ModelRegistry: Send + Sync {
    fn find_default(&self) -> Option<ModelConfig>;
    fn find_by_name(&self, name: &str) -> Option<ModelConfig>;
}

/// Fixed in-memory model registry.
pub struct StaticModelRegistry {
    default: ModelConfig,
    models: HashMap<String, ModelConfig>,
}

impl StaticModelRegistry {
    pub fn new(default: ModelConfig) -> Self {
        let mut models = HashMap::new();
        models.insert(default.name.clone(), default.clone());
        Self { default, models }
    }

    #[must_use]
    pub fn with_model(mut self, config: ModelConfig) -> Self {
        self.models.insert(config.name.clone(), config);
        self
    }
}

impl ModelRegistry for StaticModelRegistry {
    fn find_default(&self) -> Option<ModelConfig> {
        Some(self.default.clone())
    }

    fn find_by_name(&self, name: &str) -> Option<ModelConfig> {
        self.models.get(name).cloned()
    }
}

/// Plan template persistence consumed by the executor.
pub trait PlanTemplateStore: Send + Sync {
    fn load_template(&self, id: &str) -> Option<PlanTemplate>;
    fn list_templates(&self) -> Vec<String>;
    fn save_template(&self, template: PlanTemplate);
}

/// Concurrent in-memory template store.
#[derive(Default)]
pub struct InMemoryTemplateStore {
    templates: DashMap<String, PlanTemplate>,
}

impl InMemoryTemplateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PlanTemplateStore for InMemoryTemplateStore {
    fn load_template(&self, id: &str) -> Option<PlanTemplate> {
        self.templates.get(id).map(|t| t.value().clone())
    }

    fn list_templates(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.templates.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    fn save_template(&self, template: PlanTemplate) {
        self.templates.insert(template.id.clone(), template);
    }
}

/// Plan directory operations used at the top-level plan boundary.
pub trait DirectoryManager: Send + Sync {
    fn root_plan_dir(&self, root_plan_id: &str) -> PathBuf;
    fn ensure_external_folder_link(&self, root_plan_id: &str) -> std::io::Result<()>;
    fn remove_external_folder_link(&self, root_plan_id: &str) -> std::io::Result<()>;
    fn sync_uploaded_files(&self, upload_key: &str, root_plan_id: &str) -> std::io::Result<()>;
}

/// Directory manager that performs no filesystem work.
pub struct NoopDirectoryManager;

impl DirectoryManager for NoopDirectoryManager {
    fn root_plan_dir(&self, root_plan_id: &str) -> PathBuf {
        PathBuf::from(root_plan_id)
    }

    fn ensure_external_folder_link(&self, _root_plan_id: &str) -> std::io::Result<()> {
        Ok(())
    }

    fn remove_external_folder_link(&self, _root_plan_id: &str) -> std::io::Result<()> {
        Ok(())
    }

    fn sync_uploaded_files(&self, _upload_key: &str, _root_plan_id: &str) -> std::io::Result<()> {
        Ok(())
    }
}
