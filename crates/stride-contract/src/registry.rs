//! Tool registry with qualified-key resolution.
//!
//! Tools register under `serviceGroup_toolName` keys. LLMs emit the exact
//! key, the dot form `serviceGroup.toolName`, or the bare tool name; the
//! resolution chain is: direct lookup, dot-to-underscore conversion via the
//! group index, then suffix match after the last `_`. Resolution is
//! deterministic for a fixed registry.

use crate::tool::Tool;
use dashmap::{DashMap, DashSet};
use std::sync::Arc;

/// Index of known service group names, used to convert dot-form tool keys.
#[derive(Debug, Default)]
pub struct ServiceGroupIndex {
    groups: DashSet<String>,
}

impl ServiceGroupIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_group(&self, group: impl Into<String>) {
        self.groups.insert(group.into());
    }

    pub fn contains(&self, group: &str) -> bool {
        self.groups.contains(group)
    }

    /// Convert `serviceGroup.toolName` to the registry key
    /// `serviceGroup_toolName` when the group is known.
    pub fn construct_tool_key(&self, name: &str) -> Option<String> {
        let (group, tool) = name.split_once('.')?;
        if tool.is_empty() || !self.contains(group) {
            return None;
        }
        Some(format!("{group}_{tool}"))
    }
}

/// Concurrent map of qualified tool keys to tool implementations.
#[derive(Default)]
pub struct ToolRegistry {
    tools: DashMap<String, Arc<dyn Tool>>,
    groups: ServiceGroupIndex,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool under its descriptor's qualified key.
    pub fn register(&self, tool: Arc<dyn Tool>) -> String {
        let descriptor = tool.descriptor();
        if let Some(group) = &descriptor.service_group {
            self.groups.add_group(group.clone());
        }
        let key = descriptor.qualified_key();
        self.tools.insert(key.clone(), tool);
        key
    }

    /// Register a tool under an explicit key.
    pub fn register_as(&self, key: impl Into<String>, tool: Arc<dyn Tool>) {
        let key = key.into();
        if let Some((group, _)) = key.split_once('_') {
            self.groups.add_group(group);
        }
        self.tools.insert(key, tool);
    }

    /// Direct lookup by exact key.
    pub fn get(&self, key: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(key).map(|t| t.value().clone())
    }

    /// Resolve a tool name through the full chain. Returns the matched
    /// registry key together with the tool.
    pub fn resolve(&self, name: &str) -> Option<(String, Arc<dyn Tool>)> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        if let Some(tool) = self.get(name) {
            return Some((name.to_string(), tool));
        }

        if let Some(converted) = self.groups.construct_tool_key(name) {
            if let Some(tool) = self.get(&converted) {
                return Some((converted, tool));
            }
        }

        // Bare-name fallback for tools registered without a group prefix.
        if let Some((_, suffix)) = name.rsplit_once('_') {
            if !suffix.is_empty() {
                if let Some(tool) = self.get(suffix) {
                    return Some((suffix.to_string(), tool));
                }
            }
        }

        None
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.tools.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    pub fn group_index(&self) -> &ServiceGroupIndex {
        &self.groups
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Run `cleanup(plan_id)` on every registered tool, swallowing nothing:
    /// the tool contract requires cleanup to be infallible.
    pub fn cleanup_all(&self, plan_id: &str) {
        for entry in self.tools.iter() {
            entry.value().cleanup(plan_id);
        }
    }
}
