//! Step-tag parsing and agent template resolution.

use dashmap::DashMap;
use regex::Regex;
use std::sync::LazyLock;
use stride_agent_loop::AgentDefinition;

/// Agent tag used when a step carries no `[TAG]` prefix.
pub const DEFAULT_AGENT_TAG: &str = "DEFAULT_AGENT";

// Leading square-bracket tag; the tag may contain any non-bracket
// characters, including non-ASCII.
static TAG_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\[([^\]]+)\]").expect("tag pattern is valid"));

/// Extract the uppercased agent tag from a step requirement.
pub fn parse_step_tag(step_requirement: &str) -> String {
    TAG_PATTERN
        .captures(step_requirement)
        .and_then(|captures| captures.get(1))
        .map(|tag| tag.as_str().trim().to_uppercase())
        .unwrap_or_else(|| DEFAULT_AGENT_TAG.to_string())
}

/// Registry of agent variants keyed by uppercased name.
#[derive(Default)]
pub struct AgentTemplateRegistry {
    agents: DashMap<String, AgentDefinition>,
}

impl AgentTemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, definition: AgentDefinition) {
        self.agents
            .insert(definition.name.to_uppercase(), definition);
    }

    pub fn find(&self, tag: &str) -> Option<AgentDefinition> {
        self.agents.get(&tag.to_uppercase()).map(|d| d.clone())
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.agents.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}
