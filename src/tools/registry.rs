//! Tool registry.

use std::collections::BTreeMap;

use super::{RegistryError, ToolDefinition, ToolId, ToolSpec};

/// Name and description of a registered tool, used for prompting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInfo {
    pub name: &'static str,
    pub description: String,
}

/// Registry of tools, keyed by [`ToolId`].
///
/// Built once at startup and shared read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<ToolId, ToolSpec>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool. Each id may be registered once.
    pub fn register(&mut self, spec: ToolSpec) -> Result<(), RegistryError> {
        if self.tools.contains_key(&spec.id) {
            return Err(RegistryError::DuplicateTool(spec.name().to_string()));
        }
        tracing::debug!(tool = spec.name(), "Registered tool");
        self.tools.insert(spec.id, spec);
        Ok(())
    }

    /// Resolve a tool by its wire name.
    pub fn lookup(&self, name: &str) -> Result<&ToolSpec, RegistryError> {
        let id: ToolId = name.parse()?;
        self.tools
            .get(&id)
            .ok_or_else(|| RegistryError::UnknownTool(name.to_string()))
    }

    /// Function-calling schemas for every registered tool, in id order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(ToolSpec::definition).collect()
    }

    pub fn list_tools(&self) -> Vec<ToolInfo> {
        self.tools
            .values()
            .map(|t| ToolInfo {
                name: t.name(),
                description: t.description.clone(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
