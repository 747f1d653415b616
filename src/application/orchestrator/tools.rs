//! Tool registry.
//!
//! Tools are described to the model as function schemas. Disabled tools stay
//! registered but are hidden from the model and the keyword classifier.

use serde_json::{json, Value};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::ports::{FunctionSchema, ToolExecutor};

/// A callable tool.
#[derive(Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments object.
    pub parameters: Value,
    /// Phrases that make the keyword classifier pick the `tool` intent.
    pub triggers: Vec<String>,
    executor: Option<Arc<dyn ToolExecutor>>,
}

impl fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("triggers", &self.triggers)
            .field("executable", &self.executor.is_some())
            .finish()
    }
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: json!({"type": "object", "properties": {}}),
            triggers: Vec::new(),
            executor: None,
        }
    }

    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_triggers<I, S>(mut self, triggers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.triggers = triggers.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_executor(mut self, executor: Arc<dyn ToolExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// `None` for tools that are described but cannot run.
    pub fn executor(&self) -> Option<&Arc<dyn ToolExecutor>> {
        self.executor.as_ref()
    }

    pub fn schema(&self) -> FunctionSchema {
        FunctionSchema {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.parameters.clone(),
        }
    }
}

/// Registered tools in registration order.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolDefinition>,
    disabled: HashSet<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a tool, replacing any tool with the same name.
    pub fn register(&mut self, tool: ToolDefinition) {
        tracing::info!(tool = %tool.name, "Tool registered");
        match self.tools.iter_mut().find(|t| t.name == tool.name) {
            Some(existing) => *existing = tool,
            None => self.tools.push(tool),
        }
    }

    pub fn with_tool(mut self, tool: ToolDefinition) -> Self {
        self.register(tool);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.iter().find(|t| t.name == name)
    }

    /// Enables or disables a tool. Returns false for unknown names.
    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> bool {
        if self.get(name).is_none() {
            return false;
        }
        if enabled {
            self.disabled.remove(name);
        } else {
            self.disabled.insert(name.to_string());
        }
        tracing::info!(tool = %name, enabled, "Tool availability changed");
        true
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.get(name).is_some() && !self.disabled.contains(name)
    }

    /// All registered names, enabled or not.
    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name.clone()).collect()
    }

    pub fn enabled(&self) -> impl Iterator<Item = &ToolDefinition> {
        self.tools.iter().filter(|t| !self.disabled.contains(&t.name))
    }

    pub fn has_enabled(&self) -> bool {
        self.enabled().next().is_some()
    }

    /// `name: description` lines for the classifier prompt.
    pub fn descriptions(&self) -> Vec<String> {
        self.enabled()
            .map(|t| format!("{}: {}", t.name, t.description))
            .collect()
    }

    pub fn function_schemas(&self) -> Vec<FunctionSchema> {
        self.enabled().map(ToolDefinition::schema).collect()
    }

    /// Trigger phrases per enabled tool.
    pub fn triggers(&self) -> Vec<(String, Vec<String>)> {
        self.enabled()
            .filter(|t| !t.triggers.is_empty())
            .map(|t| (t.name.clone(), t.triggers.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ToolRegistry {
        ToolRegistry::new()
            .with_tool(ToolDefinition::new("weather", "Current weather").with_triggers(["hava durumu"]))
            .with_tool(ToolDefinition::new("orders", "Order lookup"))
    }

    #[test]
    fn disabled_tools_are_hidden() {
        let mut registry = registry();
        assert!(registry.set_enabled("weather", false));

        assert_eq!(registry.descriptions(), vec!["orders: Order lookup".to_string()]);
        assert_eq!(registry.function_schemas().len(), 1);
        assert!(registry.triggers().is_empty());
        assert_eq!(registry.names().len(), 2);
        assert!(!registry.is_enabled("weather"));

        assert!(registry.set_enabled("weather", true));
        assert!(registry.is_enabled("weather"));
    }

    #[test]
    fn unknown_tool_cannot_be_toggled() {
        let mut registry = registry();
        assert!(!registry.set_enabled("missing", true));
        assert!(!registry.is_enabled("missing"));
    }

    #[test]
    fn register_replaces_by_name() {
        let mut registry = registry();
        registry.register(ToolDefinition::new("orders", "Order status"));

        assert_eq!(registry.names(), vec!["weather".to_string(), "orders".to_string()]);
        assert_eq!(registry.get("orders").unwrap().description, "Order status");
    }

    #[test]
    fn schema_carries_parameters() {
        let tool = ToolDefinition::new("orders", "Order lookup")
            .with_parameters(json!({"type": "object", "properties": {"id": {"type": "string"}}}));
        let schema = tool.schema();
        assert_eq!(schema.name, "orders");
        assert_eq!(schema.parameters["properties"]["id"]["type"], "string");
        assert!(tool.executor().is_none());
    }
}
