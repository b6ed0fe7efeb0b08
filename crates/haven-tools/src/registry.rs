use std::collections::HashMap;

use haven_providers::ToolDefinition;

use crate::tool::{Tool, ToolResult};

/// Holds every registered tool and exposes the four operations named in
/// the tool registry contract.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .values()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.input_schema(),
            })
            .collect()
    }

    pub async fn execute(&self, name: &str, args: serde_json::Value) -> ToolResult {
        match self.tools.get(name) {
            Some(tool) => tool.execute(args).await,
            None => ToolResult::error(format!("unknown tool: {name}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes input"
        }
        fn input_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        async fn execute(&self, input: serde_json::Value) -> ToolResult {
            ToolResult::success(input.to_string())
        }
    }

    #[tokio::test]
    async fn register_get_execute_round_trip() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(Echo));
        assert!(registry.has("echo"));
        assert_eq!(registry.definitions().len(), 1);
        let result = registry.execute("echo", serde_json::json!({"a": 1})).await;
        assert!(!result.is_error);
    }

    #[tokio::test]
    async fn execute_unknown_tool_is_an_error() {
        let registry = ToolRegistry::new();
        let result = registry.execute("nope", serde_json::Value::Null).await;
        assert!(result.is_error);
    }
}
