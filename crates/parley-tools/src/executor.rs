use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{Result, ToolError};
use crate::handler::ToolHandler;

/// The tool set of one turn, keyed by tool name.
#[derive(Clone, Default)]
pub struct ToolExecutor {
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
    order: Vec<String>,
}

impl ToolExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler; a later handler with the same name replaces it.
    pub fn register(&mut self, handler: Arc<dyn ToolHandler>) {
        let name = handler.name();
        if self.handlers.insert(name.clone(), handler).is_none() {
            self.order.push(name);
        }
    }

    pub fn with(mut self, handler: Arc<dyn ToolHandler>) -> Self {
        self.register(handler);
        self
    }

    /// Tool definitions in registration order
    pub fn get_llm_tools(&self) -> Vec<parley_llm::Tool> {
        self.order
            .iter()
            .filter_map(|name| self.handlers.get(name))
            .map(|h| h.definition())
            .collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(String::as_str).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub async fn execute_tool(&self, tool_name: &str, arguments: Value) -> Result<Value> {
        let handler = self
            .handlers
            .get(tool_name)
            .ok_or_else(|| ToolError::NotFound(tool_name.to_string()))?;
        handler.call(arguments).await
    }
}
