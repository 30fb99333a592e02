use async_trait::async_trait;
use parley_llm::Tool;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{Result, ToolError};

/// A tool the model can call during a turn.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Name, description and parameter schema as sent to the model
    fn definition(&self) -> Tool;

    async fn call(&self, arguments: Value) -> Result<Value>;

    fn name(&self) -> String {
        self.definition().function.name
    }
}

/// Tool definition whose parameter schema is derived from `T`.
pub fn schema_tool<T: JsonSchema>(name: &str, description: &str) -> Tool {
    let schema = schemars::schema_for!(T).to_value();
    Tool::new(name, description, schema)
}

/// Deserialize raw model arguments into the tool's input struct.
pub fn parse_input<T: DeserializeOwned>(arguments: Value) -> Result<T> {
    // Some models send `null` for tools without required fields
    let arguments = match arguments {
        Value::Null => Value::Object(Default::default()),
        other => other,
    };
    serde_json::from_value(arguments).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}
