use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use async_trait::async_trait;
use futures::future::join_all;
use parley_llm::ToolCall;
use parley_tools::ToolExecutor;
use parley_types::{GraphState, StreamEvent};
use serde_json::Value;

use crate::node::{emit, EventSender, Node, NodeType};

/// Runs every pending tool call of the last assistant message concurrently.
///
/// Results are streamed as each call finishes and appended to the state in
/// call order. A failing tool becomes an error result the model can read.
pub struct ToolNode {
    tools: Arc<ToolExecutor>,
}

impl ToolNode {
    pub fn new(tools: Arc<ToolExecutor>) -> Self {
        Self { tools }
    }

    async fn run_call(&self, call: &ToolCall, event_tx: &EventSender) -> String {
        let start = Instant::now();
        let outcome = match call.arguments_value() {
            Ok(arguments) => self
                .tools
                .execute_tool(&call.function.name, arguments)
                .await
                .map_err(|e| e.to_string()),
            Err(e) => Err(format!("arguments are not valid JSON: {}", e)),
        };

        let (result, is_error) = match outcome {
            Ok(Value::String(text)) => (text, false),
            Ok(value) => (value.to_string(), false),
            Err(e) => {
                tracing::warn!(tool = %call.function.name, error = %e, "tool call failed");
                (format!("Tool execution failed: {}", e), true)
            }
        };

        emit(
            event_tx,
            StreamEvent::ToolResult {
                tool_call_id: call.id.clone(),
                result: result.clone(),
                is_error,
                duration_ms: start.elapsed().as_millis() as u64,
            },
        )
        .await;
        result
    }
}

#[async_trait]
impl Node for ToolNode {
    async fn execute(&self, state: &mut GraphState, event_tx: &EventSender) -> Result<()> {
        let tool_calls = state.get_pending_tool_calls();
        if tool_calls.is_empty() {
            return Ok(());
        }

        let results = join_all(tool_calls.iter().map(|call| self.run_call(call, event_tx))).await;
        for (call, result) in tool_calls.into_iter().zip(results) {
            state.add_tool_result(call.id, result);
        }
        Ok(())
    }

    fn node_type(&self) -> NodeType {
        NodeType::Tool
    }
}
