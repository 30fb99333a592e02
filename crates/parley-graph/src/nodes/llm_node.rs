use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use futures::StreamExt;
use parley_llm::{ChatClient, ChatOptions, ChatRequest, ChatStream, Content, Message, ToolCall, ToolChoice};
use parley_tools::ToolExecutor;
use parley_types::GraphState;

use crate::node::{emit, EventSender, Node, NodeType};

/// Tool call fragments collected across deltas, keyed by stream index.
#[derive(Default)]
struct ToolCallBuffer {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

/// One model step: stream a completion, forward it, and append the
/// resulting assistant message to the state.
pub struct LLMNode {
    client: Arc<dyn ChatClient>,
    tools: Arc<ToolExecutor>,
}

impl LLMNode {
    pub fn new(client: Arc<dyn ChatClient>, tools: Arc<ToolExecutor>) -> Self {
        Self { client, tools }
    }

    async fn create_stream(&self, state: &GraphState) -> Result<ChatStream> {
        let mut options = ChatOptions::new();
        let tools = self.tools.get_llm_tools();
        if !tools.is_empty() {
            options = options.tools(tools).tool_choice(ToolChoice::auto());
        }
        if let Some(temp) = state.llm_config.temperature {
            options = options.temperature(temp);
        }
        if let Some(max_tokens) = state.llm_config.max_tokens {
            options = options.max_tokens(max_tokens);
        }

        // The provider chain substitutes each route's own model name
        let request = ChatRequest::new(state.llm_config.tier.as_str(), state.messages.clone())
            .with_options(options);
        self.client.chat_stream(request).await
    }
}

#[async_trait]
impl Node for LLMNode {
    async fn execute(&self, state: &mut GraphState, event_tx: &EventSender) -> Result<()> {
        tracing::debug!(
            run_id = %state.run_id,
            step = state.steps + 1,
            tier = state.llm_config.tier.as_str(),
            "LLM step"
        );
        let mut stream = self.create_stream(state).await?;

        let mut content = String::new();
        let mut buffers: BTreeMap<u32, ToolCallBuffer> = BTreeMap::new();
        let mut finish_reason = None;

        while let Some(event) = stream.next().await {
            let event = event?;
            match &event {
                parley_llm::StreamEvent::Message { content: delta } => content.push_str(delta),
                parley_llm::StreamEvent::ToolCall { index, id, name, arguments } => {
                    let buffer = buffers.entry(*index).or_default();
                    if let Some(id) = id {
                        buffer.id = Some(id.clone());
                    }
                    if let Some(name) = name {
                        buffer.name = Some(name.clone());
                    }
                    if let Some(arguments) = arguments {
                        buffer.arguments.push_str(arguments);
                    }
                }
                parley_llm::StreamEvent::Done { finish_reason: reason } => {
                    if reason.is_some() {
                        finish_reason = reason.clone();
                    }
                }
                parley_llm::StreamEvent::Reasoning { .. } => {}
            }
            emit(event_tx, event.into()).await;
        }

        let tool_calls: Vec<ToolCall> = buffers
            .into_values()
            .filter_map(|b| match (b.id, b.name) {
                (Some(id), Some(name)) => Some(ToolCall::new(id, name, b.arguments)),
                _ => None,
            })
            .collect();

        if !tool_calls.is_empty() {
            let content = (!content.is_empty()).then(|| Content::text(content));
            state.add_message(Message::ai_with_tools(content, tool_calls));
        } else if !content.is_empty() {
            state.add_message(Message::ai(content));
        }

        state.steps += 1;
        state.finish_reason = finish_reason;
        Ok(())
    }

    fn node_type(&self) -> NodeType {
        NodeType::LLM
    }
}
