use crate::config::LLMConfig;
use parley_llm::{Message, ToolCall};
use serde::{Deserialize, Serialize};

/// Mutable state of one turn's step loop.
///
/// `messages[..input_len]` is the context the turn started from; everything
/// after it was produced by the turn and is what gets committed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphState {
    pub run_id: String,
    pub messages: Vec<Message>,
    pub llm_config: LLMConfig,
    pub input_len: usize,
    pub steps: usize,
    pub finish_reason: Option<String>,
}

impl GraphState {
    pub fn from_input(input: GraphInput) -> Self {
        let input_len = input.messages.len();
        Self {
            run_id: input.run_id,
            messages: input.messages,
            llm_config: input.llm_config,
            input_len,
            steps: 0,
            finish_reason: None,
        }
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn add_message(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn has_pending_tool_calls(&self) -> bool {
        self.last_message()
            .map(|msg| !msg.tool_calls().is_empty())
            .unwrap_or(false)
    }

    pub fn get_pending_tool_calls(&self) -> Vec<ToolCall> {
        self.last_message()
            .map(|msg| msg.tool_calls().to_vec())
            .unwrap_or_default()
    }

    pub fn add_tool_result(&mut self, tool_call_id: String, result: String) {
        self.messages.push(Message::tool_result(tool_call_id, result));
    }

    pub fn produced_messages(&self) -> &[Message] {
        &self.messages[self.input_len.min(self.messages.len())..]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphInput {
    pub run_id: String,
    /// System prompt, prior history and the new user message, in order
    pub messages: Vec<Message>,
    pub llm_config: LLMConfig,
}

impl GraphInput {
    pub fn new(messages: Vec<Message>, llm_config: LLMConfig) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            messages,
            llm_config,
        }
    }
}
