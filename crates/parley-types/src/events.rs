use serde::{Deserialize, Serialize};

/// Everything a client sees on the chat event stream.
///
/// Model output (`reasoning`, `message`, `tool_call`, `done`) is forwarded as
/// it arrives; `tool_result` follows each tool execution; `committed` or
/// `error` reports the outcome of finalization; `end_stream` is always last.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    InitStream {
        run_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        thread_id: Option<String>,
        timestamp: i64,
    },

    Reasoning {
        content: String,
    },

    Message {
        content: String,
    },

    ToolCall {
        index: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        arguments: Option<String>,
    },

    ToolResult {
        tool_call_id: String,
        result: String,
        is_error: bool,
        duration_ms: u64,
    },

    /// One model step finished
    Done {
        #[serde(skip_serializing_if = "Option::is_none")]
        finish_reason: Option<String>,
    },

    /// The turn was durably written
    Committed {
        thread_id: String,
        message_ids: Vec<String>,
    },

    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },

    EndStream {
        status: String,
        total_duration_ms: u64,
    },
}

impl StreamEvent {
    /// SSE `event:` name, identical to the serde tag.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::InitStream { .. } => "init_stream",
            Self::Reasoning { .. } => "reasoning",
            Self::Message { .. } => "message",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::Done { .. } => "done",
            Self::Committed { .. } => "committed",
            Self::Error { .. } => "error",
            Self::EndStream { .. } => "end_stream",
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            code: Some(code.into()),
        }
    }
}

impl From<parley_llm::StreamEvent> for StreamEvent {
    fn from(event: parley_llm::StreamEvent) -> Self {
        match event {
            parley_llm::StreamEvent::Reasoning { content } => Self::Reasoning { content },
            parley_llm::StreamEvent::Message { content } => Self::Message { content },
            parley_llm::StreamEvent::ToolCall { index, id, name, arguments } => Self::ToolCall {
                index,
                id,
                name,
                arguments,
            },
            parley_llm::StreamEvent::Done { finish_reason } => Self::Done { finish_reason },
        }
    }
}
