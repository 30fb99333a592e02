pub mod types;
pub mod traits;
pub mod streaming;
pub mod error;
pub mod openai;
pub mod fallback;
pub mod config;

pub use traits::{
    ChatClient,
    ChatRequest, ChatResponse, ChatOptions,
    ChatStream,
    TokenUsage,
};

pub use streaming::StreamEvent;
pub use error::{is_retryable, LlmError};
pub use openai::OpenAIClient;
pub use fallback::{FallbackClient, ProviderRoute};
pub use config::{ClientFactory, ProviderConfig};
pub use types::{Message, Content, ContentPart, Tool, ToolCall, ToolChoice, FunctionCall, FunctionDefinition};
