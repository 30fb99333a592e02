pub mod config;
pub mod events;
pub mod state;
pub mod validation;

pub use config::{GraphConfig, LLMConfig, ModelTier};
pub use events::StreamEvent;
pub use state::{GraphInput, GraphState};
