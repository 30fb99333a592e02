pub mod error;
pub mod graph;
pub mod node;
pub mod nodes;
pub mod prompt;
pub mod router;
pub mod turn;

pub use error::{FinalizeError, TurnError};
pub use graph::{Graph, TurnResult};
pub use node::{EventSender, Node, NodeType};
pub use router::{NextNode, Router, SimpleRouter};
pub use turn::{finalize, ChatOrchestrator, Finalized, PreparedTurn, TurnRequest};

pub use parley_types::{GraphConfig, GraphInput, GraphState, LLMConfig, ModelTier, StreamEvent};
