use anyhow::Result;
use async_trait::async_trait;
use parley_types::{GraphState, StreamEvent};
use tokio::sync::mpsc;

pub type EventSender = mpsc::Sender<StreamEvent>;

/// One unit of work in the step loop
#[async_trait]
pub trait Node: Send + Sync {
    /// Execute the node's logic, mutating state and emitting events
    async fn execute(&self, state: &mut GraphState, event_tx: &EventSender) -> Result<()>;

    fn node_type(&self) -> NodeType;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    LLM,
    Tool,
}

/// Forward an event to the client. A closed channel means the client went
/// away; the turn keeps running regardless.
pub async fn emit(event_tx: &EventSender, event: StreamEvent) {
    if event_tx.send(event).await.is_err() {
        tracing::trace!("event receiver dropped");
    }
}
