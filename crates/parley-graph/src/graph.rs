use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Result};
use parley_llm::{ChatClient, Message};
use parley_tools::ToolExecutor;
use parley_types::{GraphConfig, GraphInput, GraphState, ModelTier};

use crate::node::{EventSender, Node, NodeType};
use crate::nodes::{LLMNode, ToolNode};
use crate::router::{NextNode, Router, SimpleRouter};

/// What a finished step loop hands to finalization.
#[derive(Debug, Clone)]
pub struct TurnResult {
    pub run_id: String,
    /// Assistant and tool messages produced by the turn, in order
    pub produced: Vec<Message>,
    /// Finish reason of the last model step
    pub finish_reason: Option<String>,
    pub steps: usize,
}

impl TurnResult {
    pub fn finished_normally(&self) -> bool {
        self.finish_reason.as_deref() == Some("stop")
    }
}

/// The step loop, with one provider chain per model tier.
pub struct Graph {
    standard: Arc<dyn ChatClient>,
    reasoning: Arc<dyn ChatClient>,
    config: GraphConfig,
}

impl Graph {
    pub fn new(standard: Arc<dyn ChatClient>, reasoning: Arc<dyn ChatClient>, config: GraphConfig) -> Self {
        Self {
            standard,
            reasoning,
            config,
        }
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    fn client_for(&self, tier: ModelTier) -> Arc<dyn ChatClient> {
        match tier {
            ModelTier::Standard => Arc::clone(&self.standard),
            ModelTier::Reasoning => Arc::clone(&self.reasoning),
        }
    }

    /// Run the loop to completion, bounded by the configured execution timeout.
    pub async fn run(&self, input: GraphInput, tools: Arc<ToolExecutor>, event_tx: EventSender) -> Result<TurnResult> {
        let timeout = self.config.execution_timeout;
        match tokio::time::timeout(timeout, self.execute_loop(input, tools, &event_tx)).await {
            Ok(result) => result,
            Err(_) => Err(anyhow!("turn exceeded the {}s execution timeout", timeout.as_secs())),
        }
    }

    async fn execute_loop(
        &self,
        input: GraphInput,
        tools: Arc<ToolExecutor>,
        event_tx: &EventSender,
    ) -> Result<TurnResult> {
        let start_time = Instant::now();
        let mut state = GraphState::from_input(input);

        let llm_node = LLMNode::new(self.client_for(state.llm_config.tier), Arc::clone(&tools));
        let tool_node = ToolNode::new(tools);
        let router = SimpleRouter::new(self.config.max_steps);

        let mut current_node = NodeType::LLM;
        loop {
            match current_node {
                NodeType::LLM => llm_node.execute(&mut state, event_tx).await?,
                NodeType::Tool => tool_node.execute(&mut state, event_tx).await?,
            }

            current_node = match router.next(&state, current_node) {
                NextNode::End => break,
                NextNode::LLM => NodeType::LLM,
                NextNode::Tool => NodeType::Tool,
            };
        }

        tracing::info!(
            run_id = %state.run_id,
            steps = state.steps,
            finish_reason = ?state.finish_reason,
            duration_ms = start_time.elapsed().as_millis() as u64,
            "step loop finished"
        );

        Ok(TurnResult {
            produced: state.produced_messages().to_vec(),
            run_id: state.run_id,
            finish_reason: state.finish_reason,
            steps: state.steps,
        })
    }
}
