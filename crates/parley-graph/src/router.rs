use crate::node::NodeType;
use parley_types::GraphState;

/// Decides which node runs next
pub trait Router: Send + Sync {
    fn next(&self, state: &GraphState, current: NodeType) -> NextNode;
}

#[derive(Debug, Clone, PartialEq)]
pub enum NextNode {
    LLM,
    Tool,
    End,
}

/// LLM -> Tool (while tool calls are pending) -> LLM -> ... -> END,
/// stopping once `max_steps` model steps have run.
pub struct SimpleRouter {
    pub max_steps: usize,
}

impl SimpleRouter {
    pub fn new(max_steps: usize) -> Self {
        Self { max_steps }
    }
}

impl Router for SimpleRouter {
    fn next(&self, state: &GraphState, current: NodeType) -> NextNode {
        match current {
            NodeType::LLM if state.has_pending_tool_calls() => {
                if state.steps >= self.max_steps {
                    tracing::warn!(steps = state.steps, "step limit reached with tool calls pending");
                    NextNode::End
                } else {
                    NextNode::Tool
                }
            }
            NodeType::LLM => NextNode::End,
            NodeType::Tool => NextNode::LLM,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_llm::{Message, ToolCall};
    use parley_types::{GraphInput, LLMConfig};

    fn state_with_tool_call(steps: usize) -> GraphState {
        let mut state = GraphState::from_input(GraphInput::new(vec![Message::human("q")], LLMConfig::default()));
        state.add_message(Message::ai_with_tools(None, vec![ToolCall::new("c1", "t", "{}")]));
        state.steps = steps;
        state
    }

    #[test]
    fn test_routes_to_tools_until_step_limit() {
        let router = SimpleRouter::new(3);
        assert_eq!(router.next(&state_with_tool_call(1), NodeType::LLM), NextNode::Tool);
        assert_eq!(router.next(&state_with_tool_call(3), NodeType::LLM), NextNode::End);
        assert_eq!(router.next(&state_with_tool_call(1), NodeType::Tool), NextNode::LLM);
    }

    #[test]
    fn test_plain_answer_ends() {
        let router = SimpleRouter::new(3);
        let mut state = GraphState::from_input(GraphInput::new(vec![Message::human("q")], LLMConfig::default()));
        state.add_message(Message::ai("a"));
        assert_eq!(router.next(&state, NodeType::LLM), NextNode::End);
    }
}
