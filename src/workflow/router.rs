//! Intent router. Classifies the query as search, send or unclear.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::WorkflowError;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};
use crate::workflow::{ConversationState, EmailAction, WorkflowConfig, WorkflowNode};

/// The reply is a single word.
const ROUTER_MAX_TOKENS: u32 = 8;

/// Classifies the current query with one model call.
///
/// Whatever the model answers is stored; tokens other than the three
/// expected ones are routed to clarification by the graph.
pub struct IntentRouter {
    llm: Arc<dyn LlmProvider>,
    temperature: f32,
}

impl IntentRouter {
    pub fn new(llm: Arc<dyn LlmProvider>, config: &WorkflowConfig) -> Self {
        Self {
            llm,
            temperature: config.extraction_temperature,
        }
    }
}

#[async_trait]
impl WorkflowNode for IntentRouter {
    fn name(&self) -> &'static str {
        "route"
    }

    async fn run(&self, state: &mut ConversationState) -> Result<(), WorkflowError> {
        debug!(query = %state.current_query(), "Routing query");

        let request = CompletionRequest::new(vec![
            ChatMessage::system(build_router_prompt()),
            ChatMessage::user(state.current_query()),
        ])
        .with_temperature(self.temperature)
        .with_max_tokens(ROUTER_MAX_TOKENS);

        let response = self
            .llm
            .complete(request)
            .await
            .map_err(|source| WorkflowError::Node {
                node: self.name(),
                source,
            })?;

        let action = EmailAction::from_reply(&response.content);
        info!(action = %action, "Router determined action");
        state.action = Some(action);
        Ok(())
    }
}

/// System prompt for intent classification.
pub fn build_router_prompt() -> String {
    "You are a router that decides which email action to take by analyzing the user's request.\n\
     Respond with ONLY one of these words:\n\
     - search: the user wants to find or read emails\n\
     - send: the user wants to compose and send an email\n\
     - unclear: the intent is not clear"
        .to_string()
}
