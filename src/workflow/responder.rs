//! Responder: summarizes the turn for the user. Always the last node.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::error::WorkflowError;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};
use crate::workflow::{ConversationState, WorkflowConfig, WorkflowNode};

const RESPONSE_MAX_TOKENS: u32 = 1024;

/// Produces the user-facing summary and appends it to history.
pub struct Responder {
    llm: Arc<dyn LlmProvider>,
    temperature: f32,
}

impl Responder {
    pub fn new(llm: Arc<dyn LlmProvider>, config: &WorkflowConfig) -> Self {
        Self {
            llm,
            temperature: config.response_temperature,
        }
    }
}

#[async_trait]
impl WorkflowNode for Responder {
    fn name(&self) -> &'static str {
        "respond"
    }

    async fn run(&self, state: &mut ConversationState) -> Result<(), WorkflowError> {
        debug!(
            action = state.action.as_ref().map(|a| a.as_str()).unwrap_or("unknown"),
            error = state.error().unwrap_or(""),
            "Generating response"
        );

        let request = CompletionRequest::new(vec![
            ChatMessage::system(build_responder_prompt()),
            ChatMessage::user(build_summary_prompt(state)),
        ])
        .with_temperature(self.temperature)
        .with_max_tokens(RESPONSE_MAX_TOKENS);

        let response = self
            .llm
            .complete(request)
            .await
            .map_err(|source| WorkflowError::Node {
                node: self.name(),
                source,
            })?;

        state.push_assistant(response.content);
        Ok(())
    }
}

/// System prompt for the final summary.
pub fn build_responder_prompt() -> String {
    "Generate a helpful response to the user based on the action taken.\n\
     Include relevant details from the state. Be concise and informative.\n\n\
     - If there was an error, explain it and suggest how to fix it.\n\
     - If an email was sent successfully, confirm the recipient, subject and any CCs.\n\
     - If emails were retrieved, say how many and summarize them.\n\
     - If the action is unclear or unknown, ask the user what they would like to do \
       (search their mailbox or send an email)."
        .to_string()
}

/// Render the turn's state as the summary request.
pub fn build_summary_prompt(state: &ConversationState) -> String {
    let action = state
        .action
        .as_ref()
        .map(|a| a.as_str())
        .unwrap_or("unknown");
    let emails = state
        .retrieved_messages
        .as_deref()
        .map(to_json)
        .unwrap_or_else(|| "[]".to_string());
    let draft = state
        .sent_message
        .as_ref()
        .map(to_json)
        .unwrap_or_else(|| "{}".to_string());
    let send_results = state
        .send_result
        .as_ref()
        .map(to_json)
        .unwrap_or_else(|| "{}".to_string());

    format!(
        "Action: {action}\n\
         Query: {query}\n\
         Retrieved Emails: {emails}\n\
         Draft Email: {draft}\n\
         Error: {error}\n\
         Send Results: {send_results}",
        query = state.current_query(),
        error = state.error().unwrap_or(""),
    )
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("<unserializable: {e}>"))
}
