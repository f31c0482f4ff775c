//! The assistant façade: one workflow pass per query plus a turn log.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info};
use uuid::Uuid;

use crate::workflow::{ConversationState, EmailAction, EmailWorkflow};

/// Reply when a pass finishes without an assistant message.
pub const NO_REPLY_MESSAGE: &str = "I couldn't process your request. Please try again.";

/// What the assistant remembers about a finished turn.
#[derive(Debug, Clone, Serialize)]
pub struct TurnRecord {
    pub id: Uuid,
    pub query: String,
    pub response: String,
    pub action: Option<EmailAction>,
    pub timestamp: DateTime<Utc>,
}

/// Conversational email assistant.
///
/// Full per-turn state is discarded after each query; only the turn log
/// survives across turns.
pub struct EmailAssistant {
    workflow: EmailWorkflow,
    turns: Vec<TurnRecord>,
}

impl EmailAssistant {
    pub fn new(workflow: EmailWorkflow) -> Self {
        Self {
            workflow,
            turns: Vec::new(),
        }
    }

    /// Answer one query. Always returns text for the user.
    pub async fn process_query(&mut self, query: &str) -> String {
        let state = ConversationState::new(query);

        match self.workflow.run(state).await {
            Ok(state) => {
                let Some(response) = state.last_reply().map(str::to_string) else {
                    return NO_REPLY_MESSAGE.to_string();
                };
                info!(
                    action = state.action.as_ref().map(|a| a.as_str()).unwrap_or("unknown"),
                    error = state.error().unwrap_or(""),
                    "Turn complete"
                );
                self.turns.push(TurnRecord {
                    id: Uuid::new_v4(),
                    query: query.to_string(),
                    response: response.clone(),
                    action: state.action,
                    timestamp: Utc::now(),
                });
                response
            }
            Err(e) => {
                error!(error = %e, "Turn aborted");
                format!("An error occurred: {e}")
            }
        }
    }

    /// Completed turns, oldest first.
    pub fn turn_log(&self) -> &[TurnRecord] {
        &self.turns
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::testing::{RecordingMailbox, ScriptedLlm};
    use crate::workflow::WorkflowConfig;

    fn assistant(llm: ScriptedLlm) -> EmailAssistant {
        let workflow = EmailWorkflow::new(
            Arc::new(llm),
            Arc::new(RecordingMailbox::default()),
            &WorkflowConfig::default(),
        );
        EmailAssistant::new(workflow)
    }

    #[tokio::test]
    async fn successful_turn_is_logged() {
        let mut assistant = assistant(ScriptedLlm::new(&[
            "unclear",
            "Could you tell me whether you want to search or send?",
        ]));

        let reply = assistant.process_query("hmm").await;
        assert_eq!(reply, "Could you tell me whether you want to search or send?");
        let log = assistant.turn_log();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].query, "hmm");
        assert_eq!(log[0].action, Some(EmailAction::Unclear));
    }

    #[tokio::test]
    async fn router_fault_becomes_error_text() {
        let mut assistant =
            assistant(ScriptedLlm::with_results(vec![Err("invalid api key".into())]));

        let reply = assistant.process_query("find mails").await;
        assert!(reply.starts_with("An error occurred: "));
        assert!(reply.contains("invalid api key"));
        assert!(assistant.turn_log().is_empty());
    }

    #[tokio::test]
    async fn responder_fault_becomes_error_text() {
        let mut assistant = assistant(ScriptedLlm::with_results(vec![
            Ok("unclear".into()),
            Err("overloaded".into()),
        ]));

        let reply = assistant.process_query("??").await;
        assert!(reply.starts_with("An error occurred: "));
        assert!(reply.contains("respond"));
    }

    #[tokio::test]
    async fn turns_accumulate() {
        let mut assistant = assistant(ScriptedLlm::new(&["unclear", "one", "unclear", "two"]));
        assistant.process_query("a").await;
        assistant.process_query("b").await;
        let queries: Vec<&str> = assistant.turn_log().iter().map(|t| t.query.as_str()).collect();
        assert_eq!(queries, vec!["a", "b"]);
    }
}
