//! Workflow graph: fixed edges between the four nodes.
//!
//! ```text
//! route ──search──▶ search ──▶ respond ──▶ end
//!   │   ──send────▶ send ────▶ respond
//!   └── otherwise ──────────▶ respond
//! ```

use std::sync::Arc;

use tracing::{Instrument, debug, info_span};

use crate::error::WorkflowError;
use crate::llm::LlmProvider;
use crate::mail::MailProvider;
use crate::workflow::{
    ConversationState, EmailAction, IntentRouter, Responder, SearchAction, SendAction,
    WorkflowConfig, WorkflowNode,
};

/// Position in the workflow graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    Route,
    Search,
    Send,
    Respond,
    End,
}

impl Step {
    /// The step that follows this one, given the state after it ran.
    pub fn next(self, state: &ConversationState) -> Step {
        match self {
            Step::Route => route_decision(state.action.as_ref()),
            Step::Search | Step::Send => Step::Respond,
            Step::Respond | Step::End => Step::End,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Step::End)
    }
}

/// Branch taken after routing.
///
/// Anything other than `search` or `send` (including `unclear`, unexpected
/// model output and an unset action) goes to the responder, which asks the
/// user to clarify.
pub fn route_decision(action: Option<&EmailAction>) -> Step {
    match action {
        Some(EmailAction::Search) => Step::Search,
        Some(EmailAction::Send) => Step::Send,
        _ => Step::Respond,
    }
}

/// The compiled workflow: one pass per query.
pub struct EmailWorkflow {
    router: IntentRouter,
    search: SearchAction,
    send: SendAction,
    responder: Responder,
}

impl EmailWorkflow {
    /// Wire the nodes to shared collaborators.
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        mail: Arc<dyn MailProvider>,
        config: &WorkflowConfig,
    ) -> Self {
        Self {
            router: IntentRouter::new(Arc::clone(&llm), config),
            search: SearchAction::new(Arc::clone(&llm), Arc::clone(&mail), config),
            send: SendAction::new(Arc::clone(&llm), mail, config),
            responder: Responder::new(llm, config),
        }
    }

    fn node(&self, step: Step) -> Option<&dyn WorkflowNode> {
        match step {
            Step::Route => Some(&self.router),
            Step::Search => Some(&self.search),
            Step::Send => Some(&self.send),
            Step::Respond => Some(&self.responder),
            Step::End => None,
        }
    }

    /// Drive `state` from `route` to `end`.
    ///
    /// Returns the final state, or the first fault a node let escape.
    pub async fn run(
        &self,
        mut state: ConversationState,
    ) -> Result<ConversationState, WorkflowError> {
        let mut step = Step::Route;
        while let Some(node) = self.node(step) {
            let span = info_span!("node", name = node.name());
            node.run(&mut state).instrument(span).await?;
            let next = step.next(&state);
            debug!(from = ?step, to = ?next, "Workflow transition");
            step = next;
        }
        Ok(state)
    }
}
