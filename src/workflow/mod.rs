//! The email workflow: route → (search | send)? → respond.
//!
//! One pass per user query. Each node reads and writes the shared
//! [`ConversationState`]; [`graph::EmailWorkflow`] decides which node runs
//! next.

pub mod graph;
pub mod responder;
pub mod router;
pub mod search;
pub mod send;
pub mod state;

pub use graph::{EmailWorkflow, Step, route_decision};
pub use responder::Responder;
pub use router::IntentRouter;
pub use search::SearchAction;
pub use send::SendAction;
pub use state::{Author, ConversationState, EmailAction, HistoryEntry, SendParams};

use async_trait::async_trait;

use crate::error::WorkflowError;

/// Default bound on search hits.
pub const DEFAULT_MAX_RESULTS: usize = 5;

/// Tunables shared by the workflow nodes.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    /// Maximum number of messages a search returns.
    pub max_results: usize,
    /// Temperature for classification and parameter extraction.
    pub extraction_temperature: f32,
    /// Temperature for the final summary.
    pub response_temperature: f32,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_results: DEFAULT_MAX_RESULTS,
            extraction_temperature: 0.0,
            response_temperature: 0.3,
        }
    }
}

/// A step of the workflow graph.
#[async_trait]
pub trait WorkflowNode: Send + Sync {
    /// Node name, for logs and error reports.
    fn name(&self) -> &'static str;

    /// Run against the turn's state.
    ///
    /// An `Err` aborts the turn; recoverable failures belong in
    /// [`ConversationState::record_error`].
    async fn run(&self, state: &mut ConversationState) -> Result<(), WorkflowError>;
}
