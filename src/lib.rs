//! Mail Assist, a conversational email assistant.
//!
//! A query is classified (search / send / unclear), the matching action
//! runs against the mailbox, and a final model call summarizes the turn.

pub mod assistant;
pub mod cli;
pub mod config;
pub mod error;
pub mod llm;
pub mod mail;
pub mod workflow;

#[cfg(test)]
mod testing;

pub use assistant::{EmailAssistant, TurnRecord};
pub use error::Error;
