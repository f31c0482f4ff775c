//! Error types for Mail Assist.

/// Collaborator failure inside an action node, before it is recorded on
/// the conversation state.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Mail error: {0}")]
    Mail(#[from] MailError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Language model errors.
///
/// Rig folds transport, auth and rate-limit failures into one prompt
/// error, so they all arrive as `RequestFailed`.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

/// Mail provider errors (IMAP search/fetch, SMTP delivery).
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Connection to {host} failed: {reason}")]
    Connection { host: String, reason: String },

    #[error("Authentication failed for {username}")]
    AuthFailed { username: String },

    #[error("IMAP command {command} failed: {reason}")]
    Protocol { command: String, reason: String },

    #[error("Message {id} not found")]
    NotFound { id: String },

    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Failed to build message: {0}")]
    Build(String),

    #[error("Mail task failed: {0}")]
    Task(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Faults that escape a workflow pass.
///
/// Only the router and responder let collaborator failures through; action
/// nodes record theirs on the conversation state instead.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("{node} node failed: {source}")]
    Node {
        node: &'static str,
        #[source]
        source: LlmError,
    },
}
