//! Mail provider abstraction: search, fetch and send.

pub mod imap;
pub mod types;

pub use imap::ImapSmtpMailbox;
pub use types::{MessageRecord, RawMessage};

use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, MailError};

/// What a provider's search operation handed back.
///
/// Providers differ: some return a text listing of identifiers that must be
/// fetched one by one, others return message data directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchResults {
    /// Free text containing `Message ID:` / `Email ID:` markers.
    Listing(String),
    /// Message data, already materialized.
    Records(Vec<RawMessage>),
    /// One message.
    Single(RawMessage),
    /// Anything else; kept verbatim for reporting.
    Unrecognized(String),
}

/// An outbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendRequest {
    pub to: String,
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub cc: Vec<String>,
}

/// Result of a delivery attempt as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendOutcome {
    pub success: bool,
    pub detail: String,
}

impl SendOutcome {
    pub fn delivered(detail: impl Into<String>) -> Self {
        Self {
            success: true,
            detail: detail.into(),
        }
    }

    pub fn failed(detail: impl Into<String>) -> Self {
        Self {
            success: false,
            detail: detail.into(),
        }
    }
}

/// A mailbox the assistant can search and send from.
#[async_trait]
pub trait MailProvider: Send + Sync {
    /// Run a provider-syntax search, returning at most `max_results` hits.
    async fn search(&self, query: &str, max_results: usize) -> Result<SearchResults, MailError>;

    /// Fetch one message by the identifier a `Listing` carried.
    async fn get_message(&self, id: &str) -> Result<MessageRecord, MailError>;

    /// Deliver a message. A rejected delivery is `Ok` with `success: false`.
    async fn send(&self, request: SendRequest) -> Result<SendOutcome, MailError>;
}

/// Mailbox connection settings, built from environment variables.
#[derive(Debug, Clone)]
pub struct MailConfig {
    pub imap_host: String,
    pub imap_port: u16,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
    pub mailbox: String,
}

impl MailConfig {
    /// Build config from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let imap_host = lookup("EMAIL_IMAP_HOST")
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("EMAIL_IMAP_HOST".to_string()))?;

        let imap_port = parse_port(&lookup, "EMAIL_IMAP_PORT", 993)?;
        let smtp_host =
            lookup("EMAIL_SMTP_HOST").unwrap_or_else(|| imap_host.replace("imap", "smtp"));
        let smtp_port = parse_port(&lookup, "EMAIL_SMTP_PORT", 587)?;

        let username = lookup("EMAIL_USERNAME").unwrap_or_default();
        let password = SecretString::from(lookup("EMAIL_PASSWORD").unwrap_or_default());
        let from_address = lookup("EMAIL_FROM_ADDRESS").unwrap_or_else(|| username.clone());
        let mailbox = lookup("EMAIL_MAILBOX").unwrap_or_else(|| "INBOX".to_string());

        Ok(Self {
            imap_host,
            imap_port,
            smtp_host,
            smtp_port,
            username,
            password,
            from_address,
            mailbox,
        })
    }
}

fn parse_port<F>(lookup: &F, key: &str, default: u16) -> Result<u16, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("'{raw}' is not a port: {e}"),
        }),
    }
}
