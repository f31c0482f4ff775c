//! Conversation state threaded through one workflow pass.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::mail::{MessageRecord, SendOutcome};

/// What the router decided the user wants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailAction {
    Search,
    Send,
    Unclear,
    /// The model answered with something other than the three tokens.
    Other(String),
}

impl EmailAction {
    /// Interpret a raw classifier reply (trimmed and lowercased first).
    ///
    /// An empty reply carries no intent and counts as `Unclear`.
    pub fn from_reply(raw: &str) -> Self {
        let token = raw.trim().to_lowercase();
        match token.as_str() {
            "search" => Self::Search,
            "send" => Self::Send,
            "unclear" | "" => Self::Unclear,
            _ => Self::Other(token),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Search => "search",
            Self::Send => "send",
            Self::Unclear => "unclear",
            Self::Other(token) => token,
        }
    }
}

impl fmt::Display for EmailAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who wrote a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Author {
    User,
    Assistant,
}

/// One message in the running conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub author: Author,
    pub content: String,
}

/// Parameters of the message the send action composed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendParams {
    pub to: String,
    pub cc: Vec<String>,
    pub subject: String,
    pub body: String,
}

/// Per-turn state, created fresh for every query.
///
/// `history` only grows, `current_query` is fixed at construction and
/// `error` holds at most one description (the latest one written).
#[derive(Debug, Clone, Serialize)]
pub struct ConversationState {
    history: Vec<HistoryEntry>,
    current_query: String,
    pub action: Option<EmailAction>,
    pub retrieved_messages: Option<Vec<MessageRecord>>,
    pub sent_message: Option<SendParams>,
    pub send_result: Option<SendOutcome>,
    error: Option<String>,
}

impl ConversationState {
    /// Start a turn: the query becomes the first user entry in history.
    pub fn new(query: impl Into<String>) -> Self {
        let query = query.into();
        Self {
            history: vec![HistoryEntry {
                author: Author::User,
                content: query.clone(),
            }],
            current_query: query,
            action: None,
            retrieved_messages: None,
            sent_message: None,
            send_result: None,
            error: None,
        }
    }

    pub fn current_query(&self) -> &str {
        &self.current_query
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Record a failure for the responder to explain. Replaces any earlier one.
    pub fn record_error(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.history.push(HistoryEntry {
            author: Author::Assistant,
            content: content.into(),
        });
    }

    /// Content of the latest assistant entry, if any.
    pub fn last_reply(&self) -> Option<&str> {
        self.history
            .iter()
            .rev()
            .find(|e| e.author == Author::Assistant)
            .map(|e| e.content.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_reply_is_normalized() {
        assert_eq!(EmailAction::from_reply("  Search\n"), EmailAction::Search);
        assert_eq!(EmailAction::from_reply("SEND"), EmailAction::Send);
        assert_eq!(EmailAction::from_reply("unclear"), EmailAction::Unclear);
    }

    #[test]
    fn unknown_reply_is_kept_verbatim_lowercased() {
        let action = EmailAction::from_reply(" Summarize ");
        assert_eq!(action, EmailAction::Other("summarize".into()));
        assert_eq!(action.to_string(), "summarize");
    }

    #[test]
    fn blank_reply_is_unclear() {
        assert_eq!(EmailAction::from_reply(""), EmailAction::Unclear);
        assert_eq!(EmailAction::from_reply(" \n\t"), EmailAction::Unclear);
        assert_eq!(EmailAction::from_reply("").as_str(), "unclear");
    }

    #[test]
    fn new_state_starts_with_user_entry() {
        let state = ConversationState::new("find budget mails");
        assert_eq!(state.current_query(), "find budget mails");
        assert_eq!(state.history().len(), 1);
        assert_eq!(state.history()[0].author, Author::User);
        assert!(state.action.is_none());
        assert!(state.error().is_none());
        assert!(state.last_reply().is_none());
    }

    #[test]
    fn last_error_wins() {
        let mut state = ConversationState::new("q");
        state.record_error("first");
        state.record_error("second");
        assert_eq!(state.error(), Some("second"));
    }

    #[test]
    fn push_assistant_appends() {
        let mut state = ConversationState::new("q");
        state.push_assistant("done");
        assert_eq!(state.history().len(), 2);
        assert_eq!(state.last_reply(), Some("done"));
    }
}
