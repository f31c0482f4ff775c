//! Scripted collaborators for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{LlmError, MailError};
use crate::llm::{CompletionRequest, CompletionResponse, LlmProvider};
use crate::mail::{MailProvider, MessageRecord, SearchResults, SendOutcome, SendRequest};

/// LLM that answers from a fixed script, one reply per call.
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<Result<String, String>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedLlm {
    pub fn new(replies: &[&str]) -> Self {
        Self::with_results(replies.iter().map(|r| Ok(r.to_string())).collect())
    }

    pub fn with_results(replies: Vec<Result<String, String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Text of the user message in the n-th request.
    pub fn user_prompt(&self, n: usize) -> String {
        self.requests()[n]
            .messages
            .iter()
            .rev()
            .find(|m| m.role == crate::llm::Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.requests.lock().unwrap().push(request);
        match self.replies.lock().unwrap().pop_front() {
            Some(Ok(text)) => Ok(CompletionResponse::text(text)),
            Some(Err(reason)) => Err(LlmError::RequestFailed {
                provider: "scripted".into(),
                reason,
            }),
            None => Err(LlmError::InvalidResponse {
                provider: "scripted".into(),
                reason: "script exhausted".into(),
            }),
        }
    }
}

/// Mailbox that serves canned data and records every call.
#[derive(Default)]
pub struct RecordingMailbox {
    pub search_result: Mutex<Option<Result<SearchResults, String>>>,
    pub messages: HashMap<String, MessageRecord>,
    pub send_result: Mutex<Option<Result<SendOutcome, String>>>,
    pub searches: Mutex<Vec<(String, usize)>>,
    pub fetches: Mutex<Vec<String>>,
    pub sends: Mutex<Vec<SendRequest>>,
}

impl RecordingMailbox {
    pub fn with_search(result: SearchResults) -> Self {
        Self {
            search_result: Mutex::new(Some(Ok(result))),
            ..Default::default()
        }
    }

    pub fn with_send(outcome: Result<SendOutcome, String>) -> Self {
        Self {
            send_result: Mutex::new(Some(outcome)),
            ..Default::default()
        }
    }

    pub fn with_message(mut self, record: MessageRecord) -> Self {
        self.messages.insert(record.id.clone(), record);
        self
    }

    pub fn call_count(&self) -> usize {
        self.searches.lock().unwrap().len()
            + self.fetches.lock().unwrap().len()
            + self.sends.lock().unwrap().len()
    }
}

#[async_trait]
impl MailProvider for RecordingMailbox {
    async fn search(&self, query: &str, max_results: usize) -> Result<SearchResults, MailError> {
        self.searches
            .lock()
            .unwrap()
            .push((query.to_string(), max_results));
        match self.search_result.lock().unwrap().clone() {
            Some(Ok(results)) => Ok(results),
            Some(Err(reason)) => Err(MailError::Protocol {
                command: "UID SEARCH".into(),
                reason,
            }),
            None => Ok(SearchResults::Records(Vec::new())),
        }
    }

    async fn get_message(&self, id: &str) -> Result<MessageRecord, MailError> {
        self.fetches.lock().unwrap().push(id.to_string());
        self.messages
            .get(id)
            .cloned()
            .ok_or_else(|| MailError::NotFound { id: id.to_string() })
    }

    async fn send(&self, request: SendRequest) -> Result<SendOutcome, MailError> {
        self.sends.lock().unwrap().push(request);
        match self.send_result.lock().unwrap().clone() {
            Some(Ok(outcome)) => Ok(outcome),
            Some(Err(reason)) => Err(MailError::Connection {
                host: "smtp.test".into(),
                reason,
            }),
            None => Ok(SendOutcome::delivered("250 OK")),
        }
    }
}

/// A record as a mailbox fetch would return it.
pub fn record(id: &str, subject: &str) -> MessageRecord {
    MessageRecord {
        id: id.to_string(),
        subject: subject.to_string(),
        sender: "alice@example.com".to_string(),
        date: "2025-10-14T09:30:00Z".to_string(),
        body: format!("Body of {subject}"),
        error: None,
    }
}
