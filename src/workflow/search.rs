//! Search action: turns the query into a provider search and normalizes
//! whatever the mailbox returns into `MessageRecord`s.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::error::{Error, WorkflowError};
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};
use crate::mail::{MailProvider, MessageRecord, SearchResults};
use crate::workflow::{ConversationState, EmailAction, WorkflowConfig, WorkflowNode};

/// Max tokens for the query extraction call.
const QUERY_MAX_TOKENS: u32 = 64;

/// Identifier markers in a text listing; the capture runs to end of line.
static ID_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:Email|Message) ID:([^\n]*)").expect("valid regex"));

/// Runs when the router chose `search`; otherwise leaves state untouched.
pub struct SearchAction {
    llm: Arc<dyn LlmProvider>,
    mail: Arc<dyn MailProvider>,
    max_results: usize,
    temperature: f32,
}

impl SearchAction {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        mail: Arc<dyn MailProvider>,
        config: &WorkflowConfig,
    ) -> Self {
        Self {
            llm,
            mail,
            max_results: config.max_results,
            temperature: config.extraction_temperature,
        }
    }

    async fn search(&self, query: &str) -> Result<Vec<MessageRecord>, Error> {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(build_query_prompt()),
            ChatMessage::user(query),
        ])
        .with_temperature(self.temperature)
        .with_max_tokens(QUERY_MAX_TOKENS);

        let response = self.llm.complete(request).await?;
        let provider_query = clean_search_query(&response.content);
        debug!(provider_query = %provider_query, "Extracted search query");

        let results = self.mail.search(&provider_query, self.max_results).await?;
        Ok(normalize_results(results, self.max_results, self.mail.as_ref()).await)
    }
}

#[async_trait]
impl WorkflowNode for SearchAction {
    fn name(&self) -> &'static str {
        "search"
    }

    async fn run(&self, state: &mut ConversationState) -> Result<(), WorkflowError> {
        if state.action != Some(EmailAction::Search) {
            return Ok(());
        }

        match self.search(state.current_query()).await {
            Ok(records) => {
                info!(count = records.len(), "Retrieved emails");
                state.retrieved_messages = Some(records);
            }
            Err(e) => {
                warn!(error = %e, "Email search failed");
                state.record_error(format!("Failed to search emails: {e}"));
            }
        }
        Ok(())
    }
}

/// System prompt for turning a request into a mailbox search query.
pub fn build_query_prompt() -> String {
    "Extract the search parameters from the user's request and return ONLY a \
     Gmail-style search query string, with no explanation.\n\
     Examples:\n\
     - \"emails from Tarek\" -> from:Tarek\n\
     - \"emails about Project Atlas\" -> subject:\"Project Atlas\"\n\
     - \"emails from Alice about the budget\" -> from:Alice budget"
        .to_string()
}

/// Strip wrapping quotes or backticks from the model's query and fold it
/// onto one line.
pub fn clean_search_query(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('`').trim();
    let unquoted = trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(trimmed);
    unquoted.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Pull one identifier per marker out of a text listing.
///
/// Duplicates are kept; each one is fetched.
pub fn extract_message_ids(listing: &str) -> Vec<String> {
    ID_MARKER
        .captures_iter(listing)
        .map(|cap| cap[1].replace(['"', '\''], "").trim().to_string())
        .filter(|id| !id.is_empty())
        .collect()
}

/// Turn any search result shape into a uniform list of records.
pub async fn normalize_results(
    results: SearchResults,
    max_results: usize,
    mail: &dyn MailProvider,
) -> Vec<MessageRecord> {
    match results {
        SearchResults::Listing(text) => {
            let ids = extract_message_ids(&text);
            debug!(count = ids.len(), "Found message ids in listing");
            let mut records = Vec::with_capacity(ids.len());
            for id in ids {
                match mail.get_message(&id).await {
                    Ok(record) => records.push(record),
                    Err(e) => {
                        warn!(id = %id, error = %e, "Failed to fetch message");
                        records.push(MessageRecord::failed(id, e));
                    }
                }
            }
            records
        }
        SearchResults::Records(raw) => raw
            .into_iter()
            .take(max_results)
            .map(MessageRecord::from)
            .collect(),
        SearchResults::Single(raw) => vec![MessageRecord::from(raw)],
        SearchResults::Unrecognized(text) => {
            warn!("Search results in unexpected format");
            vec![MessageRecord::unrecognized(&text)]
        }
    }
}
