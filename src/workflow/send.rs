//! Send action: extracts structured send parameters from the query,
//! validates them, and hands the message to the mailbox.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::WorkflowError;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};
use crate::mail::{MailProvider, SendRequest};
use crate::workflow::{ConversationState, EmailAction, SendParams, WorkflowConfig, WorkflowNode};

/// Max tokens for parameter extraction (the body is drafted here).
const EXTRACTION_MAX_TOKENS: u32 = 1024;

/// Why extracted parameters could not be used.
#[derive(Debug, thiserror::Error)]
pub enum ParamsError {
    #[error("Failed to parse email parameters: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),
}

/// `cc` as the model may produce it.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CcField {
    Text(String),
    List(Vec<String>),
}

/// Raw extraction output; every field may be absent or null.
#[derive(Debug, Deserialize)]
struct ExtractedParams {
    #[serde(default)]
    to: Option<String>,
    #[serde(default)]
    cc: Option<CcField>,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    body: Option<String>,
}

/// Runs when the router chose `send`; otherwise leaves state untouched.
pub struct SendAction {
    llm: Arc<dyn LlmProvider>,
    mail: Arc<dyn MailProvider>,
    temperature: f32,
}

impl SendAction {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        mail: Arc<dyn MailProvider>,
        config: &WorkflowConfig,
    ) -> Self {
        Self {
            llm,
            mail,
            temperature: config.extraction_temperature,
        }
    }
}

#[async_trait]
impl WorkflowNode for SendAction {
    fn name(&self) -> &'static str {
        "send"
    }

    async fn run(&self, state: &mut ConversationState) -> Result<(), WorkflowError> {
        if state.action != Some(EmailAction::Send) {
            return Ok(());
        }

        let request = CompletionRequest::new(vec![
            ChatMessage::system(build_extraction_prompt()),
            ChatMessage::user(state.current_query()),
        ])
        .with_temperature(self.temperature)
        .with_max_tokens(EXTRACTION_MAX_TOKENS);

        let response = match self.llm.complete(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Send parameter extraction failed");
                state.record_error(format!("Failed to compose/send email: {e}"));
                return Ok(());
            }
        };

        let params = match parse_send_params(&response.content) {
            Ok(params) => params,
            Err(e) => {
                warn!(raw_response = %response.content, error = %e, "Unusable send parameters");
                state.record_error(match e {
                    ParamsError::Parse(_) => e.to_string(),
                    ParamsError::MissingField(_) => format!("Failed to compose/send email: {e}"),
                });
                return Ok(());
            }
        };

        debug!(to = %params.to, cc = params.cc.len(), "Sending email");
        state.sent_message = Some(params.clone());

        let request = SendRequest {
            to: params.to,
            subject: params.subject,
            body: params.body,
            cc: params.cc,
        };
        match self.mail.send(request).await {
            Ok(outcome) => {
                if outcome.success {
                    info!(detail = %outcome.detail, "Email delivered");
                } else {
                    warn!(detail = %outcome.detail, "Email delivery rejected");
                    state.record_error(format!("Email sending failed: {}", outcome.detail));
                }
                state.send_result = Some(outcome);
            }
            Err(e) => {
                warn!(error = %e, "Email send call failed");
                state.record_error(format!("Failed to compose/send email: {e}"));
            }
        }
        Ok(())
    }
}

/// System prompt for send-parameter extraction.
///
/// Absent cc is requested as JSON `null` so the reply stays valid JSON.
pub fn build_extraction_prompt() -> String {
    "Extract email parameters from the user's request.\n\
     Return ONLY a valid JSON object with exactly these keys: \"to\", \"cc\", \"subject\", \"body\".\n\
     - \"cc\" is null when no CC is mentioned, otherwise a string of comma-separated addresses.\n\
     - Always include the \"cc\" key.\n\
     - Do not include any other text, explanations, or markdown formatting.\n\n\
     Example:\n\
     {\"to\": \"example@email.com\", \"cc\": null, \"subject\": \"Subject line here\", \"body\": \"Email body content here\"}\n\n\
     Make the body professional and well-formatted."
        .to_string()
}

/// Parse and validate the model's extraction output.
pub fn parse_send_params(raw: &str) -> Result<SendParams, ParamsError> {
    let json = extract_json_object(raw);
    let extracted: ExtractedParams = serde_json::from_str(&json)?;

    let to = required(extracted.to, "to")?;
    let subject = required(extracted.subject, "subject")?;
    let body = required(extracted.body, "body")?;
    let cc = match extracted.cc {
        None => Vec::new(),
        Some(CcField::Text(text)) => parse_cc(Some(&text)),
        Some(CcField::List(list)) => parse_cc(Some(&list.join(","))),
    };

    Ok(SendParams {
        to: to.trim().to_string(),
        cc,
        subject,
        body,
    })
}

fn required(value: Option<String>, field: &'static str) -> Result<String, ParamsError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or(ParamsError::MissingField(field))
}

/// Split a comma-separated cc string into trimmed, non-empty addresses.
pub fn parse_cc(cc: Option<&str>) -> Vec<String> {
    cc.map(|text| {
        text.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

/// Extract a JSON object from LLM output (handles markdown wrapping).
pub fn extract_json_object(text: &str) -> String {
    let trimmed = text.trim();

    if trimmed.starts_with('{') {
        return trimmed.to_string();
    }

    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim().to_string();
        }
    }

    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        if let Some(end) = after.find("```") {
            let inner = after[..end].trim();
            if inner.starts_with('{') {
                return inner.to_string();
            }
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && end > start
    {
        return trimmed[start..=end].to_string();
    }

    trimmed.to_string()
}
