//! Mail record types and body clean-up helpers.

use serde::{Deserialize, Serialize};

/// Bodies handed to the summarizer are cut to this many characters.
pub const MAX_BODY_CHARS: usize = 2000;

/// A normalized search hit, as shown to the summarizer.
///
/// A failed per-item fetch still produces a record: `error` is set and the
/// other fields carry placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: String,
    pub subject: String,
    pub sender: String,
    pub date: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MessageRecord {
    /// Placeholder for an identifier whose content could not be fetched.
    pub fn failed(id: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self {
            id: id.into(),
            subject: "Failed to retrieve".to_string(),
            sender: "Unknown".to_string(),
            date: "Unknown".to_string(),
            body: format!("Error retrieving email: {error}"),
            error: Some(error.to_string()),
        }
    }

    /// Placeholder describing a search result the provider returned in a
    /// shape we do not understand.
    pub fn unrecognized(raw: &str) -> Self {
        let preview: String = raw.chars().take(200).collect();
        Self {
            id: "unknown".to_string(),
            subject: "Search completed".to_string(),
            sender: "Mail provider".to_string(),
            date: "Unknown".to_string(),
            body: format!("Search results in unexpected format: {preview}..."),
            error: None,
        }
    }
}

/// A loosely-shaped message as some providers return it from search.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMessage {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default, alias = "from")]
    pub sender: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub body: String,
}

impl From<RawMessage> for MessageRecord {
    fn from(raw: RawMessage) -> Self {
        let body = truncate_body(&strip_quoted_text(&raw.body));
        Self {
            id: raw.id.unwrap_or_else(|| "unknown".to_string()),
            subject: raw.subject.unwrap_or_else(|| "(no subject)".to_string()),
            sender: raw.sender.unwrap_or_else(|| "Unknown".to_string()),
            date: raw.date.unwrap_or_else(|| "Unknown".to_string()),
            body,
            error: None,
        }
    }
}

/// Drop the quoted part of a reply.
///
/// `>` lines are skipped; an "On ... wrote:" attribution or an
/// "Original Message" separator ends the body.
pub fn strip_quoted_text(body: &str) -> String {
    let kept: Vec<&str> = body
        .lines()
        .take_while(|line| !starts_quoted_history(line.trim()))
        .filter(|line| !line.trim_start().starts_with('>'))
        .collect();

    kept.join("\n").trim_end().to_string()
}

fn starts_quoted_history(line: &str) -> bool {
    (line.starts_with("On ") && line.ends_with("wrote:"))
        || (line.starts_with("---") && line.contains("Original Message"))
}

/// Reduce HTML to its text, collapsing whitespace.
pub fn strip_html(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut inside_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => {
                inside_tag = true;
                text.push(' ');
            }
            '>' => inside_tag = false,
            c if !inside_tag => text.push(c),
            _ => {}
        }
    }
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cut a body to `MAX_BODY_CHARS`, marking the cut.
pub fn truncate_body(body: &str) -> String {
    if body.chars().count() <= MAX_BODY_CHARS {
        return body.to_string();
    }
    let mut cut: String = body.chars().take(MAX_BODY_CHARS).collect();
    cut.push_str(" [truncated]");
    cut
}
