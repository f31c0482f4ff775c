//! IMAP search/fetch over rustls and SMTP delivery via lettre.
//!
//! The IMAP side is a small blocking client: every operation opens its own
//! session, runs a handful of tagged commands and logs out. All blocking
//! work runs inside `spawn_blocking`.

use std::io::{Read, Write as IoWrite};
use std::net::TcpStream;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use mail_parser::MessageParser;
use regex::Regex;
use rustls_pki_types::ServerName;
use secrecy::ExposeSecret;

use crate::error::MailError;
use crate::mail::types::{MessageRecord, strip_html, strip_quoted_text, truncate_body};
use crate::mail::{MailConfig, MailProvider, SearchResults, SendOutcome, SendRequest};

/// Socket read timeout for IMAP sessions.
const IMAP_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Gmail-style `field:value` terms we can translate to IMAP criteria.
static FIELD_TERM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(from|to|cc|subject)\s*:\s*("[^"]*"|\S+)"#).expect("valid regex")
});

// ── Mailbox ─────────────────────────────────────────────────────────

/// Mail provider backed by an IMAP server (search, fetch) and an SMTP relay
/// (send).
pub struct ImapSmtpMailbox {
    config: Arc<MailConfig>,
}

impl ImapSmtpMailbox {
    pub fn new(config: MailConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T, MailError>
    where
        T: Send + 'static,
        F: FnOnce(&MailConfig) -> Result<T, MailError> + Send + 'static,
    {
        let config = Arc::clone(&self.config);
        tokio::task::spawn_blocking(move || op(&config))
            .await
            .map_err(|e| MailError::Task(e.to_string()))?
    }
}

#[async_trait]
impl MailProvider for ImapSmtpMailbox {
    async fn search(&self, query: &str, max_results: usize) -> Result<SearchResults, MailError> {
        let query = query.to_string();
        let uids = self
            .blocking(move |config| imap_search(config, &query, max_results))
            .await?;
        tracing::debug!(count = uids.len(), "IMAP search complete");
        Ok(SearchResults::Listing(format_listing(&uids)))
    }

    async fn get_message(&self, id: &str) -> Result<MessageRecord, MailError> {
        let id = id.to_string();
        self.blocking(move |config| imap_fetch(config, &id)).await
    }

    async fn send(&self, request: SendRequest) -> Result<SendOutcome, MailError> {
        self.blocking(move |config| smtp_send(config, &request)).await
    }
}

// ── IMAP session ────────────────────────────────────────────────────

type TlsStream = rustls::StreamOwned<rustls::ClientConnection, TcpStream>;

/// Untagged lines and literal payloads collected for one tagged command.
#[derive(Debug, Default)]
struct ImapResponse {
    lines: Vec<String>,
    literals: Vec<Vec<u8>>,
}

struct ImapSession {
    tls: TlsStream,
    next_tag: u32,
}

impl ImapSession {
    fn connect(config: &MailConfig) -> Result<Self, MailError> {
        let host = config.imap_host.clone();
        let conn_err = |reason: String| MailError::Connection {
            host: host.clone(),
            reason,
        };

        let tcp = TcpStream::connect((&*config.imap_host, config.imap_port))
            .map_err(|e| conn_err(e.to_string()))?;
        tcp.set_read_timeout(Some(IMAP_READ_TIMEOUT))?;

        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = Arc::new(
            rustls::ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth(),
        );
        let server_name =
            ServerName::try_from(config.imap_host.clone()).map_err(|e| conn_err(e.to_string()))?;
        let conn = rustls::ClientConnection::new(tls_config, server_name)
            .map_err(|e| conn_err(e.to_string()))?;

        let mut session = Self {
            tls: rustls::StreamOwned::new(conn, tcp),
            next_tag: 1,
        };

        let greeting = session.read_line()?;
        if !greeting.starts_with("* OK") {
            return Err(conn_err(format!("unexpected greeting: {}", greeting.trim_end())));
        }
        Ok(session)
    }

    fn read_line(&mut self) -> Result<String, MailError> {
        let mut buf = Vec::new();
        loop {
            let mut byte = [0u8; 1];
            match self.tls.read(&mut byte) {
                Ok(0) => {
                    return Err(MailError::Protocol {
                        command: "read".into(),
                        reason: "connection closed".into(),
                    });
                }
                Ok(_) => {
                    buf.push(byte[0]);
                    if buf.ends_with(b"\r\n") {
                        return Ok(String::from_utf8_lossy(&buf).to_string());
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Send a command made only of atoms.
    fn command(&mut self, cmd: &str) -> Result<ImapResponse, MailError> {
        self.command_args(&[ImapArg::Atom(cmd.to_string())])
    }

    /// Send a tagged command and collect everything up to its completion.
    ///
    /// Literal arguments are sent after the server's `+` continuation.
    fn command_args(&mut self, args: &[ImapArg]) -> Result<ImapResponse, MailError> {
        let tag = format!("A{}", self.next_tag);
        self.next_tag += 1;
        let verb = match args.first() {
            Some(ImapArg::Atom(head)) => command_verb(head),
            _ => String::new(),
        };

        let mut tagged = Vec::with_capacity(args.len() + 1);
        tagged.push(ImapArg::Atom(tag.clone()));
        tagged.extend_from_slice(args);

        for (i, segment) in command_segments(&tagged).iter().enumerate() {
            if i > 0 {
                self.await_continuation(&tag, &verb)?;
            }
            IoWrite::write_all(&mut self.tls, segment)?;
            IoWrite::flush(&mut self.tls)?;
        }

        let mut response = ImapResponse::default();
        loop {
            let line = self.read_line()?;
            if let Some(status) = line.strip_prefix(&format!("{tag} ")) {
                if status.starts_with("OK") {
                    return Ok(response);
                }
                return Err(MailError::Protocol {
                    command: verb,
                    reason: status.trim_end().to_string(),
                });
            }
            if let Some(len) = literal_length(&line) {
                let mut literal = vec![0u8; len];
                self.tls.read_exact(&mut literal)?;
                response.literals.push(literal);
            }
            response.lines.push(line);
        }
    }

    fn await_continuation(&mut self, tag: &str, verb: &str) -> Result<(), MailError> {
        loop {
            let line = self.read_line()?;
            if line.starts_with('+') {
                return Ok(());
            }
            if let Some(status) = line.strip_prefix(&format!("{tag} ")) {
                return Err(MailError::Protocol {
                    command: verb.to_string(),
                    reason: status.trim_end().to_string(),
                });
            }
        }
    }

    fn login(&mut self, config: &MailConfig) -> Result<(), MailError> {
        self.command_args(&[
            ImapArg::Atom("LOGIN".into()),
            ImapArg::string(&config.username),
            ImapArg::string(config.password.expose_secret()),
        ])
        .map(|_| ())
        .map_err(|e| login_error(e, &config.username))
    }

    /// Open the configured mailbox read-only.
    fn examine(&mut self, mailbox: &str) -> Result<(), MailError> {
        self.command_args(&[ImapArg::Atom("EXAMINE".into()), ImapArg::string(mailbox)])
            .map(|_| ())
    }

    fn logout(mut self) {
        let _ = self.command("LOGOUT");
    }
}

fn open_session(config: &MailConfig) -> Result<ImapSession, MailError> {
    let mut session = ImapSession::connect(config)?;
    session.login(config)?;
    Ok(session)
}

/// Search the mailbox, newest UIDs first.
fn imap_search(
    config: &MailConfig,
    query: &str,
    max_results: usize,
) -> Result<Vec<String>, MailError> {
    let mut session = open_session(config)?;

    let capabilities = session.command("CAPABILITY")?;
    let gmail = capabilities.lines.iter().any(|l| l.contains("X-GM-EXT-1"));

    session.examine(&config.mailbox)?;
    let mut args = vec![ImapArg::Atom("UID SEARCH".into())];
    args.extend(search_criteria(query, gmail));
    tracing::debug!(query, gmail, args = args.len(), "IMAP search");
    let response = session.command_args(&args)?;
    session.logout();

    let mut uids = parse_search_response(&response.lines);
    uids.reverse();
    uids.truncate(max_results);
    Ok(uids)
}

/// Fetch and parse one message by UID without marking it seen.
fn imap_fetch(config: &MailConfig, uid: &str) -> Result<MessageRecord, MailError> {
    if uid.is_empty() || !uid.chars().all(|c| c.is_ascii_digit()) {
        return Err(MailError::NotFound { id: uid.to_string() });
    }

    let mut session = open_session(config)?;
    session.examine(&config.mailbox)?;
    let response = session.command(&format!("UID FETCH {uid} BODY.PEEK[]"))?;
    session.logout();

    let raw = response
        .literals
        .into_iter()
        .next()
        .ok_or_else(|| MailError::NotFound { id: uid.to_string() })?;
    parse_message(uid, &raw)
}

// ── SMTP ────────────────────────────────────────────────────────────

fn parse_mailbox(address: &str) -> Result<Mailbox, MailError> {
    address.parse().map_err(|e: lettre::address::AddressError| MailError::InvalidAddress {
        address: address.to_string(),
        reason: e.to_string(),
    })
}

/// Deliver a message. Address and build problems are errors; transport
/// problems are reported as a failed outcome.
fn smtp_send(config: &MailConfig, request: &SendRequest) -> Result<SendOutcome, MailError> {
    let mut builder = Message::builder()
        .from(parse_mailbox(&config.from_address)?)
        .to(parse_mailbox(&request.to)?);
    for cc in &request.cc {
        builder = builder.cc(parse_mailbox(cc)?);
    }
    let email = builder
        .subject(request.subject.as_str())
        .header(ContentType::TEXT_PLAIN)
        .body(request.body.clone())
        .map_err(|e| MailError::Build(e.to_string()))?;

    let relay = if config.smtp_port == 465 {
        SmtpTransport::relay(&config.smtp_host)
    } else {
        SmtpTransport::starttls_relay(&config.smtp_host)
    };
    let transport = match relay {
        Ok(builder) => builder
            .port(config.smtp_port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.expose_secret().to_string(),
            ))
            .build(),
        Err(e) => return Ok(SendOutcome::failed(format!("SMTP relay error: {e}"))),
    };

    match transport.send(&email) {
        Ok(response) => {
            tracing::info!(to = %request.to, cc = request.cc.len(), "Email sent");
            Ok(SendOutcome::delivered(format!(
                "Message to {} accepted ({})",
                request.to,
                response.code()
            )))
        }
        Err(e) => {
            tracing::warn!(to = %request.to, error = %e, "SMTP send failed");
            Ok(SendOutcome::failed(format!("SMTP send failed: {e}")))
        }
    }
}

// ── Helpers (public for testing) ────────────────────────────────────

/// One argument of an IMAP command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImapArg {
    /// Sent verbatim.
    Atom(String),
    /// 7-bit text without line breaks, sent as a quoted-string.
    Quoted(String),
    /// Anything else, sent as a `{n}` literal.
    Literal(Vec<u8>),
}

impl ImapArg {
    /// A string argument: quoted when the quoted form can carry it.
    pub fn string(value: &str) -> Self {
        if value.is_ascii() && !value.contains(['\r', '\n', '\0']) {
            Self::Quoted(value.to_string())
        } else {
            Self::Literal(value.as_bytes().to_vec())
        }
    }

    fn is_literal(&self) -> bool {
        matches!(self, Self::Literal(_))
    }
}

/// Quote a string as an IMAP quoted-string.
pub fn quote_imap_string(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

/// Serialize a command into the pieces written between continuations.
///
/// Every piece but the last ends with a literal announcement `{n}\r\n`;
/// the next piece starts with that literal's bytes.
pub fn command_segments(args: &[ImapArg]) -> Vec<Vec<u8>> {
    let mut segments = Vec::new();
    let mut current = Vec::new();
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            current.push(b' ');
        }
        match arg {
            ImapArg::Atom(atom) => current.extend_from_slice(atom.as_bytes()),
            ImapArg::Quoted(text) => {
                current.extend_from_slice(quote_imap_string(text).as_bytes());
            }
            ImapArg::Literal(bytes) => {
                current.extend_from_slice(format!("{{{}}}\r\n", bytes.len()).as_bytes());
                segments.push(std::mem::take(&mut current));
                current.extend_from_slice(bytes);
            }
        }
    }
    current.extend_from_slice(b"\r\n");
    segments.push(current);
    segments
}

/// Only a tagged `NO` to `LOGIN` means the credentials were refused.
fn login_error(err: MailError, username: &str) -> MailError {
    match err {
        MailError::Protocol { ref reason, .. } if reason.starts_with("NO") => {
            MailError::AuthFailed {
                username: username.to_string(),
            }
        }
        other => other,
    }
}

/// Size of the literal announced at the end of a response line (`{123}`).
pub fn literal_length(line: &str) -> Option<usize> {
    let line = line.trim_end();
    let inner = line.strip_suffix('}')?;
    let open = inner.rfind('{')?;
    inner[open + 1..].parse().ok()
}

/// Collect the ids from `* SEARCH` response lines.
pub fn parse_search_response(lines: &[String]) -> Vec<String> {
    lines
        .iter()
        .filter_map(|line| line.strip_prefix("* SEARCH"))
        .flat_map(|rest| rest.split_whitespace().map(str::to_string))
        .collect()
}

/// Translate a provider query into IMAP `SEARCH` criteria.
///
/// Gmail servers take the raw query through `X-GM-RAW`; elsewhere
/// `from:`/`to:`/`cc:`/`subject:` terms map to their IMAP keys and the
/// remaining words become a `TEXT` search. Line breaks are folded to
/// spaces. Non-ASCII values go out as literals under `CHARSET UTF-8`.
pub fn search_criteria(query: &str, gmail: bool) -> Vec<ImapArg> {
    let query = query.split_whitespace().collect::<Vec<_>>().join(" ");

    let mut criteria = Vec::new();
    if gmail {
        criteria.push(ImapArg::Atom("X-GM-RAW".into()));
        criteria.push(ImapArg::string(&query));
    } else {
        for cap in FIELD_TERM.captures_iter(&query) {
            criteria.push(ImapArg::Atom(cap[1].to_uppercase()));
            criteria.push(ImapArg::string(cap[2].trim_matches('"')));
        }

        let rest = FIELD_TERM.replace_all(&query, " ");
        let rest = rest.split_whitespace().collect::<Vec<_>>().join(" ");
        if !rest.is_empty() {
            criteria.push(ImapArg::Atom("TEXT".into()));
            criteria.push(ImapArg::string(&rest));
        }

        if criteria.is_empty() {
            criteria.push(ImapArg::Atom("ALL".into()));
        }
    }

    if criteria.iter().any(ImapArg::is_literal) {
        criteria.splice(
            0..0,
            [ImapArg::Atom("CHARSET".into()), ImapArg::Atom("UTF-8".into())],
        );
    }
    criteria
}

/// Render UIDs as the id listing the search action scans.
pub fn format_listing(uids: &[String]) -> String {
    let mut listing = format!("Found {} message(s)\n", uids.len());
    for uid in uids {
        listing.push_str(&format!("Message ID: {uid}\n"));
    }
    listing
}

/// Parse a raw RFC 822 message into a record.
pub fn parse_message(id: &str, raw: &[u8]) -> Result<MessageRecord, MailError> {
    let parsed = MessageParser::default()
        .parse(raw)
        .ok_or_else(|| MailError::Protocol {
            command: "FETCH".into(),
            reason: format!("message {id} could not be parsed"),
        })?;

    let body = truncate_body(&strip_quoted_text(&extract_text(&parsed)));

    Ok(MessageRecord {
        id: id.to_string(),
        subject: parsed.subject().unwrap_or("(no subject)").to_string(),
        sender: extract_sender(&parsed),
        date: parsed
            .date()
            .map(|d| d.to_rfc3339())
            .unwrap_or_else(|| "Unknown".to_string()),
        body,
        error: None,
    })
}

fn command_verb(cmd: &str) -> String {
    let mut words = cmd.split_whitespace();
    match (words.next(), words.next()) {
        (Some("UID"), Some(second)) => format!("UID {second}"),
        (Some(first), _) => first.to_string(),
        _ => String::new(),
    }
}

/// Sender as `Name <address>` when a display name is present.
fn extract_sender(parsed: &mail_parser::Message) -> String {
    let Some(addr) = parsed.from().and_then(|a| a.first()) else {
        return "unknown".to_string();
    };
    match (addr.name(), addr.address()) {
        (Some(name), Some(address)) => format!("{name} <{address}>"),
        (None, Some(address)) => address.to_string(),
        (Some(name), None) => name.to_string(),
        (None, None) => "unknown".to_string(),
    }
}

fn extract_text(parsed: &mail_parser::Message) -> String {
    if let Some(text) = parsed.body_text(0) {
        return text.to_string();
    }
    if let Some(html) = parsed.body_html(0) {
        return strip_html(html.as_ref());
    }
    "(no readable content)".to_string()
}
