use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, anyhow};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use mail_assist::EmailAssistant;
use mail_assist::cli::run_repl;
use mail_assist::config::AssistantConfig;
use mail_assist::llm::create_provider;
use mail_assist::mail::{ImapSmtpMailbox, MailConfig, MailProvider};
use mail_assist::workflow::EmailWorkflow;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install rustls crypto provider"))?;

    let config = AssistantConfig::from_env().context("Failed to load assistant configuration")?;
    let _log_guard = init_tracing(config.log_dir.as_deref());

    let mail_config = MailConfig::from_env().context("Failed to load mailbox configuration")?;

    eprintln!("\nMail Assist v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", config.llm.model);
    eprintln!(
        "   Mailbox: {} on {} (send via {}:{})",
        mail_config.mailbox, mail_config.imap_host, mail_config.smtp_host, mail_config.smtp_port
    );
    eprintln!("   Ask me to search your mail or send an email. Type 'exit' to quit.\n");

    let llm = create_provider(&config.llm).context("Failed to initialize language model")?;
    let mailbox: Arc<dyn MailProvider> = Arc::new(ImapSmtpMailbox::new(mail_config));

    let workflow = EmailWorkflow::new(llm, mailbox, &config.workflow);
    let mut assistant = EmailAssistant::new(workflow);

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    run_repl(&mut assistant, stdin, tokio::io::stdout()).await?;

    tracing::info!(turns = assistant.turn_log().len(), "Session ended");
    Ok(())
}

/// Log to stderr, and to a daily rolling file when a log directory is set.
///
/// The returned guard must live until exit so buffered file output is flushed.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "mail-assist.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .init();
            None
        }
    }
}
