//! Interactive line-oriented driver for the assistant.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::assistant::EmailAssistant;

/// Inputs that end the session (case-insensitive).
const EXIT_COMMANDS: [&str; 3] = ["exit", "quit", "bye"];

/// Does this line end the session?
pub fn is_exit_command(line: &str) -> bool {
    let line = line.trim();
    EXIT_COMMANDS.iter().any(|c| line.eq_ignore_ascii_case(c))
}

/// Read queries line by line until an exit command or EOF, writing each
/// reply to `writer`.
pub async fn run_repl<R, W>(
    assistant: &mut EmailAssistant,
    reader: R,
    mut writer: W,
) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();

    loop {
        writer.write_all(b"You: ").await?;
        writer.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if is_exit_command(line) {
            writer
                .write_all(b"\nGoodbye! Thanks for using Mail Assist.\n")
                .await?;
            break;
        }

        writer.write_all(b"\nProcessing your request...\n").await?;
        writer.flush().await?;
        let reply = assistant.process_query(line).await;
        writer
            .write_all(format!("Assistant: {reply}\n\n").as_bytes())
            .await?;
    }

    writer.flush().await
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::testing::{RecordingMailbox, ScriptedLlm};
    use crate::workflow::{EmailWorkflow, WorkflowConfig};

    #[test]
    fn exit_commands_any_case() {
        assert!(is_exit_command("exit"));
        assert!(is_exit_command("QUIT"));
        assert!(is_exit_command("  Bye "));
        assert!(!is_exit_command("goodbye"));
        assert!(!is_exit_command("exit now"));
    }

    #[tokio::test]
    async fn repl_answers_until_exit() {
        let llm = ScriptedLlm::new(&["unclear", "What would you like to do?"]);
        let workflow = EmailWorkflow::new(
            Arc::new(llm),
            Arc::new(RecordingMailbox::default()),
            &WorkflowConfig::default(),
        );
        let mut assistant = EmailAssistant::new(workflow);

        let input: &[u8] = b"hello\n\nBYE\nnever read\n";
        let mut output = Vec::new();
        run_repl(&mut assistant, input, &mut output).await.unwrap();

        let output = String::from_utf8(output).unwrap();
        assert!(output.contains("Assistant: What would you like to do?"));
        assert!(output.contains("Goodbye!"));
        assert_eq!(assistant.turn_log().len(), 1);
    }

    #[tokio::test]
    async fn repl_stops_at_eof() {
        let workflow = EmailWorkflow::new(
            Arc::new(ScriptedLlm::new(&[])),
            Arc::new(RecordingMailbox::default()),
            &WorkflowConfig::default(),
        );
        let mut assistant = EmailAssistant::new(workflow);

        let input: &[u8] = b"";
        let mut output = Vec::new();
        run_repl(&mut assistant, input, &mut output).await.unwrap();
        assert!(assistant.turn_log().is_empty());
    }
}
