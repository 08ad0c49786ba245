use std::io::Write;

use anyhow::{bail, Context, Result};
use tern_client::{ChatSession, StreamOutcome, StreamTransport, StreamTransportConfig};
use tern_protocol::Message;

use crate::bootstrap_helpers::resolve_user_id;
use crate::cli_args::ChatArgs;

/// Tracks how much of the streaming assistant message has been printed.
#[derive(Debug, Default)]
pub(crate) struct ChatRenderer {
    printed_bytes: usize,
    printed_thinking: usize,
    announced_form: bool,
}

impl ChatRenderer {
    pub(crate) fn render(
        &mut self,
        message: &Message,
        show_thinking: bool,
        out: &mut impl Write,
        err: &mut impl Write,
    ) -> Result<()> {
        if show_thinking {
            for entry in message.thinking_log.iter().skip(self.printed_thinking) {
                writeln!(err, "[{}] {}", entry.event_type, entry.raw_data)?;
            }
        }
        self.printed_thinking = message.thinking_log.len();

        if let Some(delta) = message.content.get(self.printed_bytes..) {
            if !delta.is_empty() {
                out.write_all(delta.as_bytes())?;
                out.flush()?;
            }
            self.printed_bytes = message.content.len();
        }

        if !self.announced_form {
            if let Some(form) = message.ask_user.as_ref() {
                writeln!(err, "\n[ask_user] {} ({} fields)", form.title, form.fields.len())?;
                self.announced_form = true;
            }
        }
        Ok(())
    }
}

pub(crate) async fn run_chat_command(args: ChatArgs) -> Result<()> {
    let user_id = resolve_user_id(&args.client)?;
    let transport = StreamTransport::new(StreamTransportConfig {
        base_url: args.client.base_url.clone(),
        connect_timeout_ms: args.client.connect_timeout_ms,
        idle_timeout_ms: args.idle_timeout_ms,
        user_id: Some(user_id),
        ..StreamTransportConfig::default()
    })
    .context("invalid stream transport configuration")?;
    let session = ChatSession::new(transport);
    let mut updates = session.subscribe_assistant();

    let streaming = {
        let session = session.clone();
        let message = args.message.clone();
        let conversation_id = args.conversation_id.clone();
        tokio::spawn(async move {
            session
                .stream_message(&message, conversation_id.as_deref())
                .await
        })
    };
    tokio::pin!(streaming);

    let mut renderer = ChatRenderer::default();
    let mut stdout = std::io::stdout();
    let mut stderr = std::io::stderr();
    let outcome = loop {
        tokio::select! {
            joined = &mut streaming => {
                break joined.context("chat stream task failed")?;
            }
            _ = tokio::signal::ctrl_c() => {
                if session.cancel() {
                    tracing::info!("chat stream cancelled by user");
                }
            }
            Ok(()) = updates.changed() => {
                let latest = updates.borrow_and_update().clone();
                if let Some(message) = latest {
                    renderer.render(&message, args.show_thinking, &mut stdout, &mut stderr)?;
                }
            }
        }
    };
    let latest = updates.borrow_and_update().clone();
    if let Some(message) = latest {
        renderer.render(&message, args.show_thinking, &mut stdout, &mut stderr)?;
    }
    println!();

    match outcome {
        StreamOutcome::Completed => Ok(()),
        StreamOutcome::Cancelled => {
            eprintln!("stream cancelled");
            Ok(())
        }
        StreamOutcome::Rejected => bail!("message was empty or a stream is already running"),
        StreamOutcome::Failed(reason) => bail!("chat stream failed: {reason}"),
    }
}
