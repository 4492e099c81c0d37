//! The non-interactive commands: `ask` and `health`.

use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;

use crate::client::{ChatClient, ChatTransport};
use crate::reasoning::{settled, strip_reasoning};
use crate::session::{ChatSession, StreamUpdate, BACKEND_ERROR_MESSAGE};

/// Writes a streamed reply as it arrives.
///
/// Snapshots are cumulative, so only text past what is already written goes
/// out. With reasoning hidden, output stops short of any trailing fragment the
/// filter could still remove.
pub struct ReplyPrinter<W> {
    out: W,
    hide_reasoning: bool,
    printed: String,
}

impl<W: Write> ReplyPrinter<W> {
    pub fn new(out: W, hide_reasoning: bool) -> Self {
        Self {
            out,
            hide_reasoning,
            printed: String::new(),
        }
    }

    pub fn update(&mut self, snapshot: &str) -> io::Result<()> {
        if self.hide_reasoning {
            let filtered = strip_reasoning(snapshot, true);
            self.extend_to(settled(&filtered))?;
        } else {
            self.extend_to(snapshot)?;
        }
        Ok(())
    }

    /// Write the rest of the finished reply and end the line.
    pub fn finish(&mut self, reply: &str) -> io::Result<()> {
        let text = if self.hide_reasoning {
            strip_reasoning(reply, false)
        } else {
            reply.to_string()
        };
        if !self.extend_to(&text)? {
            write!(self.out, "\n{text}")?;
        }
        writeln!(self.out)?;
        self.out.flush()
    }

    /// End a partially written line after a failed stream.
    pub fn abort(&mut self) -> io::Result<()> {
        if !self.printed.is_empty() {
            writeln!(self.out)?;
        }
        self.out.flush()
    }

    /// Returns false when `text` no longer extends what was written.
    fn extend_to(&mut self, text: &str) -> io::Result<bool> {
        let Some(new) = text.strip_prefix(self.printed.as_str()) else {
            return Ok(false);
        };
        if !new.is_empty() {
            self.out.write_all(new.as_bytes())?;
            self.out.flush()?;
            self.printed.push_str(new);
        }
        Ok(true)
    }
}

/// `ask`: stream one reply to `out`.
pub async fn ask_streaming(
    transport: Arc<dyn ChatTransport>,
    message: String,
    hide_reasoning: bool,
    out: impl Write,
    mut err: impl Write,
) -> Result<ExitCode> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut session = ChatSession::new(transport, tx);
    session.query = message;
    session.submit();

    let mut printer = ReplyPrinter::new(out, hide_reasoning);
    while session.in_progress() {
        let Some(event) = rx.recv().await else {
            break;
        };
        let failed = event.update == StreamUpdate::Failed;
        if !session.apply(event) {
            continue;
        }
        if failed {
            printer.abort()?;
            writeln!(err, "{BACKEND_ERROR_MESSAGE}")?;
            return Ok(ExitCode::FAILURE);
        }
        printer.update(session.response())?;
    }

    printer.finish(session.response())?;
    Ok(ExitCode::SUCCESS)
}

/// `ask --no-stream`
pub async fn ask_once(
    client: &ChatClient,
    message: &str,
    hide_reasoning: bool,
    mut out: impl Write,
    mut err: impl Write,
) -> Result<ExitCode> {
    match client.send(message).await {
        Ok(reply) => {
            if hide_reasoning {
                writeln!(out, "{}", strip_reasoning(&reply, false))?;
            } else {
                writeln!(out, "{reply}")?;
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(error) => {
            tracing::error!(error = %format!("{error:#}"), "Error calling backend");
            writeln!(err, "Error: {error}")?;
            Ok(ExitCode::FAILURE)
        }
    }
}

/// `health`
pub async fn check_health(
    client: &ChatClient,
    mut out: impl Write,
    mut err: impl Write,
) -> Result<ExitCode> {
    match client.health().await {
        Ok(reply) => {
            writeln!(out, "{} - {}", client.base_url(), reply.trim())?;
            Ok(ExitCode::SUCCESS)
        }
        Err(error) => {
            tracing::error!(error = %format!("{error:#}"), "health check failed");
            writeln!(err, "{BACKEND_ERROR_MESSAGE}")?;
            Ok(ExitCode::FAILURE)
        }
    }
}
