//! Console transport: replies are printed to stdout.

use console::style;

use relay_core::transport::Transport;
use relay_types::error::TransportError;

/// [`Transport`] that writes each reply as one styled line on stdout.
#[derive(Debug, Default)]
pub struct ConsoleTransport;

impl ConsoleTransport {
    pub fn new() -> Self {
        Self
    }
}

/// `[chat] relay: text`, continuation lines indented under the text.
pub fn format_reply(chat_id: &str, text: &str) -> String {
    let prefix = format!("[{chat_id}] relay: ");
    let indent = " ".repeat(prefix.chars().count());
    let body = text.trim_end().replace('\n', &format!("\n  {indent}"));
    format!("  {}{}", style(prefix).cyan(), body)
}

impl Transport for ConsoleTransport {
    async fn send_text(&self, chat_id: &str, text: &str) -> Result<(), TransportError> {
        println!("{}", format_reply(chat_id, text));
        Ok(())
    }

    async fn mark_read(
        &self,
        chat_id: &str,
        message_id: &str,
        sender_id: &str,
    ) -> Result<(), TransportError> {
        tracing::debug!(chat_id, message_id, sender_id, "message read");
        Ok(())
    }
}
