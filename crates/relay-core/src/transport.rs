//! Transport trait: how replies leave the relay.
//!
//! The pipeline never retries transport calls. Failures are logged and the
//! message is considered handled.

use std::future::Future;

use relay_types::error::TransportError;

pub trait Transport: Send + Sync + 'static {
    /// Deliver `text` to the chat.
    fn send_text(
        &self,
        chat_id: &str,
        text: &str,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Acknowledge that a message was read. Best-effort.
    fn mark_read(
        &self,
        chat_id: &str,
        message_id: &str,
        sender_id: &str,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}
