//! Mail access: the transport seam and MIME decoding.
//!
//! The orchestrator only ever sees [`MailTransport`] — a supplier of
//! message ids and raw bytes — so the core pipeline is testable with an
//! in-memory fake while production uses the IMAP client.

pub mod decode;
pub mod imap;

use async_trait::async_trait;

use crate::error::TransportError;

pub use decode::{DecodedMessage, decode};
pub use imap::{ImapConfig, ImapTransport};

/// Supplier of candidate messages for a run.
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Ids of unread messages whose subject contains `subject`.
    async fn search(&self, subject: &str) -> Result<Vec<String>, TransportError>;

    /// Raw RFC822 bytes for one message.
    async fn fetch(&self, id: &str) -> Result<Vec<u8>, TransportError>;

    /// Mark processed messages as seen. Best effort — a failure here is
    /// logged by the caller, never fatal.
    async fn mark_seen(&self, ids: &[String]) -> Result<(), TransportError>;
}
