use async_trait::async_trait;
use herald_common::MessagePayload;

use crate::TransportError;

/// What the relay handed back for an accepted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    /// Identifier of the sent message (its `Message-ID` for SMTP).
    pub id: String,
    /// The relay's final reply text.
    pub response: String,
}

/// Something that can hand a payload to a mail relay.
///
/// One call is one attempt. Implementations must not retry internally; the
/// engine owns the retry loop and re-sends the identical payload.
#[async_trait]
pub trait Transport: Send + Sync {
    /// # Errors
    ///
    /// Returns a [`TransportError`] describing why this attempt failed.
    async fn send(&self, payload: &MessagePayload) -> Result<SendReceipt, TransportError>;
}
