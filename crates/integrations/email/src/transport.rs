use async_trait::async_trait;

use crate::error::EmailError;

/// A fully composed outbound message.
#[derive(Debug, Clone)]
pub struct OutboundEmail {
    /// Recipient address.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// HTML body.
    pub html_body: String,
    /// Plain-text alternative.
    pub text_body: String,
}

/// Result of a successful transmission.
#[derive(Debug, Clone)]
pub struct SendReceipt {
    /// Provider-assigned message identifier; keys the email log and routes
    /// webhook callbacks back to the offer.
    pub message_id: String,
}

/// Pluggable mail delivery transport.
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Transmit a message, returning the provider receipt.
    async fn send(&self, email: &OutboundEmail) -> Result<SendReceipt, EmailError>;

    /// Transport name for logs (e.g. `"smtp"`, `"memory"`).
    fn transport_name(&self) -> &'static str;
}
