use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::EmailError;
use crate::transport::{MailTransport, OutboundEmail, SendReceipt};

/// Recording in-memory transport for tests and foreground runs.
///
/// Assigns a UUID message id per send and keeps every message for
/// inspection. Can be switched into a failing mode to exercise retry
/// paths.
#[derive(Default)]
pub struct MemoryMailTransport {
    sent: Mutex<Vec<(SendReceipt, OutboundEmail)>>,
    fail_sends: Mutex<bool>,
}

impl MemoryMailTransport {
    /// Create an empty transport.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent sends fail with a connection error.
    pub fn set_failing(&self, failing: bool) {
        *self.fail_sends.lock().expect("mail mutex poisoned") = failing;
    }

    /// Messages sent so far, oldest first.
    pub fn sent(&self) -> Vec<(SendReceipt, OutboundEmail)> {
        self.sent.lock().expect("mail mutex poisoned").clone()
    }

    /// Number of messages sent.
    pub fn sent_count(&self) -> usize {
        self.sent.lock().expect("mail mutex poisoned").len()
    }
}

#[async_trait]
impl MailTransport for MemoryMailTransport {
    async fn send(&self, email: &OutboundEmail) -> Result<SendReceipt, EmailError> {
        if *self.fail_sends.lock().expect("mail mutex poisoned") {
            return Err(EmailError::Connection("memory transport failing".into()));
        }
        let receipt = SendReceipt {
            message_id: Uuid::new_v4().to_string(),
        };
        self.sent
            .lock()
            .expect("mail mutex poisoned")
            .push((receipt.clone(), email.clone()));
        Ok(receipt)
    }

    fn transport_name(&self) -> &'static str {
        "memory"
    }
}
