use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::job::TrackingEventKind;
use crate::types::{OfferId, TenantId};

/// One provider notification applied to an email log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingEventRecord {
    /// Event category.
    pub kind: TrackingEventKind,
    /// When the event was ingested.
    pub at: DateTime<Utc>,
    /// Raw provider payload, kept for audits.
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// The send record that routes provider callbacks back to an offer.
///
/// Keyed by the provider `message_id` returned at transmit time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailLogEntry {
    /// Provider message id; globally unique routing key.
    pub message_id: String,

    /// The offer this transmission belongs to.
    pub offer: OfferId,

    /// Owning tenant.
    pub tenant: TenantId,

    /// Recipient address at send time.
    pub recipient: String,

    /// Ingested provider events, oldest first. Duplicate `(message_id,
    /// kind)` deliveries are dropped on append.
    #[serde(default)]
    pub events: Vec<TrackingEventRecord>,

    /// When the message was transmitted.
    pub sent_at: DateTime<Utc>,
}

impl EmailLogEntry {
    /// Create a log entry at transmit time.
    #[must_use]
    pub fn new(
        message_id: impl Into<String>,
        offer: OfferId,
        tenant: TenantId,
        recipient: impl Into<String>,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            offer,
            tenant,
            recipient: recipient.into(),
            events: Vec::new(),
            sent_at: Utc::now(),
        }
    }

    /// Whether an event of this kind was already ingested.
    #[must_use]
    pub fn has_event(&self, kind: TrackingEventKind) -> bool {
        self.events.iter().any(|e| e.kind == kind)
    }
}
