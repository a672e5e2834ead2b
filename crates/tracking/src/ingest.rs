use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use leadflow_core::{CoreError, JobContext, JobKind, TrackingEventKind};
use leadflow_dispatcher::JobHandler;
use leadflow_transport::{JobHeaders, JobTransport, enqueue_job};

use crate::service::TrackingService;

/// Result of classifying one provider callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum IngestOutcome {
    /// A tracking event was queued for processing.
    Queued {
        /// The provider message id routing the event.
        message_id: String,
    },
    /// The notification type is not one we handle.
    Ignored,
    /// A subscription handshake message was acknowledged.
    SubscriptionConfirmed,
}

/// Accepts raw provider callbacks, classifies them, and enqueues
/// `process_tracking_event` jobs on the high queue.
///
/// Accepts both the SNS-style envelope (`{Type, Message}` with a
/// stringified inner notification) and bare notification payloads.
pub struct TrackingIngestor {
    transport: Arc<dyn JobTransport>,
    http: reqwest::Client,
}

impl TrackingIngestor {
    /// Wire the ingestor.
    #[must_use]
    pub fn new(transport: Arc<dyn JobTransport>) -> Self {
        Self {
            transport,
            http: reqwest::Client::new(),
        }
    }

    /// Classify a callback body and queue the event when it is one we
    /// track.
    pub async fn ingest(&self, body: &serde_json::Value) -> Result<IngestOutcome, CoreError> {
        // Subscription confirmation handshake.
        if body.get("Type").and_then(serde_json::Value::as_str)
            == Some("SubscriptionConfirmation")
        {
            if let Some(url) = body.get("SubscribeURL").and_then(serde_json::Value::as_str) {
                // Best-effort: a failed handshake is the provider's to retry.
                if let Err(e) = self.http.get(url).send().await {
                    warn!(error = %e, "subscription confirmation request failed");
                }
            } else {
                info!("subscription confirmation without SubscribeURL; acknowledged only");
            }
            return Ok(IngestOutcome::SubscriptionConfirmed);
        }

        // SNS envelopes carry the notification as a stringified JSON
        // `Message`; bare payloads are the notification itself.
        let notification: serde_json::Value = match body
            .get("Message")
            .and_then(serde_json::Value::as_str)
        {
            Some(message) => serde_json::from_str(message)
                .map_err(|e| CoreError::InvalidInput(format!("malformed Message body: {e}")))?,
            None => body.clone(),
        };

        let Some(kind) = notification
            .get("notificationType")
            .and_then(serde_json::Value::as_str)
            .and_then(parse_notification_type)
        else {
            info!(
                notification_type = notification
                    .get("notificationType")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or("<missing>"),
                "unhandled notification type"
            );
            return Ok(IngestOutcome::Ignored);
        };

        let Some(message_id) = notification
            .pointer("/mail/messageId")
            .and_then(serde_json::Value::as_str)
        else {
            warn!("notification without mail.messageId; ignoring");
            return Ok(IngestOutcome::Ignored);
        };

        enqueue_job(
            &*self.transport,
            &JobKind::ProcessTrackingEvent {
                message_id: message_id.to_owned(),
                event: kind,
                payload: notification.clone(),
            },
            JobHeaders::new(),
        )
        .await
        .map_err(|e| CoreError::UpstreamUnavailable(e.to_string()))?;

        Ok(IngestOutcome::Queued {
            message_id: message_id.to_owned(),
        })
    }
}

fn parse_notification_type(raw: &str) -> Option<TrackingEventKind> {
    match raw {
        "Bounce" => Some(TrackingEventKind::Bounce),
        "Complaint" => Some(TrackingEventKind::Complaint),
        "Delivery" => Some(TrackingEventKind::Delivery),
        "Open" => Some(TrackingEventKind::Open),
        "Click" => Some(TrackingEventKind::Click),
        _ => None,
    }
}

/// Handler for `process_tracking_event` jobs.
pub struct ProcessTrackingEventHandler {
    service: Arc<TrackingService>,
}

impl ProcessTrackingEventHandler {
    /// Wrap the service as a job handler.
    #[must_use]
    pub fn new(service: Arc<TrackingService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl JobHandler for ProcessTrackingEventHandler {
    fn kind(&self) -> &'static str {
        "process_tracking_event"
    }

    async fn handle(&self, job: JobKind, ctx: &JobContext) -> Result<(), CoreError> {
        let JobKind::ProcessTrackingEvent {
            message_id,
            event,
            payload,
        } = job
        else {
            return Err(CoreError::PermanentFailure(format!(
                "process_tracking_event handler received {} job",
                job.kind()
            )));
        };
        ctx.checkpoint()?;
        self.service.apply_event(&message_id, event, &payload).await
    }
}
