use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use leadflow_core::{CoreError, JobContext, JobKind, Lead};
use leadflow_dispatcher::JobHandler;
use leadflow_state::LeadStore;

/// Seam for the screenshot backend (headless browser, rendering service).
///
/// The concrete capture implementation lives outside this crate; tests and
/// development use [`NoopScreenshotCapture`].
#[async_trait]
pub trait ScreenshotCapture: Send + Sync {
    /// Capture the lead's site. Idempotent per lead: re-capturing simply
    /// replaces the previous image.
    async fn capture(&self, lead: &Lead) -> Result<(), CoreError>;
}

/// Capture backend that records nothing.
#[derive(Default)]
pub struct NoopScreenshotCapture;

#[async_trait]
impl ScreenshotCapture for NoopScreenshotCapture {
    async fn capture(&self, lead: &Lead) -> Result<(), CoreError> {
        info!(lead = %lead.id, url = %lead.url, "screenshot capture skipped (noop backend)");
        Ok(())
    }
}

/// Handler for `take_screenshot` jobs.
pub struct TakeScreenshotHandler {
    leads: Arc<dyn LeadStore>,
    capture: Arc<dyn ScreenshotCapture>,
}

impl TakeScreenshotHandler {
    /// Wire the handler.
    #[must_use]
    pub fn new(leads: Arc<dyn LeadStore>, capture: Arc<dyn ScreenshotCapture>) -> Self {
        Self { leads, capture }
    }
}

#[async_trait]
impl JobHandler for TakeScreenshotHandler {
    fn kind(&self) -> &'static str {
        "take_screenshot"
    }

    async fn handle(&self, job: JobKind, ctx: &JobContext) -> Result<(), CoreError> {
        let JobKind::TakeScreenshot { lead_id } = job else {
            return Err(CoreError::PermanentFailure(format!(
                "take_screenshot handler received {} job",
                job.kind()
            )));
        };
        ctx.checkpoint()?;
        let Some(lead) = self
            .leads
            .get_lead(&lead_id)
            .await
            .map_err(|e| CoreError::UpstreamUnavailable(e.to_string()))?
        else {
            warn!(lead = %lead_id, "screenshot requested for unknown lead; skipping");
            return Ok(());
        };
        self.capture.capture(&lead).await
    }
}
