//! The tracking-and-suppression loop: the open pixel and click redirect
//! keyed by tracking token, the unsubscribe flow, and provider callbacks
//! (bounces, complaints, deliveries, opens, clicks) routed through the
//! email log.

pub mod ingest;
pub mod service;

pub use ingest::{IngestOutcome, ProcessTrackingEventHandler, TrackingIngestor};
pub use service::{ClickOutcome, TRANSPARENT_GIF, TrackingService};
