use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use leadflow_core::{CoreError, JobContext, JobKind};

/// A unit of work owning one job kind.
///
/// Handlers must be idempotent: the transport guarantees at-least-once
/// delivery, and the scheduler tolerates duplicate emission.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// The body tag this handler owns (must match [`JobKind::kind`]).
    fn kind(&self) -> &'static str;

    /// Execute the job. Check `ctx` at suspension points and abort cleanly
    /// when it is cancelled.
    async fn handle(&self, job: JobKind, ctx: &JobContext) -> Result<(), CoreError>;
}

/// Registry mapping body tags to handlers.
///
/// Built once at startup and shared by reference across workers; dynamic
/// dispatch happens through a table lookup rather than downcasting.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<&'static str, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its kind, replacing any previous one.
    pub fn register(&mut self, handler: Arc<dyn JobHandler>) {
        self.handlers.insert(handler.kind(), handler);
    }

    /// Look up the handler for a body tag.
    #[must_use]
    pub fn get(&self, kind: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(kind).cloned()
    }

    /// Registered kinds, for diagnostics.
    #[must_use]
    pub fn kinds(&self) -> Vec<&'static str> {
        let mut kinds: Vec<&'static str> = self.handlers.keys().copied().collect();
        kinds.sort_unstable();
        kinds
    }
}
