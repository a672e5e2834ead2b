use std::sync::Arc;

use tracing::warn;

use leadflow_dispatcher::HandlerRegistry;
use leadflow_email::{MailTransport, MemoryMailTransport, SmtpMailTransport};
use leadflow_gate::{RateLimiter, SendEmailHandler, SendGate, SuppressionService};
use leadflow_outreach::{
    BatchDiscoveryHandler, CheckSslHandler, CleanupConfig, CleanupOldDataHandler, CompanyLookup,
    DiscoverLeadsHandler, DiscoveryService, ExpireProposalsHandler, GenerateOfferHandler,
    GenerateProposalHandler, LeadSource, OfferComposer, OfferConfig, ProposalConfig,
    ProposalService, SchemeTlsProbe, StaticCompanyLookup, SyncCompanyHandler, TlsProbe,
};
use leadflow_pipeline::{
    AnalysisEngine, AnalyzeLeadHandler, AnalyzerRegistry, BenchmarkConfig, BenchmarkService,
    CalculateBenchmarksHandler, EngineConfig, NoopScreenshotCapture, ScreenshotCapture,
    TakeScreenshotHandler,
};
use leadflow_core::IssueRegistry;
use leadflow_state::Store;
use leadflow_state_memory::MemoryStore;
use leadflow_tracking::{ProcessTrackingEventHandler, TrackingIngestor, TrackingService};
use leadflow_transport::{JobTransport, MemoryTransport};

use crate::config::ServerConfig;

/// The lifecycle-managed service container built once at startup and
/// shared by reference across API handlers and workers.
pub struct AppContext {
    pub store: Arc<dyn Store>,
    pub transport: Arc<dyn JobTransport>,
    pub suppression: Arc<SuppressionService>,
    pub ratelimit: Arc<RateLimiter>,
    pub send_gate: Arc<SendGate>,
    pub engine: Arc<AnalysisEngine>,
    pub benchmarks: Arc<BenchmarkService>,
    pub proposals: Arc<ProposalService>,
    pub composer: Arc<OfferComposer>,
    pub discovery: Arc<DiscoveryService>,
    pub tracking: Arc<TrackingService>,
    pub ingestor: Arc<TrackingIngestor>,
    pub registry: Arc<HandlerRegistry>,
    pub issue_registry: Arc<IssueRegistry>,
}

/// Shared handle passed to axum handlers.
pub type AppState = Arc<AppContext>;

/// Pluggable seams injected at bootstrap.
pub struct BootstrapOptions {
    /// Registered analyzers; empty means analyses complete with no results.
    pub analyzers: AnalyzerRegistry,
    /// Known issue codes. Codes are stable across releases and outlive the
    /// analyzers that emit them.
    pub issues: IssueRegistry,
    /// Lead search sources for discovery.
    pub sources: Vec<Arc<dyn LeadSource>>,
    /// Mail transport override; defaults to SMTP when configured, the
    /// in-memory transport otherwise.
    pub mail: Option<Arc<dyn MailTransport>>,
    /// Company-registry lookup.
    pub lookup: Arc<dyn CompanyLookup>,
    /// Screenshot backend.
    pub capture: Arc<dyn ScreenshotCapture>,
    /// TLS probe.
    pub probe: Arc<dyn TlsProbe>,
}

impl Default for BootstrapOptions {
    fn default() -> Self {
        Self {
            analyzers: AnalyzerRegistry::new(),
            issues: IssueRegistry::new(),
            sources: Vec::new(),
            mail: None,
            lookup: Arc::new(StaticCompanyLookup::new()),
            capture: Arc::new(NoopScreenshotCapture),
            probe: Arc::new(SchemeTlsProbe),
        }
    }
}

/// Build the service container and register every job handler.
#[must_use]
pub fn bootstrap(config: &ServerConfig, options: BootstrapOptions) -> AppState {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let transport: Arc<dyn JobTransport> = Arc::new(MemoryTransport::new());

    let mail: Arc<dyn MailTransport> = options.mail.unwrap_or_else(|| {
        config.smtp.clone().map_or_else(
            || Arc::new(MemoryMailTransport::new()) as Arc<dyn MailTransport>,
            |smtp| match SmtpMailTransport::new(smtp) {
                Ok(transport) => Arc::new(transport) as Arc<dyn MailTransport>,
                Err(e) => {
                    warn!(error = %e, "invalid SMTP configuration; using in-memory transport");
                    Arc::new(MemoryMailTransport::new())
                }
            },
        )
    });

    let suppression = Arc::new(SuppressionService::new(Arc::clone(&store) as _));
    let ratelimit = Arc::new(RateLimiter::new(Arc::clone(&store) as _));
    let send_gate = Arc::new(SendGate::new(
        Arc::clone(&store),
        Arc::clone(&suppression),
        Arc::clone(&ratelimit),
        mail,
    ));
    let engine = Arc::new(AnalysisEngine::new(
        Arc::clone(&store),
        Arc::new(options.analyzers),
        Arc::clone(&transport),
        EngineConfig::default(),
    ));
    let benchmarks = Arc::new(BenchmarkService::new(
        Arc::clone(&store),
        BenchmarkConfig::default(),
    ));
    let proposals = Arc::new(ProposalService::new(
        Arc::clone(&store),
        ProposalConfig::default(),
    ));
    let composer = Arc::new(OfferComposer::new(
        Arc::clone(&store),
        OfferConfig {
            tracking_base_url: config.tracking_base_url.clone(),
            ..OfferConfig::default()
        },
    ));
    let mut discovery = DiscoveryService::new(Arc::clone(&store), Arc::clone(&transport));
    for source in options.sources {
        discovery = discovery.with_source(source);
    }
    let discovery = Arc::new(discovery);
    let tracking = Arc::new(TrackingService::new(
        Arc::clone(&store),
        Arc::clone(&suppression),
    ));
    let ingestor = Arc::new(TrackingIngestor::new(Arc::clone(&transport)));

    let mut registry = HandlerRegistry::new();
    registry.register(Arc::new(SendEmailHandler::new(Arc::clone(&send_gate))));
    registry.register(Arc::new(ProcessTrackingEventHandler::new(Arc::clone(
        &tracking,
    ))));
    registry.register(Arc::new(AnalyzeLeadHandler::new(Arc::clone(&engine))));
    registry.register(Arc::new(GenerateProposalHandler::new(Arc::clone(
        &proposals,
    ))));
    registry.register(Arc::new(ExpireProposalsHandler::new(Arc::clone(
        &proposals,
    ))));
    registry.register(Arc::new(GenerateOfferHandler::new(Arc::clone(&composer))));
    registry.register(Arc::new(SyncCompanyHandler::new(
        Arc::clone(&store) as _,
        options.lookup,
    )));
    registry.register(Arc::new(DiscoverLeadsHandler::new(Arc::clone(&discovery))));
    registry.register(Arc::new(BatchDiscoveryHandler::new(Arc::clone(
        &discovery,
    ))));
    registry.register(Arc::new(TakeScreenshotHandler::new(
        Arc::clone(&store) as _,
        options.capture,
    )));
    registry.register(Arc::new(CalculateBenchmarksHandler::new(Arc::clone(
        &benchmarks,
    ))));
    registry.register(Arc::new(CheckSslHandler::new(
        Arc::clone(&store),
        options.probe,
    )));
    registry.register(Arc::new(CleanupOldDataHandler::new(
        Arc::clone(&store),
        CleanupConfig::default(),
    )));

    Arc::new(AppContext {
        store,
        transport,
        suppression,
        ratelimit,
        send_gate,
        engine,
        benchmarks,
        proposals,
        composer,
        discovery,
        tracking,
        ingestor,
        registry: Arc::new(registry),
        issue_registry: Arc::new(options.issues),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_registers_every_job_kind() {
        let state = bootstrap(&ServerConfig::default(), BootstrapOptions::default());
        let kinds = state.registry.kinds();
        for expected in [
            "analyze_lead",
            "batch_discovery",
            "calculate_benchmarks",
            "check_ssl",
            "cleanup_old_data",
            "discover_leads",
            "expire_proposals",
            "generate_offer",
            "generate_proposal",
            "process_tracking_event",
            "send_email",
            "sync_company_by_ico",
            "take_screenshot",
        ] {
            assert!(kinds.contains(&expected), "missing handler for {expected}");
        }
    }
}
