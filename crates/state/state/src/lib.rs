//! Entity store contracts for the Leadflow platform.
//!
//! Every backend must be `Send + Sync` and safe for concurrent access. The
//! contracts encode the load-bearing uniqueness invariants: leads are unique
//! on `(tenant, domain)`, at most one open analysis exists per lead, offer
//! updates are serialized by compare-and-swap, and tracking tokens are
//! globally unique.

pub mod error;
pub mod store;

pub use error::StateError;
pub use store::{
    AnalysisStore, AppendOutcome, BenchmarkStore, CasOutcome, CompanyStore, EmailLogStore,
    LeadStore, OfferStore, ProposalStore, SnapshotStore, Store, SuppressionStore, TenantStore,
};
