//! Outreach services around the analysis core: lead discovery, proposal
//! generation and recycling, offer composition, company-registry sync, and
//! the periodic maintenance jobs.

pub mod company;
pub mod discovery;
pub mod maintenance;
pub mod offer;
pub mod proposal;

pub use company::{CompanyLookup, StaticCompanyLookup, SyncCompanyHandler};
pub use discovery::{
    BatchDiscoveryHandler, DiscoveredLead, DiscoverLeadsHandler, DiscoveryService, LeadSource,
    StaticLeadSource,
};
pub use maintenance::{
    CheckSslHandler, CleanupConfig, CleanupOldDataHandler, SchemeTlsProbe, TlsProbe,
};
pub use offer::{GenerateOfferHandler, OfferComposer, OfferConfig};
pub use proposal::{
    ExpireProposalsHandler, GenerateProposalHandler, ProposalConfig, ProposalService,
};
