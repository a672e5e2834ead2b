//! Leadflow CLI
//!
//! Operator commands: run the server, enqueue or foreground-run pipeline
//! jobs, and inspect or re-drive the failed queue.

mod commands;

use clap::{Parser, Subcommand};

use leadflow_server::telemetry;

/// Leadflow CLI -- drive the outreach pipeline.
#[derive(Parser, Debug)]
#[command(name = "leadflow", version, about)]
struct Cli {
    /// Path to the server TOML configuration.
    #[arg(long, global = true, env = "LEADFLOW_CONFIG")]
    config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server with workers and scheduler.
    Serve,
    /// Analyze a lead.
    AnalyzeLead(commands::jobs::AnalyzeLeadArgs),
    /// Discover leads from a source.
    DiscoverLeads(commands::jobs::DiscoverLeadsArgs),
    /// Generate a proposal for a lead.
    GenerateProposal(commands::jobs::GenerateProposalArgs),
    /// Compose an offer for a lead.
    GenerateOffer(commands::jobs::GenerateOfferArgs),
    /// Sync company records from the business registry.
    SyncCompany(commands::jobs::SyncCompanyArgs),
    /// Inspect and re-drive the failed queue.
    Failed(commands::failed::FailedArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => leadflow_server::ServerConfig::load(path)?,
        None => leadflow_server::ServerConfig::default(),
    };

    match cli.command {
        Command::Serve => leadflow_server::run_server(config).await,
        Command::AnalyzeLead(args) => commands::jobs::analyze_lead(&config, args).await,
        Command::DiscoverLeads(args) => commands::jobs::discover_leads(&config, args).await,
        Command::GenerateProposal(args) => commands::jobs::generate_proposal(&config, args).await,
        Command::GenerateOffer(args) => commands::jobs::generate_offer(&config, args).await,
        Command::SyncCompany(args) => commands::jobs::sync_company(&config, args).await,
        Command::Failed(args) => commands::failed::run(&config, args).await,
    }
}
