use clap::{Args, Subcommand};

use leadflow_core::QueueName;
use leadflow_server::{BootstrapOptions, ServerConfig, bootstrap};
use leadflow_transport::JobTransport;

/// Failed-queue operations.
#[derive(Args, Debug)]
pub struct FailedArgs {
    #[command(subcommand)]
    pub command: FailedCommand,
}

#[derive(Subcommand, Debug)]
pub enum FailedCommand {
    /// List rows in the failed queue.
    List {
        /// Maximum rows to show.
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// Move a failed row back to its original queue.
    Redrive {
        /// Row id to re-drive.
        id: i64,
    },
}

pub async fn run(config: &ServerConfig, args: FailedArgs) -> anyhow::Result<()> {
    let state = bootstrap(config, BootstrapOptions::default());
    match args.command {
        FailedCommand::List { limit } => {
            let rows = state.transport.list(QueueName::Failed, limit).await?;
            if rows.is_empty() {
                println!("failed queue is empty");
                return Ok(());
            }
            for row in rows {
                println!(
                    "{}\tretries={}\torigin={}\t{}",
                    row.id,
                    row.headers.retry_count,
                    row.headers
                        .original_queue
                        .map_or("unknown", |queue| queue.as_str()),
                    row.body,
                );
            }
        }
        FailedCommand::Redrive { id } => {
            state.transport.redrive(id, QueueName::Normal).await?;
            println!("re-drove job {id}");
        }
    }
    Ok(())
}
