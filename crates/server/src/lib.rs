//! The Leadflow server: the operator HTTP API, the tracking surfaces, and
//! the in-process worker pool plus scheduler.

pub mod api;
pub mod config;
pub mod error;
pub mod state;
pub mod telemetry;

pub use config::ServerConfig;
pub use error::ApiError;
pub use state::{AppContext, AppState, BootstrapOptions, bootstrap};

use std::sync::Arc;

use tracing::info;

use leadflow_dispatcher::{Scheduler, WorkerConfig, WorkerPool};

/// Run the HTTP server with workers and scheduler until ctrl-c.
///
/// # Errors
///
/// Returns an error when the listener cannot bind or the schedule fails to
/// build.
pub async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    let state = bootstrap(&config, BootstrapOptions::default());

    let pool = WorkerPool::new(
        Arc::clone(&state.transport),
        Arc::clone(&state.registry),
        WorkerConfig {
            concurrency: config.worker_concurrency,
            ..WorkerConfig::default()
        },
    );
    let pool_shutdown = pool.shutdown_token();
    let worker_handles = pool.start();

    let scheduler = Scheduler::with_default_schedule(Arc::clone(&state.transport))?;
    let scheduler_shutdown = scheduler.shutdown_token();
    let scheduler_handle = tokio::spawn(scheduler.run());

    let app = api::router(Arc::clone(&state));
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %config.bind_addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown requested");
        })
        .await?;

    pool_shutdown.cancel();
    scheduler_shutdown.cancel();
    for handle in worker_handles {
        let _ = handle.await;
    }
    let _ = scheduler_handle.await;
    Ok(())
}
