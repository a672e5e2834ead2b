//! Leadflow server binary.

use leadflow_server::{ServerConfig, run_server, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init();

    let config = match std::env::var_os("LEADFLOW_CONFIG") {
        Some(path) => ServerConfig::load(std::path::Path::new(&path))?,
        None => ServerConfig::default(),
    };
    run_server(config).await
}
