use roomcast::{RoomcastError, RoomcastServer, ServerConfig};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), RoomcastError> {
    // Optional first argument: path to a TOML config file
    let config = match std::env::args().nth(1) {
        Some(path) => ServerConfig::load(&path).map_err(|e| {
            eprintln!("failed to load config {path}: {e}");
            e
        })?,
        None => ServerConfig::default(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_filter)),
        )
        .with_target(true)
        .init();

    let server = RoomcastServer::builder().config(config).build().await.map_err(|e| {
        error!(error = %e, "failed to start");
        e
    })?;
    info!(addr = ?server.local_addr().ok(), "listening");

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "cannot listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await
}
