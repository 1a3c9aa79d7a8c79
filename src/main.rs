mod api;
mod bootstrap;
mod config;
mod error;
mod gatekeeper;
mod ledger;
mod server;
mod settlement;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// Initialize logging and tracing
fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,tower_http=debug,gatekeeper=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    info!("Starting bridge gatekeeper");

    let config = config::Config::load()?;
    let gatekeeper = bootstrap::initialize_gatekeeper(&config).await?;

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("shutdown requested");
                    shutdown.cancel();
                }
                Err(e) => error!("failed to listen for shutdown signal: {}", e),
            }
        }
    });

    if let Some(bind_address) = config.status.bind_address.clone() {
        let app = server::create_app(gatekeeper.clone());
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = server::run_server(app, &bind_address, shutdown).await {
                error!("status server failed: {}", e);
            }
        });
    }

    gatekeeper.serve(shutdown).await?;

    Ok(())
}
