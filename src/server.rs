use axum::{routing::get, Router};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::api::status::{get_status, health_check};
use crate::error::GatekeeperResult;
use crate::gatekeeper::Gatekeeper;

pub fn create_app(gatekeeper: Arc<Gatekeeper>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/status", get(get_status))
        .layer(TraceLayer::new_for_http())
        .with_state(gatekeeper)
}

pub async fn run_server(
    app: Router,
    bind_address: &str,
    shutdown: CancellationToken,
) -> GatekeeperResult<()> {
    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    info!("Status server listening on: {}", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}
