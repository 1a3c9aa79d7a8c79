use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::error::GatekeeperResult;
use crate::gatekeeper::Gatekeeper;
use crate::ledger::models::Chain;
use crate::ledger::{GatewayPair, LedgerGateway, RpcLedgerGateway};

/// Connects both gates and wires them for the configured direction
pub fn connect_gateways(config: &Config) -> GatekeeperResult<GatewayPair> {
    let timeout = config.ledger.request_timeout;

    let masterchain: Arc<dyn LedgerGateway> = Arc::new(RpcLedgerGateway::new(
        Chain::Masterchain,
        config.ledger.masterchain_url.clone(),
        timeout,
    )?);
    let sidechain: Arc<dyn LedgerGateway> = Arc::new(RpcLedgerGateway::new(
        Chain::Sidechain,
        config.ledger.sidechain_url.clone(),
        timeout,
    )?);

    let gates = GatewayPair::for_direction(config.gatekeeper.direction, masterchain, sidechain);
    info!(
        payins_from = %gates.input.chain(),
        payouts_on = %gates.output.chain(),
        "ledger gateways connected"
    );

    Ok(gates)
}

pub async fn initialize_gatekeeper(config: &Config) -> GatekeeperResult<Arc<Gatekeeper>> {
    info!("Initializing gatekeeper components ...");

    let gates = connect_gateways(config)?;
    let gatekeeper = Gatekeeper::new(config.gatekeeper.clone(), config.keeper.address, gates).await?;

    Ok(Arc::new(gatekeeper))
}
