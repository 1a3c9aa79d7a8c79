pub mod gateway;
pub mod models;
pub mod rpc;
#[cfg(test)]
pub mod memory;

pub use gateway::{GatewayPair, LedgerGateway};
pub use rpc::RpcLedgerGateway;
