// Solana模块 / Solana module

pub mod client;
pub mod failover;

pub use client::{AccountData, SolanaClient};
pub use failover::{EndpointFailoverClient, RpcEndpoint, RpcError, SimulationOutcome};
