use std::path::PathBuf;

use serde::{
    Deserialize,
    Serialize,
};

/// Settings read from `ROLLER_*` environment variables.
///
/// Every field has a default so roller runs without any variable set.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Environment {
    /// Log filter directives, also read from `RUST_LOG`.
    pub log: String,
    /// The Dymension hub binary used for chain queries.
    pub hub_binary: PathBuf,
    /// The rollapp binary used for bank queries against the rollapp.
    pub rollapp_binary: PathBuf,
    /// The IBC relayer binary.
    pub relayer_binary: PathBuf,
    /// The DA light client binary.
    pub light_client_binary: PathBuf,
    /// RPC endpoint of the rollapp node running on this machine.
    pub rollapp_rpc: String,
    /// Name of the systemd service running the rollapp node. Empty disables restarts.
    pub rollapp_service: String,
    /// How long to wait for the local rollapp node to become healthy and produce blocks.
    pub node_wait_timeout_ms: u64,
    /// Interval between two polls of the local rollapp node.
    pub node_poll_interval_ms: u64,
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            log: "info".to_string(),
            hub_binary: PathBuf::from("dymd"),
            rollapp_binary: PathBuf::from("rollappd"),
            relayer_binary: PathBuf::from("rly"),
            light_client_binary: PathBuf::from("avail-light"),
            rollapp_rpc: "http://localhost:26657".to_string(),
            rollapp_service: "rollapp".to_string(),
            node_wait_timeout_ms: 600_000,
            node_poll_interval_ms: 2_000,
        }
    }
}

impl config::Config for Environment {
    const PREFIX: &'static str = "ROLLER_";
}
