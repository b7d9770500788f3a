pub mod cli;

mod balances;
mod chain_id;
mod da;
mod environment;
mod exec;
mod hub;
mod keys;
mod node;
mod prompt;
mod reconcile;
mod relayer;
mod roller_config;
#[cfg(test)]
mod test_utils;

pub use environment::Environment;

/// Name of the roller config file inside the roller home.
const ROLLER_CONFIG_FILE: &str = "roller.toml";
/// Directory holding the relayer home inside the roller home.
const RELAYER_DIR: &str = "relayer";
/// Directory holding the rollapp node home inside the roller home.
const ROLLAPP_DIR: &str = "rollapp";
/// Directory holding the DA light client config inside the roller home.
const DA_LIGHT_NODE_DIR: &str = "da-light-node";

/// Base denom of the Dymension hub.
const HUB_DENOM: &str = "adym";
/// Bech32 prefix of hub addresses.
const HUB_ADDRESS_PREFIX: &str = "dym";
