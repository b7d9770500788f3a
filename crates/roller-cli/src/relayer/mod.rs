use std::path::Path;

use clap::Subcommand;
use color_eyre::eyre::{
    self,
    WrapErr as _,
};
use tracing::instrument;

use crate::{
    hub::ChainQuery,
    roller_config::{
        with_default_port,
        HubData,
        RollappData,
    },
    Environment,
};

pub(crate) mod channel;
pub(crate) mod client;
pub(crate) mod config;
mod setup;
mod start;

/// Name of the file the relayer status is written to inside the relayer home.
const STATUS_FILE: &str = "relayer.status";
/// Name of the file the relayer output is appended to inside the relayer home.
const LOG_FILE: &str = "relayer.log";

const DEFAULT_RPC_PORT: u16 = 443;

#[derive(Debug, clap::Args)]
pub(crate) struct Command {
    #[command(subcommand)]
    command: SubCommand,
}

impl Command {
    pub(crate) async fn run(self, home: &Path, env: &Environment) -> eyre::Result<()> {
        match self.command {
            SubCommand::Setup(setup) => setup.run(home, env).await,
            SubCommand::Start(start) => start.run(home, env).await,
        }
    }
}

#[derive(Debug, Subcommand)]
enum SubCommand {
    /// Setup the IBC connection between the Dymension hub and the RollApp
    Setup(setup::Args),
    /// Start the relayer process interactively
    Start(start::Args),
}

/// Writes the status file reporting the active channel pair.
fn write_status(relayer_home: &Path, channels: &channel::ChannelPair) -> eyre::Result<()> {
    crate::reconcile::write_atomically(
        &relayer_home.join(STATUS_FILE),
        format!("Active\n{channels}").as_bytes(),
    )
}

/// Resolves the RollApp's RPC endpoint and token metadata from the hub.
#[instrument(skip(chain, hub), err)]
async fn resolve_rollapp(
    chain: &dyn ChainQuery,
    rollapp_id: &str,
    hub: &HubData,
) -> eyre::Result<RollappData> {
    let rpc = chain
        .sequencer_rpc_endpoint(rollapp_id, hub)
        .await
        .wrap_err("failed to retrieve the rollapp rpc endpoint")?;
    let metadata = chain
        .rollapp(rollapp_id, hub)
        .await
        .wrap_err("failed to retrieve the rollapp metadata")?;
    Ok(RollappData {
        id: rollapp_id.to_string(),
        rpc_url: with_default_port(&rpc, DEFAULT_RPC_PORT),
        denom: metadata.denom,
        bech32_prefix: metadata.bech32_prefix,
        decimals: metadata.decimals,
    })
}
