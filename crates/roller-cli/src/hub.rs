//! Chain queries against the Dymension hub and RollApp binaries.

use std::path::PathBuf;

use async_trait::async_trait;
use color_eyre::eyre::{
    self,
    eyre,
    WrapErr as _,
};
use serde::Deserialize;
use tokio::process::Command;
use tracing::instrument;

use crate::{
    balances::{
        parse_balance_response,
        Balance,
    },
    exec,
    roller_config::HubData,
};

/// Where and how to query balances of a single chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ChainQueryConfig {
    pub(crate) binary: PathBuf,
    pub(crate) rpc: String,
    pub(crate) denom: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct RollappMetadata {
    pub(crate) denom: String,
    pub(crate) bech32_prefix: String,
    pub(crate) decimals: u32,
}

/// The state update a sequencer posted to the hub.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct StateInfo {
    pub(crate) da_path: String,
}

#[async_trait]
pub(crate) trait ChainQuery: Send + Sync {
    async fn balance(&self, chain: &ChainQueryConfig, address: &str) -> eyre::Result<Balance>;

    async fn rollapp(&self, rollapp_id: &str, hub: &HubData) -> eyre::Result<RollappMetadata>;

    /// The RPC endpoint the RollApp's sequencer published on the hub.
    async fn sequencer_rpc_endpoint(&self, rollapp_id: &str, hub: &HubData)
    -> eyre::Result<String>;

    /// The number of sequencers registered for the RollApp.
    async fn registered_sequencers(&self, rollapp_id: &str, hub: &HubData) -> eyre::Result<usize>;

    /// The first state update of the RollApp, or `None` if it has not posted one yet.
    async fn rollapp_state(
        &self,
        rollapp_id: &str,
        hub: &HubData,
    ) -> eyre::Result<Option<StateInfo>>;
}

/// Queries the chains by shelling out to their binaries.
pub(crate) struct HubCli {
    hub_binary: PathBuf,
}

impl HubCli {
    pub(crate) fn new(hub_binary: PathBuf) -> Self {
        Self {
            hub_binary,
        }
    }

    /// `<hub binary> q <args> --node <rpc> --chain-id <id> --output json`
    fn query(&self, hub: &HubData, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.hub_binary);
        cmd.arg("q")
            .args(args)
            .args([
                "--node",
                hub.rpc_url.as_str(),
                "--chain-id",
                hub.id.as_str(),
                "--output",
                "json",
            ]);
        cmd
    }
}

#[async_trait]
impl ChainQuery for HubCli {
    #[instrument(skip_all, fields(%address, denom = %chain.denom), err)]
    async fn balance(&self, chain: &ChainQueryConfig, address: &str) -> eyre::Result<Balance> {
        let mut cmd = Command::new(&chain.binary);
        cmd.args([
            "q",
            "bank",
            "balances",
            address,
            "--node",
            chain.rpc.as_str(),
            "--output",
            "json",
        ]);
        let out = exec::stdout(cmd).await?;
        parse_balance_response(&out, &chain.denom)
    }

    #[instrument(skip(self, hub), err)]
    async fn rollapp(&self, rollapp_id: &str, hub: &HubData) -> eyre::Result<RollappMetadata> {
        let cmd = self.query(hub, &["rollapp", "show", rollapp_id]);
        let response: RollappResponse = exec::json(cmd).await?;
        response.into_metadata()
    }

    #[instrument(skip(self, hub), err)]
    async fn sequencer_rpc_endpoint(
        &self,
        rollapp_id: &str,
        hub: &HubData,
    ) -> eyre::Result<String> {
        let cmd = self.query(hub, &["sequencer", "show-sequencers-by-rollapp", rollapp_id]);
        let response: SequencersResponse = exec::json(cmd).await?;
        response
            .first_rpc()
            .ok_or_else(|| eyre!("no sequencer of rollapp `{rollapp_id}` published an RPC endpoint"))
    }

    #[instrument(skip(self, hub), err)]
    async fn registered_sequencers(&self, rollapp_id: &str, hub: &HubData) -> eyre::Result<usize> {
        let cmd = self.query(hub, &["sequencer", "show-sequencers-by-rollapp", rollapp_id]);
        let response: SequencersResponse = exec::json(cmd).await?;
        Ok(response.sequencers.len())
    }

    #[instrument(skip(self, hub), err)]
    async fn rollapp_state(
        &self,
        rollapp_id: &str,
        hub: &HubData,
    ) -> eyre::Result<Option<StateInfo>> {
        let cmd = self.query(hub, &["rollapp", "state", rollapp_id, "--index", "1"]);
        let out = match exec::stdout(cmd).await {
            Ok(out) => out,
            Err(err) if err.is_not_found() => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let response: StateResponse = serde_json::from_slice(&out)
            .wrap_err("failed to parse the rollapp state response")?;
        Ok(Some(StateInfo {
            da_path: response.state_info.da_path,
        }))
    }
}

#[derive(Debug, Deserialize)]
struct RollappResponse {
    rollapp: RollappInfo,
}

#[derive(Debug, Deserialize)]
struct RollappInfo {
    genesis_info: GenesisInfo,
}

#[derive(Debug, Deserialize)]
struct GenesisInfo {
    #[serde(default)]
    bech32_prefix: String,
    native_denom: Option<NativeDenom>,
}

#[derive(Debug, Deserialize)]
struct NativeDenom {
    base: String,
    exponent: u32,
}

impl RollappResponse {
    fn into_metadata(self) -> eyre::Result<RollappMetadata> {
        let GenesisInfo {
            bech32_prefix,
            native_denom,
        } = self.rollapp.genesis_info;
        let denom = native_denom
            .ok_or_else(|| eyre!("rollapp does not define its native denom on the hub"))?;
        Ok(RollappMetadata {
            denom: denom.base,
            bech32_prefix,
            decimals: denom.exponent,
        })
    }
}

#[derive(Debug, Deserialize)]
struct SequencersResponse {
    #[serde(default)]
    sequencers: Vec<Sequencer>,
}

#[derive(Debug, Deserialize)]
struct Sequencer {
    #[serde(default)]
    metadata: SequencerMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct SequencerMetadata {
    #[serde(default)]
    rpcs: Vec<String>,
}

impl SequencersResponse {
    fn first_rpc(&self) -> Option<String> {
        self.sequencers
            .iter()
            .flat_map(|sequencer| &sequencer.metadata.rpcs)
            .find(|rpc| !rpc.trim().is_empty())
            .cloned()
    }
}

#[derive(Debug, Deserialize)]
struct StateResponse {
    #[serde(rename = "stateInfo", alias = "state_info")]
    state_info: RawStateInfo,
}

#[derive(Debug, Deserialize)]
struct RawStateInfo {
    #[serde(rename = "DAPath", alias = "da_path")]
    da_path: String,
}
