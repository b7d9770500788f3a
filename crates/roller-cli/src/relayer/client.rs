//! The IBC relayer binary (`rly`) and the parts of its output roller relies on.

use std::{
    io::Write as _,
    path::{
        Path,
        PathBuf,
    },
    process::Stdio,
};

use async_trait::async_trait;
use color_eyre::eyre::{
    self,
    WrapErr as _,
};
use serde::Deserialize;
use serde_json::json;
use tokio::process::Command;
use tracing::{
    info,
    instrument,
};

use crate::{
    exec,
    keys::KeyInfo,
};

/// Name of the relayer path between the hub (`src`) and the RollApp (`dst`).
pub(crate) const PATH_NAME: &str = "hub-rollapp";
/// Port of the ICS-20 transfer application.
pub(crate) const TRANSFER_PORT: &str = "transfer";
/// State of an IBC channel or connection that finished its handshake.
pub(crate) const STATE_OPEN: &str = "STATE_OPEN";

/// The coin type of ethermint keys, used by both the hub and RollApps.
const COIN_TYPE: &str = "60";

/// A chain as registered with the relayer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ChainConfig {
    pub(crate) chain_id: String,
    pub(crate) key: String,
    pub(crate) rpc_addr: String,
    pub(crate) account_prefix: String,
    pub(crate) gas_prices: String,
}

impl ChainConfig {
    fn to_json(&self) -> serde_json::Value {
        json!({
            "type": "cosmos",
            "value": {
                "key": self.key,
                "chain-id": self.chain_id,
                "rpc-addr": self.rpc_addr,
                "account-prefix": self.account_prefix,
                "keyring-backend": "test",
                "gas-adjustment": 1.2,
                "gas-prices": self.gas_prices,
                "debug": true,
                "timeout": "10s",
                "output-format": "json",
                "sign-mode": "direct",
                "client-type": "07-tendermint",
            }
        })
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub(crate) struct Counterparty {
    #[serde(default)]
    pub(crate) port_id: String,
    #[serde(default)]
    pub(crate) channel_id: String,
}

/// One end of an IBC channel as reported by `rly q channels`.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub(crate) struct ChannelEnd {
    pub(crate) state: String,
    pub(crate) port_id: String,
    pub(crate) channel_id: String,
    #[serde(default)]
    pub(crate) counterparty: Counterparty,
}

impl ChannelEnd {
    pub(crate) fn is_open_transfer(&self) -> bool {
        self.state == STATE_OPEN && self.port_id == TRANSFER_PORT
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub(crate) struct ConnectionCounterparty {
    #[serde(default)]
    pub(crate) client_id: String,
    #[serde(default)]
    pub(crate) connection_id: String,
}

/// One end of an IBC connection as reported by `rly q connections`.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub(crate) struct Connection {
    pub(crate) id: String,
    pub(crate) client_id: String,
    pub(crate) state: String,
    #[serde(default)]
    pub(crate) counterparty: ConnectionCounterparty,
}

#[async_trait]
pub(crate) trait Relayer: Send + Sync {
    /// The relayer home directory.
    fn home(&self) -> &Path;

    /// Creates the relayer config and registers `chains` with it.
    async fn init(&self, chains: &[ChainConfig]) -> eyre::Result<()>;

    async fn channels(&self, chain_id: &str) -> eyre::Result<Vec<ChannelEnd>>;

    async fn connections(&self, chain_id: &str) -> eyre::Result<Vec<Connection>>;

    /// The address of `key` on `chain_id`, or `None` if the key does not exist.
    async fn key_address(&self, chain_id: &str, key: &str) -> eyre::Result<Option<String>>;

    /// Generates `key` for `chain_id`.
    async fn add_key(&self, chain_id: &str, key: &str) -> eyre::Result<KeyInfo>;

    /// Creates the path between the hub and the RollApp.
    async fn create_path(&self, hub_id: &str, rollapp_id: &str) -> eyre::Result<()>;

    /// Creates clients, a connection and a transfer channel over the path.
    async fn link(&self) -> eyre::Result<()>;
}

/// Drives the relayer binary.
pub(crate) struct Rly {
    binary: PathBuf,
    home: PathBuf,
}

impl Rly {
    pub(crate) fn new(binary: PathBuf, home: PathBuf) -> Self {
        Self {
            binary,
            home,
        }
    }

    fn command<'a>(&self, args: impl IntoIterator<Item = &'a str>) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(args).arg("--home").arg(&self.home);
        cmd
    }

    /// The long-running `rly start` over the hub-rollapp path.
    pub(crate) fn start_command(&self) -> Command {
        let mut cmd = self.command(["start", PATH_NAME]);
        cmd.stdin(Stdio::null());
        cmd
    }
}

#[async_trait]
impl Relayer for Rly {
    fn home(&self) -> &Path {
        &self.home
    }

    #[instrument(skip_all, fields(home = %self.home.display()), err)]
    async fn init(&self, chains: &[ChainConfig]) -> eyre::Result<()> {
        exec::stdout(self.command(["config", "init"])).await?;
        for chain in chains {
            let mut file = tempfile::Builder::new()
                .suffix(".json")
                .tempfile()
                .wrap_err("failed to create a temporary chain file")?;
            serde_json::to_writer(&mut file, &chain.to_json())
                .wrap_err("failed to write the chain file")?;
            file.flush().wrap_err("failed to write the chain file")?;
            let path = file.path().to_string_lossy().into_owned();
            exec::stdout(self.command([
                "chains",
                "add",
                chain.chain_id.as_str(),
                "--file",
                path.as_str(),
            ]))
            .await
            .wrap_err_with(|| format!("failed to add chain `{}`", chain.chain_id))?;
            info!(chain_id = %chain.chain_id, "added chain to the relayer");
        }
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn channels(&self, chain_id: &str) -> eyre::Result<Vec<ChannelEnd>> {
        let out = exec::stdout(self.command(["q", "channels", chain_id])).await?;
        exec::json_lines(&out)
    }

    #[instrument(skip(self), err)]
    async fn connections(&self, chain_id: &str) -> eyre::Result<Vec<Connection>> {
        let out = exec::stdout(self.command(["q", "connections", chain_id])).await?;
        exec::json_lines(&out)
    }

    #[instrument(skip(self), err)]
    async fn key_address(&self, chain_id: &str, key: &str) -> eyre::Result<Option<String>> {
        let out = exec::stdout(self.command(["keys", "list", chain_id])).await?;
        Ok(parse_key_list(&String::from_utf8_lossy(&out), key))
    }

    #[instrument(skip(self), err)]
    async fn add_key(&self, chain_id: &str, key: &str) -> eyre::Result<KeyInfo> {
        #[derive(Deserialize)]
        struct Added {
            mnemonic: String,
            address: String,
        }

        let added: Added = exec::json(self.command([
            "keys",
            "add",
            chain_id,
            key,
            "--coin-type",
            COIN_TYPE,
        ]))
        .await?;
        Ok(KeyInfo {
            name: key.to_string(),
            address: added.address,
            mnemonic: Some(added.mnemonic),
        })
    }

    #[instrument(skip(self), err)]
    async fn create_path(&self, hub_id: &str, rollapp_id: &str) -> eyre::Result<()> {
        exec::stdout(self.command(["paths", "new", hub_id, rollapp_id, PATH_NAME])).await?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn link(&self) -> eyre::Result<()> {
        exec::stdout(self.command([
            "tx",
            "link",
            PATH_NAME,
            "--src-port",
            TRANSFER_PORT,
            "--dst-port",
            TRANSFER_PORT,
            "--version",
            "ics20-1",
            "--max-clock-drift",
            "70m",
        ]))
        .await?;
        Ok(())
    }
}

/// Finds `key` in the `key(<name>) -> <address>` lines printed by `rly keys list`.
fn parse_key_list(out: &str, key: &str) -> Option<String> {
    out.lines().find_map(|line| {
        let (name, address) = line.trim().split_once(" -> ")?;
        let name = name.strip_prefix("key(")?.strip_suffix(')')?;
        (name == key).then(|| address.trim().to_string())
    })
}
