use std::{
    fs,
    path::{
        Path,
        PathBuf,
    },
};

use color_eyre::eyre::{
    self,
    ensure,
    WrapErr as _,
};
use serde::{
    Deserialize,
    Serialize,
};

use crate::{
    chain_id::RollappId,
    reconcile::TomlPatch,
    ROLLER_CONFIG_FILE,
};

/// Environments the operator can pick the hub from.
pub(crate) const HUB_ENVIRONMENTS: &[&str] = &["playground", "custom"];

const DEFAULT_DECIMALS: u32 = 18;

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub(crate) struct HubData {
    pub(crate) id: String,
    pub(crate) api_url: String,
    pub(crate) rpc_url: String,
    pub(crate) archive_rpc_url: String,
    pub(crate) gas_price: String,
}

impl HubData {
    /// The preset hub of a named environment. `custom` has no preset.
    pub(crate) fn preset(environment: &str) -> Option<Self> {
        match environment {
            "playground" => Some(Self {
                id: "dymension_1405-1".to_string(),
                api_url: "https://api-blumbus.mzonder.com:443".to_string(),
                rpc_url: "https://rpc-blumbus.mzonder.com:443".to_string(),
                archive_rpc_url: "https://rpc-blumbus-archive.mzonder.com:443".to_string(),
                gas_price: "20000000000".to_string(),
            }),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub(crate) enum NodeType {
    Sequencer,
    #[default]
    Fullnode,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub(crate) struct DaData {
    pub(crate) backend: String,
    pub(crate) api_url: String,
}

/// The persisted `roller.toml`.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub(crate) struct RollerConfig {
    pub(crate) rollapp_id: String,
    pub(crate) home: PathBuf,
    #[serde(rename = "HubData")]
    pub(crate) hub_data: HubData,
    pub(crate) node_type: NodeType,
    pub(crate) base_denom: String,
    pub(crate) bech32_prefix: String,
    pub(crate) decimals: u32,
    #[serde(rename = "DA")]
    pub(crate) da: DaData,
}

impl Default for RollerConfig {
    fn default() -> Self {
        Self {
            rollapp_id: String::new(),
            home: PathBuf::new(),
            hub_data: HubData::default(),
            node_type: NodeType::default(),
            base_denom: String::new(),
            bech32_prefix: String::new(),
            decimals: DEFAULT_DECIMALS,
            da: DaData::default(),
        }
    }
}

impl RollerConfig {
    pub(crate) fn path(home: &Path) -> PathBuf {
        home.join(ROLLER_CONFIG_FILE)
    }

    pub(crate) fn load(home: &Path) -> eyre::Result<Self> {
        let path = Self::path(home);
        let contents = fs::read_to_string(&path)
            .wrap_err_with(|| format!("failed to read `{}`", path.display()))?;
        toml::from_str(&contents).wrap_err_with(|| format!("failed to parse `{}`", path.display()))
    }

    /// Loads the hub data without requiring the rest of the config to be complete.
    pub(crate) fn load_hub_data(home: &Path) -> eyre::Result<HubData> {
        let hub = Self::load(home)?.hub_data;
        ensure!(
            !hub.id.is_empty() && !hub.rpc_url.is_empty(),
            "`{}` does not define the hub id and rpc url",
            Self::path(home).display()
        );
        Ok(hub)
    }

    /// Checks the fields every workflow touching the hub relies on.
    pub(crate) fn validate(&self) -> eyre::Result<()> {
        self.rollapp_id
            .parse::<RollappId>()
            .wrap_err_with(|| format!("invalid rollapp_id `{}`", self.rollapp_id))?;
        ensure!(
            !self.home.as_os_str().is_empty(),
            "roller config does not define its home"
        );
        ensure!(!self.hub_data.id.is_empty(), "roller config does not define HubData.id");
        ensure!(
            !self.hub_data.rpc_url.is_empty(),
            "roller config does not define HubData.rpc_url"
        );
        ensure!(
            !self.hub_data.gas_price.is_empty(),
            "roller config does not define HubData.gas_price"
        );
        Ok(())
    }

    /// The fields written when a config is seeded from operator input.
    pub(crate) fn seed_patch(rollapp_id: &RollappId, home: &Path, hub: &HubData) -> TomlPatch {
        TomlPatch::new()
            .set("rollapp_id", rollapp_id.as_str())
            .set("home", home.to_string_lossy().into_owned())
            .set("HubData.id", hub.id.as_str())
            .set("HubData.api_url", hub.api_url.as_str())
            .set("HubData.rpc_url", hub.rpc_url.as_str())
            .set("HubData.archive_rpc_url", hub.archive_rpc_url.as_str())
            .set("HubData.gas_price", hub.gas_price.as_str())
    }
}

/// The rollapp as resolved from the hub for a single run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct RollappData {
    pub(crate) id: String,
    pub(crate) rpc_url: String,
    pub(crate) denom: String,
    pub(crate) bech32_prefix: String,
    pub(crate) decimals: u32,
}

/// Appends `:<port>` to `url` unless it already names a port.
pub(crate) fn with_default_port(url: &str, port: u16) -> String {
    let url = url.trim_end_matches('/');
    let authority = url.split_once("://").map_or(url, |(_, rest)| rest);
    let host = authority.split('/').next().unwrap_or(authority);
    let has_port = host
        .rsplit_once(':')
        .is_some_and(|(_, port)| !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()));
    if has_port {
        url.to_string()
    } else {
        format!("{url}:{port}")
    }
}
