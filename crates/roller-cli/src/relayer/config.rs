//! The relayer's own `config/config.yaml`.

use std::{
    collections::BTreeMap,
    fs,
    path::{
        Path,
        PathBuf,
    },
};

use color_eyre::eyre::{
    self,
    WrapErr as _,
};
use serde::Deserialize;
use serde_yaml::Value;

use super::client::PATH_NAME;
use crate::{
    reconcile::YamlPatch,
    roller_config::HubData,
};

const HUB_GAS_ADJUSTMENT: f64 = 1.5;
const ROLLAPP_GAS_ADJUSTMENT: f64 = 1.3;

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub(crate) struct RelayerConfig {
    #[serde(default)]
    chains: BTreeMap<String, Value>,
    #[serde(default)]
    paths: BTreeMap<String, PathConfig>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub(crate) struct PathConfig {
    #[serde(default)]
    pub(crate) src: PathEnd,
    #[serde(default)]
    pub(crate) dst: PathEnd,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", default)]
pub(crate) struct PathEnd {
    pub(crate) chain_id: String,
    pub(crate) client_id: String,
    pub(crate) connection_id: String,
}

impl RelayerConfig {
    pub(crate) fn path(relayer_home: &Path) -> PathBuf {
        relayer_home.join("config").join("config.yaml")
    }

    /// Loads the relayer config, or `None` if the relayer home was never initialized.
    pub(crate) fn load(relayer_home: &Path) -> eyre::Result<Option<Self>> {
        let path = Self::path(relayer_home);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err).wrap_err_with(|| format!("failed to read `{}`", path.display()));
            }
        };
        serde_yaml::from_str(&contents)
            .map(Some)
            .wrap_err_with(|| format!("failed to parse `{}`", path.display()))
    }

    pub(crate) fn has_chain(&self, chain_id: &str) -> bool {
        self.chains.contains_key(chain_id)
    }

    pub(crate) fn hub_rollapp_path(&self) -> Option<&PathConfig> {
        self.paths.get(PATH_NAME)
    }
}

/// Settings both chains need for the relayer to talk to a Dymension hub and a RollApp.
pub(crate) fn chain_settings_patch(hub: &HubData, rollapp_id: &str, rollapp_rpc: &str) -> YamlPatch {
    let hub_chain = format!("chains.{}.value", hub.id);
    let rollapp_chain = format!("chains.{rollapp_id}.value");
    YamlPatch::new()
        .set(format!("{hub_chain}.gas-adjustment"), HUB_GAS_ADJUSTMENT)
        .set(format!("{hub_chain}.is-dym-hub"), true)
        .set(format!("{hub_chain}.http-addr"), hub.api_url.as_str())
        .set(
            format!("{rollapp_chain}.gas-adjustment"),
            ROLLAPP_GAS_ADJUSTMENT,
        )
        .set(format!("{rollapp_chain}.is-dym-rollapp"), true)
        .set(format!("{rollapp_chain}.rpc-addr"), rollapp_rpc)
        .set("extra-codecs", vec!["ethermint"])
}

/// Points both ends of the hub-rollapp path at existing clients and connections.
pub(crate) fn path_connections_patch(src: &PathEnd, dst: &PathEnd) -> YamlPatch {
    let path = format!("paths.{PATH_NAME}");
    let mut patch = YamlPatch::new();
    for (side, end) in [("src", src), ("dst", dst)] {
        patch = patch
            .set(format!("{path}.{side}.chain-id"), end.chain_id.as_str())
            .set(format!("{path}.{side}.client-id"), end.client_id.as_str())
            .set(
                format!("{path}.{side}.connection-id"),
                end.connection_id.as_str(),
            );
    }
    patch
}
