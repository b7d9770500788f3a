use color_eyre::eyre::{
    self,
    WrapErr as _,
};
use tracing::info;

use crate::{
    balances::RequiredBalance,
    hub::ChainQueryConfig,
    relayer::client::Relayer,
    roller_config::{
        HubData,
        RollappData,
    },
    Environment,
    HUB_DENOM,
};

pub(crate) const HUB_RELAYER_KEY: &str = "relayer-hub-key";
pub(crate) const ROLLAPP_RELAYER_KEY: &str = "relayer-rollapp-key";

/// Whole DYM the hub relayer key needs to pay for client updates.
const HUB_RELAYER_MIN_DYM: u128 = 20;
const HUB_DECIMALS: u32 = 18;

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct KeyInfo {
    pub(crate) name: String,
    pub(crate) address: String,
    /// Only set when the key was generated during this run.
    pub(crate) mnemonic: Option<String>,
}

impl KeyInfo {
    pub(crate) fn print(&self) {
        println!("{}: {}", self.name, self.address);
        if let Some(mnemonic) = &self.mnemonic {
            println!("  mnemonic: {mnemonic}");
            println!("  write the mnemonic down and keep it safe, it is not shown again");
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct RelayerKeys {
    pub(crate) hub: KeyInfo,
    pub(crate) rollapp: KeyInfo,
}

/// Looks up the relayer keys of both chains, generating the ones that are missing.
pub(crate) async fn ensure_relayer_keys(
    relayer: &dyn Relayer,
    hub_id: &str,
    rollapp_id: &str,
) -> eyre::Result<RelayerKeys> {
    let hub = ensure_key(relayer, hub_id, HUB_RELAYER_KEY).await?;
    let rollapp = ensure_key(relayer, rollapp_id, ROLLAPP_RELAYER_KEY).await?;
    Ok(RelayerKeys {
        hub,
        rollapp,
    })
}

async fn ensure_key(relayer: &dyn Relayer, chain_id: &str, name: &str) -> eyre::Result<KeyInfo> {
    let existing = relayer
        .key_address(chain_id, name)
        .await
        .wrap_err_with(|| format!("failed to look up relayer key `{name}`"))?;
    if let Some(address) = existing {
        return Ok(KeyInfo {
            name: name.to_string(),
            address,
            mnemonic: None,
        });
    }
    let key = relayer
        .add_key(chain_id, name)
        .await
        .wrap_err_with(|| format!("failed to create relayer key `{name}`"))?;
    info!(key = name, chain_id, "created relayer key");
    key.print();
    Ok(key)
}

/// The balances the relayer keys must hold before channels can be created.
pub(crate) fn funding_requirements(
    keys: &RelayerKeys,
    hub: &HubData,
    rollapp: &RollappData,
    env: &Environment,
) -> Vec<RequiredBalance> {
    vec![
        RequiredBalance {
            key_name: keys.hub.name.clone(),
            address: keys.hub.address.clone(),
            required: HUB_RELAYER_MIN_DYM * 10u128.pow(HUB_DECIMALS),
            decimals: HUB_DECIMALS,
            network: hub.id.clone(),
            chain: ChainQueryConfig {
                binary: env.hub_binary.clone(),
                rpc: hub.rpc_url.clone(),
                denom: HUB_DENOM.to_string(),
            },
        },
        RequiredBalance {
            key_name: keys.rollapp.name.clone(),
            address: keys.rollapp.address.clone(),
            required: 10u128.saturating_pow(rollapp.decimals),
            decimals: rollapp.decimals,
            network: rollapp.id.clone(),
            chain: ChainQueryConfig {
                binary: env.rollapp_binary.clone(),
                rpc: rollapp.rpc_url.clone(),
                denom: rollapp.denom.clone(),
            },
        },
    ]
}
