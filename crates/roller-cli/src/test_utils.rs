//! In-memory collaborators for exercising the workflows without external binaries.

use std::{
    collections::{
        BTreeMap,
        VecDeque,
    },
    path::{
        Path,
        PathBuf,
    },
    sync::Mutex,
};

use async_trait::async_trait;
use color_eyre::eyre::{
    self,
    eyre,
};
use tempfile::TempDir;

use crate::{
    balances::Balance,
    hub::{
        ChainQuery,
        ChainQueryConfig,
        RollappMetadata,
        StateInfo,
    },
    keys::KeyInfo,
    node::RollappNode,
    prompt::Prompter,
    reconcile::{
        self,
        YamlPatch,
    },
    relayer::{
        client::{
            ChainConfig,
            ChannelEnd,
            Connection,
            Relayer,
            PATH_NAME,
        },
        config::RelayerConfig,
    },
    roller_config::{
        HubData,
        RollappData,
    },
};

pub(crate) fn rollapp_data() -> RollappData {
    RollappData {
        id: "mars_9000-1".to_string(),
        rpc_url: "https://rpc.mars.io:443".to_string(),
        denom: "amars".to_string(),
        bech32_prefix: "mars".to_string(),
        decimals: 18,
    }
}

/// A hub knowing a single RollApp and a fixed set of balances.
pub(crate) struct FakeChain {
    balances: BTreeMap<String, u128>,
    sequencers: usize,
    state: Option<StateInfo>,
    balance_queries: Mutex<Vec<String>>,
}

impl Default for FakeChain {
    fn default() -> Self {
        Self {
            balances: BTreeMap::new(),
            sequencers: 1,
            state: None,
            balance_queries: Mutex::new(Vec::new()),
        }
    }
}

impl FakeChain {
    pub(crate) fn with_balance(mut self, address: &str, amount: u128) -> Self {
        self.balances.insert(address.to_string(), amount);
        self
    }

    pub(crate) fn with_sequencers(self, sequencers: usize) -> Self {
        Self {
            sequencers,
            ..self
        }
    }

    pub(crate) fn with_state(self, state: StateInfo) -> Self {
        Self {
            state: Some(state),
            ..self
        }
    }

    /// The addresses whose balance was queried, in order.
    pub(crate) fn balance_queries(&self) -> Vec<String> {
        self.balance_queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChainQuery for FakeChain {
    async fn balance(&self, chain: &ChainQueryConfig, address: &str) -> eyre::Result<Balance> {
        self.balance_queries
            .lock()
            .unwrap()
            .push(address.to_string());
        let amount = self
            .balances
            .get(address)
            .copied()
            .ok_or_else(|| eyre!("account {address} not found"))?;
        Ok(Balance {
            denom: chain.denom.clone(),
            amount,
        })
    }

    async fn rollapp(&self, _rollapp_id: &str, _hub: &HubData) -> eyre::Result<RollappMetadata> {
        let rollapp = rollapp_data();
        Ok(RollappMetadata {
            denom: rollapp.denom,
            bech32_prefix: rollapp.bech32_prefix,
            decimals: rollapp.decimals,
        })
    }

    async fn sequencer_rpc_endpoint(
        &self,
        _rollapp_id: &str,
        _hub: &HubData,
    ) -> eyre::Result<String> {
        Ok("https://rpc.mars.io".to_string())
    }

    async fn registered_sequencers(
        &self,
        _rollapp_id: &str,
        _hub: &HubData,
    ) -> eyre::Result<usize> {
        Ok(self.sequencers)
    }

    async fn rollapp_state(
        &self,
        _rollapp_id: &str,
        _hub: &HubData,
    ) -> eyre::Result<Option<StateInfo>> {
        Ok(self.state.clone())
    }
}

/// A prompter replaying scripted answers. Running out of answers is an error.
#[derive(Default)]
pub(crate) struct ScriptedPrompter {
    confirms: Mutex<VecDeque<bool>>,
    inputs: Mutex<VecDeque<String>>,
    selects: Mutex<VecDeque<usize>>,
    asked: Mutex<Vec<String>>,
}

impl ScriptedPrompter {
    pub(crate) fn confirming(self, answers: impl IntoIterator<Item = bool>) -> Self {
        self.confirms.lock().unwrap().extend(answers);
        self
    }

    pub(crate) fn answering<'a>(self, answers: impl IntoIterator<Item = &'a str>) -> Self {
        self.inputs
            .lock()
            .unwrap()
            .extend(answers.into_iter().map(str::to_string));
        self
    }

    pub(crate) fn selecting(self, answers: impl IntoIterator<Item = usize>) -> Self {
        self.selects.lock().unwrap().extend(answers);
        self
    }

    /// Every prompt shown so far.
    pub(crate) fn asked(&self) -> Vec<String> {
        self.asked.lock().unwrap().clone()
    }

    fn ask<T>(&self, prompt: &str, answers: &Mutex<VecDeque<T>>) -> eyre::Result<T> {
        self.asked.lock().unwrap().push(prompt.to_string());
        answers
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| eyre!("unexpected prompt: {prompt}"))
    }
}

impl Prompter for ScriptedPrompter {
    fn confirm(&self, prompt: &str, _default: bool) -> eyre::Result<bool> {
        self.ask(prompt, &self.confirms)
    }

    fn input(&self, prompt: &str) -> eyre::Result<String> {
        self.ask(prompt, &self.inputs)
    }

    fn select(&self, prompt: &str, _items: &[&str]) -> eyre::Result<usize> {
        self.ask(prompt, &self.selects)
    }
}

/// A relayer keeping its keys and channels in memory and its config on disk.
pub(crate) struct FakeRelayer {
    _dir: Option<TempDir>,
    home: PathBuf,
    keys: Mutex<BTreeMap<String, String>>,
    channels: Mutex<Vec<ChannelEnd>>,
    connections: Vec<Connection>,
    linked_channel: Option<ChannelEnd>,
    link_stalls: bool,
    calls: Mutex<Vec<String>>,
}

impl Default for FakeRelayer {
    fn default() -> Self {
        let dir = TempDir::new().unwrap();
        let home = dir.path().to_path_buf();
        Self {
            _dir: Some(dir),
            ..Self::at(home)
        }
    }
}

impl FakeRelayer {
    /// A relayer whose home is `home`, which need not exist yet.
    pub(crate) fn at(home: PathBuf) -> Self {
        Self {
            _dir: None,
            home,
            keys: Mutex::new(BTreeMap::new()),
            channels: Mutex::new(Vec::new()),
            connections: Vec::new(),
            linked_channel: None,
            link_stalls: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// The address generated for `key` on `chain_id`.
    pub(crate) fn address_of(chain_id: &str, key: &str) -> String {
        format!("{key}@{chain_id}")
    }

    pub(crate) fn with_key(self, key: &str, address: &str) -> Self {
        self.keys
            .lock()
            .unwrap()
            .insert(key.to_string(), address.to_string());
        self
    }

    pub(crate) fn with_channels(self, channels: Vec<ChannelEnd>) -> Self {
        *self.channels.lock().unwrap() = channels;
        self
    }

    pub(crate) fn with_connections(self, connections: Vec<Connection>) -> Self {
        Self {
            connections,
            ..self
        }
    }

    /// `link` never returns, like a handshake waiting on an unresponsive chain.
    pub(crate) fn stalling_on_link(self) -> Self {
        Self {
            link_stalls: true,
            ..self
        }
    }

    /// The channel `link` opens.
    pub(crate) fn linking_to(self, channel: ChannelEnd) -> Self {
        Self {
            linked_channel: Some(channel),
            ..self
        }
    }

    /// Writes a relayer config knowing `chain_ids`, without recording a call.
    pub(crate) fn initialized(self, chain_ids: &[&str]) -> Self {
        write_chains(&self.home, chain_ids.iter().copied()).unwrap();
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn calls_starting_with(&self, prefix: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|call| call.starts_with(prefix))
            .collect()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

fn write_chains<'a>(home: &Path, chain_ids: impl IntoIterator<Item = &'a str>) -> eyre::Result<()> {
    let mut patch = YamlPatch::new();
    for chain_id in chain_ids {
        patch = patch
            .set(format!("chains.{chain_id}.type"), "cosmos")
            .set(format!("chains.{chain_id}.value.chain-id"), chain_id);
    }
    reconcile::update_yaml(&RelayerConfig::path(home), &patch)
}

#[async_trait]
impl Relayer for FakeRelayer {
    fn home(&self) -> &Path {
        &self.home
    }

    async fn init(&self, chains: &[ChainConfig]) -> eyre::Result<()> {
        let ids: Vec<&str> = chains.iter().map(|chain| chain.chain_id.as_str()).collect();
        self.record(format!("init {}", ids.join(" ")));
        write_chains(&self.home, ids)
    }

    async fn channels(&self, chain_id: &str) -> eyre::Result<Vec<ChannelEnd>> {
        self.record(format!("channels {chain_id}"));
        Ok(self.channels.lock().unwrap().clone())
    }

    async fn connections(&self, chain_id: &str) -> eyre::Result<Vec<Connection>> {
        self.record(format!("connections {chain_id}"));
        Ok(self.connections.clone())
    }

    async fn key_address(&self, chain_id: &str, key: &str) -> eyre::Result<Option<String>> {
        self.record(format!("key_address {chain_id} {key}"));
        Ok(self.keys.lock().unwrap().get(key).cloned())
    }

    async fn add_key(&self, chain_id: &str, key: &str) -> eyre::Result<KeyInfo> {
        self.record(format!("add_key {chain_id} {key}"));
        let address = Self::address_of(chain_id, key);
        self.keys
            .lock()
            .unwrap()
            .insert(key.to_string(), address.clone());
        Ok(KeyInfo {
            name: key.to_string(),
            address,
            mnemonic: Some("abandon ability able".to_string()),
        })
    }

    async fn create_path(&self, hub_id: &str, rollapp_id: &str) -> eyre::Result<()> {
        self.record(format!("create_path {hub_id} {rollapp_id}"));
        let path = format!("paths.{PATH_NAME}");
        reconcile::update_yaml(
            &RelayerConfig::path(&self.home),
            &YamlPatch::new()
                .set(format!("{path}.src.chain-id"), hub_id)
                .set(format!("{path}.dst.chain-id"), rollapp_id),
        )
    }

    async fn link(&self) -> eyre::Result<()> {
        self.record("link".to_string());
        if self.link_stalls {
            std::future::pending::<()>().await;
        }
        let channel = self
            .linked_channel
            .clone()
            .ok_or_else(|| eyre!("no channel scripted for link"))?;
        self.channels.lock().unwrap().push(channel);
        Ok(())
    }
}

/// A node at a fixed height recording the block times it was set to.
pub(crate) struct FakeNode {
    height: u64,
    block_times: Mutex<Vec<(String, bool)>>,
}

impl FakeNode {
    pub(crate) fn at_height(height: u64) -> Self {
        Self {
            height,
            block_times: Mutex::new(Vec::new()),
        }
    }

    /// The `(interval, force)` of every block time change, in order.
    pub(crate) fn block_time_calls(&self) -> Vec<(String, bool)> {
        self.block_times.lock().unwrap().clone()
    }
}

#[async_trait]
impl RollappNode for FakeNode {
    fn rpc_url(&self) -> &str {
        "http://localhost:26657"
    }

    async fn wait_until_healthy(&self) -> eyre::Result<()> {
        Ok(())
    }

    async fn wait_for_height(&self, min: u64) -> eyre::Result<u64> {
        Ok(self.height.max(min))
    }

    async fn height(&self) -> eyre::Result<u64> {
        Ok(self.height)
    }

    async fn set_block_time(&self, interval: &str, force: bool) -> eyre::Result<()> {
        self.block_times
            .lock()
            .unwrap()
            .push((interval.to_string(), force));
        Ok(())
    }
}
