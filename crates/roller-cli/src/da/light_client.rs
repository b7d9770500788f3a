use std::{
    fs,
    path::{
        Path,
        PathBuf,
    },
};

use async_trait::async_trait;
use color_eyre::eyre::{
    self,
    ensure,
    WrapErr as _,
};
use tokio::process::Command;
use tracing::{
    info,
    instrument,
};

use super::avail::{
    extract_height_from_da_path,
    update_light_client_config,
    BlockInfo,
    DaRpc,
};
use crate::{
    exec,
    hub::ChainQuery,
    keys::KeyInfo,
    reconcile::write_atomically,
    roller_config::RollerConfig,
};

/// Environment in which no light client runs.
pub(crate) const MOCK_ENVIRONMENT: &str = "mock";

const KEY_NAME: &str = "avail-light-client";
const CONFIG_FILE: &str = "config.toml";
const IDENTITY_FILE: &str = "identity.toml";

const DEFAULT_CONFIG: &str = r#"[Core]
IP = "0.0.0.0"
Port = 7000

[DASer]
SampleFrom = 1
SamplingRange = 100

[Header]
TrustedHash = ""
"#;

/// The light client of the DA layer, configured from the roller home.
#[async_trait]
pub(crate) trait LightNode: Send + Sync {
    fn key_name(&self) -> &str;

    fn config_path(&self) -> PathBuf;

    /// Writes the default config and a fresh identity. Returns the identity's mnemonic.
    fn init_config(&self) -> eyre::Result<String>;

    /// The DA account address of the identity.
    async fn address(&self) -> eyre::Result<String>;
}

pub(crate) struct AvailLightNode {
    binary: PathBuf,
    root: PathBuf,
}

impl AvailLightNode {
    pub(crate) fn new(binary: PathBuf, root: PathBuf) -> Self {
        Self {
            binary,
            root,
        }
    }

    fn identity_path(&self) -> PathBuf {
        self.root.join(IDENTITY_FILE)
    }
}

#[async_trait]
impl LightNode for AvailLightNode {
    fn key_name(&self) -> &str {
        KEY_NAME
    }

    fn config_path(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }

    fn init_config(&self) -> eyre::Result<String> {
        fs::create_dir_all(&self.root)
            .wrap_err_with(|| format!("failed to create `{}`", self.root.display()))?;
        write_atomically(&self.config_path(), DEFAULT_CONFIG.as_bytes())?;
        let mnemonic = bip39::Mnemonic::new(bip39::MnemonicType::Words24, bip39::Language::English);
        write_identity(&self.identity_path(), mnemonic.phrase())?;
        Ok(mnemonic.phrase().to_string())
    }

    #[instrument(skip(self), err)]
    async fn address(&self) -> eyre::Result<String> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("address").arg("--identity").arg(self.identity_path());
        let out = exec::stdout(cmd)
            .await
            .wrap_err("failed to read the light client address")?;
        let address = String::from_utf8_lossy(&out).trim().to_string();
        ensure!(!address.is_empty(), "the light client printed no address");
        Ok(address)
    }
}

fn write_identity(path: &Path, phrase: &str) -> eyre::Result<()> {
    let mut identity = toml::Table::new();
    identity.insert(
        "avail_secret_seed_phrase".to_string(),
        toml::Value::String(phrase.to_string()),
    );
    let encoded = toml::to_string(&identity).wrap_err("failed to encode the identity")?;
    write_atomically(path, encoded.as_bytes())
}

/// Initializes the light client config and picks the DA block it starts sampling from.
///
/// The light client starts at the DA height of the RollApp's first state update. A RollApp
/// without registered sequencers or without state updates starts at the latest DA block.
/// Returns `None` in the mock environment.
#[instrument(skip_all, fields(env = env_name, rollapp_id = %config.rollapp_id), err)]
pub(crate) async fn initialize(
    env_name: &str,
    config: &RollerConfig,
    chain: &dyn ChainQuery,
    da: &dyn DaRpc,
    node: &dyn LightNode,
) -> eyre::Result<Option<KeyInfo>> {
    if env_name == MOCK_ENVIRONMENT {
        return Ok(None);
    }
    let mnemonic = node.init_config()?;

    let sequencers = chain
        .registered_sequencers(&config.rollapp_id, &config.hub_data)
        .await
        .wrap_err("failed to retrieve the rollapp's sequencers")?;
    let start = if sequencers == 0 {
        info!("no sequencers registered for the rollapp, using the latest DA height");
        da.latest_block().await?
    } else {
        match chain
            .rollapp_state(&config.rollapp_id, &config.hub_data)
            .await
            .wrap_err("failed to retrieve the rollapp's first state update")?
        {
            None => {
                info!("no state update found for the rollapp, using the latest DA height");
                da.latest_block().await?
            }
            Some(state) => {
                let height = extract_height_from_da_path(&state.da_path)?;
                let hash = da.block_hash(height).await?;
                info!(height, %hash, "using the DA height of the first state update");
                BlockInfo {
                    height,
                    hash,
                }
            }
        }
    };
    println!(
        "DA light client will be initialized at height {}, block hash {}",
        start.height, start.hash
    );
    update_light_client_config(&node.config_path(), &start.hash, start.height)?;

    let address = node.address().await?;
    Ok(Some(KeyInfo {
        name: node.key_name().to_string(),
        address,
        mnemonic: Some(mnemonic),
    }))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use tempfile::TempDir;

    use super::*;
    use crate::{
        hub::StateInfo,
        test_utils::FakeChain,
    };

    struct FakeDa {
        latest: BlockInfo,
        asked_heights: Mutex<Vec<u64>>,
    }

    impl Default for FakeDa {
        fn default() -> Self {
            Self {
                latest: BlockInfo {
                    height: 900,
                    hash: "0xlatest".to_string(),
                },
                asked_heights: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl DaRpc for FakeDa {
        async fn latest_block(&self) -> eyre::Result<BlockInfo> {
            Ok(self.latest.clone())
        }

        async fn block_hash(&self, height: u64) -> eyre::Result<String> {
            self.asked_heights.lock().unwrap().push(height);
            Ok(format!("0xhash{height}"))
        }
    }

    /// A light node whose identity is fixed and whose config lives in a temporary directory.
    struct FakeLightNode {
        dir: TempDir,
    }

    impl FakeLightNode {
        fn new() -> Self {
            Self {
                dir: TempDir::new().unwrap(),
            }
        }

        fn config(&self) -> toml::Table {
            fs::read_to_string(self.config_path())
                .unwrap()
                .parse()
                .unwrap()
        }
    }

    #[async_trait]
    impl LightNode for FakeLightNode {
        fn key_name(&self) -> &str {
            KEY_NAME
        }

        fn config_path(&self) -> PathBuf {
            self.dir.path().join(CONFIG_FILE)
        }

        fn init_config(&self) -> eyre::Result<String> {
            fs::write(self.config_path(), DEFAULT_CONFIG)?;
            Ok("abandon ability".to_string())
        }

        async fn address(&self) -> eyre::Result<String> {
            Ok("5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY".to_string())
        }
    }

    fn roller_config() -> RollerConfig {
        RollerConfig {
            rollapp_id: "mars_9000-1".to_string(),
            ..RollerConfig::default()
        }
    }

    #[tokio::test]
    async fn mock_environment_is_not_initialized() {
        let node = FakeLightNode::new();
        let key = initialize(
            MOCK_ENVIRONMENT,
            &roller_config(),
            &FakeChain::default(),
            &FakeDa::default(),
            &node,
        )
        .await
        .unwrap();
        assert_eq!(key, None);
        assert!(!node.config_path().exists());
    }

    #[tokio::test]
    async fn rollapp_without_sequencers_starts_at_the_latest_block() {
        let node = FakeLightNode::new();
        let key = initialize(
            "playground",
            &roller_config(),
            &FakeChain::default().with_sequencers(0),
            &FakeDa::default(),
            &node,
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(key.name, KEY_NAME);
        assert_eq!(key.mnemonic.as_deref(), Some("abandon ability"));

        let config = node.config();
        assert_eq!(config["DASer"]["SampleFrom"].as_integer(), Some(900));
        assert_eq!(config["Header"]["TrustedHash"].as_str(), Some("0xlatest"));
    }

    #[tokio::test]
    async fn rollapp_without_state_updates_starts_at_the_latest_block() {
        let node = FakeLightNode::new();
        let da = FakeDa::default();
        initialize(
            "playground",
            &roller_config(),
            &FakeChain::default().with_sequencers(1),
            &da,
            &node,
        )
        .await
        .unwrap();
        assert_eq!(node.config()["DASer"]["SampleFrom"].as_integer(), Some(900));
        assert!(da.asked_heights.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn first_state_update_sets_the_start_height() {
        let node = FakeLightNode::new();
        let da = FakeDa::default();
        initialize(
            "playground",
            &roller_config(),
            &FakeChain::default()
                .with_sequencers(1)
                .with_state(StateInfo {
                    da_path: "avail|4242|3|0".to_string(),
                }),
            &da,
            &node,
        )
        .await
        .unwrap();
        let config = node.config();
        assert_eq!(config["DASer"]["SampleFrom"].as_integer(), Some(4242));
        assert_eq!(config["Header"]["TrustedHash"].as_str(), Some("0xhash4242"));
        assert_eq!(*da.asked_heights.lock().unwrap(), [4242]);
    }

    #[tokio::test]
    async fn malformed_da_path_is_an_error() {
        let node = FakeLightNode::new();
        let err = initialize(
            "playground",
            &roller_config(),
            &FakeChain::default()
                .with_sequencers(1)
                .with_state(StateInfo {
                    da_path: "avail".to_string(),
                }),
            &FakeDa::default(),
            &node,
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("does not have enough parts"), "{err}");
    }

    #[test]
    fn avail_node_writes_config_and_identity() {
        let dir = TempDir::new().unwrap();
        let node = AvailLightNode::new(
            PathBuf::from("avail-light"),
            dir.path().join("da-light-node"),
        );
        let phrase = node.init_config().unwrap();
        assert_eq!(phrase.split_whitespace().count(), 24);

        let identity: toml::Table = fs::read_to_string(node.identity_path())
            .unwrap()
            .parse()
            .unwrap();
        assert_eq!(
            identity["avail_secret_seed_phrase"].as_str(),
            Some(phrase.as_str())
        );
        let config: toml::Table = fs::read_to_string(node.config_path())
            .unwrap()
            .parse()
            .unwrap();
        assert_eq!(config["DASer"]["SampleFrom"].as_integer(), Some(1));
    }
}
