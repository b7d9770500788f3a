use std::{
    fs,
    path::{
        Path,
        PathBuf,
    },
    sync::atomic::{
        AtomicBool,
        Ordering,
    },
};

use color_eyre::eyre::{
    self,
    bail,
    ensure,
    WrapErr as _,
};
use tokio::signal::unix::{
    signal,
    Signal,
    SignalKind,
};
use tokio_util::sync::CancellationToken;
use tracing::{
    info,
    warn,
};

use super::{
    channel::{
        self,
        ChannelPair,
    },
    client::{
        ChainConfig,
        Relayer,
        Rly,
    },
    config::{
        chain_settings_patch,
        path_connections_patch,
        RelayerConfig,
    },
    resolve_rollapp,
    write_status,
};
use crate::{
    balances::{
        self,
    },
    chain_id::{
        RollappId,
        RollappIdError,
    },
    hub::{
        ChainQuery,
        HubCli,
    },
    keys::{
        self,
        HUB_RELAYER_KEY,
        ROLLAPP_RELAYER_KEY,
    },
    node::{
        base_denom_from_genesis,
        LocalNode,
        RollappNode,
        DEFAULT_BLOCK_TIME,
        FAST_BLOCK_TIME,
    },
    prompt::{
        Prompter,
        Terminal,
    },
    reconcile::{
        self,
        TomlPatch,
    },
    roller_config::{
        HubData,
        NodeType,
        RollappData,
        RollerConfig,
        HUB_ENVIRONMENTS,
    },
    Environment,
    HUB_ADDRESS_PREFIX,
    HUB_DENOM,
    RELAYER_DIR,
    ROLLAPP_DIR,
};

/// Gas price of relayer transactions on the RollApp, in its base denom.
const ROLLAPP_GAS_PRICE: &str = "2000000000";

#[derive(Debug, clap::Args)]
pub(super) struct Args {
    /// Remove the existing relayer home and create new clients, connection and channel
    #[arg(long = "override")]
    override_existing: bool,
}

impl Args {
    pub(super) async fn run(self, home: &Path, env: &Environment) -> eyre::Result<()> {
        let chain = HubCli::new(env.hub_binary.clone());
        let relayer = Rly::new(env.relayer_binary.clone(), home.join(RELAYER_DIR));
        let node = LocalNode::from_env(env, home)?;
        let sigterm = signal(SignalKind::terminate())
            .wrap_err("failed to listen for the SIGTERM signal")?;
        let shutdown_token = CancellationToken::new();
        let signals = tokio::spawn(cancel_on_signal(sigterm, shutdown_token.clone()));
        let setup = Setup {
            home,
            env,
            chain: &chain,
            relayer: &relayer,
            node: &node,
            prompt: &Terminal,
            override_existing: self.override_existing,
            shutdown_token,
            creating_channel: AtomicBool::new(false),
        };
        let outcome = setup.run().await;
        signals.abort();
        match outcome? {
            Outcome::Converged {
                channels,
                created,
            } => {
                if created {
                    println!("IBC transfer channel created!");
                } else {
                    println!("IBC transfer channel is already established!");
                }
                println!("{channels}");
                println!(
                    "next steps: run `roller relayer services load` to load the necessary systemd \
                     services"
                );
            }
            Outcome::Cancelled => println!("cancelled by user"),
            Outcome::Interrupted => println!("interrupted, relayer setup stopped"),
        }
        Ok(())
    }
}

async fn cancel_on_signal(mut sigterm: Signal, shutdown_token: CancellationToken) {
    let reason = tokio::select! {
        _ = sigterm.recv() => "received SIGTERM",
        res = tokio::signal::ctrl_c() => {
            if let Err(error) = res {
                warn!(
                    error = &error as &dyn std::error::Error,
                    "failed to listen for ctrl-c"
                );
                return;
            }
            "received ctrl-c"
        }
    };
    info!(reason, "stopping the relayer setup");
    shutdown_token.cancel();
}

#[derive(Debug, thiserror::Error)]
pub(super) enum SetupError {
    #[error("existing channels not found, initial IBC setup must be run on a sequencer node")]
    NotOnSequencer,
    #[error("`{id}` is not a valid RollApp ID")]
    InvalidRollappId {
        id: String,
        #[source]
        source: RollappIdError,
    },
}

#[derive(Debug, PartialEq, Eq)]
pub(super) enum Outcome {
    Converged {
        channels: ChannelPair,
        /// Whether the channel was created during this run.
        created: bool,
    },
    /// The operator declined a confirmation.
    Cancelled,
    /// The run was stopped by SIGINT or SIGTERM.
    Interrupted,
}

/// What the run works on, decided from the local config or from operator input.
#[derive(Debug)]
struct Session {
    rollapp_id: RollappId,
    hub: HubData,
    node_type: NodeType,
    /// Whether the operator chose to reuse the RollApp of an existing roller config.
    from_existing: bool,
}

struct Setup<'a> {
    home: &'a Path,
    env: &'a Environment,
    chain: &'a dyn ChainQuery,
    relayer: &'a dyn Relayer,
    node: &'a dyn RollappNode,
    prompt: &'a dyn Prompter,
    override_existing: bool,
    shutdown_token: CancellationToken,
    /// Set once the RollApp block time may have been lowered.
    creating_channel: AtomicBool,
}

impl Setup<'_> {
    async fn run(&self) -> eyre::Result<Outcome> {
        let outcome = tokio::select! {
            biased;
            () = self.shutdown_token.cancelled() => {
                warn!("relayer setup interrupted");
                Ok(Outcome::Interrupted)
            }
            outcome = self.converge() => outcome,
        };
        if self.creating_channel.load(Ordering::Acquire) {
            self.restore_block_time().await;
        }
        outcome
    }

    async fn converge(&self) -> eyre::Result<Outcome> {
        let session = self.local_config()?;
        let rollapp =
            resolve_rollapp(self.chain, session.rollapp_id.as_str(), &session.hub).await?;
        self.init_relayer_home(&session.hub, &rollapp).await?;

        let channels = channel::probe(self.relayer, &rollapp.id).await?;
        if channels.is_ready() && !self.override_existing {
            self.adopt_existing_channel(&session.hub, &rollapp).await?;
            write_status(self.relayer.home(), &channels)?;
            return Ok(Outcome::Converged {
                channels,
                created: false,
            });
        }

        if !session.from_existing || session.node_type != NodeType::Sequencer {
            return Err(SetupError::NotOnSequencer.into());
        }

        self.creating_channel.store(true, Ordering::Release);
        self.create_channel(&session.hub, &rollapp).await
    }

    fn roller_config_path(&self) -> PathBuf {
        RollerConfig::path(self.home)
    }

    /// Decides the RollApp and hub from the roller config or from the operator.
    fn local_config(&self) -> eyre::Result<Session> {
        let path = self.roller_config_path();
        if path.exists() {
            let config = RollerConfig::load(self.home)?;
            let reuse = self.prompt.confirm(
                &format!(
                    "the retrieved rollapp ID is: {}, would you like to initialize the relayer \
                     for this rollapp?",
                    config.rollapp_id
                ),
                true,
            )?;
            if reuse {
                return Ok(Session {
                    rollapp_id: parse_rollapp_id(&config.rollapp_id)?,
                    hub: config.hub_data,
                    node_type: config.node_type,
                    from_existing: true,
                });
            }
        } else {
            info!(path = %path.display(), "existing roller configuration not found");
        }

        let rollapp_id = parse_rollapp_id(&self.prompt.input("Please enter the RollApp ID")?)?;
        let selected = self.prompt.select(
            "select the environment you want to initialize relayer for",
            HUB_ENVIRONMENTS,
        )?;
        let Some(environment) = HUB_ENVIRONMENTS.get(selected) else {
            bail!("no environment at index {selected}");
        };
        let hub = match HubData::preset(environment) {
            Some(hub) => hub,
            None => self.custom_hub_data()?,
        };
        reconcile::update_toml(&path, &RollerConfig::seed_patch(&rollapp_id, self.home, &hub))
            .wrap_err("failed to seed the roller config")?;
        Ok(Session {
            rollapp_id,
            hub,
            node_type: NodeType::default(),
            from_existing: false,
        })
    }

    fn custom_hub_data(&self) -> eyre::Result<HubData> {
        Ok(HubData {
            id: self.prompt.input("provide hub chain id")?,
            rpc_url: self.prompt.input("provide hub rpc endpoint (including port)")?,
            api_url: self.prompt.input("provide hub rest api endpoint (including port)")?,
            archive_rpc_url: self
                .prompt
                .input("provide hub archive rpc endpoint (including port)")?,
            gas_price: self.prompt.input("provide gas price in adym")?,
        })
    }

    /// Initializes the relayer home unless it is already populated.
    async fn init_relayer_home(&self, hub: &HubData, rollapp: &RollappData) -> eyre::Result<()> {
        let relayer_home = self.relayer.home();
        if self.override_existing && relayer_home.exists() {
            warn!(path = %relayer_home.display(), "overriding the existing relayer configuration");
            fs::remove_dir_all(relayer_home)
                .wrap_err_with(|| format!("failed to remove `{}`", relayer_home.display()))?;
        }
        if dir_not_empty(relayer_home)? {
            info!("relayer already initialized");
            return Ok(());
        }
        fs::create_dir_all(relayer_home)
            .wrap_err_with(|| format!("failed to create `{}`", relayer_home.display()))?;
        let chains = [
            ChainConfig {
                chain_id: rollapp.id.clone(),
                key: ROLLAPP_RELAYER_KEY.to_string(),
                rpc_addr: rollapp.rpc_url.clone(),
                account_prefix: rollapp.bech32_prefix.clone(),
                gas_prices: format!("{ROLLAPP_GAS_PRICE}{}", rollapp.denom),
            },
            ChainConfig {
                chain_id: hub.id.clone(),
                key: HUB_RELAYER_KEY.to_string(),
                rpc_addr: hub.rpc_url.clone(),
                account_prefix: HUB_ADDRESS_PREFIX.to_string(),
                gas_prices: format!("{}{HUB_DENOM}", hub.gas_price),
            },
        ];
        self.relayer
            .init(&chains)
            .await
            .wrap_err("failed to initialize the relayer config")
    }

    /// Points a relayer that does not know the hub-rollapp path yet at the existing connection.
    async fn adopt_existing_channel(&self, hub: &HubData, rollapp: &RollappData) -> eyre::Result<()> {
        let has_path = RelayerConfig::load(self.relayer.home())?
            .is_some_and(|config| config.hub_rollapp_path().is_some());
        if has_path {
            return Ok(());
        }
        self.relayer
            .create_path(&hub.id, &rollapp.id)
            .await
            .wrap_err("failed to create the relayer path")?;
        let mut patch = chain_settings_patch(hub, &rollapp.id, &rollapp.rpc_url);
        match channel::active_connections(self.relayer, &hub.id, &rollapp.id).await? {
            Some((src, dst)) => patch = patch.merge(path_connections_patch(&src, &dst)),
            None => warn!("no open connection found for the existing channel"),
        }
        reconcile::update_yaml(&RelayerConfig::path(self.relayer.home()), &patch)
            .wrap_err("failed to update the relayer config")
    }

    /// Sets up keys, the path and the relayer config, then creates the transfer channel.
    ///
    /// The RollApp block time may be lowered along the way; `run` restores it.
    async fn create_channel(&self, hub: &HubData, rollapp: &RollappData) -> eyre::Result<Outcome> {
        println!("let's create that IBC connection, shall we?");
        let genesis = self
            .home
            .join(ROLLAPP_DIR)
            .join("config")
            .join("genesis.json");
        let base_denom = base_denom_from_genesis(&genesis)?;
        reconcile::update_toml(
            &self.roller_config_path(),
            &TomlPatch::new().set("base_denom", base_denom),
        )
        .wrap_err("failed to set the base denom in the roller config")?;

        self.node.wait_until_healthy().await?;
        self.node.wait_for_height(1).await?;
        if self.node.height().await? <= 2 {
            warn!("current height is too low, lowering the rollapp block time");
            self.node.set_block_time(FAST_BLOCK_TIME, false).await?;
        }

        let keys = keys::ensure_relayer_keys(self.relayer, &hub.id, &rollapp.id).await?;
        println!("please fund the relayer keys:");
        keys.hub.print();
        keys.rollapp.print();
        let required = keys::funding_requirements(&keys, hub, rollapp, self.env);
        if balances::verify(self.chain, self.prompt, &required)
            .await?
            .is_declined()
        {
            return Ok(Outcome::Cancelled);
        }

        let has_path = RelayerConfig::load(self.relayer.home())?
            .is_some_and(|config| config.hub_rollapp_path().is_some());
        if !has_path {
            self.relayer
                .create_path(&hub.id, &rollapp.id)
                .await
                .wrap_err("failed to create the relayer path")?;
        }
        reconcile::update_yaml(
            &RelayerConfig::path(self.relayer.home()),
            &chain_settings_patch(hub, &rollapp.id, self.node.rpc_url()),
        )
        .wrap_err("failed to update the relayer config")?;
        self.node.set_block_time(FAST_BLOCK_TIME, false).await?;

        RollerConfig::load(self.home)?
            .validate()
            .wrap_err("roller config is invalid")?;

        let create = self.prompt.confirm(
            &format!(
                "no channel found. would you like to create a new IBC channel for {}?",
                rollapp.id
            ),
            false,
        )?;
        if !create {
            println!("you can't run a relayer without an ibc channel");
            return Ok(Outcome::Cancelled);
        }
        if balances::verify(self.chain, self.prompt, &required)
            .await?
            .is_declined()
        {
            return Ok(Outcome::Cancelled);
        }

        println!("establishing IBC transfer channel");
        self.relayer
            .link()
            .await
            .wrap_err("failed to create the IBC channel")?;
        let channels = channel::probe(self.relayer, &rollapp.id).await?;
        ensure!(
            channels.is_ready(),
            "the relayer did not report an open transfer channel after creating it"
        );
        write_status(self.relayer.home(), &channels)?;
        Ok(Outcome::Converged {
            channels,
            created: true,
        })
    }

    async fn restore_block_time(&self) {
        info!("reverting the rollapp block time to {DEFAULT_BLOCK_TIME}");
        if let Err(error) = self.node.set_block_time(DEFAULT_BLOCK_TIME, true).await {
            warn!(
                error = AsRef::<dyn std::error::Error>::as_ref(&error),
                "failed to revert the rollapp block time; set `max_idle_time` to \
                 {DEFAULT_BLOCK_TIME} in dymint.toml manually"
            );
        }
    }
}

fn parse_rollapp_id(id: &str) -> Result<RollappId, SetupError> {
    id.parse().map_err(|source| SetupError::InvalidRollappId {
        id: id.to_string(),
        source,
    })
}

fn dir_not_empty(path: &Path) -> eyre::Result<bool> {
    match fs::read_dir(path) {
        Ok(mut entries) => Ok(entries.next().is_some()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err).wrap_err_with(|| format!("failed to read `{}`", path.display())),
    }
}
