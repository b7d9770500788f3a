use std::{
    fs::OpenOptions,
    path::{
        Path,
        PathBuf,
    },
};

use color_eyre::eyre::{
    self,
    bail,
    ensure,
    eyre,
    WrapErr as _,
};
use tokio::{
    process::Command,
    signal::unix::{
        signal,
        SignalKind,
    },
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{
    info,
    instrument,
};

use super::{
    channel::{
        self,
        ChannelPair,
    },
    client::{
        Relayer,
        Rly,
    },
    config::RelayerConfig,
    resolve_rollapp,
    write_status,
    LOG_FILE,
};
use crate::{
    balances,
    hub::{
        ChainQuery,
        HubCli,
    },
    keys::{
        self,
        KeyInfo,
        RelayerKeys,
        HUB_RELAYER_KEY,
        ROLLAPP_RELAYER_KEY,
    },
    prompt::{
        Prompter,
        Terminal,
    },
    roller_config::RollerConfig,
    Environment,
    RELAYER_DIR,
};

#[derive(Debug, clap::Args)]
pub(super) struct Args {}

impl Args {
    pub(super) async fn run(self, home: &Path, env: &Environment) -> eyre::Result<()> {
        let chain = HubCli::new(env.hub_binary.clone());
        let relayer = Rly::new(env.relayer_binary.clone(), home.join(RELAYER_DIR));
        let Some(channels) = prepare(home, env, &chain, &relayer, &Terminal).await? else {
            println!("cancelled by user");
            return Ok(());
        };
        println!("starting the relayer for\n{channels}");

        let shutdown_token = CancellationToken::new();
        let relayer_task = tokio::spawn(run_relayer(
            relayer.start_command(),
            relayer.home().join(LOG_FILE),
            shutdown_token.clone(),
        ));
        wait_for_shutdown(shutdown_token, relayer_task).await
    }
}

/// Checks the relayer is set up, funded and has a channel to relay over.
///
/// Returns `None` if the operator declined to fund the relayer keys.
#[instrument(skip_all, err)]
async fn prepare(
    home: &Path,
    env: &Environment,
    chain: &dyn ChainQuery,
    relayer: &dyn Relayer,
    prompt: &dyn Prompter,
) -> eyre::Result<Option<ChannelPair>> {
    let config = RelayerConfig::load(relayer.home())?.ok_or_else(|| {
        eyre!(
            "no relayer config found in `{}`, run `roller relayer setup` first",
            relayer.home().display()
        )
    })?;
    let path = config
        .hub_rollapp_path()
        .ok_or_else(|| eyre!("the relayer has no path configured, run `roller relayer setup` first"))?;
    let hub_id = path.src.chain_id.as_str();
    let rollapp_id = path.dst.chain_id.as_str();
    ensure!(
        !hub_id.is_empty() && !rollapp_id.is_empty(),
        "the relayer path does not name both chains"
    );

    let hub = RollerConfig::load_hub_data(home)?;
    ensure!(
        hub.id == hub_id,
        "the relayer path points at hub `{hub_id}` but the roller config at `{}`",
        hub.id
    );
    let rollapp = resolve_rollapp(chain, rollapp_id, &hub).await?;

    let keys = RelayerKeys {
        hub: existing_key(relayer, hub_id, HUB_RELAYER_KEY).await?,
        rollapp: existing_key(relayer, rollapp_id, ROLLAPP_RELAYER_KEY).await?,
    };
    let required = keys::funding_requirements(&keys, &hub, &rollapp, env);
    if balances::verify(chain, prompt, &required)
        .await?
        .is_declined()
    {
        return Ok(None);
    }

    let channels = channel::probe(relayer, rollapp_id).await?;
    ensure!(
        channels.is_ready(),
        "no channels found, ensure you've setup the relayer"
    );
    write_status(relayer.home(), &channels)?;
    Ok(Some(channels))
}

async fn existing_key(relayer: &dyn Relayer, chain_id: &str, name: &str) -> eyre::Result<KeyInfo> {
    let address = relayer
        .key_address(chain_id, name)
        .await?
        .ok_or_else(|| {
            eyre!("relayer key `{name}` for `{chain_id}` not found, run `roller relayer setup` first")
        })?;
    Ok(KeyInfo {
        name: name.to_string(),
        address,
        mnemonic: None,
    })
}

/// Runs the relayer until it exits or `shutdown_token` is cancelled.
///
/// The relayer output is appended to `log_path`. The relayer exiting on its own is an error.
#[instrument(skip_all, fields(log = %log_path.display()), err)]
async fn run_relayer(
    mut cmd: Command,
    log_path: PathBuf,
    shutdown_token: CancellationToken,
) -> eyre::Result<()> {
    let log = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .wrap_err_with(|| format!("failed to open `{}`", log_path.display()))?;
    let stderr = log
        .try_clone()
        .wrap_err("failed to duplicate the relayer log handle")?;
    let mut child = cmd
        .stdout(log)
        .stderr(stderr)
        .kill_on_drop(true)
        .spawn()
        .wrap_err("failed to start the relayer")?;
    info!(pid = child.id(), "relayer started");

    tokio::select! {
        () = shutdown_token.cancelled() => {
            info!("stopping the relayer");
            child.kill().await.wrap_err("failed to stop the relayer")?;
            Ok(())
        }
        status = child.wait() => {
            let status = status.wrap_err("failed waiting for the relayer to exit")?;
            bail!(
                "relayer exited unexpectedly with {status}, see `{}`",
                log_path.display()
            );
        }
    }
}

async fn wait_for_shutdown(
    shutdown_token: CancellationToken,
    mut relayer_task: JoinHandle<eyre::Result<()>>,
) -> eyre::Result<()> {
    let mut sigterm = signal(SignalKind::terminate())
        .wrap_err("failed to listen for the SIGTERM signal")?;
    let reason = tokio::select! {
        _ = sigterm.recv() => "received SIGTERM",
        res = tokio::signal::ctrl_c() => {
            res.wrap_err("failed to listen for ctrl-c")?;
            "received ctrl-c"
        }
        res = &mut relayer_task => {
            return res.wrap_err("relayer task panicked")?;
        }
    };
    info!(reason, "shutting down");
    shutdown_token.cancel();
    relayer_task.await.wrap_err("relayer task panicked")?
}
