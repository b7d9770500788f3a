//! The RollApp node running next to roller.

use std::{
    fs,
    future::Future,
    path::{
        Path,
        PathBuf,
    },
    time::Duration,
};

use async_trait::async_trait;
use color_eyre::eyre::{
    self,
    ensure,
    eyre,
    WrapErr as _,
};
use serde::Deserialize;
use tokio::{
    process::Command,
    time,
};
use tracing::{
    debug,
    info,
    instrument,
    warn,
};

use crate::{
    exec,
    reconcile::{
        self,
        TomlPatch,
    },
    Environment,
    ROLLAPP_DIR,
};

/// Block production interval while the relayer sets up IBC.
pub(crate) const FAST_BLOCK_TIME: &str = "5s";
/// Block production interval of an idle RollApp.
pub(crate) const DEFAULT_BLOCK_TIME: &str = "1h0m0s";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[async_trait]
pub(crate) trait RollappNode: Send + Sync {
    fn rpc_url(&self) -> &str;

    async fn wait_until_healthy(&self) -> eyre::Result<()>;

    /// Waits until the node reached at least `min` and returns its height.
    async fn wait_for_height(&self, min: u64) -> eyre::Result<u64>;

    async fn height(&self) -> eyre::Result<u64>;

    /// Sets the interval at which the node produces blocks when idle and restarts it.
    ///
    /// Unless `force` is set, the interval is only ever lowered.
    async fn set_block_time(&self, interval: &str, force: bool) -> eyre::Result<()>;
}

/// A node reachable over CometBFT RPC whose dymint config lives in the roller home.
pub(crate) struct LocalNode {
    client: reqwest::Client,
    rpc_url: String,
    dymint_config: PathBuf,
    service: String,
    wait_timeout: Duration,
    poll_interval: Duration,
}

impl LocalNode {
    pub(crate) fn new(rpc_url: impl Into<String>, rollapp_home: &Path) -> eyre::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .wrap_err("failed to build the http client")?;
        Ok(Self {
            client,
            rpc_url: rpc_url.into().trim_end_matches('/').to_string(),
            dymint_config: rollapp_home.join("config").join("dymint.toml"),
            service: String::new(),
            wait_timeout: Duration::from_secs(600),
            poll_interval: Duration::from_secs(2),
        })
    }

    pub(crate) fn from_env(env: &Environment, roller_home: &Path) -> eyre::Result<Self> {
        Ok(Self::new(env.rollapp_rpc.clone(), &roller_home.join(ROLLAPP_DIR))?
            .with_service(env.rollapp_service.clone())
            .with_wait(
                Duration::from_millis(env.node_wait_timeout_ms),
                Duration::from_millis(env.node_poll_interval_ms),
            ))
    }

    /// The systemd service restarted after a block time change. Empty disables restarts.
    pub(crate) fn with_service(self, service: String) -> Self {
        Self {
            service,
            ..self
        }
    }

    pub(crate) fn with_wait(self, wait_timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            wait_timeout,
            poll_interval,
            ..self
        }
    }

    async fn health(&self) -> eyre::Result<()> {
        self.client
            .get(format!("{}/health", self.rpc_url))
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .wrap_err("rollapp node is not healthy")?;
        Ok(())
    }

    async fn height_at_least(&self, min: u64) -> eyre::Result<u64> {
        let height = self.height().await?;
        ensure!(height >= min, "rollapp node is at height {height}, waiting for {min}");
        Ok(height)
    }

    /// Retries `attempt` on a fixed interval until it succeeds or the wait times out.
    async fn poll<T, F, Fut>(&self, waiting_for: &str, attempt: F) -> eyre::Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = eyre::Result<T>>,
    {
        let retry_config = tryhard::RetryFutureConfig::new(u32::MAX)
            .fixed_backoff(self.poll_interval)
            .on_retry(
                |attempt, next_delay: Option<Duration>, error: &eyre::Report| {
                    let wait_duration = next_delay
                        .map(humantime::format_duration)
                        .map(tracing::field::display);
                    debug!(
                        attempt,
                        wait_duration,
                        error = %error,
                        "rollapp node not ready yet; retrying after backoff",
                    );
                    std::future::ready(())
                },
            );
        time::timeout(
            self.wait_timeout,
            tryhard::retry_fn(attempt).with_config(retry_config),
        )
        .await
        .map_err(|_| {
            eyre!(
                "timed out after {} waiting for the rollapp node to {waiting_for}; re-run `roller \
                 relayer setup` once the node is running",
                humantime::format_duration(self.wait_timeout)
            )
        })?
    }

    async fn restart(&self) -> eyre::Result<()> {
        if self.service.is_empty() {
            warn!("no rollapp service configured; restart the rollapp node to apply the block time");
            return Ok(());
        }
        let Ok(systemctl) = which::which("systemctl") else {
            warn!(
                service = %self.service,
                "systemctl not found; restart the rollapp node manually to apply the block time"
            );
            return Ok(());
        };
        let mut cmd = Command::new(systemctl);
        cmd.arg("restart").arg(&self.service);
        exec::stdout(cmd)
            .await
            .wrap_err_with(|| format!("failed to restart the `{}` service", self.service))?;
        info!(service = %self.service, "restarted the rollapp node");
        Ok(())
    }
}

#[derive(Deserialize)]
struct BlockResponse {
    result: BlockResult,
}

#[derive(Deserialize)]
struct BlockResult {
    block: Block,
}

#[derive(Deserialize)]
struct Block {
    header: Header,
}

#[derive(Deserialize)]
struct Header {
    height: String,
}

#[async_trait]
impl RollappNode for LocalNode {
    fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    #[instrument(skip_all, fields(rpc = %self.rpc_url), err)]
    async fn wait_until_healthy(&self) -> eyre::Result<()> {
        self.poll("become healthy", || self.health()).await
    }

    #[instrument(skip(self), fields(rpc = %self.rpc_url), err)]
    async fn wait_for_height(&self, min: u64) -> eyre::Result<u64> {
        self.poll("produce blocks", || self.height_at_least(min)).await
    }

    async fn height(&self) -> eyre::Result<u64> {
        let response: BlockResponse = self
            .client
            .get(format!("{}/block", self.rpc_url))
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .wrap_err("failed to query the latest rollapp block")?
            .json()
            .await
            .wrap_err("failed to parse the latest rollapp block")?;
        let height = response.result.block.header.height;
        height
            .parse()
            .wrap_err_with(|| format!("rollapp node reported invalid height `{height}`"))
    }

    #[instrument(skip(self), fields(config = %self.dymint_config.display()), err)]
    async fn set_block_time(&self, interval: &str, force: bool) -> eyre::Result<()> {
        let target = humantime::parse_duration(interval)
            .wrap_err_with(|| format!("`{interval}` is not a valid block time"))?;
        if !force {
            if let Some(current) = current_block_time(&self.dymint_config)? {
                if current <= target {
                    debug!(
                        current = %humantime::format_duration(current),
                        "block time is already at or below the requested interval"
                    );
                    return Ok(());
                }
            }
        }
        reconcile::update_toml(
            &self.dymint_config,
            &TomlPatch::new()
                .set("max_idle_time", interval)
                .set("max_proof_time", interval),
        )?;
        info!(interval, "updated the rollapp block time");
        self.restart().await
    }
}

/// The `max_idle_time` in the dymint config, if the file sets one.
fn current_block_time(dymint_config: &Path) -> eyre::Result<Option<Duration>> {
    let contents = match fs::read_to_string(dymint_config) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err)
                .wrap_err_with(|| format!("failed to read `{}`", dymint_config.display()));
        }
    };
    let config: toml::Table = contents
        .parse()
        .wrap_err_with(|| format!("failed to parse `{}`", dymint_config.display()))?;
    let Some(value) = config.get("max_idle_time").and_then(toml::Value::as_str) else {
        return Ok(None);
    };
    humantime::parse_duration(value)
        .map(Some)
        .wrap_err_with(|| format!("`{value}` in the dymint config is not a duration"))
}

/// The base denom of the RollApp, read from its genesis bank supply.
pub(crate) fn base_denom_from_genesis(genesis: &Path) -> eyre::Result<String> {
    let contents = fs::read(genesis)
        .wrap_err_with(|| format!("failed to read `{}`", genesis.display()))?;
    let genesis: serde_json::Value = serde_json::from_slice(&contents)
        .wrap_err_with(|| format!("failed to parse `{}`", genesis.display()))?;
    genesis
        .pointer("/app_state/bank/supply/0/denom")
        .and_then(serde_json::Value::as_str)
        .filter(|denom| !denom.is_empty())
        .map(str::to_string)
        .ok_or_else(|| eyre!("genesis does not define a bank supply to take the base denom from"))
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::TempDir;
    use wiremock::{
        matchers::{
            method,
            path,
        },
        Mock,
        MockServer,
        ResponseTemplate,
    };

    use super::*;

    fn block(height: u64) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": -1,
            "result": {
                "block_id": {"hash": "ABCD"},
                "block": {"header": {"chain_id": "mars_9000-1", "height": height.to_string()}}
            }
        }))
    }

    fn node(server: &MockServer, home: &Path) -> LocalNode {
        LocalNode::new(server.uri(), home)
            .unwrap()
            .with_wait(Duration::from_millis(500), Duration::from_millis(10))
    }

    #[tokio::test]
    async fn height_is_read_from_the_latest_block() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/block"))
            .respond_with(block(42))
            .mount(&server)
            .await;
        let home = TempDir::new().unwrap();
        assert_eq!(node(&server, home.path()).height().await.unwrap(), 42);
    }

    #[tokio::test]
    async fn waiting_for_height_polls_until_reached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/block"))
            .respond_with(block(0))
            .up_to_n_times(3)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/block"))
            .respond_with(block(2))
            .mount(&server)
            .await;
        let home = TempDir::new().unwrap();
        assert_eq!(
            node(&server, home.path()).wait_for_height(1).await.unwrap(),
            2
        );
    }

    #[tokio::test]
    async fn unhealthy_node_times_out_with_a_rerun_hint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        let home = TempDir::new().unwrap();
        let err = node(&server, home.path())
            .wait_until_healthy()
            .await
            .unwrap_err();
        assert!(
            err.to_string().contains("roller relayer setup"),
            "{err:?}"
        );
    }

    #[tokio::test]
    async fn healthy_node_is_accepted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": {}})))
            .mount(&server)
            .await;
        let home = TempDir::new().unwrap();
        node(&server, home.path())
            .wait_until_healthy()
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn block_time_is_only_lowered_unless_forced() {
        let server = MockServer::start().await;
        let home = TempDir::new().unwrap();
        let config = home.path().join("config").join("dymint.toml");
        fs::create_dir_all(config.parent().unwrap()).unwrap();
        fs::write(&config, "block_time = \"200ms\"\nmax_idle_time = \"1h0m0s\"\n").unwrap();
        let node = node(&server, home.path());

        node.set_block_time(FAST_BLOCK_TIME, false).await.unwrap();
        assert_eq!(
            current_block_time(&config).unwrap(),
            Some(Duration::from_secs(5))
        );

        node.set_block_time(DEFAULT_BLOCK_TIME, false).await.unwrap();
        assert_eq!(
            current_block_time(&config).unwrap(),
            Some(Duration::from_secs(5))
        );

        node.set_block_time(DEFAULT_BLOCK_TIME, true).await.unwrap();
        assert_eq!(
            current_block_time(&config).unwrap(),
            Some(Duration::from_secs(3600))
        );
        let contents = fs::read_to_string(&config).unwrap();
        assert!(contents.contains("block_time = \"200ms\""));
        assert!(contents.contains("max_proof_time = \"1h0m0s\""));
    }

    #[test]
    fn base_denom_comes_from_the_bank_supply() {
        let dir = TempDir::new().unwrap();
        let genesis = dir.path().join("genesis.json");
        fs::write(
            &genesis,
            json!({"app_state": {"bank": {"supply": [{"denom": "amars", "amount": "1"}]}}})
                .to_string(),
        )
        .unwrap();
        assert_eq!(base_denom_from_genesis(&genesis).unwrap(), "amars");

        fs::write(&genesis, json!({"app_state": {"bank": {"supply": []}}}).to_string()).unwrap();
        assert!(base_denom_from_genesis(&genesis).is_err());
    }
}
