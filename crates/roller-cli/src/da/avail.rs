//! Avail: the JSON-RPC node API and the light client config.

use std::{
    fs,
    path::Path,
    time::Duration,
};

use async_trait::async_trait;
use color_eyre::eyre::{
    self,
    bail,
    eyre,
    WrapErr as _,
};
use reqwest::Url;
use serde::{
    de::DeserializeOwned,
    Deserialize,
    Deserializer,
};
use serde_json::json;
use tracing::instrument;

use crate::reconcile::write_atomically;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// A block on the DA layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct BlockInfo {
    pub(crate) height: u64,
    pub(crate) hash: String,
}

#[async_trait]
pub(crate) trait DaRpc: Send + Sync {
    async fn latest_block(&self) -> eyre::Result<BlockInfo>;

    async fn block_hash(&self, height: u64) -> eyre::Result<String>;
}

pub(crate) struct AvailClient {
    client: reqwest::Client,
    url: Url,
}

impl AvailClient {
    /// Accepts the websocket endpoint of an Avail node and talks to it over HTTP,
    /// which the node serves on the same address.
    pub(crate) fn new(url: &str) -> eyre::Result<Self> {
        if url.is_empty() {
            bail!("no Avail RPC endpoint configured; set `DA.api_url` in the roller config");
        }
        let url = http_endpoint(url)?;
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .wrap_err("failed to build the http client")?;
        Ok(Self {
            client,
            url,
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> eyre::Result<T> {
        let response: RpcResponse<T> = self
            .client
            .post(self.url.clone())
            .json(&json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": method,
                "params": params,
            }))
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .wrap_err_with(|| format!("`{method}` request to `{}` failed", self.url))?
            .json()
            .await
            .wrap_err_with(|| format!("failed to decode the `{method}` response"))?;
        match (response.result, response.error) {
            (_, Some(error)) => Err(eyre!(
                "`{method}` failed with code {}: {}",
                error.code,
                error.message
            )),
            (Some(result), None) => Ok(result),
            (None, None) => Err(eyre!("`{method}` returned neither a result nor an error")),
        }
    }
}

#[async_trait]
impl DaRpc for AvailClient {
    #[instrument(skip(self), err)]
    async fn latest_block(&self) -> eyre::Result<BlockInfo> {
        let header: Header = self.call("chain_getHeader", json!([])).await?;
        let height = parse_hex_number(&header.number)?;
        let hash = self.block_hash(height).await?;
        Ok(BlockInfo {
            height,
            hash,
        })
    }

    #[instrument(skip(self), err)]
    async fn block_hash(&self, height: u64) -> eyre::Result<String> {
        let hash: Option<String> = self.call("chain_getBlockHash", json!([height])).await?;
        hash.ok_or_else(|| eyre!("no Avail block at height {height}"))
    }
}

fn http_endpoint(url: &str) -> eyre::Result<Url> {
    let mut url: Url = url
        .parse()
        .wrap_err_with(|| format!("`{url}` is not a valid Avail RPC endpoint"))?;
    let scheme = match url.scheme() {
        "http" | "https" => return Ok(url),
        "ws" => "http",
        "wss" => "https",
        other => bail!("unsupported scheme `{other}` in Avail RPC endpoint `{url}`"),
    };
    url.set_scheme(scheme)
        .map_err(|()| eyre!("failed to switch `{url}` to {scheme}"))?;
    Ok(url)
}

#[derive(Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct RpcResponse<T> {
    /// `Some` whenever the field is present, including an explicit `null`.
    #[serde(default, deserialize_with = "present")]
    result: Option<T>,
    error: Option<RpcError>,
}

fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

#[derive(Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct Header {
    number: String,
}

fn parse_hex_number(number: &str) -> eyre::Result<u64> {
    let digits = number.strip_prefix("0x").unwrap_or(number);
    u64::from_str_radix(digits, 16)
        .wrap_err_with(|| format!("`{number}` is not a hex encoded block number"))
}

/// Extracts the DA height from the DA path of a RollApp state update, `<da>|<height>|...`.
pub(crate) fn extract_height_from_da_path(da_path: &str) -> eyre::Result<u64> {
    let Some(height) = da_path.split('|').nth(1) else {
        bail!("DA path `{da_path}` does not have enough parts");
    };
    height
        .parse()
        .wrap_err_with(|| format!("DA path `{da_path}` does not carry a valid height"))
}

/// Points the light client at the block it starts sampling from.
///
/// The file is parsed and re-encoded as a whole. `DASer.SampleFrom` and
/// `Header.TrustedHash` are only set when their tables exist.
pub(crate) fn update_light_client_config(file: &Path, hash: &str, height: u64) -> eyre::Result<()> {
    let contents = fs::read_to_string(file)
        .wrap_err_with(|| format!("failed to read `{}`", file.display()))?;
    let mut config: toml::Table = contents
        .parse()
        .wrap_err_with(|| format!("failed to parse `{}`", file.display()))?;
    let height = i64::try_from(height).wrap_err("DA height does not fit a TOML integer")?;
    if let Some(toml::Value::Table(daser)) = config.get_mut("DASer") {
        daser.insert("SampleFrom".to_string(), toml::Value::Integer(height));
    }
    if let Some(toml::Value::Table(header)) = config.get_mut("Header") {
        header.insert("TrustedHash".to_string(), toml::Value::String(hash.to_string()));
    }
    let encoded =
        toml::to_string_pretty(&config).wrap_err("failed to encode the light client config")?;
    write_atomically(file, encoded.as_bytes())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;
    use wiremock::{
        matchers::{
            body_partial_json,
            method,
        },
        Mock,
        MockServer,
        ResponseTemplate,
    };

    use super::*;

    async fn mock_rpc(server: &MockServer, rpc_method: &str, result: serde_json::Value) {
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": rpc_method})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": result,
            })))
            .mount(server)
            .await;
    }

    #[test]
    fn height_is_the_second_part_of_the_da_path() {
        assert_eq!(extract_height_from_da_path("avail|1234|0|42").unwrap(), 1234);
        assert_eq!(extract_height_from_da_path("avail|7").unwrap(), 7);
    }

    #[test]
    fn da_path_without_height_is_an_error() {
        assert!(extract_height_from_da_path("avail").is_err());
        assert!(extract_height_from_da_path("").is_err());
        assert!(extract_height_from_da_path("avail|tip").is_err());
    }

    #[test]
    fn hex_block_numbers_are_parsed() {
        assert_eq!(parse_hex_number("0x1a2b").unwrap(), 6699);
        assert_eq!(parse_hex_number("ff").unwrap(), 255);
        assert!(parse_hex_number("0xzz").is_err());
    }

    #[test]
    fn config_rewrite_sets_sample_height_and_trusted_hash() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("config.toml");
        fs::write(
            &file,
            "[Core]\nIP = \"127.0.0.1\"\n\n[DASer]\nSampleFrom = 1\nSamplingRange = \
             100\n\n[Header]\nTrustedHash = \"\"\n",
        )
        .unwrap();

        update_light_client_config(&file, "0xabc", 4242).unwrap();

        let config: toml::Table = fs::read_to_string(&file).unwrap().parse().unwrap();
        assert_eq!(config["DASer"]["SampleFrom"].as_integer(), Some(4242));
        assert_eq!(config["DASer"]["SamplingRange"].as_integer(), Some(100));
        assert_eq!(config["Header"]["TrustedHash"].as_str(), Some("0xabc"));
        assert_eq!(config["Core"]["IP"].as_str(), Some("127.0.0.1"));
    }

    #[test]
    fn config_rewrite_does_not_add_missing_tables() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("config.toml");
        fs::write(&file, "[Core]\nIP = \"127.0.0.1\"\n").unwrap();

        update_light_client_config(&file, "0xabc", 1).unwrap();

        let config: toml::Table = fs::read_to_string(&file).unwrap().parse().unwrap();
        assert!(!config.contains_key("DASer"));
        assert!(!config.contains_key("Header"));
    }

    #[test]
    fn missing_config_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(update_light_client_config(&dir.path().join("config.toml"), "0xabc", 1).is_err());
    }

    #[test]
    fn empty_endpoint_is_rejected() {
        assert!(AvailClient::new("").is_err());
    }

    #[tokio::test]
    async fn latest_block_combines_header_and_hash() {
        let server = MockServer::start().await;
        mock_rpc(&server, "chain_getHeader", json!({
            "number": "0x1a2b",
            "parentHash": "0x01",
        }))
        .await;
        mock_rpc(&server, "chain_getBlockHash", json!("0xfeed")).await;

        let client = AvailClient::new(&server.uri()).unwrap();
        assert_eq!(client.latest_block().await.unwrap(), BlockInfo {
            height: 6699,
            hash: "0xfeed".to_string(),
        });
    }

    #[tokio::test]
    async fn unknown_height_has_no_hash() {
        let server = MockServer::start().await;
        mock_rpc(&server, "chain_getBlockHash", serde_json::Value::Null).await;

        let client = AvailClient::new(&server.uri()).unwrap();
        let err = client.block_hash(99_999_999).await.unwrap_err();
        assert!(
            err.to_string().contains("no Avail block at height 99999999"),
            "{err}"
        );
    }

    #[tokio::test]
    async fn response_without_result_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"jsonrpc": "2.0", "id": 1})),
            )
            .mount(&server)
            .await;

        let client = AvailClient::new(&server.uri()).unwrap();
        let err = client.block_hash(1).await.unwrap_err();
        assert!(
            err.to_string().contains("neither a result nor an error"),
            "{err}"
        );
    }

    #[test]
    fn websocket_endpoints_are_reached_over_http() {
        assert_eq!(
            http_endpoint("wss://turing-rpc.avail.so/ws").unwrap().as_str(),
            "https://turing-rpc.avail.so/ws"
        );
        assert_eq!(
            http_endpoint("ws://127.0.0.1:9944").unwrap().as_str(),
            "http://127.0.0.1:9944/"
        );
        assert_eq!(
            http_endpoint("https://turing-rpc.avail.so/rpc").unwrap().as_str(),
            "https://turing-rpc.avail.so/rpc"
        );
        assert!(http_endpoint("ftp://turing-rpc.avail.so").is_err());
        assert!(http_endpoint("turing-rpc.avail.so").is_err());
    }

    #[tokio::test]
    async fn latest_block_is_read_through_a_websocket_endpoint() {
        let server = MockServer::start().await;
        mock_rpc(&server, "chain_getHeader", json!({"number": "0x10"})).await;
        mock_rpc(&server, "chain_getBlockHash", json!("0xbeef")).await;

        let ws_url = server.uri().replacen("http://", "ws://", 1);
        let client = AvailClient::new(&ws_url).unwrap();
        assert_eq!(client.latest_block().await.unwrap(), BlockInfo {
            height: 16,
            hash: "0xbeef".to_string(),
        });
    }

    #[tokio::test]
    async fn rpc_errors_are_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": {"code": -32601, "message": "Method not found"},
            })))
            .mount(&server)
            .await;

        let client = AvailClient::new(&server.uri()).unwrap();
        let err = client.block_hash(1).await.unwrap_err();
        assert!(err.to_string().contains("Method not found"), "{err}");
    }
}
