//! EVM JSON-RPC client.
//!
//! Thin wrapper over the handful of `eth_*` methods the keeper needs.
//! Quantities travel as `0x`-prefixed hex strings.

use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, instrument};

use super::abi::Address;

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// Receipt fields the keeper cares about.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcReceipt {
    pub transaction_hash: String,
    pub block_number: Option<String>,
    pub status: Option<String>,
}

/// JSON-RPC client bound to one network endpoint.
#[derive(Debug)]
pub struct RpcClient {
    http: Client,
    url: String,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            url: url.to_string(),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Issue a request that must return a non-null result.
    pub async fn request<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        self.request_optional(method, params)
            .await?
            .ok_or_else(|| anyhow!("{} returned null result", method))
    }

    /// Issue a request whose result may legitimately be null.
    pub async fn request_optional<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<Option<T>> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        let response = self
            .http
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .with_context(|| format!("Failed to send {} request", method))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("RPC HTTP error {} on {}: {}", status, method, body);
        }

        let body: RpcResponse<T> = response
            .json()
            .await
            .with_context(|| format!("Failed to parse {} response", method))?;

        if let Some(err) = body.error {
            anyhow::bail!("RPC error {} on {}: {}", err.code, method, err.message);
        }

        Ok(body.result)
    }

    /// Read-only contract call at the latest block.
    #[instrument(skip(self, data))]
    pub async fn eth_call(&self, to: &Address, data: &[u8]) -> Result<Vec<u8>> {
        let result: String = self
            .request(
                "eth_call",
                json!([{ "to": to.to_string(), "data": to_hex(data) }, "latest"]),
            )
            .await?;
        debug!(bytes = result.len().saturating_sub(2) / 2, "eth_call returned");
        from_hex(&result)
    }

    pub async fn chain_id(&self) -> Result<u64> {
        let result: String = self.request("eth_chainId", json!([])).await?;
        parse_quantity_u64(&result, "chain id")
    }

    pub async fn pending_nonce(&self, address: &Address) -> Result<u64> {
        let result: String = self
            .request("eth_getTransactionCount", json!([address.to_string(), "pending"]))
            .await?;
        parse_quantity_u64(&result, "nonce")
    }

    pub async fn gas_price(&self) -> Result<u128> {
        let result: String = self.request("eth_gasPrice", json!([])).await?;
        parse_quantity(&result)
    }

    pub async fn estimate_gas(&self, from: &Address, to: &Address, data: &[u8]) -> Result<u64> {
        let result: String = self
            .request(
                "eth_estimateGas",
                json!([{ "from": from.to_string(), "to": to.to_string(), "data": to_hex(data) }]),
            )
            .await?;
        parse_quantity_u64(&result, "gas estimate")
    }

    /// Broadcast a signed transaction, returning its hash.
    pub async fn send_raw_transaction(&self, raw: &[u8]) -> Result<String> {
        self.request("eth_sendRawTransaction", json!([to_hex(raw)])).await
    }

    /// `None` while the transaction is still pending.
    pub async fn transaction_receipt(&self, tx_hash: &str) -> Result<Option<RpcReceipt>> {
        self.request_optional("eth_getTransactionReceipt", json!([tx_hash]))
            .await
    }

    pub async fn balance(&self, address: &Address) -> Result<u128> {
        let result: String = self
            .request("eth_getBalance", json!([address.to_string(), "latest"]))
            .await?;
        parse_quantity(&result)
    }
}

pub fn to_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

pub fn from_hex(s: &str) -> Result<Vec<u8>> {
    let trimmed = s.strip_prefix("0x").unwrap_or(s);
    hex::decode(trimmed).with_context(|| format!("invalid hex data: {}", s))
}

/// Parse a hex quantity such as `0x1a`.
pub fn parse_quantity(s: &str) -> Result<u128> {
    let trimmed = s.strip_prefix("0x").unwrap_or(s);
    if trimmed.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(trimmed, 16).with_context(|| format!("invalid hex quantity: {}", s))
}

/// Parse a hex quantity that must fit in 64 bits.
pub fn parse_quantity_u64(s: &str, what: &str) -> Result<u64> {
    let value = parse_quantity(s)?;
    u64::try_from(value).with_context(|| format!("{} {} does not fit in u64", what, s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn addr() -> Address {
        Address([0x11; 20])
    }

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("0x0").unwrap(), 0);
        assert_eq!(parse_quantity("0x1a4").unwrap(), 420);
        assert_eq!(parse_quantity("0x").unwrap(), 0);
        assert!(parse_quantity("0xzz").is_err());
    }

    #[test]
    fn test_parse_quantity_u64_rejects_overflow() {
        assert_eq!(parse_quantity_u64("0xa4b1", "chain id").unwrap(), 42161);
        assert_eq!(parse_quantity_u64("0xffffffffffffffff", "nonce").unwrap(), u64::MAX);

        let err = parse_quantity_u64("0x10000000000000000", "block number").unwrap_err();
        assert!(err.to_string().contains("block number"));
    }

    #[tokio::test]
    async fn test_eth_call_decodes_result() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "eth_call"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 1,
                "result": "0x0000000000000000000000000000000000000000000000000000000000000001"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = RpcClient::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let data = client.eth_call(&addr(), &[0xc1, 0x9d, 0x93, 0xfb]).await.unwrap();
        assert_eq!(data.len(), 32);
        assert_eq!(data[31], 1);
    }

    #[tokio::test]
    async fn test_rpc_error_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 1,
                "error": {"code": -32000, "message": "execution reverted"}
            })))
            .mount(&server)
            .await;

        let client = RpcClient::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let err = client.eth_call(&addr(), &[]).await.unwrap_err();
        assert!(err.to_string().contains("execution reverted"));
    }

    #[tokio::test]
    async fn test_pending_receipt_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "eth_getTransactionReceipt"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 1, "result": null
            })))
            .mount(&server)
            .await;

        let client = RpcClient::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let receipt = client.transaction_receipt("0xabc").await.unwrap();
        assert!(receipt.is_none());
    }
}
