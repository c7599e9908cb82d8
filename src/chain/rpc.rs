// JSON-RPC chain provider over HTTP

use super::{ChainProvider, RpcLog};
use crate::error::ProviderError;
use alloy_primitives::{Address, B256, U64};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client as HttpClient;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct BlockHeader {
    timestamp: U64,
}

pub struct JsonRpcProvider {
    http_client: HttpClient,
    rpc_url: String,
    next_id: AtomicU64,
}

impl JsonRpcProvider {
    pub fn new(rpc_url: String) -> Result<Self, ProviderError> {
        let http_client = HttpClient::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http_client,
            rpc_url,
            next_id: AtomicU64::new(1),
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: Value,
    ) -> Result<Option<T>, ProviderError> {
        let payload = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
        });

        let resp = self
            .http_client
            .post(&self.rpc_url)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;

        let rpc_resp: RpcResponse<T> = resp.json().await?;

        if let Some(error) = rpc_resp.error {
            return Err(ProviderError::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        Ok(rpc_resp.result)
    }
}

#[async_trait]
impl ChainProvider for JsonRpcProvider {
    async fn current_height(&self) -> Result<u64, ProviderError> {
        let height: U64 = self
            .call("eth_blockNumber", json!([]))
            .await?
            .ok_or(ProviderError::EmptyResult("eth_blockNumber"))?;
        Ok(height.to::<u64>())
    }

    async fn block_timestamp(&self, height: u64) -> Result<DateTime<Utc>, ProviderError> {
        let header: BlockHeader = self
            .call("eth_getBlockByNumber", json!([format!("{:#x}", height), false]))
            .await?
            .ok_or(ProviderError::MissingBlock(height))?;

        let secs = header.timestamp.to::<u64>();
        i64::try_from(secs)
            .ok()
            .and_then(|s| Utc.timestamp_opt(s, 0).single())
            .ok_or(ProviderError::InvalidTimestamp(secs))
    }

    async fn get_logs(
        &self,
        address: Address,
        topic0: B256,
        from: u64,
        to: u64,
    ) -> Result<Vec<RpcLog>, ProviderError> {
        let filter = json!({
            "address": address,
            "topics": [topic0],
            "fromBlock": format!("{:#x}", from),
            "toBlock": format!("{:#x}", to),
        });

        let logs: Vec<RpcLog> = self
            .call("eth_getLogs", json!([filter]))
            .await?
            .ok_or(ProviderError::EmptyResult("eth_getLogs"))?;

        debug!(
            "eth_getLogs {} topic {} [{}, {}] -> {} logs",
            address,
            topic0,
            from,
            to,
            logs.len()
        );

        Ok(logs)
    }
}
