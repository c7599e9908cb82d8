//! Chain log source capability.
//!
//! Adapters only see the [`ChainProvider`] trait: current head, block
//! timestamps and `eth_getLogs` filtered by emitter and first topic. Retry
//! and connection policy belong to the implementation, not to the callers.

pub mod rpc;

#[cfg(test)]
pub mod mock;

use crate::error::ProviderError;
use alloy_primitives::{Address, Bytes, B256, U64};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use rpc::JsonRpcProvider;

#[async_trait]
pub trait ChainProvider: Send + Sync {
    async fn current_height(&self) -> Result<u64, ProviderError>;

    async fn block_timestamp(&self, height: u64) -> Result<DateTime<Utc>, ProviderError>;

    /// Logs emitted by `address` with first topic `topic0` in `[from, to]`.
    async fn get_logs(
        &self,
        address: Address,
        topic0: B256,
        from: u64,
        to: u64,
    ) -> Result<Vec<RpcLog>, ProviderError>;
}

/// A log entry as returned by `eth_getLogs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    #[serde(default)]
    pub block_number: Option<U64>,
    #[serde(default)]
    pub transaction_hash: Option<B256>,
    #[serde(default)]
    pub log_index: Option<U64>,
    #[serde(default)]
    pub removed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_get_logs_entry() {
        let raw = r#"{
            "address": "0x3600000000000000000000000000000000000000",
            "topics": ["0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"],
            "data": "0x00000000000000000000000000000000000000000000000000000000000f4240",
            "blockNumber": "0x1b4",
            "transactionHash": "0x88df016429689c079f3b2f6ad39fa052532c56795b733da78a91ebe6a713944b",
            "transactionIndex": "0x0",
            "blockHash": "0xdc0818cf78f21a8e70579cb46a43643f78291264dda342ae31049421c82d21ae",
            "logIndex": "0x2",
            "removed": false
        }"#;
        let log: RpcLog = serde_json::from_str(raw).unwrap();
        assert_eq!(log.block_number, Some(U64::from(436)));
        assert_eq!(log.log_index, Some(U64::from(2)));
        assert_eq!(log.topics.len(), 1);
        assert_eq!(log.data.len(), 32);
        assert!(!log.removed);
    }
}
