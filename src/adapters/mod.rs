//! Source adapters.
//!
//! One adapter runs per configured (chain, source kind). Each turns a block
//! range into typed [`DomainEvent`]s: it issues `eth_getLogs` per event
//! signature and emitter, decodes every log against the expected schema and
//! stamps it with its block time. A log that fails to decode or references
//! an unknown token is dropped with a warning; only provider failures abort
//! the range.

pub mod cctp;
pub mod fx;
pub mod native;
pub mod yield_token;

use crate::chain::{ChainProvider, RpcLog};
use crate::config::{ChainConfig, IndexerConfig};
use crate::error::{DecodeError, ProviderError};
use crate::models::{DomainEvent, LogMeta, SourceKind};
use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

pub use cctp::BridgeAdapter;
pub use fx::FxAdapter;
pub use native::NativeAdapter;
pub use yield_token::YieldAdapter;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Inclusive block range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRange {
    pub from: u64,
    pub to: u64,
}

/// Next range to index after `last_indexed`, at most `batch_size` blocks,
/// or `None` when already caught up with `current`.
pub fn plan_range(last_indexed: u64, current: u64, batch_size: u64) -> Option<BlockRange> {
    plan_range_from(last_indexed.checked_add(1)?, current, batch_size)
}

/// Range starting at `from` inclusive; used when there is no cursor yet.
pub fn plan_range_from(from: u64, current: u64, batch_size: u64) -> Option<BlockRange> {
    if from > current {
        return None;
    }
    let to = from
        .saturating_add(batch_size.max(1) - 1)
        .min(current);
    Some(BlockRange { from, to })
}

/// Height roughly `lookback_days` behind `current`, floored at 0.
pub fn estimate_start_height(current: u64, lookback_days: u64, block_time_secs: f64) -> u64 {
    let blocks_per_day = (SECONDS_PER_DAY / block_time_secs).floor() as u64;
    current.saturating_sub(blocks_per_day.saturating_mul(lookback_days))
}

/// State shared by every adapter kind.
pub struct AdapterBase {
    pub chain: ChainConfig,
    pub provider: Arc<dyn ChainProvider>,
    pub batch_size: u64,
}

impl AdapterBase {
    pub fn new(chain: ChainConfig, provider: Arc<dyn ChainProvider>, batch_size: u64) -> Self {
        Self {
            chain,
            provider,
            batch_size,
        }
    }
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn base(&self) -> &AdapterBase;

    fn kind(&self) -> SourceKind;

    /// Decode every relevant log in `[from, to]`, ordered by chain position.
    async fn fetch_range(&self, from: u64, to: u64) -> Result<Vec<DomainEvent>, ProviderError>;

    fn chain(&self) -> &str {
        &self.base().chain.name
    }

    async fn current_height(&self) -> Result<u64, ProviderError> {
        self.base().provider.current_height().await
    }

    async fn block_timestamp(&self, height: u64) -> Result<DateTime<Utc>, ProviderError> {
        self.base().provider.block_timestamp(height).await
    }

    fn plan_range(&self, last_indexed: u64, current: u64) -> Option<BlockRange> {
        plan_range(last_indexed, current, self.base().batch_size)
    }

    fn plan_first_range(&self, start: u64, current: u64) -> Option<BlockRange> {
        plan_range_from(start, current, self.base().batch_size)
    }

    fn estimate_start_height(&self, current: u64, lookback_days: u64) -> u64 {
        estimate_start_height(current, lookback_days, self.base().chain.block_time())
    }
}

/// Build one adapter per configured (chain, kind).
pub fn build_adapters(
    config: &IndexerConfig,
    providers: &HashMap<String, Arc<dyn ChainProvider>>,
) -> Vec<Arc<dyn SourceAdapter>> {
    let mut adapters: Vec<Arc<dyn SourceAdapter>> = Vec::new();
    for chain in &config.chains {
        let Some(provider) = providers.get(&chain.name) else {
            continue;
        };
        for kind in chain.sources() {
            let base = AdapterBase::new(chain.clone(), provider.clone(), config.batch_size);
            let adapter: Arc<dyn SourceAdapter> = match kind {
                SourceKind::Cctp => Arc::new(BridgeAdapter::new(base)),
                SourceKind::Native => Arc::new(NativeAdapter::new(base)),
                SourceKind::Yield => Arc::new(YieldAdapter::new(base)),
                SourceKind::Fx => Arc::new(FxAdapter::new(base)),
            };
            adapters.push(adapter);
        }
    }
    adapters
}

/// Memoizes block timestamps for the duration of one range fetch.
pub struct BlockClock<'a> {
    provider: &'a dyn ChainProvider,
    cache: HashMap<u64, DateTime<Utc>>,
}

impl<'a> BlockClock<'a> {
    pub fn new(provider: &'a dyn ChainProvider) -> Self {
        Self {
            provider,
            cache: HashMap::new(),
        }
    }

    pub async fn time_of(&mut self, height: u64) -> Result<DateTime<Utc>, ProviderError> {
        if let Some(ts) = self.cache.get(&height) {
            return Ok(*ts);
        }
        let ts = self.provider.block_timestamp(height).await?;
        self.cache.insert(height, ts);
        Ok(ts)
    }
}

/// Position of a log in the chain.
#[derive(Debug, Clone, Copy)]
pub struct LogPosition {
    pub tx_hash: B256,
    pub log_index: u64,
    pub block_number: u64,
}

impl LogPosition {
    pub fn of(log: &RpcLog) -> Result<Self, DecodeError> {
        Ok(Self {
            tx_hash: log
                .transaction_hash
                .ok_or(DecodeError::MissingField("transactionHash"))?,
            log_index: log
                .log_index
                .ok_or(DecodeError::MissingField("logIndex"))?
                .to::<u64>(),
            block_number: log
                .block_number
                .ok_or(DecodeError::MissingField("blockNumber"))?
                .to::<u64>(),
        })
    }

    pub fn meta(&self, block_time: DateTime<Utc>) -> LogMeta {
        LogMeta {
            tx_hash: hex_b256(&self.tx_hash),
            log_index: self.log_index,
            block_number: self.block_number,
            block_time,
        }
    }
}

pub fn hex_address(address: &Address) -> String {
    format!("0x{}", hex::encode(address.as_slice()))
}

pub fn hex_b256(word: &B256) -> String {
    format!("0x{}", hex::encode(word.as_slice()))
}

/// EVM address held in the low 20 bytes of a 32-byte word.
pub fn address_from_word(word: &B256) -> Address {
    Address::from_slice(&word.as_slice()[12..])
}

/// Token amount in whole units, for rate math only.
pub fn scaled(amount: &U256, decimals: u8) -> f64 {
    let raw = amount
        .as_limbs()
        .iter()
        .rev()
        .fold(0.0_f64, |acc, limb| acc * 18_446_744_073_709_551_616.0 + *limb as f64);
    raw / 10f64.powi(decimals as i32)
}

/// Sort into chain order so a range is persisted as it happened.
pub fn sort_by_position(events: &mut [DomainEvent]) {
    events.sort_by_key(|e| (e.meta().block_number, e.meta().log_index));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::MockProvider;

    #[test]
    fn test_plan_range_caps_to_batch() {
        assert_eq!(
            plan_range(100, 250, 50),
            Some(BlockRange { from: 101, to: 150 })
        );
    }

    #[test]
    fn test_plan_range_caught_up() {
        assert_eq!(plan_range(250, 250, 50), None);
        assert_eq!(plan_range(300, 250, 50), None);
    }

    #[test]
    fn test_plan_range_clamps_to_head() {
        assert_eq!(
            plan_range(240, 250, 50),
            Some(BlockRange { from: 241, to: 250 })
        );
        assert_eq!(
            plan_range(249, 250, 1),
            Some(BlockRange { from: 250, to: 250 })
        );
    }

    #[test]
    fn test_plan_range_from_genesis() {
        assert_eq!(
            plan_range_from(0, 250, 50),
            Some(BlockRange { from: 0, to: 49 })
        );
        assert_eq!(plan_range_from(251, 250, 50), None);
    }

    #[test]
    fn test_estimate_start_height() {
        assert_eq!(estimate_start_height(200_000, 1, 0.5), 27_200);
        assert_eq!(estimate_start_height(200_000, 7, 12.0), 200_000 - 7 * 7_200);
    }

    #[test]
    fn test_estimate_start_height_floors_at_zero() {
        assert_eq!(estimate_start_height(1_000, 30, 2.0), 0);
    }

    #[test]
    fn test_address_from_word() {
        let mut word = [0u8; 32];
        word[12..].copy_from_slice(&[0xab; 20]);
        let address = address_from_word(&B256::from(word));
        assert_eq!(address, Address::repeat_byte(0xab));
        assert_eq!(
            hex_address(&address),
            "0xabababababababababababababababababababab"
        );
    }

    #[test]
    fn test_scaled() {
        assert_eq!(scaled(&U256::from(1_500_000u64), 6), 1.5);
        let big = U256::from(1u64) << 70;
        assert_eq!(scaled(&big, 0), 2f64.powi(70));
    }

    #[tokio::test]
    async fn test_block_clock_memoizes() {
        let provider = MockProvider::new(100);
        let mut clock = BlockClock::new(&provider);
        let first = clock.time_of(10).await.unwrap();
        let again = clock.time_of(10).await.unwrap();
        clock.time_of(11).await.unwrap();
        assert_eq!(first, again);
        assert_eq!(provider.timestamp_calls(), 2);
    }
}
