// In-memory chain provider for tests

use super::{ChainProvider, RpcLog};
use crate::error::ProviderError;
use alloy_primitives::{Address, LogData, B256, U64};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Blocks are `block_secs` apart starting at 2025-03-01T00:00:00Z.
pub struct MockProvider {
    head: Mutex<u64>,
    logs: Mutex<Vec<RpcLog>>,
    block_secs: i64,
    fail: AtomicBool,
    timestamp_calls: AtomicUsize,
}

impl MockProvider {
    pub fn new(head: u64) -> Self {
        Self {
            head: Mutex::new(head),
            logs: Mutex::new(Vec::new()),
            block_secs: 2,
            fail: AtomicBool::new(false),
            timestamp_calls: AtomicUsize::new(0),
        }
    }

    pub fn genesis() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap()
    }

    pub fn time_of(&self, height: u64) -> DateTime<Utc> {
        Self::genesis() + Duration::seconds(height as i64 * self.block_secs)
    }

    pub fn set_head(&self, head: u64) {
        *self.head.lock().unwrap() = head;
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn timestamp_calls(&self) -> usize {
        self.timestamp_calls.load(Ordering::SeqCst)
    }

    pub fn push_log(&self, log: RpcLog) {
        self.logs.lock().unwrap().push(log);
    }

    /// Record an encoded event as emitted by `address`.
    pub fn emit(&self, address: Address, data: LogData, block: u64, tx: u8, log_index: u64) {
        self.push_log(RpcLog {
            address,
            topics: data.topics().to_vec(),
            data: data.data,
            block_number: Some(U64::from(block)),
            transaction_hash: Some(B256::repeat_byte(tx)),
            log_index: Some(U64::from(log_index)),
            removed: false,
        });
    }

    fn check(&self) -> Result<(), ProviderError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ProviderError::Rpc {
                code: -32000,
                message: "upstream unavailable".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ChainProvider for MockProvider {
    async fn current_height(&self) -> Result<u64, ProviderError> {
        self.check()?;
        Ok(*self.head.lock().unwrap())
    }

    async fn block_timestamp(&self, height: u64) -> Result<DateTime<Utc>, ProviderError> {
        self.check()?;
        self.timestamp_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.time_of(height))
    }

    async fn get_logs(
        &self,
        address: Address,
        topic0: B256,
        from: u64,
        to: u64,
    ) -> Result<Vec<RpcLog>, ProviderError> {
        self.check()?;
        let logs = self.logs.lock().unwrap();
        Ok(logs
            .iter()
            .filter(|log| log.address == address)
            .filter(|log| log.topics.first() == Some(&topic0))
            .filter(|log| {
                log.block_number
                    .map(|n| (from..=to).contains(&n.to::<u64>()))
                    .unwrap_or(false)
            })
            .cloned()
            .collect())
    }
}
