// In-memory ledger with the same unique keys as the PostgreSQL schema

use super::{day_bounds, CursorStore, Ledger};
use crate::error::StoreError;
use crate::models::{
    BridgeDailySummary, Direction, FxDailySummary, FxSwapRecord, MintCompletion,
    NativeActivityRecord, NativeHourlySummary, PendingMatch, RouteSummary, SourceKind, Transfer,
    TransferStatus, WalletDailySummary, YieldAction, YieldActivityRecord, YieldDailySummary,
};
use alloy_primitives::U256;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeMap;
use std::sync::Mutex;

#[derive(Default)]
pub struct MemoryState {
    pub cursors: BTreeMap<(String, SourceKind), u64>,
    pub transfers: BTreeMap<(String, String), Transfer>,
    pub native: BTreeMap<(String, String), NativeActivityRecord>,
    pub yield_activity: BTreeMap<(String, YieldAction), YieldActivityRecord>,
    pub fx: BTreeMap<String, FxSwapRecord>,
    pub bridge_daily: BTreeMap<(NaiveDate, String, String, Direction), BridgeDailySummary>,
    pub routes: BTreeMap<(NaiveDate, String, String, String), RouteSummary>,
    pub native_hourly: BTreeMap<(DateTime<Utc>, String), NativeHourlySummary>,
    pub wallet_daily: BTreeMap<(NaiveDate, String, String), WalletDailySummary>,
    pub yield_daily: BTreeMap<(NaiveDate, YieldAction), YieldDailySummary>,
    pub fx_daily: BTreeMap<NaiveDate, FxDailySummary>,
}

/// Failure injection for persistence-error paths.
#[derive(Default)]
struct Faults {
    fail_tx_hashes: Vec<String>,
    fail_cursor_writes: bool,
    fail_summaries: bool,
}

#[derive(Default)]
pub struct MemoryLedger {
    state: Mutex<MemoryState>,
    faults: Mutex<Faults>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state<R>(&self, f: impl FnOnce(&MemoryState) -> R) -> R {
        f(&self.state.lock().unwrap())
    }

    pub fn transfer(&self, source_chain: &str, nonce: &str) -> Option<Transfer> {
        self.with_state(|s| {
            s.transfers
                .get(&(source_chain.to_string(), nonce.to_string()))
                .cloned()
        })
    }

    /// Make every insert of a record with this tx hash fail.
    pub fn fail_tx(&self, tx_hash: &str) {
        self.faults.lock().unwrap().fail_tx_hashes.push(tx_hash.to_string());
    }

    pub fn fail_cursor_writes(&self, fail: bool) {
        self.faults.lock().unwrap().fail_cursor_writes = fail;
    }

    pub fn fail_summaries(&self, fail: bool) {
        self.faults.lock().unwrap().fail_summaries = fail;
    }

    fn check_tx(&self, tx_hash: &str) -> Result<(), StoreError> {
        if self
            .faults
            .lock()
            .unwrap()
            .fail_tx_hashes
            .iter()
            .any(|h| h == tx_hash)
        {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }

    fn check_summaries(&self) -> Result<(), StoreError> {
        if self.faults.lock().unwrap().fail_summaries {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

#[async_trait]
impl CursorStore for MemoryLedger {
    async fn get_cursor(&self, chain: &str, kind: SourceKind) -> Result<Option<u64>, StoreError> {
        Ok(self.with_state(|s| s.cursors.get(&(chain.to_string(), kind)).copied()))
    }

    async fn set_cursor(
        &self,
        chain: &str,
        kind: SourceKind,
        height: u64,
    ) -> Result<(), StoreError> {
        if self.faults.lock().unwrap().fail_cursor_writes {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        self.state
            .lock()
            .unwrap()
            .cursors
            .insert((chain.to_string(), kind), height);
        Ok(())
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn insert_transfer(&self, transfer: &Transfer) -> Result<bool, StoreError> {
        self.check_tx(&transfer.source_tx_hash)?;
        let key = (transfer.source_chain.clone(), transfer.nonce.clone());
        let mut state = self.state.lock().unwrap();
        if state.transfers.contains_key(&key) {
            return Ok(false);
        }
        state.transfers.insert(key, transfer.clone());
        Ok(true)
    }

    async fn find_pending_transfers(
        &self,
        dest_chain: &str,
        dest_address: &str,
        token: &str,
        amount: &U256,
        limit: i64,
    ) -> Result<Vec<PendingMatch>, StoreError> {
        let state = self.state.lock().unwrap();
        let mut matches: Vec<&Transfer> = state
            .transfers
            .values()
            .filter(|t| {
                t.status == TransferStatus::Pending
                    && t.dest_chain == dest_chain
                    && t.dest_address == dest_address
                    && t.token == token
                    && t.amount == *amount
            })
            .collect();
        matches.sort_by_key(|t| t.source_timestamp);
        Ok(matches
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|t| PendingMatch {
                source_chain: t.source_chain.clone(),
                nonce: t.nonce.clone(),
                source_timestamp: t.source_timestamp,
            })
            .collect())
    }

    async fn complete_transfer(
        &self,
        source_chain: &str,
        nonce: &str,
        completion: &MintCompletion,
    ) -> Result<bool, StoreError> {
        self.check_tx(&completion.dest_tx_hash)?;
        let mut state = self.state.lock().unwrap();
        let Some(transfer) = state
            .transfers
            .get_mut(&(source_chain.to_string(), nonce.to_string()))
        else {
            return Ok(false);
        };
        if transfer.status != TransferStatus::Pending {
            return Ok(false);
        }
        transfer.status = TransferStatus::Completed;
        transfer.dest_tx_hash = Some(completion.dest_tx_hash.clone());
        transfer.dest_timestamp = Some(completion.dest_timestamp);
        transfer.dest_block = Some(completion.dest_block);
        Ok(true)
    }

    async fn insert_native_activity(
        &self,
        record: &NativeActivityRecord,
    ) -> Result<bool, StoreError> {
        self.check_tx(&record.tx_hash)?;
        let key = (record.tx_hash.clone(), record.token.clone());
        let mut state = self.state.lock().unwrap();
        if state.native.contains_key(&key) {
            return Ok(false);
        }
        state.native.insert(key, record.clone());
        Ok(true)
    }

    async fn insert_yield_activity(
        &self,
        record: &YieldActivityRecord,
    ) -> Result<bool, StoreError> {
        self.check_tx(&record.tx_hash)?;
        let key = (record.tx_hash.clone(), record.action);
        let mut state = self.state.lock().unwrap();
        if state.yield_activity.contains_key(&key) {
            return Ok(false);
        }
        state.yield_activity.insert(key, record.clone());
        Ok(true)
    }

    async fn insert_fx_swap(&self, record: &FxSwapRecord) -> Result<bool, StoreError> {
        self.check_tx(&record.tx_hash)?;
        let mut state = self.state.lock().unwrap();
        if state.fx.contains_key(&record.tx_hash) {
            return Ok(false);
        }
        state.fx.insert(record.tx_hash.clone(), record.clone());
        Ok(true)
    }

    async fn transfers_on(&self, date: NaiveDate) -> Result<Vec<Transfer>, StoreError> {
        Ok(self.with_state(|s| {
            s.transfers
                .values()
                .filter(|t| t.source_timestamp.date_naive() == date)
                .cloned()
                .collect()
        }))
    }

    async fn native_activity_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<NativeActivityRecord>, StoreError> {
        Ok(self.with_state(|s| {
            s.native
                .values()
                .filter(|r| r.block_time >= start && r.block_time < end)
                .cloned()
                .collect()
        }))
    }

    async fn yield_activity_on(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<YieldActivityRecord>, StoreError> {
        let (start, end) = day_bounds(date);
        Ok(self.with_state(|s| {
            s.yield_activity
                .values()
                .filter(|r| r.block_time >= start && r.block_time < end)
                .cloned()
                .collect()
        }))
    }

    async fn fx_swaps_on(&self, date: NaiveDate) -> Result<Vec<FxSwapRecord>, StoreError> {
        let (start, end) = day_bounds(date);
        Ok(self.with_state(|s| {
            s.fx.values()
                .filter(|r| r.block_time >= start && r.block_time < end)
                .cloned()
                .collect()
        }))
    }

    async fn upsert_bridge_daily(&self, rows: &[BridgeDailySummary]) -> Result<(), StoreError> {
        self.check_summaries()?;
        let mut state = self.state.lock().unwrap();
        for row in rows {
            let key = (row.date, row.token.clone(), row.chain.clone(), row.direction);
            state.bridge_daily.insert(key, row.clone());
        }
        Ok(())
    }

    async fn upsert_routes(&self, rows: &[RouteSummary]) -> Result<(), StoreError> {
        self.check_summaries()?;
        let mut state = self.state.lock().unwrap();
        for row in rows {
            let key = (
                row.date,
                row.token.clone(),
                row.source_chain.clone(),
                row.dest_chain.clone(),
            );
            state.routes.insert(key, row.clone());
        }
        Ok(())
    }

    async fn upsert_native_hourly(&self, rows: &[NativeHourlySummary]) -> Result<(), StoreError> {
        self.check_summaries()?;
        let mut state = self.state.lock().unwrap();
        for row in rows {
            state
                .native_hourly
                .insert((row.hour, row.token.clone()), row.clone());
        }
        Ok(())
    }

    async fn upsert_wallet_daily(&self, rows: &[WalletDailySummary]) -> Result<(), StoreError> {
        self.check_summaries()?;
        let mut state = self.state.lock().unwrap();
        for row in rows {
            let key = (row.date, row.token.clone(), row.wallet.clone());
            state.wallet_daily.insert(key, row.clone());
        }
        Ok(())
    }

    async fn upsert_yield_daily(&self, rows: &[YieldDailySummary]) -> Result<(), StoreError> {
        self.check_summaries()?;
        let mut state = self.state.lock().unwrap();
        for row in rows {
            state.yield_daily.insert((row.date, row.action), row.clone());
        }
        Ok(())
    }

    async fn upsert_fx_daily(&self, row: &FxDailySummary) -> Result<(), StoreError> {
        self.check_summaries()?;
        self.state
            .lock()
            .unwrap()
            .fx_daily
            .insert(row.date, row.clone());
        Ok(())
    }
}
