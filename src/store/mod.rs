//! Ledger and cursor persistence seams.
//!
//! Every write is keyed by the record's natural unique key and ignores
//! conflicts, so re-processing an overlapping block range is harmless.
//! Summary upserts replace the stored bucket values.

#[cfg(test)]
pub mod memory;

use crate::error::StoreError;
use crate::models::{
    BridgeDailySummary, FxDailySummary, FxSwapRecord, MintCompletion, NativeActivityRecord,
    NativeHourlySummary, PendingMatch, RouteSummary, SourceKind, Transfer, WalletDailySummary,
    YieldActivityRecord, YieldDailySummary,
};
use alloy_primitives::U256;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

/// Last fully indexed block per (chain, source kind).
#[async_trait]
pub trait CursorStore: Send + Sync {
    async fn get_cursor(&self, chain: &str, kind: SourceKind) -> Result<Option<u64>, StoreError>;

    async fn set_cursor(&self, chain: &str, kind: SourceKind, height: u64)
        -> Result<(), StoreError>;
}

#[async_trait]
pub trait Ledger: Send + Sync {
    /// Returns false when `(source_chain, nonce)` already exists.
    async fn insert_transfer(&self, transfer: &Transfer) -> Result<bool, StoreError>;

    /// Pending transfers a mint with these fields could complete, oldest
    /// burn first, at most `limit`.
    async fn find_pending_transfers(
        &self,
        dest_chain: &str,
        dest_address: &str,
        token: &str,
        amount: &U256,
        limit: i64,
    ) -> Result<Vec<PendingMatch>, StoreError>;

    /// Moves a pending transfer to completed. Returns false when the row is
    /// missing or no longer pending.
    async fn complete_transfer(
        &self,
        source_chain: &str,
        nonce: &str,
        completion: &MintCompletion,
    ) -> Result<bool, StoreError>;

    async fn insert_native_activity(&self, record: &NativeActivityRecord)
        -> Result<bool, StoreError>;

    async fn insert_yield_activity(&self, record: &YieldActivityRecord)
        -> Result<bool, StoreError>;

    async fn insert_fx_swap(&self, record: &FxSwapRecord) -> Result<bool, StoreError>;

    /// Transfers whose burn happened on `date` (UTC).
    async fn transfers_on(&self, date: NaiveDate) -> Result<Vec<Transfer>, StoreError>;

    /// Native activity with `start <= block_time < end`.
    async fn native_activity_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<NativeActivityRecord>, StoreError>;

    async fn yield_activity_on(&self, date: NaiveDate)
        -> Result<Vec<YieldActivityRecord>, StoreError>;

    async fn fx_swaps_on(&self, date: NaiveDate) -> Result<Vec<FxSwapRecord>, StoreError>;

    async fn upsert_bridge_daily(&self, rows: &[BridgeDailySummary]) -> Result<(), StoreError>;

    async fn upsert_routes(&self, rows: &[RouteSummary]) -> Result<(), StoreError>;

    async fn upsert_native_hourly(&self, rows: &[NativeHourlySummary]) -> Result<(), StoreError>;

    async fn upsert_wallet_daily(&self, rows: &[WalletDailySummary]) -> Result<(), StoreError>;

    async fn upsert_yield_daily(&self, rows: &[YieldDailySummary]) -> Result<(), StoreError>;

    async fn upsert_fx_daily(&self, row: &FxDailySummary) -> Result<(), StoreError>;
}

/// UTC day as a half-open `[start, end)` interval.
pub fn day_bounds(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = date.and_time(chrono::NaiveTime::MIN).and_utc();
    (start, start + chrono::Duration::days(1))
}
