//! Summary computation.
//!
//! Each bucket (a UTC day, or an hour for native activity) is recomputed
//! from a single read of its ledger rows and upserted over the stored
//! values. The row builders are pure functions of the ledger rows, so a
//! refresh can be repeated any number of times with the same result.

use crate::adapters::scaled;
use crate::error::StoreError;
use crate::models::{
    BridgeDailySummary, Direction, FxDailySummary, FxSwapRecord, NativeActivityRecord,
    NativeHourlySummary, RouteSummary, Transfer, TransferStatus, WalletDailySummary,
    YieldAction, YieldActivityRecord, YieldDailySummary,
};
use crate::store::{day_bounds, Ledger};
use alloy_primitives::U256;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;

/// Start of the UTC hour containing `ts`.
pub fn hour_of(ts: DateTime<Utc>) -> DateTime<Utc> {
    let secs = ts.timestamp();
    DateTime::from_timestamp(secs - secs.rem_euclid(3600), 0).unwrap_or(ts)
}

pub fn day_of(ts: DateTime<Utc>) -> NaiveDate {
    ts.date_naive()
}

#[derive(Default)]
struct BridgeBucket {
    transfers: i64,
    completed: i64,
    volume: U256,
    wallets: BTreeSet<String>,
}

/// Outbound rows per source chain and inbound rows per destination chain
/// for transfers burned on `date`.
pub fn bridge_daily_rows(date: NaiveDate, transfers: &[Transfer]) -> Vec<BridgeDailySummary> {
    let mut buckets: BTreeMap<(String, String, Direction), BridgeBucket> = BTreeMap::new();

    for t in transfers.iter().filter(|t| day_of(t.source_timestamp) == date) {
        let sides = [
            (&t.source_chain, Direction::Outbound, &t.source_address),
            (&t.dest_chain, Direction::Inbound, &t.dest_address),
        ];
        for (chain, direction, wallet) in sides {
            let bucket = buckets
                .entry((t.token.clone(), chain.clone(), direction))
                .or_default();
            bucket.transfers += 1;
            if t.status == TransferStatus::Completed {
                bucket.completed += 1;
            }
            bucket.volume = bucket.volume.saturating_add(t.amount);
            bucket.wallets.insert(wallet.clone());
        }
    }

    buckets
        .into_iter()
        .map(|((token, chain, direction), b)| BridgeDailySummary {
            date,
            token,
            chain,
            direction,
            transfer_count: b.transfers,
            completed_count: b.completed,
            volume: b.volume,
            unique_wallets: b.wallets.len() as i64,
        })
        .collect()
}

#[derive(Default)]
struct RouteBucket {
    transfers: i64,
    completed: i64,
    volume: U256,
    completion_secs: Vec<i64>,
}

pub fn route_rows(date: NaiveDate, transfers: &[Transfer]) -> Vec<RouteSummary> {
    let mut buckets: BTreeMap<(String, String, String), RouteBucket> = BTreeMap::new();

    for t in transfers.iter().filter(|t| day_of(t.source_timestamp) == date) {
        let bucket = buckets
            .entry((t.token.clone(), t.source_chain.clone(), t.dest_chain.clone()))
            .or_default();
        bucket.transfers += 1;
        bucket.volume = bucket.volume.saturating_add(t.amount);
        if t.status == TransferStatus::Completed {
            bucket.completed += 1;
            if let Some(secs) = t.completion_secs() {
                bucket.completion_secs.push(secs);
            }
        }
    }

    buckets
        .into_iter()
        .map(|((token, source_chain, dest_chain), b)| {
            let avg_completion_secs = (!b.completion_secs.is_empty()).then(|| {
                b.completion_secs.iter().sum::<i64>() as f64 / b.completion_secs.len() as f64
            });
            RouteSummary {
                date,
                token,
                source_chain,
                dest_chain,
                transfer_count: b.transfers,
                completed_count: b.completed,
                volume: b.volume,
                avg_completion_secs,
            }
        })
        .collect()
}

#[derive(Default)]
struct HourBucket {
    transfers: i64,
    volume: U256,
    senders: BTreeSet<String>,
    receivers: BTreeSet<String>,
}

pub fn native_hourly_rows(
    hour: DateTime<Utc>,
    records: &[NativeActivityRecord],
) -> Vec<NativeHourlySummary> {
    let mut buckets: BTreeMap<String, HourBucket> = BTreeMap::new();

    for r in records.iter().filter(|r| hour_of(r.block_time) == hour) {
        let bucket = buckets.entry(r.token.clone()).or_default();
        bucket.transfers += 1;
        bucket.volume = bucket.volume.saturating_add(r.amount);
        bucket.senders.insert(r.from_address.clone());
        bucket.receivers.insert(r.to_address.clone());
    }

    buckets
        .into_iter()
        .map(|(token, b)| NativeHourlySummary {
            hour,
            token,
            transfer_count: b.transfers,
            volume: b.volume,
            unique_senders: b.senders.len() as i64,
            unique_receivers: b.receivers.len() as i64,
        })
        .collect()
}

fn wallet_entry<'a>(
    rows: &'a mut BTreeMap<(String, String), WalletDailySummary>,
    date: NaiveDate,
    token: &str,
    wallet: &str,
) -> &'a mut WalletDailySummary {
    rows.entry((token.to_string(), wallet.to_string()))
        .or_insert_with(|| WalletDailySummary {
            date,
            token: token.to_string(),
            wallet: wallet.to_string(),
            sent_count: 0,
            sent_volume: U256::ZERO,
            received_count: 0,
            received_volume: U256::ZERO,
        })
}

pub fn wallet_rows(date: NaiveDate, records: &[NativeActivityRecord]) -> Vec<WalletDailySummary> {
    let mut rows = BTreeMap::new();

    for r in records.iter().filter(|r| day_of(r.block_time) == date) {
        let sender = wallet_entry(&mut rows, date, &r.token, &r.from_address);
        sender.sent_count += 1;
        sender.sent_volume = sender.sent_volume.saturating_add(r.amount);

        let receiver = wallet_entry(&mut rows, date, &r.token, &r.to_address);
        receiver.received_count += 1;
        receiver.received_volume = receiver.received_volume.saturating_add(r.amount);
    }

    rows.into_values().collect()
}

#[derive(Default)]
struct YieldBucket {
    events: i64,
    underlying: U256,
    shares: U256,
    actors: BTreeSet<String>,
}

pub fn yield_daily_rows(date: NaiveDate, records: &[YieldActivityRecord]) -> Vec<YieldDailySummary> {
    let mut buckets: BTreeMap<YieldAction, YieldBucket> = BTreeMap::new();

    for r in records.iter().filter(|r| day_of(r.block_time) == date) {
        let bucket = buckets.entry(r.action).or_default();
        bucket.events += 1;
        if let Some(underlying) = r.underlying_amount {
            bucket.underlying = bucket.underlying.saturating_add(underlying);
        }
        bucket.shares = bucket.shares.saturating_add(r.share_amount);
        bucket.actors.insert(r.actor.clone());
    }

    buckets
        .into_iter()
        .map(|(action, b)| YieldDailySummary {
            date,
            action,
            event_count: b.events,
            underlying_volume: b.underlying,
            share_volume: b.shares,
            unique_actors: b.actors.len() as i64,
        })
        .collect()
}

/// Daily FX row, or `None` when no swap settled on `date`. The VWAP weights
/// each priced swap's rate by its base amount.
pub fn fx_daily_row(date: NaiveDate, swaps: &[FxSwapRecord]) -> Option<FxDailySummary> {
    let swaps: Vec<&FxSwapRecord> = swaps
        .iter()
        .filter(|s| day_of(s.block_time) == date)
        .collect();
    if swaps.is_empty() {
        return None;
    }

    let mut base_volume = U256::ZERO;
    let mut quote_volume = U256::ZERO;
    let mut traders = BTreeSet::new();
    let mut weighted = 0.0_f64;
    let mut weight = 0.0_f64;
    let mut min_rate: Option<f64> = None;
    let mut max_rate: Option<f64> = None;

    for s in &swaps {
        base_volume = base_volume.saturating_add(s.base_amount);
        quote_volume = quote_volume.saturating_add(s.quote_amount);
        traders.insert(s.maker.as_str());
        traders.insert(s.taker.as_str());

        if let Some(rate) = s.rate {
            let base = scaled(&s.base_amount, 0);
            weighted += rate * base;
            weight += base;
            min_rate = Some(min_rate.map_or(rate, |m| m.min(rate)));
            max_rate = Some(max_rate.map_or(rate, |m| m.max(rate)));
        }
    }

    Some(FxDailySummary {
        date,
        swap_count: swaps.len() as i64,
        base_volume,
        quote_volume,
        vwap_rate: (weight > 0.0).then(|| weighted / weight),
        min_rate,
        max_rate,
        unique_traders: traders.len() as i64,
    })
}

/// Aggregation Refresher: recomputes affected buckets from the ledger.
#[derive(Clone)]
pub struct Aggregator {
    ledger: Arc<dyn Ledger>,
}

impl Aggregator {
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self { ledger }
    }

    pub async fn refresh_bridge_dates(&self, dates: &BTreeSet<NaiveDate>) -> Result<(), StoreError> {
        for &date in dates {
            let transfers = self.ledger.transfers_on(date).await?;
            let daily = bridge_daily_rows(date, &transfers);
            let routes = route_rows(date, &transfers);
            self.ledger.upsert_bridge_daily(&daily).await?;
            self.ledger.upsert_routes(&routes).await?;
            debug!(
                "Refreshed bridge summaries for {}: {} daily, {} route rows",
                date,
                daily.len(),
                routes.len()
            );
        }
        Ok(())
    }

    /// Refreshes the hourly buckets and the wallet rows of the days they
    /// fall on.
    pub async fn refresh_native_hours(
        &self,
        hours: &BTreeSet<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        for &hour in hours {
            let records = self
                .ledger
                .native_activity_between(hour, hour + Duration::hours(1))
                .await?;
            let rows = native_hourly_rows(hour, &records);
            self.ledger.upsert_native_hourly(&rows).await?;
        }

        let dates: BTreeSet<NaiveDate> = hours.iter().map(|h| day_of(*h)).collect();
        for date in dates {
            let (start, end) = day_bounds(date);
            let records = self.ledger.native_activity_between(start, end).await?;
            let rows = wallet_rows(date, &records);
            self.ledger.upsert_wallet_daily(&rows).await?;
            debug!("Refreshed {} wallet rows for {}", rows.len(), date);
        }
        Ok(())
    }

    pub async fn refresh_yield_dates(&self, dates: &BTreeSet<NaiveDate>) -> Result<(), StoreError> {
        for &date in dates {
            let records = self.ledger.yield_activity_on(date).await?;
            let rows = yield_daily_rows(date, &records);
            self.ledger.upsert_yield_daily(&rows).await?;
        }
        Ok(())
    }

    pub async fn refresh_fx_dates(&self, dates: &BTreeSet<NaiveDate>) -> Result<(), StoreError> {
        for &date in dates {
            let swaps = self.ledger.fx_swaps_on(date).await?;
            if let Some(row) = fx_daily_row(date, &swaps) {
                self.ledger.upsert_fx_daily(&row).await?;
            }
        }
        Ok(())
    }
}
