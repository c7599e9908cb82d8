// Database layer: PostgreSQL ledger and cursor store

use crate::error::StoreError;
use crate::models::{
    BridgeDailySummary, FxDailySummary, FxSwapRecord, MintCompletion, NativeActivityRecord,
    NativeHourlySummary, PendingMatch, RouteSummary, SourceKind, Transfer, WalletDailySummary,
    YieldActivityRecord, YieldDailySummary,
};
use crate::store::{day_bounds, CursorStore, Ledger};
use alloy_primitives::U256;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{Pool, Postgres, Row};
use std::str::FromStr;
use tracing::info;

pub type DbPool = Pool<Postgres>;

pub struct Database;

impl Database {
    /// Initialize database connection pool
    pub async fn init(database_url: &str) -> Result<DbPool> {
        info!("Connecting to database");

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        // Run migrations
        info!("Running database migrations...");
        sqlx::migrate!("./migrations").run(&pool).await?;

        info!("Database initialized successfully");
        Ok(pool)
    }

    pub async fn ping(pool: &DbPool) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(pool).await?;
        Ok(())
    }
}

/// Ledger backed by the tables in `migrations/`. NUMERIC columns travel as
/// text so `U256` values keep full precision.
#[derive(Clone)]
pub struct PgLedger {
    pool: DbPool,
}

impl PgLedger {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn parse_column<T: FromStr>(column: &'static str, value: String) -> Result<T, StoreError> {
    value
        .parse::<T>()
        .map_err(|_| StoreError::Corrupt { column, value })
}

fn amount(row: &PgRow, column: &'static str) -> Result<U256, StoreError> {
    parse_column(column, row.try_get::<String, _>(column)?)
}

fn opt_amount(row: &PgRow, column: &'static str) -> Result<Option<U256>, StoreError> {
    row.try_get::<Option<String>, _>(column)?
        .map(|v| parse_column(column, v))
        .transpose()
}

fn height(row: &PgRow, column: &'static str) -> Result<u64, StoreError> {
    let value: i64 = row.try_get(column)?;
    u64::try_from(value).map_err(|_| StoreError::Corrupt {
        column,
        value: value.to_string(),
    })
}

fn domain(row: &PgRow, column: &'static str) -> Result<u32, StoreError> {
    let value: i64 = row.try_get(column)?;
    u32::try_from(value).map_err(|_| StoreError::Corrupt {
        column,
        value: value.to_string(),
    })
}

fn transfer_from_row(row: &PgRow) -> Result<Transfer, StoreError> {
    let dest_block: Option<i64> = row.try_get("dest_block")?;
    Ok(Transfer {
        source_chain: row.try_get("source_chain")?,
        nonce: row.try_get("nonce")?,
        token: row.try_get("token")?,
        amount: amount(row, "amount")?,
        source_tx_hash: row.try_get("source_tx_hash")?,
        source_address: row.try_get("source_address")?,
        source_timestamp: row.try_get("source_timestamp")?,
        source_block: height(row, "source_block")?,
        dest_chain: row.try_get("dest_chain")?,
        dest_address: row.try_get("dest_address")?,
        dest_tx_hash: row.try_get("dest_tx_hash")?,
        dest_timestamp: row.try_get("dest_timestamp")?,
        dest_block: dest_block.map(|b| b as u64),
        source_domain: domain(row, "source_domain")?,
        dest_domain: domain(row, "dest_domain")?,
        max_fee: opt_amount(row, "max_fee")?,
        protocol_version: parse_column("protocol_version", row.try_get("protocol_version")?)?,
        status: parse_column("status", row.try_get("status")?)?,
    })
}

#[async_trait]
impl CursorStore for PgLedger {
    async fn get_cursor(&self, chain: &str, kind: SourceKind) -> Result<Option<u64>, StoreError> {
        let row = sqlx::query(
            "SELECT last_indexed_block FROM indexer_cursor
             WHERE source_chain = $1 AND source_kind = $2",
        )
        .bind(chain)
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| height(&r, "last_indexed_block")).transpose()
    }

    async fn set_cursor(
        &self,
        chain: &str,
        kind: SourceKind,
        height: u64,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO indexer_cursor (source_chain, source_kind, last_indexed_block, updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (source_chain, source_kind) DO UPDATE
            SET last_indexed_block = EXCLUDED.last_indexed_block, updated_at = NOW()
            "#,
        )
        .bind(chain)
        .bind(kind.as_str())
        .bind(height as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl Ledger for PgLedger {
    async fn insert_transfer(&self, t: &Transfer) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO transfer (
                kind, source_chain, nonce, token, amount,
                source_tx_hash, source_address, source_timestamp, source_block,
                dest_chain, dest_address, dest_tx_hash, dest_timestamp, dest_block,
                source_domain, dest_domain, max_fee, protocol_version, status
            ) VALUES (
                'bridge', $1, $2, $3, $4::NUMERIC,
                $5, $6, $7, $8,
                $9, $10, $11, $12, $13,
                $14, $15, $16::NUMERIC, $17, $18
            )
            ON CONFLICT (source_chain, nonce) DO NOTHING
            "#,
        )
        .bind(&t.source_chain)
        .bind(&t.nonce)
        .bind(&t.token)
        .bind(t.amount.to_string())
        .bind(&t.source_tx_hash)
        .bind(&t.source_address)
        .bind(t.source_timestamp)
        .bind(t.source_block as i64)
        .bind(&t.dest_chain)
        .bind(&t.dest_address)
        .bind(&t.dest_tx_hash)
        .bind(t.dest_timestamp)
        .bind(t.dest_block.map(|b| b as i64))
        .bind(t.source_domain as i64)
        .bind(t.dest_domain as i64)
        .bind(t.max_fee.map(|f| f.to_string()))
        .bind(t.protocol_version.as_str())
        .bind(t.status.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_pending_transfers(
        &self,
        dest_chain: &str,
        dest_address: &str,
        token: &str,
        amount: &U256,
        limit: i64,
    ) -> Result<Vec<PendingMatch>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT source_chain, nonce, source_timestamp
            FROM transfer
            WHERE dest_chain = $1
              AND dest_address = $2
              AND token = $3
              AND amount = $4::NUMERIC
              AND status = 'pending'
            ORDER BY source_timestamp ASC
            LIMIT $5
            "#,
        )
        .bind(dest_chain)
        .bind(dest_address)
        .bind(token)
        .bind(amount.to_string())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<PendingMatch, StoreError> {
                Ok(PendingMatch {
                    source_chain: row.try_get("source_chain")?,
                    nonce: row.try_get("nonce")?,
                    source_timestamp: row.try_get("source_timestamp")?,
                })
            })
            .collect()
    }

    async fn complete_transfer(
        &self,
        source_chain: &str,
        nonce: &str,
        completion: &MintCompletion,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE transfer
            SET status = 'completed',
                dest_tx_hash = $3,
                dest_timestamp = $4,
                dest_block = $5
            WHERE source_chain = $1 AND nonce = $2 AND status = 'pending'
            "#,
        )
        .bind(source_chain)
        .bind(nonce)
        .bind(&completion.dest_tx_hash)
        .bind(completion.dest_timestamp)
        .bind(completion.dest_block as i64)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn insert_native_activity(
        &self,
        r: &NativeActivityRecord,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO native_activity (
                chain, tx_hash, log_index, token, from_address, to_address,
                amount, block_number, block_time
            ) VALUES ($1, $2, $3, $4, $5, $6, $7::NUMERIC, $8, $9)
            ON CONFLICT (tx_hash, token) DO NOTHING
            "#,
        )
        .bind(&r.chain)
        .bind(&r.tx_hash)
        .bind(r.log_index as i64)
        .bind(&r.token)
        .bind(&r.from_address)
        .bind(&r.to_address)
        .bind(r.amount.to_string())
        .bind(r.block_number as i64)
        .bind(r.block_time)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn insert_yield_activity(
        &self,
        r: &YieldActivityRecord,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO yield_activity (
                chain, tx_hash, action, token, actor, counterparty,
                underlying_amount, share_amount, block_number, block_time
            ) VALUES ($1, $2, $3, $4, $5, $6, $7::NUMERIC, $8::NUMERIC, $9, $10)
            ON CONFLICT (tx_hash, action) DO NOTHING
            "#,
        )
        .bind(&r.chain)
        .bind(&r.tx_hash)
        .bind(r.action.as_str())
        .bind(&r.token)
        .bind(&r.actor)
        .bind(&r.counterparty)
        .bind(r.underlying_amount.map(|a| a.to_string()))
        .bind(r.share_amount.to_string())
        .bind(r.block_number as i64)
        .bind(r.block_time)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn insert_fx_swap(&self, r: &FxSwapRecord) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO fx_swap (
                chain, tx_hash, trade_id, maker, taker, base_token, quote_token,
                base_amount, quote_amount, rate, block_number, block_time
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8::NUMERIC, $9::NUMERIC, $10, $11, $12)
            ON CONFLICT (tx_hash) DO NOTHING
            "#,
        )
        .bind(&r.chain)
        .bind(&r.tx_hash)
        .bind(&r.trade_id)
        .bind(&r.maker)
        .bind(&r.taker)
        .bind(&r.base_token)
        .bind(&r.quote_token)
        .bind(r.base_amount.to_string())
        .bind(r.quote_amount.to_string())
        .bind(r.rate)
        .bind(r.block_number as i64)
        .bind(r.block_time)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn transfers_on(&self, date: NaiveDate) -> Result<Vec<Transfer>, StoreError> {
        let (start, end) = day_bounds(date);
        let rows = sqlx::query(
            r#"
            SELECT source_chain, nonce, token, amount::TEXT AS amount,
                   source_tx_hash, source_address, source_timestamp, source_block,
                   dest_chain, dest_address, dest_tx_hash, dest_timestamp, dest_block,
                   source_domain, dest_domain, max_fee::TEXT AS max_fee,
                   protocol_version, status
            FROM transfer
            WHERE kind = 'bridge' AND source_timestamp >= $1 AND source_timestamp < $2
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(transfer_from_row).collect()
    }

    async fn native_activity_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<NativeActivityRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT chain, tx_hash, log_index, token, from_address, to_address,
                   amount::TEXT AS amount, block_number, block_time
            FROM native_activity
            WHERE block_time >= $1 AND block_time < $2
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<NativeActivityRecord, StoreError> {
                Ok(NativeActivityRecord {
                    chain: row.try_get("chain")?,
                    tx_hash: row.try_get("tx_hash")?,
                    log_index: height(row, "log_index")?,
                    token: row.try_get("token")?,
                    from_address: row.try_get("from_address")?,
                    to_address: row.try_get("to_address")?,
                    amount: amount(row, "amount")?,
                    block_number: height(row, "block_number")?,
                    block_time: row.try_get("block_time")?,
                })
            })
            .collect()
    }

    async fn yield_activity_on(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<YieldActivityRecord>, StoreError> {
        let (start, end) = day_bounds(date);
        let rows = sqlx::query(
            r#"
            SELECT chain, tx_hash, action, token, actor, counterparty,
                   underlying_amount::TEXT AS underlying_amount,
                   share_amount::TEXT AS share_amount, block_number, block_time
            FROM yield_activity
            WHERE block_time >= $1 AND block_time < $2
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<YieldActivityRecord, StoreError> {
                Ok(YieldActivityRecord {
                    chain: row.try_get("chain")?,
                    tx_hash: row.try_get("tx_hash")?,
                    action: parse_column("action", row.try_get("action")?)?,
                    token: row.try_get("token")?,
                    actor: row.try_get("actor")?,
                    counterparty: row.try_get("counterparty")?,
                    underlying_amount: opt_amount(row, "underlying_amount")?,
                    share_amount: amount(row, "share_amount")?,
                    block_number: height(row, "block_number")?,
                    block_time: row.try_get("block_time")?,
                })
            })
            .collect()
    }

    async fn fx_swaps_on(&self, date: NaiveDate) -> Result<Vec<FxSwapRecord>, StoreError> {
        let (start, end) = day_bounds(date);
        let rows = sqlx::query(
            r#"
            SELECT chain, tx_hash, trade_id, maker, taker, base_token, quote_token,
                   base_amount::TEXT AS base_amount, quote_amount::TEXT AS quote_amount,
                   rate, block_number, block_time
            FROM fx_swap
            WHERE block_time >= $1 AND block_time < $2
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<FxSwapRecord, StoreError> {
                Ok(FxSwapRecord {
                    chain: row.try_get("chain")?,
                    tx_hash: row.try_get("tx_hash")?,
                    trade_id: row.try_get("trade_id")?,
                    maker: row.try_get("maker")?,
                    taker: row.try_get("taker")?,
                    base_token: row.try_get("base_token")?,
                    quote_token: row.try_get("quote_token")?,
                    base_amount: amount(row, "base_amount")?,
                    quote_amount: amount(row, "quote_amount")?,
                    rate: row.try_get("rate")?,
                    block_number: height(row, "block_number")?,
                    block_time: row.try_get("block_time")?,
                })
            })
            .collect()
    }

    async fn upsert_bridge_daily(&self, rows: &[BridgeDailySummary]) -> Result<(), StoreError> {
        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO bridge_daily_summary (
                    date, token, chain, direction,
                    transfer_count, completed_count, volume, unique_wallets, updated_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7::NUMERIC, $8, NOW())
                ON CONFLICT (date, token, chain, direction) DO UPDATE SET
                    transfer_count = EXCLUDED.transfer_count,
                    completed_count = EXCLUDED.completed_count,
                    volume = EXCLUDED.volume,
                    unique_wallets = EXCLUDED.unique_wallets,
                    updated_at = NOW()
                "#,
            )
            .bind(row.date)
            .bind(&row.token)
            .bind(&row.chain)
            .bind(row.direction.as_str())
            .bind(row.transfer_count)
            .bind(row.completed_count)
            .bind(row.volume.to_string())
            .bind(row.unique_wallets)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn upsert_routes(&self, rows: &[RouteSummary]) -> Result<(), StoreError> {
        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO bridge_route_summary (
                    date, token, source_chain, dest_chain,
                    transfer_count, completed_count, volume, avg_completion_secs, updated_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7::NUMERIC, $8, NOW())
                ON CONFLICT (date, token, source_chain, dest_chain) DO UPDATE SET
                    transfer_count = EXCLUDED.transfer_count,
                    completed_count = EXCLUDED.completed_count,
                    volume = EXCLUDED.volume,
                    avg_completion_secs = EXCLUDED.avg_completion_secs,
                    updated_at = NOW()
                "#,
            )
            .bind(row.date)
            .bind(&row.token)
            .bind(&row.source_chain)
            .bind(&row.dest_chain)
            .bind(row.transfer_count)
            .bind(row.completed_count)
            .bind(row.volume.to_string())
            .bind(row.avg_completion_secs)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn upsert_native_hourly(&self, rows: &[NativeHourlySummary]) -> Result<(), StoreError> {
        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO native_hourly_summary (
                    hour, token, transfer_count, volume,
                    unique_senders, unique_receivers, updated_at
                ) VALUES ($1, $2, $3, $4::NUMERIC, $5, $6, NOW())
                ON CONFLICT (hour, token) DO UPDATE SET
                    transfer_count = EXCLUDED.transfer_count,
                    volume = EXCLUDED.volume,
                    unique_senders = EXCLUDED.unique_senders,
                    unique_receivers = EXCLUDED.unique_receivers,
                    updated_at = NOW()
                "#,
            )
            .bind(row.hour)
            .bind(&row.token)
            .bind(row.transfer_count)
            .bind(row.volume.to_string())
            .bind(row.unique_senders)
            .bind(row.unique_receivers)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn upsert_wallet_daily(&self, rows: &[WalletDailySummary]) -> Result<(), StoreError> {
        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO wallet_daily_summary (
                    date, token, wallet, sent_count, sent_volume,
                    received_count, received_volume, updated_at
                ) VALUES ($1, $2, $3, $4, $5::NUMERIC, $6, $7::NUMERIC, NOW())
                ON CONFLICT (date, token, wallet) DO UPDATE SET
                    sent_count = EXCLUDED.sent_count,
                    sent_volume = EXCLUDED.sent_volume,
                    received_count = EXCLUDED.received_count,
                    received_volume = EXCLUDED.received_volume,
                    updated_at = NOW()
                "#,
            )
            .bind(row.date)
            .bind(&row.token)
            .bind(&row.wallet)
            .bind(row.sent_count)
            .bind(row.sent_volume.to_string())
            .bind(row.received_count)
            .bind(row.received_volume.to_string())
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn upsert_yield_daily(&self, rows: &[YieldDailySummary]) -> Result<(), StoreError> {
        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO yield_daily_summary (
                    date, action, event_count, underlying_volume,
                    share_volume, unique_actors, updated_at
                ) VALUES ($1, $2, $3, $4::NUMERIC, $5::NUMERIC, $6, NOW())
                ON CONFLICT (date, action) DO UPDATE SET
                    event_count = EXCLUDED.event_count,
                    underlying_volume = EXCLUDED.underlying_volume,
                    share_volume = EXCLUDED.share_volume,
                    unique_actors = EXCLUDED.unique_actors,
                    updated_at = NOW()
                "#,
            )
            .bind(row.date)
            .bind(row.action.as_str())
            .bind(row.event_count)
            .bind(row.underlying_volume.to_string())
            .bind(row.share_volume.to_string())
            .bind(row.unique_actors)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn upsert_fx_daily(&self, row: &FxDailySummary) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO fx_daily_summary (
                date, swap_count, base_volume, quote_volume,
                vwap_rate, min_rate, max_rate, unique_traders, updated_at
            ) VALUES ($1, $2, $3::NUMERIC, $4::NUMERIC, $5, $6, $7, $8, NOW())
            ON CONFLICT (date) DO UPDATE SET
                swap_count = EXCLUDED.swap_count,
                base_volume = EXCLUDED.base_volume,
                quote_volume = EXCLUDED.quote_volume,
                vwap_rate = EXCLUDED.vwap_rate,
                min_rate = EXCLUDED.min_rate,
                max_rate = EXCLUDED.max_rate,
                unique_traders = EXCLUDED.unique_traders,
                updated_at = NOW()
            "#,
        )
        .bind(row.date)
        .bind(row.swap_count)
        .bind(row.base_volume.to_string())
        .bind(row.quote_volume.to_string())
        .bind(row.vwap_rate)
        .bind(row.min_rate)
        .bind(row.max_rate)
        .bind(row.unique_traders)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
