//! Reconciliation service.
//!
//! Turns decoded domain events into ledger rows. Every write is an
//! insert-or-ignore on the record's natural key, so a re-fetched range
//! changes nothing. Bridge burns open a pending transfer; mints complete
//! the single pending transfer with the same destination chain, recipient,
//! token and amount.

use crate::aggregation::{day_of, hour_of, Aggregator};
use crate::domains::DomainRegistry;
use crate::models::{
    BurnEvent, DomainEvent, FxSwapEvent, FxSwapRecord, MintCompletion, MintEvent,
    NativeActivityRecord, NativeTransferEvent, Transfer, TransferStatus, YieldAction,
    YieldActivityRecord,
};
use crate::store::Ledger;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Candidates fetched per mint. Two is enough to tell a unique match from
/// an ambiguous one.
const MATCH_PROBE: i64 = 2;

/// Rows written by one `ingest` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub burns: usize,
    pub mints: usize,
    pub native: usize,
    pub yield_activity: usize,
    pub fx: usize,
}

impl IngestReport {
    pub fn total(&self) -> usize {
        self.burns + self.mints + self.native + self.yield_activity + self.fx
    }
}

pub struct Reconciler {
    ledger: Arc<dyn Ledger>,
    domains: DomainRegistry,
    aggregator: Aggregator,
}

impl Reconciler {
    pub fn new(ledger: Arc<dyn Ledger>, domains: DomainRegistry) -> Self {
        let aggregator = Aggregator::new(ledger.clone());
        Self {
            ledger,
            domains,
            aggregator,
        }
    }

    /// Persist one fetched range of `chain`. Burns are written before mints
    /// so a burn and its mint inside the same range still reconcile.
    pub async fn ingest(&self, chain: &str, events: &[DomainEvent]) -> IngestReport {
        let mut burns = Vec::new();
        let mut mints = Vec::new();
        let mut native = Vec::new();
        let mut fx = Vec::new();
        let mut yield_events = Vec::new();

        for event in events {
            match event {
                DomainEvent::Burn(e) => burns.push(e.clone()),
                DomainEvent::Mint(e) => mints.push(e.clone()),
                DomainEvent::NativeTransfer(e) => native.push(e.clone()),
                DomainEvent::FxSwapSettled(e) => fx.push(e.clone()),
                DomainEvent::YieldDeposit(_)
                | DomainEvent::YieldWithdraw(_)
                | DomainEvent::YieldTransfer(_) => yield_events.push(event.clone()),
            }
        }

        let mut report = IngestReport::default();
        if !burns.is_empty() {
            report.burns = self.ingest_burns(&burns, chain).await;
        }
        if !mints.is_empty() {
            report.mints = self.complete_mints(&mints, chain).await;
        }
        if !native.is_empty() {
            report.native = self.ingest_native(chain, &native).await;
        }
        if !yield_events.is_empty() {
            report.yield_activity = self.ingest_yield(chain, &yield_events).await;
        }
        if !fx.is_empty() {
            report.fx = self.ingest_fx(chain, &fx).await;
        }
        report
    }

    pub fn transfer_from_burn(&self, burn: &BurnEvent, source_chain: &str) -> Transfer {
        Transfer {
            source_chain: source_chain.to_string(),
            nonce: burn.nonce.clone(),
            token: burn.token.clone(),
            amount: burn.amount,
            source_tx_hash: burn.meta.tx_hash.clone(),
            source_address: burn.depositor.clone(),
            source_timestamp: burn.meta.block_time,
            source_block: burn.meta.block_number,
            dest_chain: self.domains.resolve(burn.dest_domain),
            dest_address: burn.recipient.clone(),
            dest_tx_hash: None,
            dest_timestamp: None,
            dest_block: None,
            source_domain: burn.source_domain,
            dest_domain: burn.dest_domain,
            max_fee: burn.max_fee,
            protocol_version: burn.version,
            status: TransferStatus::Pending,
        }
    }

    /// Open a pending transfer per burn. Returns the number of new rows.
    pub async fn ingest_burns(&self, events: &[BurnEvent], source_chain: &str) -> usize {
        let mut inserted = 0;
        let mut dates = BTreeSet::new();

        for burn in events {
            let transfer = self.transfer_from_burn(burn, source_chain);
            match self.ledger.insert_transfer(&transfer).await {
                Ok(true) => {
                    inserted += 1;
                    dates.insert(day_of(transfer.source_timestamp));
                    debug!(
                        "[{}/cctp] New transfer {} -> {} nonce {}",
                        source_chain, source_chain, transfer.dest_chain, transfer.nonce
                    );
                }
                Ok(false) => {}
                Err(e) => warn!(
                    "[{}/cctp] Failed to store burn {}: {}",
                    source_chain, burn.meta.tx_hash, e
                ),
            }
        }

        if inserted > 0 {
            info!("[{}/cctp] Stored {} new transfers", source_chain, inserted);
        }
        self.refresh_bridge(source_chain, &dates).await;
        inserted
    }

    /// Complete the pending transfer each mint pays out. A mint with no
    /// candidate, or with several indistinguishable candidates, changes
    /// nothing. Unmatched mints are not kept for a later retry, so a mint
    /// ingested before its burn leaves that transfer pending.
    pub async fn complete_mints(&self, events: &[MintEvent], dest_chain: &str) -> usize {
        let mut completed = 0;
        let mut dates = BTreeSet::new();

        for mint in events {
            let candidates = match self
                .ledger
                .find_pending_transfers(
                    dest_chain,
                    &mint.recipient,
                    &mint.token,
                    &mint.amount,
                    MATCH_PROBE,
                )
                .await
            {
                Ok(candidates) => candidates,
                Err(e) => {
                    warn!(
                        "[{}/cctp] Failed to look up transfer for mint {}: {}",
                        dest_chain, mint.meta.tx_hash, e
                    );
                    continue;
                }
            };

            let pending = match candidates.as_slice() {
                [] => {
                    debug!(
                        "[{}/cctp] No pending transfer for mint {}",
                        dest_chain, mint.meta.tx_hash
                    );
                    continue;
                }
                [only] => only,
                _ => {
                    warn!(
                        "[{}/cctp] Mint {} matches several pending transfers to {}, leaving them pending",
                        dest_chain, mint.meta.tx_hash, mint.recipient
                    );
                    continue;
                }
            };

            let completion = MintCompletion {
                dest_tx_hash: mint.meta.tx_hash.clone(),
                dest_timestamp: mint.meta.block_time,
                dest_block: mint.meta.block_number,
            };
            match self
                .ledger
                .complete_transfer(&pending.source_chain, &pending.nonce, &completion)
                .await
            {
                Ok(true) => {
                    completed += 1;
                    dates.insert(day_of(pending.source_timestamp));
                }
                Ok(false) => {}
                Err(e) => warn!(
                    "[{}/cctp] Failed to complete transfer {}/{}: {}",
                    dest_chain, pending.source_chain, pending.nonce, e
                ),
            }
        }

        if completed > 0 {
            info!("[{}/cctp] Completed {} transfers", dest_chain, completed);
        }
        self.refresh_bridge(dest_chain, &dates).await;
        completed
    }

    pub async fn ingest_native(&self, chain: &str, events: &[NativeTransferEvent]) -> usize {
        let mut inserted = 0;
        let mut hours = BTreeSet::new();

        for event in events {
            let record = NativeActivityRecord {
                chain: chain.to_string(),
                tx_hash: event.meta.tx_hash.clone(),
                log_index: event.meta.log_index,
                token: event.token.clone(),
                from_address: event.from.clone(),
                to_address: event.to.clone(),
                amount: event.amount,
                block_number: event.meta.block_number,
                block_time: event.meta.block_time,
            };
            match self.ledger.insert_native_activity(&record).await {
                Ok(true) => {
                    inserted += 1;
                    hours.insert(hour_of(record.block_time));
                }
                Ok(false) => {}
                Err(e) => warn!(
                    "[{}/native] Failed to store transfer {}: {}",
                    chain, record.tx_hash, e
                ),
            }
        }

        if !hours.is_empty() {
            if let Err(e) = self.aggregator.refresh_native_hours(&hours).await {
                warn!("[{}/native] Summary refresh failed: {}", chain, e);
            }
        }
        inserted
    }

    pub async fn ingest_yield(&self, chain: &str, events: &[DomainEvent]) -> usize {
        let mut inserted = 0;
        let mut dates = BTreeSet::new();

        for record in events.iter().filter_map(|e| yield_record(chain, e)) {
            match self.ledger.insert_yield_activity(&record).await {
                Ok(true) => {
                    inserted += 1;
                    dates.insert(day_of(record.block_time));
                }
                Ok(false) => {}
                Err(e) => warn!(
                    "[{}/yield] Failed to store {} {}: {}",
                    chain,
                    record.action.as_str(),
                    record.tx_hash,
                    e
                ),
            }
        }

        if !dates.is_empty() {
            if let Err(e) = self.aggregator.refresh_yield_dates(&dates).await {
                warn!("[{}/yield] Summary refresh failed: {}", chain, e);
            }
        }
        inserted
    }

    pub async fn ingest_fx(&self, chain: &str, events: &[FxSwapEvent]) -> usize {
        let mut inserted = 0;
        let mut dates = BTreeSet::new();

        for event in events {
            let record = FxSwapRecord {
                chain: chain.to_string(),
                tx_hash: event.meta.tx_hash.clone(),
                trade_id: event.trade_id.clone(),
                maker: event.maker.clone(),
                taker: event.taker.clone(),
                base_token: event.base_token.clone(),
                quote_token: event.quote_token.clone(),
                base_amount: event.base_amount,
                quote_amount: event.quote_amount,
                rate: event.rate,
                block_number: event.meta.block_number,
                block_time: event.meta.block_time,
            };
            match self.ledger.insert_fx_swap(&record).await {
                Ok(true) => {
                    inserted += 1;
                    dates.insert(day_of(record.block_time));
                }
                Ok(false) => {}
                Err(e) => warn!(
                    "[{}/fx] Failed to store swap {}: {}",
                    chain, record.tx_hash, e
                ),
            }
        }

        if !dates.is_empty() {
            if let Err(e) = self.aggregator.refresh_fx_dates(&dates).await {
                warn!("[{}/fx] Summary refresh failed: {}", chain, e);
            }
        }
        inserted
    }

    async fn refresh_bridge(&self, chain: &str, dates: &BTreeSet<NaiveDate>) {
        if dates.is_empty() {
            return;
        }
        if let Err(e) = self.aggregator.refresh_bridge_dates(dates).await {
            warn!("[{}/cctp] Summary refresh failed: {}", chain, e);
        }
    }
}

fn yield_record(chain: &str, event: &DomainEvent) -> Option<YieldActivityRecord> {
    let (action, token, actor, counterparty, underlying_amount, share_amount, meta) = match event {
        DomainEvent::YieldDeposit(e) => (
            YieldAction::Mint,
            &e.token,
            &e.actor,
            e.counterparty.clone(),
            Some(e.underlying_amount),
            e.share_amount,
            &e.meta,
        ),
        DomainEvent::YieldWithdraw(e) => (
            YieldAction::Redeem,
            &e.token,
            &e.actor,
            e.counterparty.clone(),
            Some(e.underlying_amount),
            e.share_amount,
            &e.meta,
        ),
        DomainEvent::YieldTransfer(e) => (
            YieldAction::Transfer,
            &e.token,
            &e.from,
            Some(e.to.clone()),
            None,
            e.share_amount,
            &e.meta,
        ),
        _ => return None,
    };

    Some(YieldActivityRecord {
        chain: chain.to_string(),
        tx_hash: meta.tx_hash.clone(),
        action,
        token: token.clone(),
        actor: actor.clone(),
        counterparty,
        underlying_amount,
        share_amount,
        block_number: meta.block_number,
        block_time: meta.block_time,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexerConfig;
    use crate::models::{BridgeVersion, LogMeta, YieldFlowEvent, YieldTransferEvent};
    use crate::store::memory::MemoryLedger;
    use alloy_primitives::U256;
    use chrono::{TimeZone, Utc};

    const CONFIG: &str = r#"
chains:
  - name: ethereum-sepolia
    rpc_url: http://localhost:8545
    bridge_domain: 0
  - name: arc-testnet
    rpc_url: http://localhost:8546
    bridge_domain: 26
"#;

    const RECIPIENT: &str = "0x00000000000000000000000000000000000000aa";

    fn reconciler(ledger: Arc<MemoryLedger>) -> Reconciler {
        let config = IndexerConfig::from_yaml(CONFIG).unwrap();
        Reconciler::new(ledger, DomainRegistry::from_config(&config))
    }

    fn meta(tx: &str, block: u64, minute: u32) -> LogMeta {
        LogMeta {
            tx_hash: tx.into(),
            log_index: 0,
            block_number: block,
            block_time: Utc.with_ymd_and_hms(2025, 3, 1, 12, minute, 0).unwrap(),
        }
    }

    fn burn(nonce: &str, amount: u64, minute: u32) -> BurnEvent {
        BurnEvent {
            nonce: nonce.into(),
            token: "USDC".into(),
            amount: U256::from(amount),
            depositor: "0x00000000000000000000000000000000000000d0".into(),
            recipient: RECIPIENT.into(),
            source_domain: 0,
            dest_domain: 26,
            max_fee: None,
            version: BridgeVersion::V1,
            meta: meta(&format!("0xb{}", nonce), 100, minute),
        }
    }

    fn mint(tx: &str, amount: u64, minute: u32) -> MintEvent {
        MintEvent {
            recipient: RECIPIENT.into(),
            token: "USDC".into(),
            amount: U256::from(amount),
            fee_collected: None,
            version: BridgeVersion::V1,
            meta: meta(tx, 500, minute),
        }
    }

    fn native(tx: &str) -> NativeTransferEvent {
        NativeTransferEvent {
            from: "0x01".into(),
            to: "0x02".into(),
            token: "USDC".into(),
            amount: U256::from(7u64),
            meta: meta(tx, 10, 5),
        }
    }

    #[tokio::test]
    async fn test_burn_resolves_destination() {
        let ledger = Arc::new(MemoryLedger::new());
        let reconciler = reconciler(ledger.clone());

        let mut unknown = burn("2", 10, 0);
        unknown.dest_domain = 4242;
        let stored = reconciler
            .ingest_burns(&[burn("1", 100, 0), unknown], "ethereum-sepolia")
            .await;
        assert_eq!(stored, 2);

        let t = ledger.transfer("ethereum-sepolia", "1").unwrap();
        assert_eq!(t.dest_chain, "arc-testnet");
        assert_eq!(t.status, TransferStatus::Pending);
        assert_eq!(t.source_address, "0x00000000000000000000000000000000000000d0");
        assert_eq!(
            ledger.transfer("ethereum-sepolia", "2").unwrap().dest_chain,
            "domain-4242"
        );
    }

    #[tokio::test]
    async fn test_reingesting_burns_is_a_noop() {
        let ledger = Arc::new(MemoryLedger::new());
        let reconciler = reconciler(ledger.clone());
        let burns = [burn("1", 100, 0), burn("2", 200, 1)];

        assert_eq!(reconciler.ingest_burns(&burns, "ethereum-sepolia").await, 2);
        let before = ledger.with_state(|s| s.transfers.clone());
        assert_eq!(reconciler.ingest_burns(&burns, "ethereum-sepolia").await, 0);
        assert_eq!(ledger.with_state(|s| s.transfers.clone()), before);
    }

    #[tokio::test]
    async fn test_mint_completes_matching_transfer() {
        let ledger = Arc::new(MemoryLedger::new());
        let reconciler = reconciler(ledger.clone());
        reconciler
            .ingest_burns(&[burn("1", 100, 0)], "ethereum-sepolia")
            .await;

        let done = reconciler
            .complete_mints(&[mint("0xm1", 100, 3)], "arc-testnet")
            .await;
        assert_eq!(done, 1);

        let t = ledger.transfer("ethereum-sepolia", "1").unwrap();
        assert_eq!(t.status, TransferStatus::Completed);
        assert_eq!(t.dest_tx_hash.as_deref(), Some("0xm1"));
        assert_eq!(t.dest_block, Some(500));
        assert_eq!(t.completion_secs(), Some(180));

        // a second identical mint finds nothing pending
        let again = reconciler
            .complete_mints(&[mint("0xm2", 100, 9)], "arc-testnet")
            .await;
        assert_eq!(again, 0);
        let t = ledger.transfer("ethereum-sepolia", "1").unwrap();
        assert_eq!(t.status, TransferStatus::Completed);
        assert_eq!(t.dest_tx_hash.as_deref(), Some("0xm1"));
    }

    #[tokio::test]
    async fn test_mint_without_match_changes_nothing() {
        let ledger = Arc::new(MemoryLedger::new());
        let reconciler = reconciler(ledger.clone());
        reconciler
            .ingest_burns(&[burn("1", 100, 0)], "ethereum-sepolia")
            .await;

        assert_eq!(
            reconciler
                .complete_mints(&[mint("0xm1", 99, 3)], "arc-testnet")
                .await,
            0
        );
        assert_eq!(
            reconciler
                .complete_mints(&[mint("0xm1", 100, 3)], "ethereum-sepolia")
                .await,
            0
        );
        let t = ledger.transfer("ethereum-sepolia", "1").unwrap();
        assert_eq!(t.status, TransferStatus::Pending);
    }

    #[tokio::test]
    async fn test_mint_before_burn_leaves_transfer_pending() {
        let ledger = Arc::new(MemoryLedger::new());
        let reconciler = reconciler(ledger.clone());

        let done = reconciler
            .complete_mints(&[mint("0xm1", 100, 3)], "arc-testnet")
            .await;
        assert_eq!(done, 0);
        reconciler
            .ingest_burns(&[burn("1", 100, 0)], "ethereum-sepolia")
            .await;

        let t = ledger.transfer("ethereum-sepolia", "1").unwrap();
        assert_eq!(t.status, TransferStatus::Pending);
        assert_eq!(t.dest_tx_hash, None);
    }

    #[tokio::test]
    async fn test_ambiguous_mint_is_skipped() {
        let ledger = Arc::new(MemoryLedger::new());
        let reconciler = reconciler(ledger.clone());
        reconciler
            .ingest_burns(&[burn("1", 100, 0), burn("2", 100, 1)], "ethereum-sepolia")
            .await;

        let done = reconciler
            .complete_mints(&[mint("0xm1", 100, 5)], "arc-testnet")
            .await;
        assert_eq!(done, 0);
        for nonce in ["1", "2"] {
            let t = ledger.transfer("ethereum-sepolia", nonce).unwrap();
            assert_eq!(t.status, TransferStatus::Pending);
        }
    }

    #[tokio::test]
    async fn test_ingest_orders_burn_before_mint() {
        let ledger = Arc::new(MemoryLedger::new());
        let reconciler = reconciler(ledger.clone());

        // a self-addressed route: burn and mint observed in one range
        let mut local = burn("1", 100, 0);
        local.dest_domain = 0;
        let mut payout = mint("0xm1", 100, 1);
        payout.meta.block_number = 50;

        let report = reconciler
            .ingest(
                "ethereum-sepolia",
                &[DomainEvent::Mint(payout), DomainEvent::Burn(local)],
            )
            .await;
        assert_eq!(report.burns, 1);
        assert_eq!(report.mints, 1);
        assert_eq!(report.total(), 2);
    }

    #[tokio::test]
    async fn test_native_ingest_is_idempotent_and_refreshes() {
        let ledger = Arc::new(MemoryLedger::new());
        let reconciler = reconciler(ledger.clone());
        let events = [native("0x1"), native("0x2")];

        assert_eq!(reconciler.ingest_native("arc-testnet", &events).await, 2);
        assert_eq!(reconciler.ingest_native("arc-testnet", &events).await, 0);
        assert_eq!(ledger.with_state(|s| s.native.len()), 2);

        let hourly = ledger.with_state(|s| s.native_hourly.values().cloned().collect::<Vec<_>>());
        assert_eq!(hourly.len(), 1);
        assert_eq!(hourly[0].transfer_count, 2);
        assert_eq!(hourly[0].volume, U256::from(14u64));
    }

    fn swap(tx: &str, maker: &str, base: u64, quote: u64, minute: u32) -> FxSwapEvent {
        FxSwapEvent {
            trade_id: format!("{}-trade", tx),
            maker: maker.into(),
            taker: "0x0c".into(),
            base_token: "USDC".into(),
            quote_token: "EURC".into(),
            base_amount: U256::from(base),
            quote_amount: U256::from(quote),
            rate: Some(quote as f64 / base as f64),
            meta: meta(tx, 20, minute),
        }
    }

    #[tokio::test]
    async fn test_fx_ingest_is_idempotent_and_refreshes() {
        let ledger = Arc::new(MemoryLedger::new());
        let reconciler = reconciler(ledger.clone());
        let events = [
            swap("0xf1", "0x0a", 100, 50, 1),
            swap("0xf2", "0x0b", 300, 300, 2),
        ];

        assert_eq!(reconciler.ingest_fx("arc-testnet", &events).await, 2);
        let first = ledger.with_state(|s| s.fx_daily.clone());
        assert_eq!(reconciler.ingest_fx("arc-testnet", &events).await, 0);
        assert_eq!(ledger.with_state(|s| s.fx.len()), 2);
        assert_eq!(ledger.with_state(|s| s.fx_daily.clone()), first);

        let day = first.values().next().unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(day.swap_count, 2);
        assert_eq!(day.base_volume, U256::from(400u64));
        assert_eq!(day.quote_volume, U256::from(350u64));
        assert_eq!(day.min_rate, Some(0.5));
        assert_eq!(day.max_rate, Some(1.0));
        assert_eq!(day.vwap_rate, Some(0.875));
        assert_eq!(day.unique_traders, 3);
    }

    #[tokio::test]
    async fn test_persistence_error_skips_only_that_record() {
        let ledger = Arc::new(MemoryLedger::new());
        ledger.fail_tx("0x1");
        let reconciler = reconciler(ledger.clone());

        let stored = reconciler
            .ingest_native("arc-testnet", &[native("0x1"), native("0x2")])
            .await;
        assert_eq!(stored, 1);
        assert_eq!(ledger.with_state(|s| s.native.len()), 1);
    }

    #[tokio::test]
    async fn test_refresh_failure_does_not_fail_ingest() {
        let ledger = Arc::new(MemoryLedger::new());
        ledger.fail_summaries(true);
        let reconciler = reconciler(ledger.clone());

        let stored = reconciler
            .ingest_burns(&[burn("1", 100, 0)], "ethereum-sepolia")
            .await;
        assert_eq!(stored, 1);
        assert!(ledger.with_state(|s| s.bridge_daily.is_empty()));
    }

    #[tokio::test]
    async fn test_yield_actions() {
        let ledger = Arc::new(MemoryLedger::new());
        let reconciler = reconciler(ledger.clone());
        let flow = |tx: &str| YieldFlowEvent {
            token: "USYC".into(),
            actor: "0x0a".into(),
            counterparty: Some("0x0a".into()),
            underlying_amount: U256::from(1_000u64),
            share_amount: U256::from(990u64),
            meta: meta(tx, 10, 0),
        };
        let events = [
            DomainEvent::YieldDeposit(flow("0x1")),
            DomainEvent::YieldWithdraw(flow("0x2")),
            DomainEvent::YieldTransfer(YieldTransferEvent {
                token: "USYC".into(),
                from: "0x0a".into(),
                to: "0x0b".into(),
                share_amount: U256::from(5u64),
                meta: meta("0x3", 11, 1),
            }),
        ];

        assert_eq!(reconciler.ingest_yield("arc-testnet", &events).await, 3);
        assert_eq!(reconciler.ingest_yield("arc-testnet", &events).await, 0);

        ledger.with_state(|s| {
            let deposit = &s.yield_activity[&("0x1".to_string(), YieldAction::Mint)];
            assert_eq!(deposit.underlying_amount, Some(U256::from(1_000u64)));
            let transfer = &s.yield_activity[&("0x3".to_string(), YieldAction::Transfer)];
            assert_eq!(transfer.actor, "0x0a");
            assert_eq!(transfer.counterparty.as_deref(), Some("0x0b"));
            assert_eq!(transfer.underlying_amount, None);
            assert_eq!(s.yield_daily.len(), 3);
        });
    }
}
