// Yield token adapter: teller deposits/withdrawals and share transfers

use super::native::Transfer;
use super::{hex_address, sort_by_position, AdapterBase, BlockClock, LogPosition, SourceAdapter};
use crate::config::YieldConfig;
use crate::error::{DecodeError, ProviderError};
use crate::models::{DomainEvent, SourceKind, YieldFlowEvent, YieldTransferEvent};
use alloy_primitives::Address;
use alloy_sol_types::{sol, SolEvent};
use async_trait::async_trait;
use tracing::{debug, warn};

sol! {
    event Deposit(address indexed sender, address indexed owner, uint256 assets, uint256 shares);

    event Withdraw(
        address indexed sender,
        address indexed receiver,
        address indexed owner,
        uint256 assets,
        uint256 shares
    );
}

pub struct YieldAdapter {
    base: AdapterBase,
}

impl YieldAdapter {
    pub fn new(base: AdapterBase) -> Self {
        Self { base }
    }

    /// Share transfers that are the mint/burn leg of a teller flow are
    /// already recorded as deposits/withdrawals.
    pub fn is_flow_leg(yield_cfg: &YieldConfig, from: &Address, to: &Address) -> bool {
        [Address::ZERO, yield_cfg.teller]
            .iter()
            .any(|excluded| excluded == from || excluded == to)
    }

    fn warn_skip(&self, what: &str, e: &DecodeError) {
        warn!("[{}/yield] Skipping {} log: {}", self.base.chain.name, what, e);
    }
}

#[async_trait]
impl SourceAdapter for YieldAdapter {
    fn base(&self) -> &AdapterBase {
        &self.base
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Yield
    }

    async fn fetch_range(&self, from: u64, to: u64) -> Result<Vec<DomainEvent>, ProviderError> {
        let Some(cfg) = &self.base.chain.yield_token else {
            return Ok(Vec::new());
        };
        let provider = self.base.provider.as_ref();
        let mut clock = BlockClock::new(provider);
        let mut events = Vec::new();

        let deposits = provider
            .get_logs(cfg.teller, Deposit::SIGNATURE_HASH, from, to)
            .await?;
        for log in &deposits {
            let decoded = Deposit::decode_raw_log(log.topics.iter().copied(), &log.data, true)
                .map_err(DecodeError::from)
                .and_then(|d| LogPosition::of(log).map(|pos| (d, pos)));
            let (deposit, pos) = match decoded {
                Ok(decoded) => decoded,
                Err(e) => {
                    self.warn_skip("deposit", &e);
                    continue;
                }
            };
            let block_time = clock.time_of(pos.block_number).await?;
            events.push(DomainEvent::YieldDeposit(YieldFlowEvent {
                token: cfg.symbol.clone(),
                actor: hex_address(&deposit.owner),
                counterparty: Some(hex_address(&deposit.sender)),
                underlying_amount: deposit.assets,
                share_amount: deposit.shares,
                meta: pos.meta(block_time),
            }));
        }

        let withdrawals = provider
            .get_logs(cfg.teller, Withdraw::SIGNATURE_HASH, from, to)
            .await?;
        for log in &withdrawals {
            let decoded = Withdraw::decode_raw_log(log.topics.iter().copied(), &log.data, true)
                .map_err(DecodeError::from)
                .and_then(|w| LogPosition::of(log).map(|pos| (w, pos)));
            let (withdraw, pos) = match decoded {
                Ok(decoded) => decoded,
                Err(e) => {
                    self.warn_skip("withdraw", &e);
                    continue;
                }
            };
            let block_time = clock.time_of(pos.block_number).await?;
            events.push(DomainEvent::YieldWithdraw(YieldFlowEvent {
                token: cfg.symbol.clone(),
                actor: hex_address(&withdraw.owner),
                counterparty: Some(hex_address(&withdraw.receiver)),
                underlying_amount: withdraw.assets,
                share_amount: withdraw.shares,
                meta: pos.meta(block_time),
            }));
        }

        let transfers = provider
            .get_logs(cfg.token, Transfer::SIGNATURE_HASH, from, to)
            .await?;
        for log in &transfers {
            let decoded = Transfer::decode_raw_log(log.topics.iter().copied(), &log.data, true)
                .map_err(DecodeError::from)
                .and_then(|t| LogPosition::of(log).map(|pos| (t, pos)));
            let (transfer, pos) = match decoded {
                Ok(decoded) => decoded,
                Err(e) => {
                    self.warn_skip("transfer", &e);
                    continue;
                }
            };
            if Self::is_flow_leg(cfg, &transfer.from, &transfer.to) {
                continue;
            }
            let block_time = clock.time_of(pos.block_number).await?;
            events.push(DomainEvent::YieldTransfer(YieldTransferEvent {
                token: cfg.symbol.clone(),
                from: hex_address(&transfer.from),
                to: hex_address(&transfer.to),
                share_amount: transfer.value,
                meta: pos.meta(block_time),
            }));
        }

        debug!(
            "[{}/yield] {} deposits, {} withdrawals, {} transfer logs in [{}, {}]",
            self.base.chain.name,
            deposits.len(),
            withdrawals.len(),
            transfers.len(),
            from,
            to
        );

        sort_by_position(&mut events);
        Ok(events)
    }
}
