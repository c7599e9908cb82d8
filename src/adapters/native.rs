// Native token transfer adapter

use super::{hex_address, sort_by_position, AdapterBase, BlockClock, LogPosition, SourceAdapter};
use crate::chain::RpcLog;
use crate::error::{DecodeError, ProviderError};
use crate::models::{DomainEvent, NativeTransferEvent, SourceKind};
use alloy_primitives::Address;
use alloy_sol_types::{sol, SolEvent};
use async_trait::async_trait;
use std::collections::HashSet;
use tracing::{debug, warn};

sol! {
    event Transfer(address indexed from, address indexed to, uint256 value);
}

/// Indexes plain transfers of the chain's natively issued tokens.
///
/// Transfers touching a bridge contract, a gateway contract or the zero
/// address are bridge-internal mint/burn legs and are left to the bridge
/// adapter.
pub struct NativeAdapter {
    base: AdapterBase,
    excluded: HashSet<Address>,
}

impl NativeAdapter {
    pub fn new(base: AdapterBase) -> Self {
        let mut excluded: HashSet<Address> = base.chain.bridge_contracts().into_iter().collect();
        excluded.extend(base.chain.gateways.iter().copied());
        excluded.insert(Address::ZERO);
        Self { base, excluded }
    }

    pub fn is_excluded(&self, from: &Address, to: &Address) -> bool {
        self.excluded.contains(from) || self.excluded.contains(to)
    }

    async fn transfer_from_log(
        &self,
        symbol: &str,
        log: &RpcLog,
        clock: &mut BlockClock<'_>,
    ) -> Result<Option<NativeTransferEvent>, ProviderError> {
        let decoded = Transfer::decode_raw_log(log.topics.iter().copied(), &log.data, true)
            .map_err(DecodeError::from)
            .and_then(|transfer| LogPosition::of(log).map(|pos| (transfer, pos)));
        let (transfer, pos) = match decoded {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!("[{}/native] Skipping {} transfer log: {}", self.base.chain.name, symbol, e);
                return Ok(None);
            }
        };

        if self.is_excluded(&transfer.from, &transfer.to) {
            return Ok(None);
        }

        let block_time = clock.time_of(pos.block_number).await?;
        Ok(Some(NativeTransferEvent {
            from: hex_address(&transfer.from),
            to: hex_address(&transfer.to),
            token: symbol.to_string(),
            amount: transfer.value,
            meta: pos.meta(block_time),
        }))
    }
}

#[async_trait]
impl SourceAdapter for NativeAdapter {
    fn base(&self) -> &AdapterBase {
        &self.base
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Native
    }

    async fn fetch_range(&self, from: u64, to: u64) -> Result<Vec<DomainEvent>, ProviderError> {
        let provider = self.base.provider.as_ref();
        let mut clock = BlockClock::new(provider);
        let mut events = Vec::new();

        for symbol in &self.base.chain.native_tokens {
            let Some(token) = self.base.chain.token(symbol) else {
                continue;
            };
            let logs = provider
                .get_logs(token.address, Transfer::SIGNATURE_HASH, from, to)
                .await?;
            let before = events.len();
            for log in &logs {
                if let Some(transfer) = self.transfer_from_log(symbol, log, &mut clock).await? {
                    events.push(DomainEvent::NativeTransfer(transfer));
                }
            }
            debug!(
                "[{}/native] {}: {} logs, {} kept in [{}, {}]",
                self.base.chain.name,
                symbol,
                logs.len(),
                events.len() - before,
                from,
                to
            );
        }

        sort_by_position(&mut events);
        Ok(events)
    }
}
