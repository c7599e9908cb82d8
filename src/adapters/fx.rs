// FX escrow settlement adapter

use super::{hex_address, hex_b256, scaled, sort_by_position, AdapterBase, BlockClock, LogPosition, SourceAdapter};
use crate::config::{ChainConfig, FxConfig};
use crate::error::{DecodeError, ProviderError};
use crate::models::{DomainEvent, FxSwapEvent, SourceKind};
use alloy_primitives::U256;
use alloy_sol_types::{sol, SolEvent};
use async_trait::async_trait;
use tracing::{debug, warn};

sol! {
    event TradeSettled(
        bytes32 indexed tradeId,
        address indexed maker,
        address indexed taker,
        address baseToken,
        address quoteToken,
        uint256 baseAmount,
        uint256 quoteAmount
    );
}

/// Legs of a trade expressed in the configured pair orientation.
#[derive(Debug, Clone, PartialEq)]
pub struct OrientedLegs {
    pub base_amount: U256,
    pub quote_amount: U256,
    pub rate: Option<f64>,
}

/// Orient a settled trade to `pair`, or `None` when its tokens are not the
/// configured pair in either order.
pub fn orient(
    chain: &ChainConfig,
    pair: &FxConfig,
    trade: &TradeSettled,
) -> Option<OrientedLegs> {
    let base_symbol = chain.resolve_token(&trade.baseToken)?;
    let quote_symbol = chain.resolve_token(&trade.quoteToken)?;

    let (base_amount, quote_amount) = if base_symbol == pair.base && quote_symbol == pair.quote {
        (trade.baseAmount, trade.quoteAmount)
    } else if base_symbol == pair.quote && quote_symbol == pair.base {
        (trade.quoteAmount, trade.baseAmount)
    } else {
        return None;
    };

    let base_decimals = chain.token(&pair.base)?.decimals;
    let quote_decimals = chain.token(&pair.quote)?.decimals;
    let rate = (!base_amount.is_zero())
        .then(|| scaled(&quote_amount, quote_decimals) / scaled(&base_amount, base_decimals));

    Some(OrientedLegs {
        base_amount,
        quote_amount,
        rate,
    })
}

pub struct FxAdapter {
    base: AdapterBase,
}

impl FxAdapter {
    pub fn new(base: AdapterBase) -> Self {
        Self { base }
    }
}

#[async_trait]
impl SourceAdapter for FxAdapter {
    fn base(&self) -> &AdapterBase {
        &self.base
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Fx
    }

    async fn fetch_range(&self, from: u64, to: u64) -> Result<Vec<DomainEvent>, ProviderError> {
        let chain = &self.base.chain;
        let Some(pair) = &chain.fx else {
            return Ok(Vec::new());
        };
        let provider = self.base.provider.as_ref();
        let mut clock = BlockClock::new(provider);
        let mut events = Vec::new();

        let logs = provider
            .get_logs(pair.escrow, TradeSettled::SIGNATURE_HASH, from, to)
            .await?;
        for log in &logs {
            let decoded = TradeSettled::decode_raw_log(log.topics.iter().copied(), &log.data, true)
                .map_err(DecodeError::from)
                .and_then(|t| LogPosition::of(log).map(|pos| (t, pos)));
            let (trade, pos) = match decoded {
                Ok(decoded) => decoded,
                Err(e) => {
                    warn!("[{}/fx] Skipping settlement log: {}", chain.name, e);
                    continue;
                }
            };

            let Some(legs) = orient(chain, pair, &trade) else {
                warn!(
                    "[{}/fx] Dropping out-of-pair trade {} ({} / {})",
                    chain.name,
                    hex_b256(&trade.tradeId),
                    hex_address(&trade.baseToken),
                    hex_address(&trade.quoteToken)
                );
                continue;
            };

            let block_time = clock.time_of(pos.block_number).await?;
            events.push(DomainEvent::FxSwapSettled(FxSwapEvent {
                trade_id: hex_b256(&trade.tradeId),
                maker: hex_address(&trade.maker),
                taker: hex_address(&trade.taker),
                base_token: pair.base.clone(),
                quote_token: pair.quote.clone(),
                base_amount: legs.base_amount,
                quote_amount: legs.quote_amount,
                rate: legs.rate,
                meta: pos.meta(block_time),
            }));
        }

        debug!(
            "[{}/fx] {} settlement logs, {} in pair, [{}, {}]",
            chain.name,
            logs.len(),
            events.len(),
            from,
            to
        );

        sort_by_position(&mut events);
        Ok(events)
    }
}
