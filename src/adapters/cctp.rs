// Burn/mint adapter covering both bridge contract generations

use super::{
    address_from_word, hex_address, hex_b256, sort_by_position, AdapterBase, BlockClock,
    LogPosition, SourceAdapter,
};
use crate::chain::RpcLog;
use crate::error::{DecodeError, ProviderError};
use crate::models::{BridgeVersion, BurnEvent, DomainEvent, MintEvent, SourceKind};
use alloy_primitives::{Address, B256};
use alloy_sol_types::{sol, SolEvent};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

pub mod v1 {
    use super::sol;

    sol! {
        event DepositForBurn(
            uint64 indexed nonce,
            address indexed burnToken,
            uint256 amount,
            address indexed depositor,
            bytes32 mintRecipient,
            uint32 destinationDomain,
            bytes32 destinationTokenMessenger,
            bytes32 destinationCaller
        );

        event MintAndWithdraw(
            address indexed mintRecipient,
            uint256 amount,
            address indexed mintToken
        );
    }
}

pub mod v2 {
    use super::sol;

    sol! {
        event DepositForBurn(
            address indexed burnToken,
            uint256 amount,
            address indexed depositor,
            bytes32 mintRecipient,
            uint32 destinationDomain,
            bytes32 destinationTokenMessenger,
            bytes32 destinationCaller,
            uint256 maxFee,
            uint32 indexed minFinalityThreshold,
            bytes hookData
        );

        event MintAndWithdraw(
            address indexed mintRecipient,
            uint256 amount,
            address indexed mintToken,
            uint256 feeCollected
        );
    }
}

pub fn burn_topic(version: BridgeVersion) -> B256 {
    match version {
        BridgeVersion::V1 => v1::DepositForBurn::SIGNATURE_HASH,
        BridgeVersion::V2 => v2::DepositForBurn::SIGNATURE_HASH,
    }
}

pub fn mint_topic(version: BridgeVersion) -> B256 {
    match version {
        BridgeVersion::V1 => v1::MintAndWithdraw::SIGNATURE_HASH,
        BridgeVersion::V2 => v2::MintAndWithdraw::SIGNATURE_HASH,
    }
}

/// Burn log decoded with the schema of the contract generation that emitted it.
pub enum DecodedBurn {
    V1(v1::DepositForBurn),
    V2(v2::DepositForBurn),
}

impl DecodedBurn {
    pub fn decode(version: BridgeVersion, log: &RpcLog) -> Result<Self, DecodeError> {
        let topics = log.topics.iter().copied();
        Ok(match version {
            BridgeVersion::V1 => {
                DecodedBurn::V1(v1::DepositForBurn::decode_raw_log(topics, &log.data, true)?)
            }
            BridgeVersion::V2 => {
                DecodedBurn::V2(v2::DepositForBurn::decode_raw_log(topics, &log.data, true)?)
            }
        })
    }

    pub fn burn_token(&self) -> Address {
        match self {
            DecodedBurn::V1(e) => e.burnToken,
            DecodedBurn::V2(e) => e.burnToken,
        }
    }

    /// v1 carries its nonce on-chain. v2 does not, so the transfer is keyed
    /// by the position of the burn log, which is stable across re-fetches.
    fn into_event(
        self,
        token: String,
        source_domain: u32,
        pos: &LogPosition,
        block_time: DateTime<Utc>,
    ) -> BurnEvent {
        let meta = pos.meta(block_time);
        match self {
            DecodedBurn::V1(e) => BurnEvent {
                nonce: e.nonce.to_string(),
                token,
                amount: e.amount,
                depositor: hex_address(&e.depositor),
                recipient: hex_address(&address_from_word(&e.mintRecipient)),
                source_domain,
                dest_domain: e.destinationDomain,
                max_fee: None,
                version: BridgeVersion::V1,
                meta,
            },
            DecodedBurn::V2(e) => BurnEvent {
                nonce: format!("{}:{}", meta.tx_hash, meta.log_index),
                token,
                amount: e.amount,
                depositor: hex_address(&e.depositor),
                recipient: hex_address(&address_from_word(&e.mintRecipient)),
                source_domain,
                dest_domain: e.destinationDomain,
                max_fee: Some(e.maxFee),
                version: BridgeVersion::V2,
                meta,
            },
        }
    }
}

pub enum DecodedMint {
    V1(v1::MintAndWithdraw),
    V2(v2::MintAndWithdraw),
}

impl DecodedMint {
    pub fn decode(version: BridgeVersion, log: &RpcLog) -> Result<Self, DecodeError> {
        let topics = log.topics.iter().copied();
        Ok(match version {
            BridgeVersion::V1 => {
                DecodedMint::V1(v1::MintAndWithdraw::decode_raw_log(topics, &log.data, true)?)
            }
            BridgeVersion::V2 => {
                DecodedMint::V2(v2::MintAndWithdraw::decode_raw_log(topics, &log.data, true)?)
            }
        })
    }

    pub fn mint_token(&self) -> Address {
        match self {
            DecodedMint::V1(e) => e.mintToken,
            DecodedMint::V2(e) => e.mintToken,
        }
    }

    /// v2 reports the amount net of the relayer fee; add it back so the mint
    /// compares against the gross burn amount.
    fn into_event(self, token: String, pos: &LogPosition, block_time: DateTime<Utc>) -> MintEvent {
        let meta = pos.meta(block_time);
        match self {
            DecodedMint::V1(e) => MintEvent {
                recipient: hex_address(&e.mintRecipient),
                token,
                amount: e.amount,
                fee_collected: None,
                version: BridgeVersion::V1,
                meta,
            },
            DecodedMint::V2(e) => MintEvent {
                recipient: hex_address(&e.mintRecipient),
                token,
                amount: e.amount.saturating_add(e.feeCollected),
                fee_collected: Some(e.feeCollected),
                version: BridgeVersion::V2,
                meta,
            },
        }
    }
}

pub struct BridgeAdapter {
    base: AdapterBase,
    domain: u32,
}

impl BridgeAdapter {
    pub fn new(base: AdapterBase) -> Self {
        let domain = base.chain.bridge_domain.unwrap_or_default();
        Self { base, domain }
    }

    /// Every configured contract generation, queried on every range.
    fn contracts(&self) -> Vec<(BridgeVersion, Address)> {
        let Some(cctp) = &self.base.chain.cctp else {
            return Vec::new();
        };
        [
            (BridgeVersion::V1, cctp.token_messenger_v1),
            (BridgeVersion::V2, cctp.token_messenger_v2),
        ]
        .into_iter()
        .filter_map(|(version, address)| address.map(|a| (version, a)))
        .collect()
    }

    async fn burn_from_log(
        &self,
        version: BridgeVersion,
        log: &RpcLog,
        clock: &mut BlockClock<'_>,
    ) -> Result<Option<BurnEvent>, ProviderError> {
        let chain = &self.base.chain.name;
        let decoded = DecodedBurn::decode(version, log)
            .and_then(|burn| LogPosition::of(log).map(|pos| (burn, pos)));
        let (burn, pos) = match decoded {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!("[{}/cctp] Skipping {} burn log: {}", chain, version.as_str(), e);
                return Ok(None);
            }
        };

        let Some(token) = self.base.chain.resolve_token(&burn.burn_token()) else {
            warn!(
                "[{}/cctp] Dropping burn of unknown token {} in {}",
                chain,
                hex_address(&burn.burn_token()),
                hex_b256(&pos.tx_hash)
            );
            return Ok(None);
        };
        let token = token.to_string();

        let block_time = clock.time_of(pos.block_number).await?;
        Ok(Some(burn.into_event(token, self.domain, &pos, block_time)))
    }

    async fn mint_from_log(
        &self,
        version: BridgeVersion,
        log: &RpcLog,
        clock: &mut BlockClock<'_>,
    ) -> Result<Option<MintEvent>, ProviderError> {
        let chain = &self.base.chain.name;
        let decoded = DecodedMint::decode(version, log)
            .and_then(|mint| LogPosition::of(log).map(|pos| (mint, pos)));
        let (mint, pos) = match decoded {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!("[{}/cctp] Skipping {} mint log: {}", chain, version.as_str(), e);
                return Ok(None);
            }
        };

        let Some(token) = self.base.chain.resolve_token(&mint.mint_token()) else {
            warn!(
                "[{}/cctp] Dropping mint of unknown token {} in {}",
                chain,
                hex_address(&mint.mint_token()),
                hex_b256(&pos.tx_hash)
            );
            return Ok(None);
        };
        let token = token.to_string();

        let block_time = clock.time_of(pos.block_number).await?;
        Ok(Some(mint.into_event(token, &pos, block_time)))
    }
}

#[async_trait]
impl SourceAdapter for BridgeAdapter {
    fn base(&self) -> &AdapterBase {
        &self.base
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Cctp
    }

    async fn fetch_range(&self, from: u64, to: u64) -> Result<Vec<DomainEvent>, ProviderError> {
        let provider = self.base.provider.as_ref();
        let mut clock = BlockClock::new(provider);
        let mut events = Vec::new();

        for (version, contract) in self.contracts() {
            let burns = provider
                .get_logs(contract, burn_topic(version), from, to)
                .await?;
            for log in &burns {
                if let Some(burn) = self.burn_from_log(version, log, &mut clock).await? {
                    events.push(DomainEvent::Burn(burn));
                }
            }

            let mints = provider
                .get_logs(contract, mint_topic(version), from, to)
                .await?;
            for log in &mints {
                if let Some(mint) = self.mint_from_log(version, log, &mut clock).await? {
                    events.push(DomainEvent::Mint(mint));
                }
            }

            debug!(
                "[{}/cctp] {} contract {}: {} burn logs, {} mint logs in [{}, {}]",
                self.base.chain.name,
                version.as_str(),
                hex_address(&contract),
                burns.len(),
                mints.len(),
                from,
                to
            );
        }

        sort_by_position(&mut events);
        Ok(events)
    }
}
