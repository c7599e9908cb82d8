// Domain events, ledger records and summary rows

use alloy_primitives::U256;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of event stream a source indexes. Together with the chain name it
/// keys the cursor table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Cctp,
    Native,
    Yield,
    Fx,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Cctp => "cctp",
            SourceKind::Native => "native",
            SourceKind::Yield => "yield",
            SourceKind::Fx => "fx",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bridge contract generation. Both may be deployed on the same chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BridgeVersion {
    V1,
    V2,
}

impl BridgeVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            BridgeVersion::V1 => "v1",
            BridgeVersion::V2 => "v2",
        }
    }
}

impl FromStr for BridgeVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "v1" => Ok(BridgeVersion::V1),
            "v2" => Ok(BridgeVersion::V2),
            other => Err(other.to_string()),
        }
    }
}

/// Where a decoded event came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogMeta {
    pub tx_hash: String,
    pub log_index: u64,
    pub block_number: u64,
    pub block_time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BurnEvent {
    pub nonce: String,
    pub token: String,
    pub amount: U256,
    pub depositor: String,
    pub recipient: String,
    pub source_domain: u32,
    pub dest_domain: u32,
    pub max_fee: Option<U256>,
    pub version: BridgeVersion,
    pub meta: LogMeta,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MintEvent {
    pub recipient: String,
    pub token: String,
    /// Gross amount, comparable with the amount of the originating burn
    pub amount: U256,
    pub fee_collected: Option<U256>,
    pub version: BridgeVersion,
    pub meta: LogMeta,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NativeTransferEvent {
    pub from: String,
    pub to: String,
    pub token: String,
    pub amount: U256,
    pub meta: LogMeta,
}

/// Teller deposit or withdrawal.
#[derive(Debug, Clone, PartialEq)]
pub struct YieldFlowEvent {
    pub token: String,
    pub actor: String,
    pub counterparty: Option<String>,
    pub underlying_amount: U256,
    pub share_amount: U256,
    pub meta: LogMeta,
}

#[derive(Debug, Clone, PartialEq)]
pub struct YieldTransferEvent {
    pub token: String,
    pub from: String,
    pub to: String,
    pub share_amount: U256,
    pub meta: LogMeta,
}

/// Settled trade, already oriented to the configured pair.
#[derive(Debug, Clone, PartialEq)]
pub struct FxSwapEvent {
    pub trade_id: String,
    pub maker: String,
    pub taker: String,
    pub base_token: String,
    pub quote_token: String,
    pub base_amount: U256,
    pub quote_amount: U256,
    pub rate: Option<f64>,
    pub meta: LogMeta,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    Burn(BurnEvent),
    Mint(MintEvent),
    NativeTransfer(NativeTransferEvent),
    YieldDeposit(YieldFlowEvent),
    YieldWithdraw(YieldFlowEvent),
    YieldTransfer(YieldTransferEvent),
    FxSwapSettled(FxSwapEvent),
}

impl DomainEvent {
    pub fn meta(&self) -> &LogMeta {
        match self {
            DomainEvent::Burn(e) => &e.meta,
            DomainEvent::Mint(e) => &e.meta,
            DomainEvent::NativeTransfer(e) => &e.meta,
            DomainEvent::YieldDeposit(e) | DomainEvent::YieldWithdraw(e) => &e.meta,
            DomainEvent::YieldTransfer(e) => &e.meta,
            DomainEvent::FxSwapSettled(e) => &e.meta,
        }
    }
}

/// Lifecycle of a bridge transfer.
///
/// `Failed` is part of the stored enum but nothing transitions a transfer
/// into it: there is no timeout-based failure detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Pending,
    Completed,
    Failed,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Pending => "pending",
            TransferStatus::Completed => "completed",
            TransferStatus::Failed => "failed",
        }
    }
}

impl FromStr for TransferStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransferStatus::Pending),
            "completed" => Ok(TransferStatus::Completed),
            "failed" => Ok(TransferStatus::Failed),
            other => Err(other.to_string()),
        }
    }
}

/// Bridge transfer row, unique by `(source_chain, nonce)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Transfer {
    pub source_chain: String,
    pub nonce: String,
    pub token: String,
    pub amount: U256,
    pub source_tx_hash: String,
    pub source_address: String,
    pub source_timestamp: DateTime<Utc>,
    pub source_block: u64,
    pub dest_chain: String,
    pub dest_address: String,
    pub dest_tx_hash: Option<String>,
    pub dest_timestamp: Option<DateTime<Utc>>,
    pub dest_block: Option<u64>,
    pub source_domain: u32,
    pub dest_domain: u32,
    pub max_fee: Option<U256>,
    pub protocol_version: BridgeVersion,
    pub status: TransferStatus,
}

impl Transfer {
    /// Seconds between burn and mint, for completed transfers.
    pub fn completion_secs(&self) -> Option<i64> {
        self.dest_timestamp
            .map(|done| (done - self.source_timestamp).num_seconds())
    }
}

/// Identity of a pending transfer that a mint may complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMatch {
    pub source_chain: String,
    pub nonce: String,
    pub source_timestamp: DateTime<Utc>,
}

/// Destination-side fields recorded when a mint completes a transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintCompletion {
    pub dest_tx_hash: String,
    pub dest_timestamp: DateTime<Utc>,
    pub dest_block: u64,
}

/// Native token transfer, unique by `(tx_hash, token)`.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeActivityRecord {
    pub chain: String,
    pub tx_hash: String,
    pub log_index: u64,
    pub token: String,
    pub from_address: String,
    pub to_address: String,
    pub amount: U256,
    pub block_number: u64,
    pub block_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum YieldAction {
    Mint,
    Redeem,
    Transfer,
}

impl YieldAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            YieldAction::Mint => "mint",
            YieldAction::Redeem => "redeem",
            YieldAction::Transfer => "transfer",
        }
    }
}

impl FromStr for YieldAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mint" => Ok(YieldAction::Mint),
            "redeem" => Ok(YieldAction::Redeem),
            "transfer" => Ok(YieldAction::Transfer),
            other => Err(other.to_string()),
        }
    }
}

/// Yield token activity, unique by `(tx_hash, action)`.
#[derive(Debug, Clone, PartialEq)]
pub struct YieldActivityRecord {
    pub chain: String,
    pub tx_hash: String,
    pub action: YieldAction,
    pub token: String,
    pub actor: String,
    pub counterparty: Option<String>,
    pub underlying_amount: Option<U256>,
    pub share_amount: U256,
    pub block_number: u64,
    pub block_time: DateTime<Utc>,
}

/// Settled FX trade, unique by `tx_hash`.
#[derive(Debug, Clone, PartialEq)]
pub struct FxSwapRecord {
    pub chain: String,
    pub tx_hash: String,
    pub trade_id: String,
    pub maker: String,
    pub taker: String,
    pub base_token: String,
    pub quote_token: String,
    pub base_amount: U256,
    pub quote_amount: U256,
    pub rate: Option<f64>,
    pub block_number: u64,
    pub block_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BridgeDailySummary {
    pub date: NaiveDate,
    pub token: String,
    pub chain: String,
    pub direction: Direction,
    pub transfer_count: i64,
    pub completed_count: i64,
    pub volume: U256,
    pub unique_wallets: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouteSummary {
    pub date: NaiveDate,
    pub token: String,
    pub source_chain: String,
    pub dest_chain: String,
    pub transfer_count: i64,
    pub completed_count: i64,
    pub volume: U256,
    pub avg_completion_secs: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NativeHourlySummary {
    pub hour: DateTime<Utc>,
    pub token: String,
    pub transfer_count: i64,
    pub volume: U256,
    pub unique_senders: i64,
    pub unique_receivers: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WalletDailySummary {
    pub date: NaiveDate,
    pub token: String,
    pub wallet: String,
    pub sent_count: i64,
    pub sent_volume: U256,
    pub received_count: i64,
    pub received_volume: U256,
}

#[derive(Debug, Clone, PartialEq)]
pub struct YieldDailySummary {
    pub date: NaiveDate,
    pub action: YieldAction,
    pub event_count: i64,
    pub underlying_volume: U256,
    pub share_volume: U256,
    pub unique_actors: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FxDailySummary {
    pub date: NaiveDate,
    pub swap_count: i64,
    pub base_volume: U256,
    pub quote_volume: U256,
    pub vwap_rate: Option<f64>,
    pub min_rate: Option<f64>,
    pub max_rate: Option<f64>,
    pub unique_traders: i64,
}
