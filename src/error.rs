// Error taxonomy for the indexer

use thiserror::Error;

/// Failures talking to a chain JSON-RPC endpoint. Always fatal to the
/// current sweep of the affected source, never to the process.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("RPC error: {message} ({code})")]
    Rpc { code: i64, message: String },

    #[error("no result in RPC response for {0}")]
    EmptyResult(&'static str),

    #[error("block {0} not found")]
    MissingBlock(u64),

    #[error("block timestamp {0} out of range")]
    InvalidTimestamp(u64),
}

/// A single log could not be turned into a domain event.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("abi decode failed: {0}")]
    Abi(#[from] alloy_sol_types::Error),

    #[error("log is missing {0}")]
    MissingField(&'static str),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt value in column {column}: {value}")]
    Corrupt { column: &'static str, value: String },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Outcome of a failed sweep. The cursor of the source is left untouched.
#[derive(Debug, Error)]
pub enum SweepError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("source task aborted: {0}")]
    Aborted(String),
}
