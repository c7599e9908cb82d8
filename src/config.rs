// Indexer configuration: YAML file plus environment overrides

use crate::error::ConfigError;
use crate::models::SourceKind;
use alloy_primitives::Address;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "indexer.yaml";

/// Used when a chain has no configured block time and no entry in
/// `KNOWN_BLOCK_TIMES`.
const FALLBACK_BLOCK_TIME_SECS: f64 = 12.0;

/// Average block times by chain-name prefix.
const KNOWN_BLOCK_TIMES: &[(&str, f64)] = &[
    ("ethereum", 12.0),
    ("sepolia", 12.0),
    ("arbitrum", 0.25),
    ("base", 2.0),
    ("optimism", 2.0),
    ("avalanche", 2.0),
    ("polygon", 2.0),
    ("unichain", 1.0),
    ("linea", 2.0),
    ("arc", 0.5),
];

fn default_batch_size() -> u64 {
    2000
}

fn default_poll_interval_ms() -> u64 {
    15_000
}

fn default_sync_days() -> u64 {
    7
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndexerConfig {
    #[serde(default)]
    pub database_url: Option<String>,
    /// Max blocks fetched per source per sweep
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Cold-start lookback when a source has no cursor yet
    #[serde(default = "default_sync_days")]
    pub sync_days: u64,
    /// Blocks to stay behind the current head
    #[serde(default)]
    pub confirmations: u64,
    pub chains: Vec<ChainConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub name: String,
    pub rpc_url: String,
    /// Bridge-protocol domain id of this chain
    #[serde(default)]
    pub bridge_domain: Option<u32>,
    #[serde(default)]
    pub block_time_secs: Option<f64>,
    #[serde(default)]
    pub tokens: BTreeMap<String, TokenConfig>,
    #[serde(default)]
    pub cctp: Option<CctpConfig>,
    #[serde(default)]
    pub gateways: Vec<Address>,
    #[serde(default)]
    pub native_tokens: Vec<String>,
    #[serde(default)]
    pub yield_token: Option<YieldConfig>,
    #[serde(default)]
    pub fx: Option<FxConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    pub address: Address,
    #[serde(default = "default_decimals")]
    pub decimals: u8,
}

fn default_decimals() -> u8 {
    6
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CctpConfig {
    #[serde(default)]
    pub token_messenger_v1: Option<Address>,
    #[serde(default)]
    pub token_messenger_v2: Option<Address>,
}

impl CctpConfig {
    pub fn is_configured(&self) -> bool {
        self.token_messenger_v1.is_some() || self.token_messenger_v2.is_some()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct YieldConfig {
    pub symbol: String,
    pub token: Address,
    pub teller: Address,
    #[serde(default = "default_decimals")]
    pub decimals: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FxConfig {
    pub escrow: Address,
    pub base: String,
    pub quote: String,
}

impl IndexerConfig {
    /// Load the YAML file at `path`, apply environment overrides and validate.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        let mut config = Self::from_yaml(&raw)?;
        if let Ok(url) = std::env::var("DATABASE_URL") {
            config.database_url = Some(url);
        }
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        let config: IndexerConfig = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn chain(&self, name: &str) -> Option<&ChainConfig> {
        self.chains.iter().find(|c| c.name == name)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be positive".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "poll_interval_ms must be positive".into(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        let mut domains = std::collections::HashMap::new();
        for chain in &self.chains {
            if !seen.insert(chain.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate chain name {}",
                    chain.name
                )));
            }
            // burns resolve their destination by domain, so it must name one chain
            if let Some(domain) = chain.bridge_domain {
                if let Some(other) = domains.insert(domain, chain.name.as_str()) {
                    return Err(ConfigError::Invalid(format!(
                        "bridge_domain {} is shared by {} and {}",
                        domain, other, chain.name
                    )));
                }
            }
            chain.validate()?;
        }
        Ok(())
    }
}

impl ChainConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(secs) = self.block_time_secs {
            if !(secs > 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "{}: block_time_secs must be positive",
                    self.name
                )));
            }
        }
        if self.cctp.as_ref().is_some_and(CctpConfig::is_configured) && self.bridge_domain.is_none()
        {
            return Err(ConfigError::Invalid(format!(
                "{}: cctp contracts configured without bridge_domain",
                self.name
            )));
        }
        for symbol in &self.native_tokens {
            if !self.tokens.contains_key(symbol) {
                return Err(ConfigError::Invalid(format!(
                    "{}: native token {} is not listed under tokens",
                    self.name, symbol
                )));
            }
        }
        if let Some(fx) = &self.fx {
            for symbol in [&fx.base, &fx.quote] {
                if !self.tokens.contains_key(symbol) {
                    return Err(ConfigError::Invalid(format!(
                        "{}: fx token {} is not listed under tokens",
                        self.name, symbol
                    )));
                }
            }
            if fx.base == fx.quote {
                return Err(ConfigError::Invalid(format!(
                    "{}: fx base and quote must differ",
                    self.name
                )));
            }
        }
        Ok(())
    }

    /// Configured block time, else the chain-name table, else 12s.
    pub fn block_time(&self) -> f64 {
        if let Some(secs) = self.block_time_secs {
            return secs;
        }
        let name = self.name.to_lowercase();
        KNOWN_BLOCK_TIMES
            .iter()
            .find(|(prefix, _)| name.starts_with(prefix))
            .map(|(_, secs)| *secs)
            .unwrap_or(FALLBACK_BLOCK_TIME_SECS)
    }

    /// Symbol of the configured token at `address`, if any.
    pub fn resolve_token(&self, address: &Address) -> Option<&str> {
        self.tokens
            .iter()
            .find(|(_, token)| token.address == *address)
            .map(|(symbol, _)| symbol.as_str())
    }

    pub fn token(&self, symbol: &str) -> Option<&TokenConfig> {
        self.tokens.get(symbol)
    }

    /// Bridge contracts configured on this chain.
    pub fn bridge_contracts(&self) -> Vec<Address> {
        self.cctp
            .iter()
            .flat_map(|c| [c.token_messenger_v1, c.token_messenger_v2])
            .flatten()
            .collect()
    }

    /// Source kinds this chain has enough configuration for.
    pub fn sources(&self) -> Vec<SourceKind> {
        let mut kinds = Vec::new();
        if self.cctp.as_ref().is_some_and(CctpConfig::is_configured) {
            kinds.push(SourceKind::Cctp);
        }
        if !self.native_tokens.is_empty() {
            kinds.push(SourceKind::Native);
        }
        if self.yield_token.is_some() {
            kinds.push(SourceKind::Yield);
        }
        if self.fx.is_some() {
            kinds.push(SourceKind::Fx);
        }
        kinds
    }
}
