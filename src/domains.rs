// Bridge domain id -> chain name resolution

use crate::config::IndexerConfig;
use std::collections::HashMap;

/// Well-known bridge domains, used when the destination is not one of the
/// configured chains.
const KNOWN_DOMAINS: &[(u32, &str)] = &[
    (0, "ethereum"),
    (1, "avalanche"),
    (2, "optimism"),
    (3, "arbitrum"),
    (5, "solana"),
    (6, "base"),
    (7, "polygon"),
    (10, "unichain"),
    (11, "linea"),
    (26, "arc"),
];

#[derive(Debug, Clone, Default)]
pub struct DomainRegistry {
    configured: HashMap<u32, String>,
}

impl DomainRegistry {
    pub fn from_config(config: &IndexerConfig) -> Self {
        let configured = config
            .chains
            .iter()
            .filter_map(|chain| chain.bridge_domain.map(|d| (d, chain.name.clone())))
            .collect();
        Self { configured }
    }

    /// Configured chain first, then the static table, then a placeholder
    /// id so the transfer is still recorded.
    pub fn resolve(&self, domain: u32) -> String {
        if let Some(name) = self.configured.get(&domain) {
            return name.clone();
        }
        KNOWN_DOMAINS
            .iter()
            .find(|(d, _)| *d == domain)
            .map(|(_, name)| name.to_string())
            .unwrap_or_else(|| format!("domain-{}", domain))
    }
}
