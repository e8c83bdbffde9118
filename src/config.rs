//! Wallet configuration
//!
//! Aggregates the indexer endpoint list, fee rate, cache TTL, and
//! consolidation thresholds behind a single `Default`-able struct.

use std::time::Duration;

/// Network selection; affects WIF network byte and nothing else (the
/// CashAddr HRP is `ecash` on both — testnet XEC reuses the same prefix
/// space as mainnet in practice, only the WIF version byte differs).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Mainnet,
    Testnet,
}

impl Network {
    pub(crate) fn wif_version_byte(self) -> u8 {
        match self {
            Network::Mainnet => 0x80,
            Network::Testnet => 0xEF,
        }
    }
}

/// The default Chronik endpoints enumerated in the source.
pub const DEFAULT_CHRONIK_ENDPOINTS: &[&str] = &[
    "https://chronik.e.cash",
    "https://chronik1.fabien.cash",
    "https://chronik2.fabien.cash",
    "https://chronik.pay2stay.com/xec",
    "https://chronik-native1.fabien.cash",
    "https://chronik-native2.fabien.cash",
    "https://chronik.dragon0.com",
];

/// Default fee rate, satoshis per byte.
pub const DEFAULT_SATS_PER_BYTE: f64 = 1.2;

/// Dust limit, in satoshis, below which a non-data P2PKH output is rejected.
pub const DUST_LIMIT_SATS: u64 = 546;

/// Default UTXO/balance cache TTL.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(30);

/// Default consolidation value threshold, in satoshis.
pub const DEFAULT_CONSOLIDATION_THRESHOLD_SATS: u64 = 100_000;

/// Default maximum number of inputs per consolidation batch.
pub const DEFAULT_MAX_CONSOLIDATION_INPUTS: usize = 200;

/// Default maximum txids accepted per indexer batch lookup.
pub const DEFAULT_TX_BATCH_SIZE: usize = 20;

/// Default maximum addresses dispatched in parallel per indexer batch.
pub const DEFAULT_ADDRESS_BATCH_SIZE: usize = 20;

/// Default OP_RETURN memo protocol tag.
pub const DEFAULT_OP_RETURN_PREFIX: &str = "6d02";

/// Maximum total OP_RETURN payload size, in bytes (prefix + message).
pub const MAX_OP_RETURN_BYTES: usize = 220;

#[derive(Debug, Clone)]
pub struct WalletConfig {
    /// Ordered list of equivalent indexer endpoints, tried in order on failover.
    pub indexer_endpoints: Vec<String>,
    pub network: Network,
    pub sats_per_byte: f64,
    pub cache_ttl: Duration,
    pub dust_attack_threshold_sats: u64,
    pub consolidation_threshold_sats: u64,
    pub max_consolidation_inputs: usize,
    pub tx_batch_size: usize,
    pub address_batch_size: usize,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            indexer_endpoints: DEFAULT_CHRONIK_ENDPOINTS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            network: Network::Mainnet,
            sats_per_byte: DEFAULT_SATS_PER_BYTE,
            cache_ttl: DEFAULT_CACHE_TTL,
            dust_attack_threshold_sats: DUST_LIMIT_SATS,
            consolidation_threshold_sats: DEFAULT_CONSOLIDATION_THRESHOLD_SATS,
            max_consolidation_inputs: DEFAULT_MAX_CONSOLIDATION_INPUTS,
            tx_batch_size: DEFAULT_TX_BATCH_SIZE,
            address_batch_size: DEFAULT_ADDRESS_BATCH_SIZE,
        }
    }
}

impl WalletConfig {
    pub fn with_endpoints(mut self, endpoints: Vec<String>) -> Self {
        self.indexer_endpoints = endpoints;
        self
    }

    pub fn with_network(mut self, network: Network) -> Self {
        self.network = network;
        self
    }

    pub fn with_sats_per_byte(mut self, sats_per_byte: f64) -> Self {
        self.sats_per_byte = sats_per_byte;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_spec_constants() {
        let cfg = WalletConfig::default();
        assert_eq!(cfg.indexer_endpoints.len(), 7);
        assert_eq!(cfg.dust_attack_threshold_sats, 546);
        assert_eq!(cfg.max_consolidation_inputs, 200);
    }

    #[test]
    fn builder_overrides_fields() {
        let cfg = WalletConfig::default()
            .with_sats_per_byte(2.0)
            .with_network(Network::Testnet);
        assert_eq!(cfg.sats_per_byte, 2.0);
        assert_eq!(cfg.network, Network::Testnet);
    }
}
