//! Indexer configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). Every numeric key falls back to its
//! default when missing or unparsable.
//!
//! Chains are discovered from the known network names: a network is
//! configured when both `{NAME}_RPC_URL` and `{NAME}_STAKING_CONTRACT` are
//! set.

use std::net::SocketAddr;

use crate::domain::ChainId;
use crate::error::IndexerError;

/// Networks the indexer knows how to configure, with their default chain
/// ids.
pub const KNOWN_CHAINS: [(&str, u64); 4] = [
    ("ethereum", 1),
    ("arbitrum", 42_161),
    ("base", 8_453),
    ("sepolia", 11_155_111),
];

/// PostgreSQL connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// PostgreSQL connection string.
    pub url: String,
    /// Maximum number of database connections in the pool.
    pub max_connections: u32,
    /// Minimum idle connections in the pool.
    pub min_connections: u32,
    /// Timeout in seconds for acquiring a database connection.
    pub connect_timeout_secs: u64,
}

/// One configured network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainConfig {
    /// Partition key (`"sepolia"`, ...).
    pub name: ChainId,
    /// EVM chain id.
    pub chain_id: u64,
    /// JSON-RPC endpoint.
    pub rpc_url: String,
    /// Staking contract address.
    pub staking_contract: String,
    /// Maximum blocks per batch.
    pub batch_size: u64,
    /// Seconds between polls once caught up.
    pub poll_interval_secs: u64,
    /// Cursor value for a fresh database.
    pub start_block: u64,
}

/// Top-level indexer configuration.
///
/// Loaded once at startup via [`IndexerConfig::from_env`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexerConfig {
    /// Socket address to bind the HTTP server to (e.g. `0.0.0.0:8000`).
    pub listen_addr: SocketAddr,

    /// Serve the read API. Engines run either way.
    pub api_enabled: bool,

    /// Database settings; `None` runs against the in-memory ledger.
    pub database: Option<DatabaseConfig>,

    /// Chain used by API requests that do not name one.
    pub default_chain: ChainId,

    /// Configured networks.
    pub chains: Vec<ChainConfig>,

    /// Attempts per block batch, including the first.
    pub retry_attempts: u32,

    /// Wait before the second attempt of a batch.
    pub retry_min_backoff_secs: u64,

    /// Upper bound on any wait between attempts.
    pub retry_max_backoff_secs: u64,

    /// Wait after a batch exhausted its attempts.
    pub failure_cooldown_secs: u64,
}

impl IndexerConfig {
    /// Loads configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::Config`] if `LISTEN_ADDR` is set but cannot
    /// be parsed, or if `INDEXER_CHAINS` names an unknown network.
    pub fn from_env() -> Result<Self, IndexerError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Same as [`IndexerConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, IndexerError> {
        let listen_addr: SocketAddr = lookup("LISTEN_ADDR")
            .unwrap_or_else(|| "0.0.0.0:8000".to_string())
            .parse()
            .map_err(|e| IndexerError::Config(format!("LISTEN_ADDR: {e}")))?;

        let database = lookup("DATABASE_URL")
            .filter(|url| !url.trim().is_empty())
            .map(|url| DatabaseConfig {
                url,
                max_connections: parse_env(&lookup, "DATABASE_MAX_CONNECTIONS", 10),
                min_connections: parse_env(&lookup, "DATABASE_MIN_CONNECTIONS", 2),
                connect_timeout_secs: parse_env(&lookup, "DATABASE_CONNECT_TIMEOUT_SECS", 5),
            });

        let batch_size = parse_env(&lookup, "INDEXER_BATCH_SIZE", 1_000);
        let poll_interval_secs = parse_env(&lookup, "INDEXER_POLL_INTERVAL", 15);
        let start_block = parse_env(&lookup, "INDEX_START_BLOCK", 0);

        let allow_list = lookup("INDEXER_CHAINS").map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(ChainId::new)
                .collect::<Vec<_>>()
        });
        if let Some(names) = &allow_list {
            for name in names {
                if !KNOWN_CHAINS.iter().any(|(known, _)| *known == name.as_str()) {
                    return Err(IndexerError::Config(format!(
                        "INDEXER_CHAINS: unknown chain {name}"
                    )));
                }
            }
        }

        let mut chains = Vec::new();
        for (name, default_chain_id) in KNOWN_CHAINS {
            let id = ChainId::new(name);
            if allow_list.as_ref().is_some_and(|names| !names.contains(&id)) {
                continue;
            }
            let prefix = name.to_uppercase();
            let key = |suffix: &str| format!("{prefix}_{suffix}");

            let rpc_url = lookup(&key("RPC_URL")).filter(|v| !v.trim().is_empty());
            let contract = lookup(&key("STAKING_CONTRACT")).filter(|v| !v.trim().is_empty());
            let (Some(rpc_url), Some(staking_contract)) = (rpc_url, contract) else {
                continue;
            };

            chains.push(ChainConfig {
                name: id,
                chain_id: parse_env(&lookup, &key("CHAIN_ID"), default_chain_id),
                rpc_url,
                staking_contract,
                batch_size: parse_env(&lookup, &key("BATCH_SIZE"), batch_size),
                poll_interval_secs: parse_env(&lookup, &key("POLL_INTERVAL"), poll_interval_secs),
                start_block: parse_env(&lookup, &key("START_BLOCK"), start_block),
            });
        }

        Ok(Self {
            listen_addr,
            api_enabled: parse_env_bool(&lookup, "API_ENABLED", true),
            database,
            default_chain: ChainId::new(
                &lookup("DEFAULT_CHAIN").unwrap_or_else(|| "sepolia".to_string()),
            ),
            chains,
            retry_attempts: parse_env(&lookup, "INDEXER_RETRY_ATTEMPTS", 3),
            retry_min_backoff_secs: parse_env(&lookup, "INDEXER_RETRY_MIN_BACKOFF_SECS", 4),
            retry_max_backoff_secs: parse_env(&lookup, "INDEXER_RETRY_MAX_BACKOFF_SECS", 10),
            failure_cooldown_secs: parse_env(&lookup, "INDEXER_FAILURE_COOLDOWN_SECS", 5),
        })
    }

    /// Returns the configuration for `chain`, if configured.
    #[must_use]
    pub fn chain(&self, chain: &ChainId) -> Option<&ChainConfig> {
        self.chains.iter().find(|c| &c.name == chain)
    }
}

/// Parses a variable as `T`, returning `default` on missing or invalid
/// values.
fn parse_env<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Parses a variable as a boolean. Accepts `"true"`, `"1"`, `"false"`,
/// `"0"` (case-insensitive). Returns `default` otherwise.
fn parse_env_bool(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    match lookup(key).map(|v| v.trim().to_lowercase()).as_deref() {
        Some("true" | "1") => true,
        Some("false" | "0") => false,
        _ => default,
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<IndexerConfig, IndexerError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        IndexerConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply_without_environment() {
        let Ok(config) = load(&[]) else {
            panic!("empty environment is valid");
        };
        assert_eq!(config.listen_addr.port(), 8000);
        assert!(config.api_enabled);
        assert!(config.database.is_none());
        assert!(config.chains.is_empty());
        assert_eq!(config.default_chain.as_str(), "sepolia");
        assert_eq!(config.retry_attempts, 3);
        assert_eq!(config.retry_min_backoff_secs, 4);
        assert_eq!(config.retry_max_backoff_secs, 10);
        assert_eq!(config.failure_cooldown_secs, 5);
    }

    #[test]
    fn chain_requires_rpc_and_contract() {
        let Ok(config) = load(&[
            ("SEPOLIA_RPC_URL", "http://localhost:8545"),
            ("SEPOLIA_STAKING_CONTRACT", "0x0000000000000000000000000000000000000001"),
            ("BASE_RPC_URL", "http://base"),
        ]) else {
            panic!("valid config");
        };
        let [sepolia] = config.chains.as_slice() else {
            panic!("only sepolia is complete");
        };
        assert_eq!(sepolia.name.as_str(), "sepolia");
        assert_eq!(sepolia.chain_id, 11_155_111);
        assert_eq!(sepolia.batch_size, 1_000);
        assert_eq!(sepolia.poll_interval_secs, 15);
    }

    #[test]
    fn per_chain_overrides_beat_globals() {
        let Ok(config) = load(&[
            ("INDEXER_BATCH_SIZE", "500"),
            ("INDEX_START_BLOCK", "42"),
            ("BASE_RPC_URL", "http://base"),
            ("BASE_STAKING_CONTRACT", "0x01"),
            ("BASE_BATCH_SIZE", "50"),
            ("BASE_CHAIN_ID", "84532"),
            ("ARBITRUM_RPC_URL", "http://arb"),
            ("ARBITRUM_STAKING_CONTRACT", "0x02"),
        ]) else {
            panic!("valid config");
        };
        let Some(base) = config.chain(&ChainId::new("base")) else {
            panic!("base configured");
        };
        assert_eq!(base.batch_size, 50);
        assert_eq!(base.start_block, 42);
        assert_eq!(base.chain_id, 84_532);
        let Some(arbitrum) = config.chain(&ChainId::new("ARBITRUM")) else {
            panic!("arbitrum configured");
        };
        assert_eq!(arbitrum.batch_size, 500);
    }

    #[test]
    fn allow_list_filters_and_validates() {
        let vars = [
            ("BASE_RPC_URL", "http://base"),
            ("BASE_STAKING_CONTRACT", "0x01"),
            ("SEPOLIA_RPC_URL", "http://sepolia"),
            ("SEPOLIA_STAKING_CONTRACT", "0x02"),
            ("INDEXER_CHAINS", " Sepolia "),
        ];
        let Ok(config) = load(&vars) else {
            panic!("valid config");
        };
        assert_eq!(config.chains.len(), 1);
        assert!(config.chain(&ChainId::new("base")).is_none());

        assert!(matches!(
            load(&[("INDEXER_CHAINS", "solana")]),
            Err(IndexerError::Config(_))
        ));
    }

    #[test]
    fn invalid_values_fall_back_or_fail() {
        let Ok(config) = load(&[
            ("INDEXER_RETRY_ATTEMPTS", "many"),
            ("API_ENABLED", "FALSE"),
            ("DATABASE_URL", "postgres://localhost/stakeflow"),
        ]) else {
            panic!("valid config");
        };
        assert_eq!(config.retry_attempts, 3);
        assert!(!config.api_enabled);
        let Some(database) = config.database else {
            panic!("database configured");
        };
        assert_eq!(database.max_connections, 10);

        assert!(matches!(
            load(&[("LISTEN_ADDR", "not-an-address")]),
            Err(IndexerError::Config(_))
        ));
    }
}
