//! Configuration management for Floodgate.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

use crate::error::{FloodgateError, Result};
use crate::p2p::NodeId;

/// Messages per second accepted from one address when no configuration is given.
pub const DEFAULT_LIMIT_PER_ADDRESS: u64 = 10;

/// Messages per second accepted from one identity when no configuration is given.
pub const DEFAULT_LIMIT_PER_IDENTITY: u64 = 5;

/// Prefix for environment overrides read by [`PeerRateLimiterConfig::load`].
pub const ENV_PREFIX: &str = "FLOODGATE";

/// Rate limiting policy for inbound peer messages.
///
/// A limit of `0` disables that dimension. `Default` is the explicit
/// "unlimited, nothing whitelisted" policy; use [`recommended`](Self::recommended)
/// for the built-in limits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRateLimiterConfig {
    /// Messages per second allowed from a single network address
    #[serde(default)]
    pub limit_per_address: u64,

    /// Messages per second allowed from a single peer identity
    #[serde(default)]
    pub limit_per_identity: u64,

    /// Addresses that are never throttled
    #[serde(default)]
    pub whitelisted_addresses: Vec<String>,

    /// Peer identities that are never throttled
    #[serde(default)]
    pub whitelisted_identities: Vec<NodeId>,
}

impl PeerRateLimiterConfig {
    /// The limits applied when the host supplies no configuration.
    pub fn recommended() -> Self {
        Self {
            limit_per_address: DEFAULT_LIMIT_PER_ADDRESS,
            limit_per_identity: DEFAULT_LIMIT_PER_IDENTITY,
            whitelisted_addresses: Vec::new(),
            whitelisted_identities: Vec::new(),
        }
    }

    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading peer rate limiter configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| {
            FloodgateError::Config(format!("Failed to parse peer rate limiter config: {}", e))
        })
    }

    /// Load configuration from a file, then apply `FLOODGATE_*` environment
    /// overrides (e.g. `FLOODGATE_LIMIT_PER_ADDRESS=20`).
    ///
    /// The file format is picked from its extension.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let settings = ::config::Config::builder()
            .add_source(::config::File::from(path))
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("whitelisted_addresses")
                    .with_list_parse_key("whitelisted_identities"),
            )
            .build()
            .map_err(|e| FloodgateError::Config(e.to_string()))?;

        let config: Self = settings
            .try_deserialize()
            .map_err(|e| FloodgateError::Config(e.to_string()))?;

        info!(
            path = %path.display(),
            limit_per_address = config.limit_per_address,
            limit_per_identity = config.limit_per_identity,
            whitelisted_addresses = config.whitelisted_addresses.len(),
            whitelisted_identities = config.whitelisted_identities.len(),
            "Configuration loaded"
        );
        Ok(config)
    }
}

/// Precomputed whitelist sets for O(1) membership checks.
#[derive(Debug, Clone, Default)]
pub struct Whitelist {
    addresses: HashSet<String>,
    identities: HashSet<NodeId>,
}

impl Whitelist {
    /// Build the sets from a configuration.
    pub fn from_config(config: &PeerRateLimiterConfig) -> Self {
        Self {
            addresses: config.whitelisted_addresses.iter().cloned().collect(),
            identities: config.whitelisted_identities.iter().copied().collect(),
        }
    }

    /// Whether `address` is exempt from throttling.
    pub fn contains_address(&self, address: &str) -> bool {
        self.addresses.contains(address)
    }

    /// Whether `id` is exempt from throttling.
    pub fn contains_identity(&self, id: &NodeId) -> bool {
        self.identities.contains(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_unlimited() {
        let config = PeerRateLimiterConfig::default();
        assert_eq!(config.limit_per_address, 0);
        assert_eq!(config.limit_per_identity, 0);
        assert!(config.whitelisted_addresses.is_empty());
        assert!(config.whitelisted_identities.is_empty());
    }

    #[test]
    fn test_recommended_limits() {
        let config = PeerRateLimiterConfig::recommended();
        assert_eq!(config.limit_per_address, DEFAULT_LIMIT_PER_ADDRESS);
        assert_eq!(config.limit_per_identity, DEFAULT_LIMIT_PER_IDENTITY);
    }

    #[test]
    fn test_parse_yaml() {
        let id = NodeId::from_prefix(&[0xaa, 0xbb, 0xcc]);
        let yaml = format!(
            r#"
limit_per_address: 20
limit_per_identity: 8
whitelisted_addresses:
  - "127.0.0.1"
  - "<nil>"
whitelisted_identities:
  - "{}"
"#,
            id
        );
        let config = PeerRateLimiterConfig::from_yaml(&yaml).unwrap();
        assert_eq!(config.limit_per_address, 20);
        assert_eq!(config.limit_per_identity, 8);
        assert_eq!(config.whitelisted_addresses, vec!["127.0.0.1", "<nil>"]);
        assert_eq!(config.whitelisted_identities, vec![id]);
    }

    #[test]
    fn test_parse_partial_yaml_defaults_missing_fields() {
        let config = PeerRateLimiterConfig::from_yaml("limit_per_identity: 3\n").unwrap();
        assert_eq!(config.limit_per_address, 0);
        assert_eq!(config.limit_per_identity, 3);
    }

    #[test]
    fn test_parse_rejects_bad_identity() {
        let yaml = r#"
whitelisted_identities:
  - "not-hex"
"#;
        let result = PeerRateLimiterConfig::from_yaml(yaml);
        assert!(matches!(result, Err(FloodgateError::Config(_))));
    }

    #[test]
    fn test_from_file_missing() {
        let result = PeerRateLimiterConfig::from_file("/nonexistent/floodgate.yaml");
        assert!(matches!(result, Err(FloodgateError::Io(_))));
    }

    // Environment variables are process-wide, so both layers are checked in
    // one test.
    #[test]
    fn test_load_file_then_env_overrides() {
        let file_id = NodeId::from_prefix(&[0xaa]);
        let env_ids = [NodeId::from_prefix(&[0xbb]), NodeId::from_prefix(&[0xcc, 0xdd])];

        let path = std::env::temp_dir().join(format!("floodgate-load-{}.yaml", std::process::id()));
        let yaml = format!(
            "limit_per_address: 42\nlimit_per_identity: 7\nwhitelisted_identities:\n  - \"{}\"\n",
            file_id
        );
        std::fs::write(&path, yaml).unwrap();

        let from_file = PeerRateLimiterConfig::load(&path).unwrap();
        assert_eq!(from_file.limit_per_address, 42);
        assert_eq!(from_file.limit_per_identity, 7);
        assert_eq!(from_file.whitelisted_identities, vec![file_id]);

        std::env::set_var("FLOODGATE_LIMIT_PER_ADDRESS", "99");
        std::env::set_var(
            "FLOODGATE_WHITELISTED_IDENTITIES",
            format!("{},{}", env_ids[0], env_ids[1]),
        );
        std::env::set_var("FLOODGATE_WHITELISTED_ADDRESSES", "10.0.0.1,10.0.0.2");

        let layered = PeerRateLimiterConfig::load(&path);

        std::env::remove_var("FLOODGATE_LIMIT_PER_ADDRESS");
        std::env::remove_var("FLOODGATE_WHITELISTED_IDENTITIES");
        std::env::remove_var("FLOODGATE_WHITELISTED_ADDRESSES");
        std::fs::remove_file(&path).ok();

        let layered = layered.unwrap();
        assert_eq!(layered.limit_per_address, 99);
        assert_eq!(layered.limit_per_identity, 7);
        assert_eq!(layered.whitelisted_identities, env_ids.to_vec());
        assert_eq!(layered.whitelisted_addresses, vec!["10.0.0.1", "10.0.0.2"]);
    }

    #[test]
    fn test_whitelist_membership() {
        let id = NodeId::from_prefix(&[1, 2, 3]);
        let whitelist = Whitelist::from_config(&PeerRateLimiterConfig {
            whitelisted_addresses: vec!["10.0.0.1".to_string()],
            whitelisted_identities: vec![id],
            ..Default::default()
        });

        assert!(whitelist.contains_address("10.0.0.1"));
        assert!(!whitelist.contains_address("10.0.0.2"));
        assert!(whitelist.contains_identity(&id));
        assert!(!whitelist.contains_identity(&NodeId::from_prefix(&[9])));
    }
}
