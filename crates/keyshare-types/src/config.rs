//! Configuration types for the KeyShare agent and manager.
//!
//! Every section has serde defaults, so a partial (or empty) TOML file
//! deserializes into a usable configuration.

use crate::error::{KeyShareError, KeyShareResult};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Default UDP address the agent binds to.
pub const DEFAULT_AGENT_ADDR: &str = "127.0.0.1:16100";

/// Highest code point (exclusive) a key alphabet may reach.
const ALPHABET_CEILING: u32 = 0xD800;

/// Top-level configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyShareConfig {
    /// Log filter used when `RUST_LOG` is unset.
    pub log_level: String,
    pub network: NetworkConfig,
    pub key_maintenance: KeyMaintenanceConfig,
    pub agent: AgentConfig,
    pub manager: ManagerConfig,
}

impl Default for KeyShareConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            network: NetworkConfig::default(),
            key_maintenance: KeyMaintenanceConfig::default(),
            agent: AgentConfig::default(),
            manager: ManagerConfig::default(),
        }
    }
}

/// Transport settings for the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// UDP address the agent listens on.
    pub bind_addr: SocketAddr,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_agent_addr(),
        }
    }
}

/// Matrix and key lifecycle parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyMaintenanceConfig {
    /// Matrix dimension `K`; also the length of every issued key.
    pub matrix_size: usize,
    /// Master seed `M`: exactly `2 * matrix_size` decimal digits. Empty means
    /// "generate one at boot".
    pub master_key: String,
    /// Maintenance interval `T` in milliseconds.
    pub update_interval_ms: u64,
    /// Key time-to-live `V` in seconds.
    pub key_ttl_secs: u64,
    /// Maximum number of concurrently valid keys `X`.
    pub max_keys: u64,
    /// First code point of the key alphabet.
    pub first_char: u32,
    /// Number of characters in the key alphabet.
    pub cardinality: u32,
    /// Build the matrix with one global seeded matrix instead of two derived ones.
    pub single_seed: bool,
    /// Global seed for the single-seed variant.
    pub matrix_seed: u64,
}

impl Default for KeyMaintenanceConfig {
    fn default() -> Self {
        Self {
            matrix_size: 10,
            master_key: String::new(),
            update_interval_ms: 1000,
            key_ttl_secs: 3600,
            max_keys: 16,
            first_char: 33,
            cardinality: 94,
            single_seed: false,
            matrix_seed: 0,
        }
    }
}

impl KeyMaintenanceConfig {
    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }

    /// Check ranges that would make the matrix or the alphabet unusable.
    pub fn validate(&self) -> KeyShareResult<()> {
        if self.matrix_size < 2 {
            return Err(KeyShareError::Config(format!(
                "matrix_size must be at least 2 (got {})",
                self.matrix_size
            )));
        }
        if !self.master_key.is_empty() {
            let expected = 2 * self.matrix_size;
            if self.master_key.len() != expected
                || !self.master_key.bytes().all(|b| b.is_ascii_digit())
            {
                return Err(KeyShareError::Config(format!(
                    "master_key must be exactly {expected} decimal digits"
                )));
            }
        }
        validate_alphabet(i64::from(self.first_char), i64::from(self.cardinality))
    }
}

/// Check that `first_char .. first_char + cardinality` is a run of valid,
/// non-surrogate characters.
pub fn validate_alphabet(first_char: i64, cardinality: i64) -> KeyShareResult<()> {
    if cardinality < 1 {
        return Err(KeyShareError::Config(format!(
            "alphabet cardinality must be positive (got {cardinality})"
        )));
    }
    let end = first_char.checked_add(cardinality);
    if first_char < 0 || end.map_or(true, |end| end > i64::from(ALPHABET_CEILING)) {
        return Err(KeyShareError::Config(format!(
            "alphabet {first_char}+{cardinality} leaves the valid character range"
        )));
    }
    Ok(())
}

/// Agent-side request handling and persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Window in which a reused request id is rejected. Zero disables the check.
    pub duplicate_window_ms: u64,
    /// Where the MIB snapshot is written on shutdown and read on boot.
    pub snapshot_path: Option<PathBuf>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            duplicate_window_ms: 1000,
            snapshot_path: None,
        }
    }
}

impl AgentConfig {
    pub fn duplicate_window(&self) -> Duration {
        Duration::from_millis(self.duplicate_window_ms)
    }
}

/// Manager client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Agent to talk to.
    pub agent_addr: SocketAddr,
    /// How long to wait for a response.
    pub timeout_ms: u64,
    /// Minimum interval before a request id may be reused.
    pub retry_interval_ms: u64,
    /// Fixed local address for the request socket. Keys issued with
    /// visibility 1 are bound to the exact source address, so a manager that
    /// wants to read its own keys back needs a stable one. `None` binds an
    /// ephemeral port per request.
    pub local_addr: Option<SocketAddr>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            agent_addr: default_agent_addr(),
            timeout_ms: 5000,
            retry_interval_ms: 5000,
            local_addr: None,
        }
    }
}

impl ManagerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

fn default_agent_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 16100))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = KeyShareConfig::default();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.network.bind_addr.to_string(), DEFAULT_AGENT_ADDR);
        assert_eq!(config.key_maintenance.matrix_size, 10);
        assert_eq!(config.key_maintenance.cardinality, 94);
        assert!(config.agent.snapshot_path.is_none());
        assert!(config.key_maintenance.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: KeyShareConfig = toml::from_str(
            r#"
            [key_maintenance]
            matrix_size = 4
            master_key = "01234567"

            [manager]
            timeout_ms = 250
        "#,
        )
        .unwrap();
        assert_eq!(config.key_maintenance.matrix_size, 4);
        assert_eq!(config.key_maintenance.key_ttl_secs, 3600);
        assert_eq!(config.manager.timeout(), Duration::from_millis(250));
        assert_eq!(config.manager.retry_interval_ms, 5000);
        assert!(config.manager.local_addr.is_none());
        assert!(config.key_maintenance.validate().is_ok());
    }

    #[test]
    fn test_validate_master_key_length_and_digits() {
        let mut km = KeyMaintenanceConfig {
            matrix_size: 3,
            master_key: "12345".into(),
            ..Default::default()
        };
        assert!(matches!(km.validate(), Err(KeyShareError::Config(_))));
        km.master_key = "12345a".into();
        assert!(km.validate().is_err());
        km.master_key = "123456".into();
        assert!(km.validate().is_ok());
    }

    #[test]
    fn test_validate_alphabet() {
        assert!(validate_alphabet(33, 94).is_ok());
        assert!(validate_alphabet(33, 0).is_err());
        assert!(validate_alphabet(-1, 5).is_err());
        assert!(validate_alphabet(0xD7FF, 2).is_err());
    }

    #[test]
    fn test_validate_alphabet_extreme_values() {
        assert!(matches!(
            validate_alphabet(i64::MAX, 94),
            Err(KeyShareError::Config(_))
        ));
        assert!(validate_alphabet(33, i64::MAX).is_err());
        assert!(validate_alphabet(i64::MAX, i64::MAX).is_err());
        assert!(validate_alphabet(i64::MIN, 94).is_err());
    }

    #[test]
    fn test_small_matrix_rejected() {
        let km = KeyMaintenanceConfig {
            matrix_size: 1,
            ..Default::default()
        };
        assert!(km.validate().is_err());
    }
}
