//! Configuration loading from `~/.keyshare/config.toml` with defaults.

use keyshare_types::config::KeyShareConfig;
use std::path::{Path, PathBuf};
use tracing::info;

/// Load configuration from a TOML file, with defaults.
///
/// A missing, unreadable or unparsable file is not fatal: it is logged and
/// the defaults are used instead.
pub fn load_config(path: Option<&Path>) -> KeyShareConfig {
    let config_path = path
        .map(|p| p.to_path_buf())
        .unwrap_or_else(default_config_path);

    if config_path.exists() {
        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match toml::from_str::<KeyShareConfig>(&contents) {
                Ok(config) => {
                    info!(path = %config_path.display(), "Loaded configuration");
                    return config;
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        path = %config_path.display(),
                        "Failed to parse config, using defaults"
                    );
                }
            },
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    path = %config_path.display(),
                    "Failed to read config file, using defaults"
                );
            }
        }
    } else {
        info!(
            path = %config_path.display(),
            "Config file not found, using defaults"
        );
    }

    KeyShareConfig::default()
}

/// Get the default config file path.
pub fn default_config_path() -> PathBuf {
    keyshare_home().join("config.toml")
}

/// Get the default KeyShare home directory.
pub fn keyshare_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".keyshare")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_config_missing_file() {
        let config = load_config(Some(Path::new("/nonexistent/config.toml")));
        assert_eq!(config.log_level, "info");
        assert_eq!(config.key_maintenance.matrix_size, 10);
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(
            f,
            r#"
            log_level = "debug"

            [network]
            bind_addr = "0.0.0.0:17000"

            [key_maintenance]
            matrix_size = 5
            master_key = "0123456789"
            max_keys = 3

            [agent]
            snapshot_path = "/var/lib/keyshare/mib.msgpack"
        "#
        )
        .unwrap();

        let config = load_config(Some(&path));
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.network.bind_addr.port(), 17000);
        assert_eq!(config.key_maintenance.matrix_size, 5);
        assert_eq!(config.key_maintenance.max_keys, 3);
        assert_eq!(config.key_maintenance.key_ttl_secs, 3600);
        assert_eq!(
            config.agent.snapshot_path.as_deref(),
            Some(Path::new("/var/lib/keyshare/mib.msgpack"))
        );
    }

    #[test]
    fn test_invalid_config_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[key_maintenance]\nmatrix_size = \"ten\"\n").unwrap();
        let config = load_config(Some(&path));
        assert_eq!(config.key_maintenance.matrix_size, 10);
    }

    #[test]
    fn test_default_path_under_keyshare_home() {
        let path = default_config_path();
        assert!(path.ends_with(".keyshare/config.toml"));
    }
}
