//! Relay settings: room capacity, timeouts and dedup bounds.
//! Loaded from TOML at startup by the relay binary.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

/// Relay configuration. Every field has a default, so an empty file is valid.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct RelayConfig {
    /// Shortest room id accepted by `join`.
    pub min_room_id_len: usize,
    pub max_players: usize,
    /// Rooms with no traffic for this long are deleted.
    pub idle_ttl_secs: u64,
    /// Empty rooms are deleted after this long unless someone rejoins.
    pub empty_grace_secs: u64,
    pub sweep_interval_secs: u64,
    pub processed_cap: usize,
    pub processed_keep: usize,
    /// Outbound message buffer per connection.
    pub channel_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            min_room_id_len: 4,
            max_players: 2,
            idle_ttl_secs: 3600,
            empty_grace_secs: 60,
            sweep_interval_secs: 300,
            processed_cap: 100,
            processed_keep: 50,
            channel_capacity: 64,
        }
    }
}

impl RelayConfig {
    pub fn empty_grace(&self) -> Duration {
        Duration::from_secs(self.empty_grace_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

/// Load the relay config from a TOML file at the given path.
pub fn load_config(path: &Path) -> Result<RelayConfig, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    toml::from_str(&content).map_err(|e| format!("Failed to parse {}: {}", path.display(), e))
}

/// Try to load the config from well-known paths, returning defaults if none found.
pub fn load_default_config() -> RelayConfig {
    let candidates = ["relay.toml", "../relay.toml", "/etc/azul/relay.toml"];
    for path in &candidates {
        let p = Path::new(path);
        if p.exists() {
            match load_config(p) {
                Ok(config) => {
                    tracing::info!(path = %p.display(), "loaded relay config");
                    return config;
                }
                Err(e) => {
                    tracing::warn!(path = %p.display(), error = %e, "failed to load relay config");
                }
            }
        }
    }
    tracing::info!("no relay.toml found, using built-in defaults");
    RelayConfig::default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "empty_grace_secs = 5\nmax_players = 2").unwrap();
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.empty_grace_secs, 5);
        assert_eq!(config.idle_ttl_secs, 3600);
        assert_eq!(config.processed_cap, 100);
    }

    #[test]
    fn test_empty_file_is_default() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert_eq!(load_config(file.path()).unwrap(), RelayConfig::default());
    }

    #[test]
    fn test_errors_name_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        let err = load_config(&missing).unwrap_err();
        assert!(err.contains("missing.toml"));

        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "idle_ttl_secs = \"soon\"").unwrap();
        let err = load_config(&bad).unwrap_err();
        assert!(err.starts_with("Failed to parse"));
    }
}
