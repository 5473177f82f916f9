//! Relay configuration
//!
//! Read once at startup and shared read-only (`Arc<RelayConfig>`) with the
//! listener and every connection.
//!
//! Files ending in `.toml` are parsed as TOML, anything else as JSON. The
//! legacy keys `mgo_host`/`mgo_port` and numeric `log_type` (`0` stdout,
//! `1` file) are still accepted.
//!
//! ## Environment Variables
//!
//! - `SOLILOG_LISTEN_PORT` - Relay listen port
//! - `SOLILOG_STORE_HOST` - Backing store host
//! - `SOLILOG_STORE_PORT` - Backing store port
//! - `SOLILOG_LOG_DIR` - Directory for daily log files
//!
//! These can be set in a `.env` file next to the configuration file; a
//! malformed `.env` is a configuration error.

use serde::{de, Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/solilog.json";

pub const ENV_LISTEN_PORT: &str = "SOLILOG_LISTEN_PORT";
pub const ENV_STORE_HOST: &str = "SOLILOG_STORE_HOST";
pub const ENV_STORE_PORT: &str = "SOLILOG_STORE_PORT";
pub const ENV_LOG_DIR: &str = "SOLILOG_LOG_DIR";

/// Where diagnostic lines go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogMode {
    #[default]
    Stdout,
    /// `<log_dir>/<YYYYMM>/<D>.log`
    File,
}

impl<'de> Deserialize<'de> for LogMode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Code(i64),
            Name(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Code(0) => Ok(LogMode::Stdout),
            Raw::Code(1) => Ok(LogMode::File),
            Raw::Code(other) => Err(de::Error::custom(format!(
                "unknown log_type {}, expected 0 (stdout) or 1 (file)",
                other
            ))),
            Raw::Name(name) => match name.to_ascii_lowercase().as_str() {
                "stdout" => Ok(LogMode::Stdout),
                "file" => Ok(LogMode::File),
                _ => Err(de::Error::custom(format!(
                    "unknown log_type '{}', expected \"stdout\" or \"file\"",
                    name
                ))),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Port the relay accepts clients on
    pub listen_port: u16,
    #[serde(alias = "mgo_host")]
    pub store_host: String,
    #[serde(alias = "mgo_port")]
    pub store_port: u16,
    /// Database credentials are checked against
    #[serde(default = "default_admin_database")]
    pub admin_database: String,
    #[serde(default)]
    pub log_type: LogMode,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    #[serde(default = "default_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub insert_timeout_ms: u64,
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,
}

fn default_admin_database() -> String {
    "_system".to_string()
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("./log")
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_max_frame_size() -> usize {
    solilog_client::protocol::MAX_FRAME_SIZE
}

impl RelayConfig {
    pub fn new(listen_port: u16, store_host: &str, store_port: u16) -> Self {
        Self {
            listen_port,
            store_host: store_host.to_string(),
            store_port,
            admin_database: default_admin_database(),
            log_type: LogMode::default(),
            log_dir: default_log_dir(),
            connect_timeout_ms: default_timeout_ms(),
            insert_timeout_ms: default_timeout_ms(),
            max_frame_size: default_max_frame_size(),
        }
    }

    /// Load the configuration file, then apply `.env` and environment
    /// overrides.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if let Some(dir) = path.parent() {
            let env_path = dir.join(".env");
            if env_path.exists() {
                dotenvy::from_path(&env_path).map_err(|e| {
                    anyhow::anyhow!("Cannot read {}: {}", env_path.display(), e)
                })?;
            }
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!("Cannot read configuration file {}: {}", path.display(), e)
        })?;

        let is_toml = path.extension().is_some_and(|ext| ext == "toml");
        let mut config = Self::parse(&content, is_toml).map_err(|e| {
            anyhow::anyhow!("Invalid configuration file {}: {}", path.display(), e)
        })?;

        config.apply_env_overrides();
        Ok(config)
    }

    pub fn parse(content: &str, is_toml: bool) -> anyhow::Result<Self> {
        let config = if is_toml {
            toml::from_str(content)?
        } else {
            serde_json::from_str(content)?
        };
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply overrides from `lookup`; empty or unparsable values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup(ENV_LISTEN_PORT).and_then(|p| p.parse::<u16>().ok()) {
            self.listen_port = port;
        }

        if let Some(host) = lookup(ENV_STORE_HOST).filter(|h| !h.is_empty()) {
            self.store_host = host;
        }

        if let Some(port) = lookup(ENV_STORE_PORT).and_then(|p| p.parse::<u16>().ok()) {
            self.store_port = port;
        }

        if let Some(dir) = lookup(ENV_LOG_DIR).filter(|d| !d.is_empty()) {
            self.log_dir = PathBuf::from(dir);
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn insert_timeout(&self) -> Duration {
        Duration::from_millis(self.insert_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_parse_legacy_json() {
        let json = r#"{
            "listen_port": 8707,
            "mgo_host": "10.0.0.5",
            "mgo_port": 6745,
            "log_type": 1,
            "log_dir": "/var/log/solilog"
        }"#;

        let config = RelayConfig::parse(json, false).unwrap();
        assert_eq!(config.listen_port, 8707);
        assert_eq!(config.store_host, "10.0.0.5");
        assert_eq!(config.store_port, 6745);
        assert_eq!(config.log_type, LogMode::File);
        assert_eq!(config.log_dir, PathBuf::from("/var/log/solilog"));
        assert_eq!(config.admin_database, "_system");
        assert_eq!(config.connect_timeout_ms, 5000);
    }

    #[test]
    fn test_parse_toml() {
        let toml_str = r#"
            listen_port = 9000
            store_host = "db.internal"
            store_port = 6745
            log_type = "stdout"
            insert_timeout_ms = 250
        "#;

        let config = RelayConfig::parse(toml_str, true).unwrap();
        assert_eq!(config.listen_port, 9000);
        assert_eq!(config.log_type, LogMode::Stdout);
        assert_eq!(config.insert_timeout(), Duration::from_millis(250));
        assert_eq!(config.max_frame_size, 16 * 1024 * 1024);
    }

    #[test]
    fn test_parse_rejects_unknown_log_type() {
        let json = r#"{"listen_port": 1, "store_host": "h", "store_port": 2, "log_type": 7}"#;
        assert!(RelayConfig::parse(json, false).is_err());
    }

    #[test]
    fn test_parse_rejects_missing_port() {
        assert!(RelayConfig::parse(r#"{"store_host": "h"}"#, false).is_err());
    }

    #[test]
    fn test_load_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = RelayConfig::load(&dir.path().join("nope.json")).unwrap_err();
        assert!(err.to_string().contains("Cannot read configuration file"));
    }

    #[test]
    fn test_load_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.toml");
        std::fs::write(&path, "listen_port = 1\nstore_host = \"h\"\nstore_port = 2\n").unwrap();

        let config = RelayConfig::load(&path).unwrap();
        assert_eq!(config.store_host, "h");
    }

    #[test]
    fn test_load_rejects_malformed_env_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.json");
        std::fs::write(&path, r#"{"listen_port": 1, "store_host": "h", "store_port": 2}"#).unwrap();
        std::fs::write(dir.path().join(".env"), "SOLILOG_BROKEN=\"unterminated\n").unwrap();

        let err = RelayConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("Cannot read"));
        assert!(err.to_string().contains(".env"));
    }

    #[test]
    fn test_overrides() {
        let mut config = RelayConfig::new(8707, "127.0.0.1", 6745);
        let vars: HashMap<&str, &str> = [
            (ENV_LISTEN_PORT, "9100"),
            (ENV_STORE_HOST, ""),
            (ENV_STORE_PORT, "not-a-port"),
            (ENV_LOG_DIR, "/tmp/logs"),
        ]
        .into_iter()
        .collect();

        config.apply_overrides(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(config.listen_port, 9100);
        assert_eq!(config.store_host, "127.0.0.1");
        assert_eq!(config.store_port, 6745);
        assert_eq!(config.log_dir, PathBuf::from("/tmp/logs"));
    }
}
