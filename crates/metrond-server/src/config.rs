//! Server configuration: flags, environment and an optional JSON file.
//! Precedence is env > flag > file > default (see the agent's config for
//! the same convention).

use clap::{ArgAction, Parser};
use serde::Deserialize;

pub const DEFAULT_ADDRESS: &str = "localhost:8080";
pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_STORE_INTERVAL: u64 = 300;
pub const DEFAULT_FILE_STORAGE_PATH: &str = "metrics-db.json";

#[derive(Parser, Debug, Clone)]
#[command(name = "metrond-server", about = "metrond metrics server")]
pub struct ServerConfig {
    /// Listen address, host:port
    #[arg(short = 'a', long, env = "ADDRESS", default_value = DEFAULT_ADDRESS)]
    pub address: String,

    /// Log level for the metrond crates
    #[arg(long, env = "LOG_LEVEL", default_value = DEFAULT_LOG_LEVEL)]
    pub log_level: String,

    /// Snapshot interval in seconds; 0 snapshots after every update
    #[arg(short = 'i', long, env = "STORE_INTERVAL", default_value_t = DEFAULT_STORE_INTERVAL)]
    pub store_interval: u64,

    /// Snapshot file path
    #[arg(short = 'f', long, env = "FILE_STORAGE_PATH", default_value = DEFAULT_FILE_STORAGE_PATH)]
    pub file_storage_path: String,

    /// Restore metrics from the snapshot file at startup
    #[arg(long, env = "RESTORE", default_value_t = true, action = ArgAction::Set)]
    pub restore: bool,

    /// PostgreSQL DSN; empty selects the in-memory backend
    #[arg(short = 'd', long, env = "DATABASE_DSN", default_value = "")]
    pub database_dsn: String,

    /// HMAC signing key; empty disables body verification
    #[arg(short = 'k', long, env = "KEY", default_value = "")]
    pub key: String,

    /// Audit log file; empty disables the file auditor
    #[arg(long, env = "AUDIT_FILE", default_value = "")]
    pub audit_file: String,

    /// Audit webhook URL; empty disables the webhook auditor
    #[arg(long, env = "AUDIT_URL", default_value = "")]
    pub audit_url: String,

    /// Path to the PEM private key; empty disables envelope decryption
    #[arg(long, env = "CRYPTO_KEY", default_value = "")]
    pub crypto_key: String,

    /// Path to a JSON config file
    #[arg(short = 'c', long, env = "CONFIG")]
    pub config: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    pub address: Option<String>,
    pub log_level: Option<String>,
    pub store_interval: Option<u64>,
    pub file_storage_path: Option<String>,
    pub restore: Option<bool>,
    pub database_dsn: Option<String>,
    pub key: Option<String>,
    pub audit_file: Option<String>,
    pub audit_url: Option<String>,
    pub crypto_key: Option<String>,
}

impl ServerConfig {
    pub fn load() -> anyhow::Result<Self> {
        let mut config = Self::parse();
        if let Some(path) = config.config.clone() {
            let content = std::fs::read_to_string(&path)
                .map_err(|e| anyhow::anyhow!("cannot read config file {path}: {e}"))?;
            let file: ServerFileConfig = serde_json::from_str(&content)
                .map_err(|e| anyhow::anyhow!("cannot parse config file {path}: {e}"))?;
            config.apply_file(file);
        }
        Ok(config)
    }

    pub fn use_database(&self) -> bool {
        !self.database_dsn.is_empty()
    }

    /// Restore is meaningless with the SQL backend: the data is already
    /// durable there.
    pub fn restore_enabled(&self) -> bool {
        self.restore && !self.use_database()
    }

    pub fn store_on_update(&self) -> bool {
        self.store_interval == 0 && !self.use_database()
    }

    pub fn store_periodically(&self) -> bool {
        self.store_interval > 0 && !self.use_database()
    }

    pub(crate) fn apply_file(&mut self, file: ServerFileConfig) {
        if self.address == DEFAULT_ADDRESS {
            if let Some(address) = file.address {
                self.address = address;
            }
        }
        if self.log_level == DEFAULT_LOG_LEVEL {
            if let Some(level) = file.log_level {
                self.log_level = level;
            }
        }
        if self.store_interval == DEFAULT_STORE_INTERVAL {
            if let Some(interval) = file.store_interval {
                self.store_interval = interval;
            }
        }
        if self.file_storage_path == DEFAULT_FILE_STORAGE_PATH {
            if let Some(path) = file.file_storage_path {
                self.file_storage_path = path;
            }
        }
        if self.restore {
            if let Some(restore) = file.restore {
                self.restore = restore;
            }
        }
        if self.database_dsn.is_empty() {
            if let Some(dsn) = file.database_dsn {
                self.database_dsn = dsn;
            }
        }
        if self.key.is_empty() {
            if let Some(key) = file.key {
                self.key = key;
            }
        }
        if self.audit_file.is_empty() {
            if let Some(path) = file.audit_file {
                self.audit_file = path;
            }
        }
        if self.audit_url.is_empty() {
            if let Some(url) = file.audit_url {
                self.audit_url = url;
            }
        }
        if self.crypto_key.is_empty() {
            if let Some(path) = file.crypto_key {
                self.crypto_key = path;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_dsn_disables_file_snapshotting_and_restore() {
        let config = ServerConfig::parse_from([
            "metrond-server",
            "-d",
            "postgres://localhost/metrics",
            "-i",
            "0",
        ]);
        assert!(config.use_database());
        assert!(!config.store_on_update());
        assert!(!config.store_periodically());
        assert!(!config.restore_enabled());
    }

    #[test]
    fn zero_interval_with_memory_storage_stores_on_update() {
        let config = ServerConfig::parse_from(["metrond-server", "-i", "0"]);
        assert!(config.store_on_update());
        assert!(!config.store_periodically());
    }

    #[test]
    fn positive_interval_with_memory_storage_stores_periodically() {
        let config = ServerConfig::parse_from(["metrond-server"]);
        assert!(config.store_periodically());
        assert!(!config.store_on_update());
        assert!(config.restore_enabled());
    }

    #[test]
    fn file_fills_only_keys_left_at_defaults() {
        let mut config = ServerConfig::parse_from(["metrond-server", "-a", "0.0.0.0:9000"]);
        config.apply_file(ServerFileConfig {
            address: Some("file:1".to_string()),
            store_interval: Some(60),
            restore: Some(false),
            ..Default::default()
        });

        assert_eq!(config.address, "0.0.0.0:9000");
        assert_eq!(config.store_interval, 60);
        assert!(!config.restore);
    }
}
