//! Agent configuration: flags, environment and an optional JSON file.
//!
//! Precedence is env > flag > file > default: clap resolves env over flag
//! over default, then file values fill only the keys still at their
//! defaults.

use clap::Parser;
use serde::Deserialize;

pub const DEFAULT_ADDRESS: &str = "localhost:8080";
pub const DEFAULT_REPORT_INTERVAL: u64 = 10;
pub const DEFAULT_POLL_INTERVAL: u64 = 2;
pub const DEFAULT_RATE_LIMIT: usize = 1;

#[derive(Parser, Debug, Clone)]
#[command(name = "metrond-agent", about = "metrond metrics agent")]
pub struct AgentConfig {
    /// Server address, host:port
    #[arg(short = 'a', long, env = "ADDRESS", default_value = DEFAULT_ADDRESS)]
    pub address: String,

    /// Report interval, seconds
    #[arg(short = 'r', long, env = "REPORT_INTERVAL", default_value_t = DEFAULT_REPORT_INTERVAL)]
    pub report_interval: u64,

    /// Poll interval, seconds
    #[arg(short = 'p', long, env = "POLL_INTERVAL", default_value_t = DEFAULT_POLL_INTERVAL)]
    pub poll_interval: u64,

    /// HMAC signing key; empty disables body signing
    #[arg(short = 'k', long, env = "KEY", default_value = "")]
    pub key: String,

    /// Number of concurrent send workers
    #[arg(short = 'l', long, env = "RATE_LIMIT", default_value_t = DEFAULT_RATE_LIMIT)]
    pub rate_limit: usize,

    /// Path to the server's PEM public key; empty disables encryption
    #[arg(long, env = "CRYPTO_KEY", default_value = "")]
    pub crypto_key: String,

    /// Path to a JSON config file
    #[arg(short = 'c', long, env = "CONFIG")]
    pub config: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AgentFileConfig {
    pub address: Option<String>,
    pub report_interval: Option<u64>,
    pub poll_interval: Option<u64>,
    pub key: Option<String>,
    pub rate_limit: Option<usize>,
    pub crypto_key: Option<String>,
}

impl AgentConfig {
    pub fn load() -> anyhow::Result<Self> {
        let mut config = Self::parse();
        if let Some(path) = config.config.clone() {
            let content = std::fs::read_to_string(&path)
                .map_err(|e| anyhow::anyhow!("cannot read config file {path}: {e}"))?;
            let file: AgentFileConfig = serde_json::from_str(&content)
                .map_err(|e| anyhow::anyhow!("cannot parse config file {path}: {e}"))?;
            config.apply_file(file);
        }
        Ok(config)
    }

    pub(crate) fn apply_file(&mut self, file: AgentFileConfig) {
        if self.address == DEFAULT_ADDRESS {
            if let Some(address) = file.address {
                self.address = address;
            }
        }
        if self.report_interval == DEFAULT_REPORT_INTERVAL {
            if let Some(interval) = file.report_interval {
                self.report_interval = interval;
            }
        }
        if self.poll_interval == DEFAULT_POLL_INTERVAL {
            if let Some(interval) = file.poll_interval {
                self.poll_interval = interval;
            }
        }
        if self.key.is_empty() {
            if let Some(key) = file.key {
                self.key = key;
            }
        }
        if self.rate_limit == DEFAULT_RATE_LIMIT {
            if let Some(limit) = file.rate_limit {
                self.rate_limit = limit;
            }
        }
        if self.crypto_key.is_empty() {
            if let Some(crypto_key) = file.crypto_key {
                self.crypto_key = crypto_key;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> AgentConfig {
        AgentConfig::parse_from(["metrond-agent"])
    }

    #[test]
    fn flags_override_defaults() {
        let config =
            AgentConfig::parse_from(["metrond-agent", "-a", "metrics.example:9000", "-l", "4"]);
        assert_eq!(config.address, "metrics.example:9000");
        assert_eq!(config.rate_limit, 4);
        assert_eq!(config.report_interval, DEFAULT_REPORT_INTERVAL);
    }

    #[test]
    fn file_fills_only_keys_left_at_defaults() {
        let mut config = defaults();
        config.key = "flagkey".to_string();
        config.apply_file(AgentFileConfig {
            address: Some("from-file:1234".to_string()),
            key: Some("filekey".to_string()),
            poll_interval: Some(7),
            ..Default::default()
        });

        assert_eq!(config.address, "from-file:1234");
        assert_eq!(config.key, "flagkey");
        assert_eq!(config.poll_interval, 7);
        assert_eq!(config.rate_limit, DEFAULT_RATE_LIMIT);
    }
}
