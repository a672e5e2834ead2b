use serde::{Deserialize, Serialize};

use leadflow_email::SmtpConfig;

/// Server configuration, loadable from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Public base URL used when composing tracking links.
    #[serde(default = "default_tracking_base_url")]
    pub tracking_base_url: String,

    /// Number of concurrent job workers.
    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,

    /// SMTP relay; the in-memory transport is used when absent.
    #[serde(default)]
    pub smtp: Option<SmtpConfig>,
}

fn default_bind_addr() -> String {
    "127.0.0.1:8080".to_owned()
}

fn default_tracking_base_url() -> String {
    "http://localhost:8080".to_owned()
}

fn default_worker_concurrency() -> usize {
    4
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            tracking_base_url: default_tracking_base_url(),
            worker_concurrency: default_worker_concurrency(),
            smtp: None,
        }
    }
}

impl ServerConfig {
    /// Load from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read or parsed.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.worker_concurrency, 4);
        assert!(config.smtp.is_none());
    }

    #[test]
    fn parses_minimal_toml() {
        let config: ServerConfig = toml::from_str("bind_addr = \"0.0.0.0:9000\"").unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:9000");
        assert_eq!(config.tracking_base_url, "http://localhost:8080");
    }

    #[test]
    fn parses_smtp_section() {
        let config: ServerConfig = toml::from_str(
            "[smtp]\nhost = \"smtp.example.com\"\nfrom = \"offers@example.com\"\n",
        )
        .unwrap();
        assert_eq!(config.smtp.unwrap().host, "smtp.example.com");
    }
}
