use serde::{Deserialize, Serialize};

/// SMTP relay configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    /// Relay hostname.
    pub host: String,

    /// Relay port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Optional username for relay authentication.
    #[serde(default)]
    pub username: Option<String>,

    /// Optional password for relay authentication.
    #[serde(default)]
    pub password: Option<String>,

    /// Envelope sender address.
    pub from: String,

    /// Whether to negotiate TLS (STARTTLS).
    #[serde(default = "default_tls")]
    pub use_tls: bool,
}

fn default_port() -> u16 {
    587
}

fn default_tls() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_deserializes() {
        let config: SmtpConfig = serde_json::from_str(
            r#"{"host": "smtp.example.com", "from": "offers@example.com"}"#,
        )
        .unwrap();
        assert_eq!(config.port, 587);
        assert!(config.use_tls);
        assert!(config.username.is_none());
    }
}
