use serde::Deserialize;

/// Top-level configuration for the inspector.
///
/// Covers the broker endpoint the tool connects to and the TLS material used
/// when a secured connection is requested.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub broker: BrokerSettings,
    pub tls: TlsSettings,
}

/// Broker endpoint settings.
#[derive(Debug, Deserialize, Clone)]
pub struct BrokerSettings {
    pub host: String,
    pub port: u16,
}

/// TLS settings for secured broker connections.
///
/// Paths are kept as plain strings; they are validated when a connection is
/// attempted, not when the configuration is loaded.
#[derive(Debug, Deserialize, Clone)]
pub struct TlsSettings {
    pub enabled: bool,
    pub ca_cert: String,
    pub client_cert: String,
    pub private_key: String,
}

/// Partial configuration loaded from files or environment.
///
/// Allows partial specification of settings. Missing values are filled from
/// defaults.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub broker: Option<PartialBrokerSettings>,
    pub tls: Option<PartialTlsSettings>,
}

/// Partial broker endpoint settings.
#[derive(Debug, Deserialize)]
pub struct PartialBrokerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// Partial TLS settings.
#[derive(Debug, Deserialize)]
pub struct PartialTlsSettings {
    pub enabled: Option<bool>,
    pub ca_cert: Option<String>,
    pub client_cert: Option<String>,
    pub private_key: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            broker: BrokerSettings {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            tls: TlsSettings {
                enabled: false,
                ca_cert: String::new(),
                client_cert: String::new(),
                private_key: String::new(),
            },
        }
    }
}
