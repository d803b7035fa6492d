pub mod settings;

use crate::settings::PartialSettings;
use config::{Config, ConfigError, Environment, File};

pub use settings::Settings;

pub use settings::{BrokerSettings, TlsSettings};

pub fn load_config() -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(Environment::default().separator("_"));

    let config = builder.build()?;
    let partial: PartialSettings = config.try_deserialize()?;
    let default = Settings::default();

    Ok(Settings {
        broker: BrokerSettings {
            host: partial
                .broker
                .as_ref()
                .and_then(|b| b.host.clone())
                .unwrap_or(default.broker.host),
            port: partial
                .broker
                .as_ref()
                .and_then(|b| b.port)
                .unwrap_or(default.broker.port),
        },
        tls: TlsSettings {
            enabled: partial
                .tls
                .as_ref()
                .and_then(|t| t.enabled)
                .unwrap_or(default.tls.enabled),
            ca_cert: partial
                .tls
                .as_ref()
                .and_then(|t| t.ca_cert.clone())
                .unwrap_or(default.tls.ca_cert),
            client_cert: partial
                .tls
                .as_ref()
                .and_then(|t| t.client_cert.clone())
                .unwrap_or(default.tls.client_cert),
            private_key: partial
                .tls
                .as_ref()
                .and_then(|t| t.private_key.clone())
                .unwrap_or(default.tls.private_key),
        },
    })
}
