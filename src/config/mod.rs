mod settings;

use crate::config::settings::PartialSettings;
use config::{Config, ConfigError, Environment, File};

pub use settings::{HubSettings, LogSettings, ServerSettings, Settings};

/// Environment variables look like `SSEHUB__SERVER__PORT=9000`;
/// `SSEHUB__HUB__PUBLIC_TOPICS` takes a comma-separated list.
pub const ENV_PREFIX: &str = "SSEHUB";

/// Loads the configuration from `config/default` (any format the `config`
/// crate understands) and the environment, then fills gaps with defaults.
pub fn load_config() -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("hub.public_topics")
                .try_parsing(true),
        );

    let config = builder.build()?;
    let partial: PartialSettings = config.try_deserialize()?;
    let default = Settings::default();

    Ok(Settings {
        server: ServerSettings {
            host: partial
                .server
                .as_ref()
                .and_then(|s| s.host.clone())
                .unwrap_or(default.server.host),
            port: partial
                .server
                .as_ref()
                .and_then(|s| s.port)
                .unwrap_or(default.server.port),
        },
        hub: HubSettings {
            public_topics: partial
                .hub
                .as_ref()
                .and_then(|h| h.public_topics.clone())
                .unwrap_or(default.hub.public_topics),
        },
        log: LogSettings {
            level: partial
                .log
                .as_ref()
                .and_then(|l| l.level.clone())
                .unwrap_or(default.log.level),
        },
    })
}
