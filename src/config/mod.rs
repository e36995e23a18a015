pub mod schema;

pub use schema::{
    build_http_client, resolve_config_dir, Config, ConfigError, DiscordConfig, GenerationConfig,
    ProviderConfig, ProviderKind, ResponseConfig, CONFIG_DIR_ENV,
};
