pub use self::parser::{
    Config, DatabaseConfig, DbType, DiscordConfig, EngineConfig, LoggingConfig, WebConfig,
};
pub use self::validator::ConfigError;

mod parser;
mod validator;
