use super::ConfigError;
use super::validator::{validate_log_format, validate_log_level};
use serde::{Deserialize, Serialize};
use std::path::Path;

const BOT_TOKEN_ENV: &str = "DISCORD_AUTOMATIONS_BOT_TOKEN";
const DATABASE_URL_ENV: &str = "DISCORD_AUTOMATIONS_DATABASE_URL";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub discord: DiscordConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DiscordConfig {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default = "default_use_privileged_intents")]
    pub use_privileged_intents: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub conn_string: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub max_connections: Option<u32>,
    #[serde(default)]
    pub min_connections: Option<u32>,
}

impl DatabaseConfig {
    pub fn db_type(&self) -> DbType {
        let url = self.connection_string();
        if url.starts_with("sqlite://") {
            DbType::Sqlite
        } else {
            DbType::Postgres
        }
    }

    pub fn connection_string(&self) -> String {
        if let Some(ref url) = self.url {
            url.clone()
        } else if let Some(ref conn) = self.conn_string {
            conn.clone()
        } else if let Some(ref file) = self.filename {
            format!("sqlite://{}", file)
        } else {
            String::new()
        }
    }

    pub fn sqlite_path(&self) -> Option<String> {
        if let DbType::Sqlite = self.db_type() {
            let url = self.connection_string();
            Some(url.strip_prefix("sqlite://").unwrap_or(&url).to_string())
        } else {
            None
        }
    }

    pub fn max_connections(&self) -> Option<u32> {
        match self.db_type() {
            DbType::Postgres => self.max_connections,
            DbType::Sqlite => Some(1),
        }
    }

    pub fn min_connections(&self) -> Option<u32> {
        match self.db_type() {
            DbType::Postgres => self.min_connections,
            DbType::Sqlite => Some(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbType {
    Postgres,
    Sqlite,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Drop events whose `details.isBot` is true before any rule is loaded.
    #[serde(default = "default_ignore_bot_events")]
    pub ignore_bot_events: bool,
    #[serde(default = "default_delete_pacing_ms")]
    pub delete_pacing_ms: u64,
    #[serde(default = "default_message_fetch_limit")]
    pub message_fetch_limit: u8,
    #[serde(default = "default_embed_color")]
    pub embed_color: u32,
    /// Write every gateway event to the `event_logs` table.
    #[serde(default = "default_record_events")]
    pub record_events: bool,
    /// Event log rows older than this are pruned hourly. Zero keeps them forever.
    #[serde(default = "default_event_log_retention_days")]
    pub event_log_retention_days: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ignore_bot_events: default_ignore_bot_events(),
            delete_pacing_ms: default_delete_pacing_ms(),
            message_fetch_limit: default_message_fetch_limit(),
            embed_color: default_embed_color(),
            record_events: default_record_events(),
            event_log_retention_days: default_event_log_retention_days(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebConfig {
    #[serde(default = "default_web_enabled")]
    pub enabled: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            enabled: default_web_enabled(),
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(alias = "console", default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content, |key| std::env::var(key).ok())
    }

    /// Parses `content`, applies overrides found through `env` and
    /// validates the result.
    pub fn from_yaml(
        content: &str,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config: Config = serde_yaml::from_str(content)?;
        config.apply_env_overrides(env);
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.discord.bot_token.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "discord.bot_token cannot be empty".to_string(),
            ));
        }

        if self.database.connection_string().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "database connection string cannot be empty".to_string(),
            ));
        }

        if self.web.enabled && self.web.port == 0 {
            return Err(ConfigError::InvalidConfig(
                "web.port must be between 1 and 65535".to_string(),
            ));
        }

        if self.engine.message_fetch_limit == 0 || self.engine.message_fetch_limit > 100 {
            return Err(ConfigError::InvalidConfig(
                "engine.message_fetch_limit must be between 1 and 100".to_string(),
            ));
        }

        if self.engine.embed_color > 0xFF_FF_FF {
            return Err(ConfigError::InvalidConfig(
                "engine.embed_color must be a 24-bit RGB value".to_string(),
            ));
        }

        validate_log_level(&self.logging.level)?;
        validate_log_format(&self.logging.format)?;

        Ok(())
    }

    fn apply_env_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(value) = env(BOT_TOKEN_ENV) {
            self.discord.bot_token = value;
        }
        if let Some(value) = env(DATABASE_URL_ENV) {
            self.database.url = Some(value);
        }
    }
}

fn default_use_privileged_intents() -> bool {
    true
}

fn default_ignore_bot_events() -> bool {
    true
}

fn default_delete_pacing_ms() -> u64 {
    500
}

fn default_message_fetch_limit() -> u8 {
    100
}

fn default_embed_color() -> u32 {
    0x5865F2
}

fn default_record_events() -> bool {
    true
}

fn default_event_log_retention_days() -> u32 {
    30
}

fn default_web_enabled() -> bool {
    true
}

fn default_port() -> u16 {
    9005
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    const MINIMAL: &str = r#"
discord:
  bot_token: "token"
database:
  filename: "automations.db"
"#;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn minimal_config_fills_defaults() {
        let config = Config::from_yaml(MINIMAL, no_env).unwrap();

        assert!(config.discord.use_privileged_intents);
        assert_eq!(config.database.db_type(), DbType::Sqlite);
        assert_eq!(config.database.sqlite_path().as_deref(), Some("automations.db"));
        assert!(config.engine.ignore_bot_events);
        assert_eq!(config.engine.delete_pacing_ms, 500);
        assert_eq!(config.engine.message_fetch_limit, 100);
        assert_eq!(config.engine.embed_color, 0x5865F2);
        assert!(config.engine.record_events);
        assert_eq!(config.engine.event_log_retention_days, 30);
        assert_eq!(config.web.port, 9005);
        assert_eq!(config.web.bind_address, "127.0.0.1");
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn env_overrides_token_and_database() {
        let env = |key: &str| match key {
            "DISCORD_AUTOMATIONS_BOT_TOKEN" => Some("from-env".to_string()),
            "DISCORD_AUTOMATIONS_DATABASE_URL" => Some("postgres://db/automations".to_string()),
            _ => None,
        };

        let config = Config::from_yaml(MINIMAL, env).unwrap();

        assert_eq!(config.discord.bot_token, "from-env");
        assert_eq!(config.database.db_type(), DbType::Postgres);
        assert_eq!(config.database.connection_string(), "postgres://db/automations");
        assert_eq!(config.database.sqlite_path(), None);
    }

    #[test]
    fn empty_token_is_rejected() {
        let yaml = "discord:\n  bot_token: \"\"\ndatabase:\n  url: \"sqlite://x.db\"\n";
        let err = Config::from_yaml(yaml, no_env).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidConfig(msg) if msg.contains("bot_token")));
    }

    #[test]
    fn missing_database_is_rejected() {
        let yaml = "discord:\n  bot_token: t\ndatabase: {}\n";
        assert!(matches!(
            Config::from_yaml(yaml, no_env),
            Err(ConfigError::InvalidConfig(_))
        ));
    }

    #[test]
    fn fetch_limit_above_discord_maximum_is_rejected() {
        let yaml = format!("{MINIMAL}engine:\n  message_fetch_limit: 150\n");
        assert!(matches!(
            Config::from_yaml(&yaml, no_env),
            Err(ConfigError::InvalidConfig(msg)) if msg.contains("message_fetch_limit")
        ));
    }

    #[test]
    fn unknown_log_format_is_rejected() {
        let yaml = format!("{MINIMAL}logging:\n  format: xml\n");
        assert!(Config::from_yaml(&yaml, no_env).is_err());
    }

    #[test]
    fn postgres_pool_sizes_are_only_used_for_postgres() {
        let config = DatabaseConfig {
            url: Some("postgresql://localhost/db".to_string()),
            conn_string: None,
            filename: None,
            max_connections: Some(20),
            min_connections: Some(2),
        };
        assert_eq!(config.max_connections(), Some(20));

        let sqlite = DatabaseConfig {
            url: Some("sqlite://local.db".to_string()),
            ..config
        };
        assert_eq!(sqlite.max_connections(), Some(1));
    }

    #[test]
    fn loads_from_file() {
        let mut file = NamedTempFile::new().expect("temp config file");
        file.write_all(MINIMAL.as_bytes()).expect("write config");

        let config = Config::load_from_file(file.path()).expect("load config");
        assert_eq!(config.database.filename.as_deref(), Some("automations.db"));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        assert!(matches!(
            Config::load_from_file("/nonexistent/config.yaml"),
            Err(ConfigError::Io(_))
        ));
    }
}
