use crate::automation::{Automation, AutomationSource, Event, ExecutionLog};
use crate::config::{DatabaseConfig as ConfigDatabaseConfig, DbType as ConfigDbType};
use crate::db::{
    AutomationStore, DatabaseError, EventLogStore, ExecutionLogStore, GuildSettingsStore,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

#[cfg(feature = "postgres")]
use crate::db::postgres::{
    PostgresAutomationStore, PostgresEventLogStore, PostgresExecutionLogStore,
    PostgresGuildSettingsStore,
};
#[cfg(any(feature = "postgres", feature = "sqlite"))]
use diesel::RunQueryDsl;
#[cfg(feature = "postgres")]
use diesel::pg::PgConnection;
#[cfg(feature = "postgres")]
use diesel::r2d2::{self, ConnectionManager};

#[cfg(feature = "postgres")]
pub type Pool = r2d2::Pool<ConnectionManager<PgConnection>>;

#[cfg(feature = "sqlite")]
use crate::db::sqlite::{
    SqliteAutomationStore, SqliteEventLogStore, SqliteExecutionLogStore, SqliteGuildSettingsStore,
};
#[cfg(feature = "sqlite")]
use diesel::Connection;
#[cfg(feature = "sqlite")]
use diesel::sqlite::SqliteConnection;

#[cfg(feature = "postgres")]
const POSTGRES_MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS automations (
        id BIGSERIAL PRIMARY KEY,
        guild_id TEXT NOT NULL,
        name TEXT NOT NULL,
        description TEXT,
        enabled BOOLEAN NOT NULL DEFAULT TRUE,
        trigger_event TEXT,
        trigger_events TEXT NOT NULL DEFAULT '[]',
        trigger_filters TEXT NOT NULL DEFAULT '{}',
        action_type TEXT,
        action_config TEXT NOT NULL DEFAULT '{}',
        created_by TEXT,
        trigger_count BIGINT NOT NULL DEFAULT 0,
        last_triggered_at TIMESTAMP WITH TIME ZONE,
        created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS automation_logs (
        id BIGSERIAL PRIMARY KEY,
        automation_id BIGINT NOT NULL REFERENCES automations(id) ON DELETE CASCADE,
        guild_id TEXT NOT NULL,
        trigger_event TEXT NOT NULL,
        trigger_data TEXT NOT NULL,
        action_result TEXT NOT NULL,
        success BOOLEAN NOT NULL,
        error_message TEXT,
        execution_time_ms BIGINT NOT NULL DEFAULT 0,
        created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS event_logs (
        id BIGSERIAL PRIMARY KEY,
        guild_id TEXT NOT NULL,
        event_type TEXT NOT NULL,
        event_category TEXT NOT NULL,
        actor_id TEXT,
        actor_name TEXT,
        target_id TEXT,
        target_name TEXT,
        channel_id TEXT,
        channel_name TEXT,
        details TEXT,
        created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS guild_settings (
        guild_id TEXT PRIMARY KEY,
        logging_enabled BOOLEAN NOT NULL DEFAULT TRUE,
        log_channel_id TEXT,
        excluded_channels TEXT NOT NULL DEFAULT '[]',
        excluded_categories TEXT NOT NULL DEFAULT '[]',
        updated_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_automations_guild_enabled ON automations(guild_id, enabled)",
    "CREATE INDEX IF NOT EXISTS idx_automation_logs_automation ON automation_logs(automation_id)",
    "CREATE INDEX IF NOT EXISTS idx_automation_logs_created_at ON automation_logs(created_at)",
    "CREATE INDEX IF NOT EXISTS idx_automation_logs_guild ON automation_logs(guild_id)",
    "CREATE INDEX IF NOT EXISTS idx_event_logs_guild_created ON event_logs(guild_id, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_event_logs_guild_type ON event_logs(guild_id, event_type)",
    "CREATE INDEX IF NOT EXISTS idx_event_logs_created_at ON event_logs(created_at)",
];

#[cfg(feature = "sqlite")]
const SQLITE_MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS automations (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        guild_id TEXT NOT NULL,
        name TEXT NOT NULL,
        description TEXT,
        enabled BOOLEAN NOT NULL DEFAULT 1,
        trigger_event TEXT,
        trigger_events TEXT NOT NULL DEFAULT '[]',
        trigger_filters TEXT NOT NULL DEFAULT '{}',
        action_type TEXT,
        action_config TEXT NOT NULL DEFAULT '{}',
        created_by TEXT,
        trigger_count BIGINT NOT NULL DEFAULT 0,
        last_triggered_at TEXT,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        updated_at TEXT NOT NULL DEFAULT (datetime('now'))
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS automation_logs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        automation_id INTEGER NOT NULL REFERENCES automations(id) ON DELETE CASCADE,
        guild_id TEXT NOT NULL,
        trigger_event TEXT NOT NULL,
        trigger_data TEXT NOT NULL,
        action_result TEXT NOT NULL,
        success BOOLEAN NOT NULL,
        error_message TEXT,
        execution_time_ms BIGINT NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS event_logs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        guild_id TEXT NOT NULL,
        event_type TEXT NOT NULL,
        event_category TEXT NOT NULL,
        actor_id TEXT,
        actor_name TEXT,
        target_id TEXT,
        target_name TEXT,
        channel_id TEXT,
        channel_name TEXT,
        details TEXT,
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS guild_settings (
        guild_id TEXT PRIMARY KEY,
        logging_enabled BOOLEAN NOT NULL DEFAULT 1,
        log_channel_id TEXT,
        excluded_channels TEXT NOT NULL DEFAULT '[]',
        excluded_categories TEXT NOT NULL DEFAULT '[]',
        updated_at TEXT NOT NULL DEFAULT (datetime('now'))
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_automations_guild_enabled ON automations(guild_id, enabled)",
    "CREATE INDEX IF NOT EXISTS idx_automation_logs_automation ON automation_logs(automation_id)",
    "CREATE INDEX IF NOT EXISTS idx_automation_logs_created_at ON automation_logs(created_at)",
    "CREATE INDEX IF NOT EXISTS idx_automation_logs_guild ON automation_logs(guild_id)",
    "CREATE INDEX IF NOT EXISTS idx_event_logs_guild_created ON event_logs(guild_id, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_event_logs_guild_type ON event_logs(guild_id, event_type)",
    "CREATE INDEX IF NOT EXISTS idx_event_logs_created_at ON event_logs(created_at)",
];

/// `None` when the retention reaches past the earliest representable time.
fn retention_cutoff(now: DateTime<Utc>, retention_days: u32) -> Option<DateTime<Utc>> {
    chrono::Duration::try_days(i64::from(retention_days)).and_then(|age| now.checked_sub_signed(age))
}

#[derive(Clone)]
pub struct DatabaseManager {
    #[cfg(feature = "postgres")]
    postgres_pool: Option<Pool>,
    #[cfg(feature = "sqlite")]
    sqlite_path: Option<String>,
    automation_store: Arc<dyn AutomationStore>,
    execution_log_store: Arc<dyn ExecutionLogStore>,
    event_log_store: Arc<dyn EventLogStore>,
    guild_settings_store: Arc<dyn GuildSettingsStore>,
    db_type: DbType,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DbType {
    Postgres,
    Sqlite,
}

impl From<ConfigDbType> for DbType {
    fn from(value: ConfigDbType) -> Self {
        match value {
            ConfigDbType::Postgres => DbType::Postgres,
            ConfigDbType::Sqlite => DbType::Sqlite,
        }
    }
}

impl DatabaseManager {
    pub async fn new(config: &ConfigDatabaseConfig) -> Result<Self, DatabaseError> {
        let db_type = DbType::from(config.db_type());

        match db_type {
            #[cfg(feature = "postgres")]
            DbType::Postgres => {
                let manager = ConnectionManager::<PgConnection>::new(config.connection_string());

                let pool = r2d2::Pool::builder()
                    .max_size(config.max_connections().unwrap_or(10))
                    .min_idle(Some(config.min_connections().unwrap_or(1)))
                    .build(manager)
                    .map_err(|e| DatabaseError::Connection(e.to_string()))?;

                Ok(Self {
                    automation_store: Arc::new(PostgresAutomationStore::new(pool.clone())),
                    execution_log_store: Arc::new(PostgresExecutionLogStore::new(pool.clone())),
                    event_log_store: Arc::new(PostgresEventLogStore::new(pool.clone())),
                    guild_settings_store: Arc::new(PostgresGuildSettingsStore::new(pool.clone())),
                    postgres_pool: Some(pool),
                    #[cfg(feature = "sqlite")]
                    sqlite_path: None,
                    db_type,
                })
            }
            #[cfg(feature = "sqlite")]
            DbType::Sqlite => {
                let path = config.sqlite_path().ok_or_else(|| {
                    DatabaseError::Connection("sqlite path is not configured".to_string())
                })?;
                let shared_path = Arc::new(path.clone());

                Ok(Self {
                    #[cfg(feature = "postgres")]
                    postgres_pool: None,
                    automation_store: Arc::new(SqliteAutomationStore::new(shared_path.clone())),
                    execution_log_store: Arc::new(SqliteExecutionLogStore::new(shared_path.clone())),
                    event_log_store: Arc::new(SqliteEventLogStore::new(shared_path.clone())),
                    guild_settings_store: Arc::new(SqliteGuildSettingsStore::new(shared_path)),
                    sqlite_path: Some(path),
                    db_type,
                })
            }
            #[cfg(not(feature = "postgres"))]
            DbType::Postgres => Err(DatabaseError::Connection(
                "PostgreSQL feature not enabled".to_string(),
            )),
            #[cfg(not(feature = "sqlite"))]
            DbType::Sqlite => Err(DatabaseError::Connection(
                "SQLite feature not enabled".to_string(),
            )),
        }
    }

    pub async fn migrate(&self) -> Result<(), DatabaseError> {
        match self.db_type {
            #[cfg(feature = "postgres")]
            DbType::Postgres => {
                let pool = self.postgres_pool.clone().ok_or_else(|| {
                    DatabaseError::Migration("postgres pool is not initialized".to_string())
                })?;
                Self::migrate_postgres(pool).await
            }
            #[cfg(feature = "sqlite")]
            DbType::Sqlite => {
                let path = self.sqlite_path.clone().ok_or_else(|| {
                    DatabaseError::Migration("sqlite path is not initialized".to_string())
                })?;
                Self::migrate_sqlite(path).await
            }
            #[cfg(not(feature = "postgres"))]
            DbType::Postgres => Err(DatabaseError::Migration(
                "PostgreSQL feature not enabled".to_string(),
            )),
            #[cfg(not(feature = "sqlite"))]
            DbType::Sqlite => Err(DatabaseError::Migration(
                "SQLite feature not enabled".to_string(),
            )),
        }
    }

    #[cfg(feature = "postgres")]
    async fn migrate_postgres(pool: Pool) -> Result<(), DatabaseError> {
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|e| DatabaseError::Connection(e.to_string()))?;

            for statement in POSTGRES_MIGRATIONS {
                diesel::sql_query(*statement)
                    .execute(&mut conn)
                    .map_err(|e| DatabaseError::Migration(e.to_string()))?;
            }

            Ok(())
        })
        .await
        .map_err(|e| DatabaseError::Migration(format!("migration task failed: {e}")))?
    }

    #[cfg(feature = "sqlite")]
    async fn migrate_sqlite(path: String) -> Result<(), DatabaseError> {
        tokio::task::spawn_blocking(move || {
            let mut conn = SqliteConnection::establish(&path)
                .map_err(|e| DatabaseError::Connection(e.to_string()))?;

            for statement in SQLITE_MIGRATIONS {
                diesel::sql_query(*statement)
                    .execute(&mut conn)
                    .map_err(|e| DatabaseError::Migration(e.to_string()))?;
            }

            Ok(())
        })
        .await
        .map_err(|e| DatabaseError::Migration(format!("migration task failed: {e}")))?
    }

    pub fn automation_store(&self) -> Arc<dyn AutomationStore> {
        self.automation_store.clone()
    }

    pub fn execution_log_store(&self) -> Arc<dyn ExecutionLogStore> {
        self.execution_log_store.clone()
    }

    pub fn event_log_store(&self) -> Arc<dyn EventLogStore> {
        self.event_log_store.clone()
    }

    pub fn guild_settings_store(&self) -> Arc<dyn GuildSettingsStore> {
        self.guild_settings_store.clone()
    }

    /// Deletes event log rows older than `retention_days`.
    pub async fn prune_event_logs(&self, retention_days: u32) -> Result<usize, DatabaseError> {
        match retention_cutoff(Utc::now(), retention_days) {
            Some(before) => self.event_log_store.prune_event_logs(before).await,
            None => Ok(0),
        }
    }

    pub fn db_type(&self) -> DbType {
        self.db_type
    }
}

#[async_trait]
impl AutomationSource for DatabaseManager {
    async fn triggered_automations(
        &self,
        guild_id: &str,
        event_type: &str,
    ) -> Result<Vec<Automation>, DatabaseError> {
        let records = self
            .automation_store
            .get_triggered_automations(guild_id, event_type)
            .await?;
        Ok(records.iter().map(|record| record.to_automation()).collect())
    }

    async fn log_execution(&self, log: &ExecutionLog) -> Result<(), DatabaseError> {
        self.execution_log_store.insert_execution_log(log).await?;
        self.automation_store
            .record_trigger(log.automation_id, Utc::now())
            .await
    }

    async fn record_event(&self, event: &Event) -> Result<(), DatabaseError> {
        let settings = self
            .guild_settings_store
            .get_guild_settings(&event.guild_id)
            .await?;
        if settings.is_some_and(|settings| !settings.allows(event)) {
            return Ok(());
        }
        self.event_log_store.insert_event_log(event).await.map(|_| ())
    }
}
