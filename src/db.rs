pub use self::error::DatabaseError;
pub use self::manager::DatabaseManager;
pub use self::models::{
    AutomationRecord, EventLogQuery, EventLogRecord, EventLogStats, ExecutionLogQuery,
    ExecutionLogRecord, GuildSettings, NewAutomation, Page,
};
pub use self::stores::{AutomationStore, EventLogStore, ExecutionLogStore, GuildSettingsStore};

pub mod error;
pub mod manager;
pub mod models;
pub mod stores;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "postgres")]
pub mod schema;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "sqlite")]
pub mod schema_sqlite;
