use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::DatabaseError;
use super::models::{
    AutomationRecord, EventLogQuery, EventLogRecord, EventLogStats, ExecutionLogQuery,
    ExecutionLogRecord, GuildSettings, NewAutomation, Page,
};
use crate::automation::{Event, ExecutionLog};

#[async_trait]
pub trait AutomationStore: Send + Sync {
    async fn create_automation(
        &self,
        automation: &NewAutomation,
    ) -> Result<AutomationRecord, DatabaseError>;
    async fn get_automation(&self, id: i64) -> Result<Option<AutomationRecord>, DatabaseError>;
    async fn list_automations(&self, guild_id: &str)
    -> Result<Vec<AutomationRecord>, DatabaseError>;
    /// Replaces every editable field. The guild, counters and creation time are kept.
    async fn update_automation(
        &self,
        id: i64,
        automation: &NewAutomation,
    ) -> Result<Option<AutomationRecord>, DatabaseError>;
    /// Returns false when no automation has this id.
    async fn set_enabled(&self, id: i64, enabled: bool) -> Result<bool, DatabaseError>;
    /// Removes the automation together with its execution logs.
    async fn delete_automation(&self, id: i64) -> Result<bool, DatabaseError>;
    /// Enabled automations of `guild_id` that list `event_type` among their triggers.
    async fn get_triggered_automations(
        &self,
        guild_id: &str,
        event_type: &str,
    ) -> Result<Vec<AutomationRecord>, DatabaseError>;
    async fn record_trigger(
        &self,
        id: i64,
        triggered_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError>;
}

#[async_trait]
pub trait ExecutionLogStore: Send + Sync {
    async fn insert_execution_log(&self, log: &ExecutionLog) -> Result<i64, DatabaseError>;
    /// Most recent logs first.
    async fn list_execution_logs(
        &self,
        automation_id: i64,
        limit: i64,
    ) -> Result<Vec<ExecutionLogRecord>, DatabaseError>;
    async fn list_guild_execution_logs(
        &self,
        guild_id: &str,
        query: &ExecutionLogQuery,
    ) -> Result<Page<ExecutionLogRecord>, DatabaseError>;
}

#[async_trait]
pub trait EventLogStore: Send + Sync {
    async fn insert_event_log(&self, event: &Event) -> Result<i64, DatabaseError>;
    /// Newest events first.
    async fn list_event_logs(
        &self,
        guild_id: &str,
        query: &EventLogQuery,
    ) -> Result<Page<EventLogRecord>, DatabaseError>;
    /// Totals over the whole log, hourly activity since `since`.
    async fn event_log_stats(
        &self,
        guild_id: &str,
        since: DateTime<Utc>,
    ) -> Result<EventLogStats, DatabaseError>;
    /// Deletes events older than `before` across all guilds.
    async fn prune_event_logs(&self, before: DateTime<Utc>) -> Result<usize, DatabaseError>;
}

#[async_trait]
pub trait GuildSettingsStore: Send + Sync {
    async fn get_guild_settings(
        &self,
        guild_id: &str,
    ) -> Result<Option<GuildSettings>, DatabaseError>;
    async fn upsert_guild_settings(
        &self,
        settings: &GuildSettings,
    ) -> Result<GuildSettings, DatabaseError>;
}
