use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::pg::{Pg, PgConnection};
use diesel::prelude::*;

use crate::automation::{Event, ExecutionLog};
use crate::db::manager::Pool;
use crate::db::schema::{automation_logs, automations, event_logs, guild_settings};

use super::{
    DatabaseError,
    models::{
        AutomationRecord, EventLogQuery, EventLogRecord, EventLogStats, ExecutionLogQuery,
        ExecutionLogRecord, GuildSettings, NewAutomation, Page, encode_event_details,
        encode_execution_log, parse_json, parse_optional_json, parse_string_list,
    },
};

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = automations)]
struct DbAutomation {
    id: i64,
    guild_id: String,
    name: String,
    description: Option<String>,
    enabled: bool,
    trigger_event: Option<String>,
    trigger_events: String,
    trigger_filters: String,
    action_type: Option<String>,
    action_config: String,
    created_by: Option<String>,
    trigger_count: i64,
    last_triggered_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<DbAutomation> for AutomationRecord {
    type Error = DatabaseError;

    fn try_from(value: DbAutomation) -> Result<Self, Self::Error> {
        Ok(Self {
            id: value.id,
            guild_id: value.guild_id,
            name: value.name,
            description: value.description,
            enabled: value.enabled,
            trigger_event: value.trigger_event,
            trigger_events: parse_json(&value.trigger_events)?,
            trigger_filters: parse_json(&value.trigger_filters)?,
            action_type: value.action_type,
            action_config: parse_json(&value.action_config)?,
            created_by: value.created_by,
            trigger_count: value.trigger_count,
            last_triggered_at: value.last_triggered_at,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = automations)]
struct NewDbAutomation<'a> {
    guild_id: &'a str,
    name: &'a str,
    description: Option<&'a str>,
    enabled: bool,
    trigger_event: Option<String>,
    trigger_events: String,
    trigger_filters: String,
    action_type: Option<String>,
    action_config: String,
    created_by: Option<&'a str>,
    trigger_count: i64,
    created_at: &'a DateTime<Utc>,
    updated_at: &'a DateTime<Utc>,
}

#[derive(AsChangeset)]
#[diesel(table_name = automations, treat_none_as_null = true)]
struct AutomationChanges<'a> {
    name: &'a str,
    description: Option<&'a str>,
    enabled: bool,
    trigger_event: Option<String>,
    trigger_events: String,
    trigger_filters: String,
    action_type: Option<String>,
    action_config: String,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = automation_logs)]
struct DbExecutionLog {
    id: i64,
    automation_id: i64,
    guild_id: String,
    trigger_event: String,
    trigger_data: String,
    action_result: String,
    success: bool,
    error_message: Option<String>,
    execution_time_ms: i64,
    created_at: DateTime<Utc>,
}

impl TryFrom<DbExecutionLog> for ExecutionLogRecord {
    type Error = DatabaseError;

    fn try_from(value: DbExecutionLog) -> Result<Self, Self::Error> {
        Ok(Self {
            id: value.id,
            automation_id: value.automation_id,
            guild_id: value.guild_id,
            trigger_event: value.trigger_event,
            trigger_data: parse_json(&value.trigger_data)?,
            action_result: parse_json(&value.action_result)?,
            success: value.success,
            error_message: value.error_message,
            execution_time_ms: value.execution_time_ms,
            created_at: value.created_at,
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = automation_logs)]
struct NewDbExecutionLog<'a> {
    automation_id: i64,
    guild_id: &'a str,
    trigger_event: &'a str,
    trigger_data: String,
    action_result: String,
    success: bool,
    error_message: Option<&'a str>,
    execution_time_ms: i64,
    created_at: &'a DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = event_logs)]
struct DbEventLog {
    id: i64,
    guild_id: String,
    event_type: String,
    event_category: String,
    actor_id: Option<String>,
    actor_name: Option<String>,
    target_id: Option<String>,
    target_name: Option<String>,
    channel_id: Option<String>,
    channel_name: Option<String>,
    details: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<DbEventLog> for EventLogRecord {
    type Error = DatabaseError;

    fn try_from(value: DbEventLog) -> Result<Self, Self::Error> {
        Ok(Self {
            id: value.id,
            guild_id: value.guild_id,
            event_type: value.event_type,
            event_category: value.event_category,
            actor_id: value.actor_id,
            actor_name: value.actor_name,
            target_id: value.target_id,
            target_name: value.target_name,
            channel_id: value.channel_id,
            channel_name: value.channel_name,
            details: parse_optional_json(value.details.as_deref())?,
            created_at: value.created_at,
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = event_logs)]
struct NewDbEventLog<'a> {
    guild_id: &'a str,
    event_type: &'a str,
    event_category: &'a str,
    actor_id: Option<&'a str>,
    actor_name: Option<&'a str>,
    target_id: Option<&'a str>,
    target_name: Option<&'a str>,
    channel_id: Option<&'a str>,
    channel_name: Option<&'a str>,
    details: Option<String>,
    created_at: &'a DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = guild_settings)]
struct DbGuildSettings {
    guild_id: String,
    logging_enabled: bool,
    log_channel_id: Option<String>,
    excluded_channels: String,
    excluded_categories: String,
}

impl TryFrom<DbGuildSettings> for GuildSettings {
    type Error = DatabaseError;

    fn try_from(value: DbGuildSettings) -> Result<Self, Self::Error> {
        Ok(Self {
            guild_id: value.guild_id,
            logging_enabled: value.logging_enabled,
            log_channel_id: value.log_channel_id,
            excluded_channels: parse_string_list(&value.excluded_channels)?,
            excluded_categories: parse_string_list(&value.excluded_categories)?,
        })
    }
}

async fn with_connection<T, F>(pool: Pool, operation: F) -> Result<T, DatabaseError>
where
    T: Send + 'static,
    F: FnOnce(&mut PgConnection) -> Result<T, DatabaseError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut conn = pool
            .get()
            .map_err(|e| DatabaseError::Connection(e.to_string()))?;
        operation(&mut conn)
    })
    .await
    .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
}

pub struct PostgresAutomationStore {
    pool: Pool,
}

impl PostgresAutomationStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl super::AutomationStore for PostgresAutomationStore {
    async fn create_automation(
        &self,
        automation: &NewAutomation,
    ) -> Result<AutomationRecord, DatabaseError> {
        let automation = automation.clone();
        let encoded = automation.encode()?;
        let pool = self.pool.clone();
        with_connection(pool, move |conn| {
            let now = Utc::now();
            let row = NewDbAutomation {
                guild_id: &automation.guild_id,
                name: &automation.name,
                description: automation.description.as_deref(),
                enabled: automation.enabled,
                trigger_event: encoded.trigger_event,
                trigger_events: encoded.trigger_events,
                trigger_filters: encoded.trigger_filters,
                action_type: encoded.action_type,
                action_config: encoded.action_config,
                created_by: automation.created_by.as_deref(),
                trigger_count: 0,
                created_at: &now,
                updated_at: &now,
            };

            diesel::insert_into(automations::table)
                .values(&row)
                .returning(DbAutomation::as_returning())
                .get_result::<DbAutomation>(conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))?
                .try_into()
        })
        .await
    }

    async fn get_automation(&self, automation_id: i64) -> Result<Option<AutomationRecord>, DatabaseError> {
        let pool = self.pool.clone();
        with_connection(pool, move |conn| {
            use crate::db::schema::automations::dsl::*;
            automations
                .filter(id.eq(automation_id))
                .select(DbAutomation::as_select())
                .first::<DbAutomation>(conn)
                .optional()
                .map_err(|e| DatabaseError::Query(e.to_string()))?
                .map(AutomationRecord::try_from)
                .transpose()
        })
        .await
    }

    async fn list_automations(&self, guild: &str) -> Result<Vec<AutomationRecord>, DatabaseError> {
        let guild = guild.to_string();
        let pool = self.pool.clone();
        with_connection(pool, move |conn| {
            use crate::db::schema::automations::dsl::*;
            automations
                .filter(guild_id.eq(guild))
                .order(id.asc())
                .select(DbAutomation::as_select())
                .load::<DbAutomation>(conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))?
                .into_iter()
                .map(AutomationRecord::try_from)
                .collect()
        })
        .await
    }

    async fn update_automation(
        &self,
        automation_id: i64,
        automation: &NewAutomation,
    ) -> Result<Option<AutomationRecord>, DatabaseError> {
        let automation = automation.clone();
        let encoded = automation.encode()?;
        let pool = self.pool.clone();
        with_connection(pool, move |conn| {
            let changes = AutomationChanges {
                name: &automation.name,
                description: automation.description.as_deref(),
                enabled: automation.enabled,
                trigger_event: encoded.trigger_event,
                trigger_events: encoded.trigger_events,
                trigger_filters: encoded.trigger_filters,
                action_type: encoded.action_type,
                action_config: encoded.action_config,
                updated_at: Utc::now(),
            };

            diesel::update(automations::table.filter(automations::id.eq(automation_id)))
                .set(&changes)
                .returning(DbAutomation::as_returning())
                .get_result::<DbAutomation>(conn)
                .optional()
                .map_err(|e| DatabaseError::Query(e.to_string()))?
                .map(AutomationRecord::try_from)
                .transpose()
        })
        .await
    }

    async fn set_enabled(&self, automation_id: i64, value: bool) -> Result<bool, DatabaseError> {
        let pool = self.pool.clone();
        with_connection(pool, move |conn| {
            use crate::db::schema::automations::dsl::*;
            diesel::update(automations.filter(id.eq(automation_id)))
                .set((enabled.eq(value), updated_at.eq(Utc::now())))
                .execute(conn)
                .map(|updated| updated > 0)
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn delete_automation(&self, automation_id: i64) -> Result<bool, DatabaseError> {
        let pool = self.pool.clone();
        with_connection(pool, move |conn| {
            conn.transaction(|conn| {
                diesel::delete(
                    automation_logs::table.filter(automation_logs::automation_id.eq(automation_id)),
                )
                .execute(conn)?;

                diesel::delete(automations::table.filter(automations::id.eq(automation_id)))
                    .execute(conn)
                    .map(|deleted| deleted > 0)
                    .map_err(DatabaseError::from)
            })
        })
        .await
    }

    async fn get_triggered_automations(
        &self,
        guild: &str,
        event_type: &str,
    ) -> Result<Vec<AutomationRecord>, DatabaseError> {
        let guild = guild.to_string();
        let event_type = event_type.to_string();
        let pool = self.pool.clone();
        with_connection(pool, move |conn| {
            use crate::db::schema::automations::dsl::*;
            let rows = automations
                .filter(guild_id.eq(guild))
                .filter(enabled.eq(true))
                .order(id.asc())
                .select(DbAutomation::as_select())
                .load::<DbAutomation>(conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))?;

            let mut triggered = Vec::new();
            for row in rows {
                let record = AutomationRecord::try_from(row)?;
                if record.triggers_on(&event_type) {
                    triggered.push(record);
                }
            }
            Ok(triggered)
        })
        .await
    }

    async fn record_trigger(
        &self,
        automation_id: i64,
        triggered_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        let pool = self.pool.clone();
        with_connection(pool, move |conn| {
            use crate::db::schema::automations::dsl::*;
            diesel::update(automations.filter(id.eq(automation_id)))
                .set((
                    trigger_count.eq(trigger_count + 1),
                    last_triggered_at.eq(Some(triggered_at)),
                ))
                .execute(conn)
                .map(|_| ())
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }
}

pub struct PostgresExecutionLogStore {
    pool: Pool,
}

impl PostgresExecutionLogStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl super::ExecutionLogStore for PostgresExecutionLogStore {
    async fn insert_execution_log(&self, log: &ExecutionLog) -> Result<i64, DatabaseError> {
        let log = log.clone();
        let encoded = encode_execution_log(&log)?;
        let pool = self.pool.clone();
        with_connection(pool, move |conn| {
            let now = Utc::now();
            let row = NewDbExecutionLog {
                automation_id: log.automation_id,
                guild_id: &log.guild_id,
                trigger_event: &log.trigger_event,
                trigger_data: encoded.trigger_data,
                action_result: encoded.action_result,
                success: log.success,
                error_message: log.error_message.as_deref(),
                execution_time_ms: encoded.execution_time_ms,
                created_at: &now,
            };

            diesel::insert_into(automation_logs::table)
                .values(&row)
                .returning(automation_logs::id)
                .get_result::<i64>(conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn list_execution_logs(
        &self,
        automation: i64,
        limit: i64,
    ) -> Result<Vec<ExecutionLogRecord>, DatabaseError> {
        let pool = self.pool.clone();
        with_connection(pool, move |conn| {
            use crate::db::schema::automation_logs::dsl::*;
            automation_logs
                .filter(automation_id.eq(automation))
                .order(id.desc())
                .limit(limit)
                .select(DbExecutionLog::as_select())
                .load::<DbExecutionLog>(conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))?
                .into_iter()
                .map(ExecutionLogRecord::try_from)
                .collect()
        })
        .await
    }

    async fn list_guild_execution_logs(
        &self,
        guild: &str,
        query: &ExecutionLogQuery,
    ) -> Result<Page<ExecutionLogRecord>, DatabaseError> {
        let guild = guild.to_string();
        let query = query.clone();
        let pool = self.pool.clone();
        with_connection(pool, move |conn| {
            let total = filtered_execution_logs(&guild, &query)
                .count()
                .get_result::<i64>(conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))?;
            let items = filtered_execution_logs(&guild, &query)
                .order(automation_logs::id.desc())
                .limit(query.limit)
                .offset(query.offset)
                .select(DbExecutionLog::as_select())
                .load::<DbExecutionLog>(conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))?
                .into_iter()
                .map(ExecutionLogRecord::try_from)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Page { items, total })
        })
        .await
    }
}

fn filtered_execution_logs(
    guild: &str,
    query: &ExecutionLogQuery,
) -> automation_logs::BoxedQuery<'static, Pg> {
    let mut filtered = automation_logs::table
        .filter(automation_logs::guild_id.eq(guild.to_string()))
        .into_boxed();
    if let Some(automation) = query.automation_id {
        filtered = filtered.filter(automation_logs::automation_id.eq(automation));
    }
    if let Some(success) = query.success {
        filtered = filtered.filter(automation_logs::success.eq(success));
    }
    filtered
}

fn filtered_event_logs(guild: &str, query: &EventLogQuery) -> event_logs::BoxedQuery<'static, Pg> {
    let mut filtered = event_logs::table
        .filter(event_logs::guild_id.eq(guild.to_string()))
        .into_boxed();
    if let Some(category) = &query.category {
        filtered = filtered.filter(event_logs::event_category.eq(category.clone()));
    }
    if let Some(event_type) = &query.event_type {
        filtered = filtered.filter(event_logs::event_type.eq(event_type.clone()));
    }
    if let Some(actor) = &query.actor_id {
        filtered = filtered.filter(event_logs::actor_id.eq(actor.clone()));
    }
    if let Some(start) = query.start {
        filtered = filtered.filter(event_logs::created_at.ge(start));
    }
    if let Some(end) = query.end {
        filtered = filtered.filter(event_logs::created_at.le(end));
    }
    if let Some(pattern) = query.search_pattern() {
        filtered = filtered.filter(
            event_logs::actor_name
                .ilike(pattern.clone())
                .or(event_logs::target_name.ilike(pattern.clone()))
                .or(event_logs::channel_name.ilike(pattern)),
        );
    }
    filtered
}

pub struct PostgresEventLogStore {
    pool: Pool,
}

impl PostgresEventLogStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl super::EventLogStore for PostgresEventLogStore {
    async fn insert_event_log(&self, event: &Event) -> Result<i64, DatabaseError> {
        let event = event.clone();
        let details = encode_event_details(&event)?;
        let pool = self.pool.clone();
        with_connection(pool, move |conn| {
            let now = Utc::now();
            let row = NewDbEventLog {
                guild_id: &event.guild_id,
                event_type: &event.event_type,
                event_category: &event.event_category,
                actor_id: event.actor_id.as_deref(),
                actor_name: event.actor_name.as_deref(),
                target_id: event.target_id.as_deref(),
                target_name: event.target_name.as_deref(),
                channel_id: event.channel_id.as_deref(),
                channel_name: event.channel_name.as_deref(),
                details,
                created_at: &now,
            };

            diesel::insert_into(event_logs::table)
                .values(&row)
                .returning(event_logs::id)
                .get_result::<i64>(conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn list_event_logs(
        &self,
        guild: &str,
        query: &EventLogQuery,
    ) -> Result<Page<EventLogRecord>, DatabaseError> {
        let guild = guild.to_string();
        let query = query.clone();
        let pool = self.pool.clone();
        with_connection(pool, move |conn| {
            let total = filtered_event_logs(&guild, &query)
                .count()
                .get_result::<i64>(conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))?;
            let items = filtered_event_logs(&guild, &query)
                .order(event_logs::id.desc())
                .limit(query.limit)
                .offset(query.offset)
                .select(DbEventLog::as_select())
                .load::<DbEventLog>(conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))?
                .into_iter()
                .map(EventLogRecord::try_from)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Page { items, total })
        })
        .await
    }

    async fn event_log_stats(
        &self,
        guild: &str,
        since: DateTime<Utc>,
    ) -> Result<EventLogStats, DatabaseError> {
        let guild = guild.to_string();
        let pool = self.pool.clone();
        with_connection(pool, move |conn| {
            use crate::db::schema::event_logs::dsl::*;
            let by_category = event_logs
                .filter(guild_id.eq(guild.clone()))
                .group_by(event_category)
                .select((event_category, diesel::dsl::count_star()))
                .load::<(String, i64)>(conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))?;
            let by_type = event_logs
                .filter(guild_id.eq(guild.clone()))
                .group_by(event_type)
                .select((event_type, diesel::dsl::count_star()))
                .load::<(String, i64)>(conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))?;
            let recent = event_logs
                .filter(guild_id.eq(guild))
                .filter(created_at.ge(since))
                .select(created_at)
                .load::<DateTime<Utc>>(conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))?;

            Ok(EventLogStats::from_counts(by_category, by_type, &recent))
        })
        .await
    }

    async fn prune_event_logs(&self, before: DateTime<Utc>) -> Result<usize, DatabaseError> {
        let pool = self.pool.clone();
        with_connection(pool, move |conn| {
            use crate::db::schema::event_logs::dsl::*;
            diesel::delete(event_logs.filter(created_at.lt(before)))
                .execute(conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }
}

pub struct PostgresGuildSettingsStore {
    pool: Pool,
}

impl PostgresGuildSettingsStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl super::GuildSettingsStore for PostgresGuildSettingsStore {
    async fn get_guild_settings(&self, guild: &str) -> Result<Option<GuildSettings>, DatabaseError> {
        let guild = guild.to_string();
        let pool = self.pool.clone();
        with_connection(pool, move |conn| {
            use crate::db::schema::guild_settings::dsl::*;
            guild_settings
                .filter(guild_id.eq(guild))
                .select(DbGuildSettings::as_select())
                .first::<DbGuildSettings>(conn)
                .optional()
                .map_err(|e| DatabaseError::Query(e.to_string()))?
                .map(GuildSettings::try_from)
                .transpose()
        })
        .await
    }

    async fn upsert_guild_settings(
        &self,
        settings: &GuildSettings,
    ) -> Result<GuildSettings, DatabaseError> {
        let settings = settings.clone();
        let (channels, categories) = settings.encode_lists()?;
        let pool = self.pool.clone();
        with_connection(pool, move |conn| {
            use crate::db::schema::guild_settings::dsl::*;
            let now = Utc::now();
            diesel::insert_into(guild_settings)
                .values((
                    guild_id.eq(settings.guild_id.as_str()),
                    logging_enabled.eq(settings.logging_enabled),
                    log_channel_id.eq(settings.log_channel_id.as_deref()),
                    excluded_channels.eq(channels.as_str()),
                    excluded_categories.eq(categories.as_str()),
                    updated_at.eq(now),
                ))
                .on_conflict(guild_id)
                .do_update()
                .set((
                    logging_enabled.eq(settings.logging_enabled),
                    log_channel_id.eq(settings.log_channel_id.as_deref()),
                    excluded_channels.eq(channels.as_str()),
                    excluded_categories.eq(categories.as_str()),
                    updated_at.eq(now),
                ))
                .returning(DbGuildSettings::as_returning())
                .get_result::<DbGuildSettings>(conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))
                .and_then(GuildSettings::try_from)
        })
        .await
    }
}
