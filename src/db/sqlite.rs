use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::sql_types::Integer;
use diesel::sqlite::{Sqlite, SqliteConnection};
use std::sync::Arc;

use crate::automation::{Event, ExecutionLog};
use crate::db::schema_sqlite::{automation_logs, automations, event_logs, guild_settings};

use super::{
    DatabaseError,
    models::{
        AutomationRecord, EventLogQuery, EventLogRecord, EventLogStats, ExecutionLogQuery,
        ExecutionLogRecord, GuildSettings, NewAutomation, Page, encode_event_details,
        encode_execution_log, parse_json, parse_optional_json, parse_string_list,
    },
};

fn datetime_to_string(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn string_to_datetime(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::Query(format!("invalid datetime format: {}", e)))
}

// SQLite INTEGER primary keys come back as i32; the public records use i64.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = automations)]
struct DbAutomation {
    id: i32,
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
    last_triggered_at: Option<String>,
    created_at: String,
    updated_at: String,
}

impl DbAutomation {
    fn to_record(&self) -> Result<AutomationRecord, DatabaseError> {
        Ok(AutomationRecord {
            id: self.id as i64,
            guild_id: self.guild_id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            enabled: self.enabled,
            trigger_event: self.trigger_event.clone(),
            trigger_events: parse_json(&self.trigger_events)?,
            trigger_filters: parse_json(&self.trigger_filters)?,
            action_type: self.action_type.clone(),
            action_config: parse_json(&self.action_config)?,
            created_by: self.created_by.clone(),
            trigger_count: self.trigger_count,
            last_triggered_at: self
                .last_triggered_at
                .as_deref()
                .map(string_to_datetime)
                .transpose()?,
            created_at: string_to_datetime(&self.created_at)?,
            updated_at: string_to_datetime(&self.updated_at)?,
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
    created_at: String,
    updated_at: String,
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
    updated_at: String,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = automation_logs)]
struct DbExecutionLog {
    id: i32,
    automation_id: i32,
    guild_id: String,
    trigger_event: String,
    trigger_data: String,
    action_result: String,
    success: bool,
    error_message: Option<String>,
    execution_time_ms: i64,
    created_at: String,
}

impl DbExecutionLog {
    fn to_record(&self) -> Result<ExecutionLogRecord, DatabaseError> {
        Ok(ExecutionLogRecord {
            id: self.id as i64,
            automation_id: self.automation_id as i64,
            guild_id: self.guild_id.clone(),
            trigger_event: self.trigger_event.clone(),
            trigger_data: parse_json(&self.trigger_data)?,
            action_result: parse_json(&self.action_result)?,
            success: self.success,
            error_message: self.error_message.clone(),
            execution_time_ms: self.execution_time_ms,
            created_at: string_to_datetime(&self.created_at)?,
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = automation_logs)]
struct NewDbExecutionLog<'a> {
    automation_id: i32,
    guild_id: &'a str,
    trigger_event: &'a str,
    trigger_data: String,
    action_result: String,
    success: bool,
    error_message: Option<&'a str>,
    execution_time_ms: i64,
    created_at: String,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = event_logs)]
struct DbEventLog {
    id: i32,
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
    created_at: String,
}

impl DbEventLog {
    fn to_record(&self) -> Result<EventLogRecord, DatabaseError> {
        Ok(EventLogRecord {
            id: self.id as i64,
            guild_id: self.guild_id.clone(),
            event_type: self.event_type.clone(),
            event_category: self.event_category.clone(),
            actor_id: self.actor_id.clone(),
            actor_name: self.actor_name.clone(),
            target_id: self.target_id.clone(),
            target_name: self.target_name.clone(),
            channel_id: self.channel_id.clone(),
            channel_name: self.channel_name.clone(),
            details: parse_optional_json(self.details.as_deref())?,
            created_at: string_to_datetime(&self.created_at)?,
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
    created_at: String,
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

impl DbGuildSettings {
    fn to_settings(&self) -> Result<GuildSettings, DatabaseError> {
        Ok(GuildSettings {
            guild_id: self.guild_id.clone(),
            logging_enabled: self.logging_enabled,
            log_channel_id: self.log_channel_id.clone(),
            excluded_channels: parse_string_list(&self.excluded_channels)?,
            excluded_categories: parse_string_list(&self.excluded_categories)?,
        })
    }
}

fn establish_connection(path: &str) -> Result<SqliteConnection, DatabaseError> {
    SqliteConnection::establish(path).map_err(|e| DatabaseError::Connection(e.to_string()))
}

fn last_insert_rowid(conn: &mut SqliteConnection) -> Result<i32, DatabaseError> {
    diesel::select(diesel::dsl::sql::<Integer>("last_insert_rowid()"))
        .get_result::<i32>(conn)
        .map_err(|e| DatabaseError::Query(e.to_string()))
}

async fn with_connection<T, F>(db_path: Arc<String>, operation: F) -> Result<T, DatabaseError>
where
    T: Send + 'static,
    F: FnOnce(&mut SqliteConnection) -> Result<T, DatabaseError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut conn = establish_connection(&db_path)?;
        operation(&mut conn)
    })
    .await
    .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
}

pub struct SqliteAutomationStore {
    db_path: Arc<String>,
}

impl SqliteAutomationStore {
    pub fn new(db_path: Arc<String>) -> Self {
        Self { db_path }
    }
}

fn load_automation(
    conn: &mut SqliteConnection,
    automation_id: i32,
) -> Result<Option<AutomationRecord>, DatabaseError> {
    use crate::db::schema_sqlite::automations::dsl::*;
    automations
        .filter(id.eq(automation_id))
        .select(DbAutomation::as_select())
        .first::<DbAutomation>(conn)
        .optional()
        .map_err(|e| DatabaseError::Query(e.to_string()))?
        .map(|row| row.to_record())
        .transpose()
}

#[async_trait]
impl super::AutomationStore for SqliteAutomationStore {
    async fn create_automation(
        &self,
        automation: &NewAutomation,
    ) -> Result<AutomationRecord, DatabaseError> {
        let automation = automation.clone();
        let encoded = automation.encode()?;
        with_connection(self.db_path.clone(), move |conn| {
            let now = datetime_to_string(&Utc::now());
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
                created_at: now.clone(),
                updated_at: now,
            };

            conn.transaction(|conn| {
                diesel::insert_into(automations::table)
                    .values(&row)
                    .execute(conn)
                    .map_err(|e| DatabaseError::Query(e.to_string()))?;
                let new_id = last_insert_rowid(conn)?;
                load_automation(conn, new_id)?.ok_or_else(|| {
                    DatabaseError::Query(format!("automation {new_id} missing after insert"))
                })
            })
        })
        .await
    }

    async fn get_automation(&self, automation_id: i64) -> Result<Option<AutomationRecord>, DatabaseError> {
        let automation_id = automation_id as i32;
        with_connection(self.db_path.clone(), move |conn| {
            load_automation(conn, automation_id)
        })
        .await
    }

    async fn list_automations(&self, guild: &str) -> Result<Vec<AutomationRecord>, DatabaseError> {
        let guild = guild.to_string();
        with_connection(self.db_path.clone(), move |conn| {
            use crate::db::schema_sqlite::automations::dsl::*;
            let rows = automations
                .filter(guild_id.eq(guild))
                .order(id.asc())
                .select(DbAutomation::as_select())
                .load::<DbAutomation>(conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))?;

            rows.iter().map(DbAutomation::to_record).collect()
        })
        .await
    }

    async fn update_automation(
        &self,
        automation_id: i64,
        automation: &NewAutomation,
    ) -> Result<Option<AutomationRecord>, DatabaseError> {
        let automation_id = automation_id as i32;
        let automation = automation.clone();
        let encoded = automation.encode()?;
        with_connection(self.db_path.clone(), move |conn| {
            let changes = AutomationChanges {
                name: &automation.name,
                description: automation.description.as_deref(),
                enabled: automation.enabled,
                trigger_event: encoded.trigger_event,
                trigger_events: encoded.trigger_events,
                trigger_filters: encoded.trigger_filters,
                action_type: encoded.action_type,
                action_config: encoded.action_config,
                updated_at: datetime_to_string(&Utc::now()),
            };

            conn.transaction(|conn| {
                let updated = diesel::update(automations::table.filter(automations::id.eq(automation_id)))
                    .set(&changes)
                    .execute(conn)
                    .map_err(|e| DatabaseError::Query(e.to_string()))?;
                if updated == 0 {
                    return Ok(None);
                }
                load_automation(conn, automation_id)
            })
        })
        .await
    }

    async fn set_enabled(&self, automation_id: i64, value: bool) -> Result<bool, DatabaseError> {
        let automation_id = automation_id as i32;
        with_connection(self.db_path.clone(), move |conn| {
            use crate::db::schema_sqlite::automations::dsl::*;
            diesel::update(automations.filter(id.eq(automation_id)))
                .set((
                    enabled.eq(value),
                    updated_at.eq(datetime_to_string(&Utc::now())),
                ))
                .execute(conn)
                .map(|updated| updated > 0)
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn delete_automation(&self, automation_id: i64) -> Result<bool, DatabaseError> {
        let automation_id = automation_id as i32;
        with_connection(self.db_path.clone(), move |conn| {
            conn.transaction(|conn| {
                diesel::delete(
                    automation_logs::table.filter(automation_logs::automation_id.eq(automation_id)),
                )
                .execute(conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))?;

                diesel::delete(automations::table.filter(automations::id.eq(automation_id)))
                    .execute(conn)
                    .map(|deleted| deleted > 0)
                    .map_err(|e| DatabaseError::Query(e.to_string()))
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
        with_connection(self.db_path.clone(), move |conn| {
            use crate::db::schema_sqlite::automations::dsl::*;
            let rows = automations
                .filter(guild_id.eq(guild))
                .filter(enabled.eq(true))
                .order(id.asc())
                .select(DbAutomation::as_select())
                .load::<DbAutomation>(conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))?;

            let mut triggered = Vec::new();
            for row in rows {
                let record = row.to_record()?;
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
        let automation_id = automation_id as i32;
        with_connection(self.db_path.clone(), move |conn| {
            use crate::db::schema_sqlite::automations::dsl::*;
            diesel::update(automations.filter(id.eq(automation_id)))
                .set((
                    trigger_count.eq(trigger_count + 1),
                    last_triggered_at.eq(Some(datetime_to_string(&triggered_at))),
                ))
                .execute(conn)
                .map(|_| ())
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }
}

pub struct SqliteExecutionLogStore {
    db_path: Arc<String>,
}

impl SqliteExecutionLogStore {
    pub fn new(db_path: Arc<String>) -> Self {
        Self { db_path }
    }
}

#[async_trait]
impl super::ExecutionLogStore for SqliteExecutionLogStore {
    async fn insert_execution_log(&self, log: &ExecutionLog) -> Result<i64, DatabaseError> {
        let log = log.clone();
        let encoded = encode_execution_log(&log)?;
        with_connection(self.db_path.clone(), move |conn| {
            let row = NewDbExecutionLog {
                automation_id: log.automation_id as i32,
                guild_id: &log.guild_id,
                trigger_event: &log.trigger_event,
                trigger_data: encoded.trigger_data,
                action_result: encoded.action_result,
                success: log.success,
                error_message: log.error_message.as_deref(),
                execution_time_ms: encoded.execution_time_ms,
                created_at: datetime_to_string(&Utc::now()),
            };

            conn.transaction(|conn| {
                diesel::insert_into(automation_logs::table)
                    .values(&row)
                    .execute(conn)
                    .map_err(|e| DatabaseError::Query(e.to_string()))?;
                last_insert_rowid(conn).map(i64::from)
            })
        })
        .await
    }

    async fn list_execution_logs(
        &self,
        automation: i64,
        limit: i64,
    ) -> Result<Vec<ExecutionLogRecord>, DatabaseError> {
        let automation = automation as i32;
        with_connection(self.db_path.clone(), move |conn| {
            use crate::db::schema_sqlite::automation_logs::dsl::*;
            let rows = automation_logs
                .filter(automation_id.eq(automation))
                .order(id.desc())
                .limit(limit)
                .select(DbExecutionLog::as_select())
                .load::<DbExecutionLog>(conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))?;

            rows.iter().map(DbExecutionLog::to_record).collect()
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
        with_connection(self.db_path.clone(), move |conn| {
            let total = filtered_execution_logs(&guild, &query)
                .count()
                .get_result::<i64>(conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))?;
            let rows = filtered_execution_logs(&guild, &query)
                .order(automation_logs::id.desc())
                .limit(query.limit)
                .offset(query.offset)
                .select(DbExecutionLog::as_select())
                .load::<DbExecutionLog>(conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))?;

            let items = rows
                .iter()
                .map(DbExecutionLog::to_record)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Page { items, total })
        })
        .await
    }
}

fn filtered_execution_logs(
    guild: &str,
    query: &ExecutionLogQuery,
) -> automation_logs::BoxedQuery<'static, Sqlite> {
    let mut filtered = automation_logs::table
        .filter(automation_logs::guild_id.eq(guild.to_string()))
        .into_boxed();
    if let Some(automation) = query.automation_id {
        filtered = filtered.filter(automation_logs::automation_id.eq(automation as i32));
    }
    if let Some(success) = query.success {
        filtered = filtered.filter(automation_logs::success.eq(success));
    }
    filtered
}

fn filtered_event_logs(guild: &str, query: &EventLogQuery) -> event_logs::BoxedQuery<'static, Sqlite> {
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
    if let Some(start) = &query.start {
        filtered = filtered.filter(event_logs::created_at.ge(datetime_to_string(start)));
    }
    if let Some(end) = &query.end {
        filtered = filtered.filter(event_logs::created_at.le(datetime_to_string(end)));
    }
    if let Some(pattern) = query.search_pattern() {
        filtered = filtered.filter(
            event_logs::actor_name
                .like(pattern.clone())
                .or(event_logs::target_name.like(pattern.clone()))
                .or(event_logs::channel_name.like(pattern)),
        );
    }
    filtered
}

pub struct SqliteEventLogStore {
    db_path: Arc<String>,
}

impl SqliteEventLogStore {
    pub fn new(db_path: Arc<String>) -> Self {
        Self { db_path }
    }
}

#[async_trait]
impl super::EventLogStore for SqliteEventLogStore {
    async fn insert_event_log(&self, event: &Event) -> Result<i64, DatabaseError> {
        let event = event.clone();
        let details = encode_event_details(&event)?;
        with_connection(self.db_path.clone(), move |conn| {
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
                created_at: datetime_to_string(&Utc::now()),
            };

            conn.transaction(|conn| {
                diesel::insert_into(event_logs::table)
                    .values(&row)
                    .execute(conn)
                    .map_err(|e| DatabaseError::Query(e.to_string()))?;
                last_insert_rowid(conn).map(i64::from)
            })
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
        with_connection(self.db_path.clone(), move |conn| {
            let total = filtered_event_logs(&guild, &query)
                .count()
                .get_result::<i64>(conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))?;
            let rows = filtered_event_logs(&guild, &query)
                .order(event_logs::id.desc())
                .limit(query.limit)
                .offset(query.offset)
                .select(DbEventLog::as_select())
                .load::<DbEventLog>(conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))?;

            let items = rows
                .iter()
                .map(DbEventLog::to_record)
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
        with_connection(self.db_path.clone(), move |conn| {
            use crate::db::schema_sqlite::event_logs::dsl::*;
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
                .filter(created_at.ge(datetime_to_string(&since)))
                .select(created_at)
                .load::<String>(conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))?
                .iter()
                .map(|raw| string_to_datetime(raw.as_str()))
                .collect::<Result<Vec<_>, _>>()?;

            Ok(EventLogStats::from_counts(by_category, by_type, &recent))
        })
        .await
    }

    async fn prune_event_logs(&self, before: DateTime<Utc>) -> Result<usize, DatabaseError> {
        with_connection(self.db_path.clone(), move |conn| {
            use crate::db::schema_sqlite::event_logs::dsl::*;
            diesel::delete(event_logs.filter(created_at.lt(datetime_to_string(&before))))
                .execute(conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }
}

pub struct SqliteGuildSettingsStore {
    db_path: Arc<String>,
}

impl SqliteGuildSettingsStore {
    pub fn new(db_path: Arc<String>) -> Self {
        Self { db_path }
    }
}

fn load_guild_settings(
    conn: &mut SqliteConnection,
    guild: &str,
) -> Result<Option<GuildSettings>, DatabaseError> {
    use crate::db::schema_sqlite::guild_settings::dsl::*;
    guild_settings
        .filter(guild_id.eq(guild))
        .select(DbGuildSettings::as_select())
        .first::<DbGuildSettings>(conn)
        .optional()
        .map_err(|e| DatabaseError::Query(e.to_string()))?
        .map(|row| row.to_settings())
        .transpose()
}

#[async_trait]
impl super::GuildSettingsStore for SqliteGuildSettingsStore {
    async fn get_guild_settings(&self, guild: &str) -> Result<Option<GuildSettings>, DatabaseError> {
        let guild = guild.to_string();
        with_connection(self.db_path.clone(), move |conn| load_guild_settings(conn, &guild)).await
    }

    async fn upsert_guild_settings(
        &self,
        settings: &GuildSettings,
    ) -> Result<GuildSettings, DatabaseError> {
        let settings = settings.clone();
        let (channels, categories) = settings.encode_lists()?;
        with_connection(self.db_path.clone(), move |conn| {
            use crate::db::schema_sqlite::guild_settings::dsl::*;
            let now = datetime_to_string(&Utc::now());
            conn.transaction(|conn| {
                diesel::insert_into(guild_settings)
                    .values((
                        guild_id.eq(settings.guild_id.as_str()),
                        logging_enabled.eq(settings.logging_enabled),
                        log_channel_id.eq(settings.log_channel_id.as_deref()),
                        excluded_channels.eq(channels.as_str()),
                        excluded_categories.eq(categories.as_str()),
                        updated_at.eq(now.as_str()),
                    ))
                    .on_conflict(guild_id)
                    .do_update()
                    .set((
                        logging_enabled.eq(settings.logging_enabled),
                        log_channel_id.eq(settings.log_channel_id.as_deref()),
                        excluded_channels.eq(channels.as_str()),
                        excluded_categories.eq(categories.as_str()),
                        updated_at.eq(now.as_str()),
                    ))
                    .execute(conn)
                    .map_err(|e| DatabaseError::Query(e.to_string()))?;
                load_guild_settings(conn, &settings.guild_id)?.ok_or_else(|| {
                    DatabaseError::Query(format!(
                        "settings for guild {} missing after upsert",
                        settings.guild_id
                    ))
                })
            })
        })
        .await
    }
}
