use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use super::DatabaseError;
use crate::automation::model::{ActionSpec, Automation, Event, ExecutionLog, normalize_actions};

/// An `automations` row with its JSON columns decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationRecord {
    pub id: i64,
    pub guild_id: String,
    pub name: String,
    pub description: Option<String>,
    pub enabled: bool,
    /// Single trigger kept by rows written before multi-trigger support.
    pub trigger_event: Option<String>,
    pub trigger_events: Value,
    pub trigger_filters: Value,
    pub action_type: Option<String>,
    pub action_config: Value,
    pub created_by: Option<String>,
    pub trigger_count: i64,
    pub last_triggered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AutomationRecord {
    pub fn trigger_list(&self) -> Vec<String> {
        let mut events: Vec<String> = self
            .trigger_events
            .as_array()
            .map(|events| {
                events
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        if let Some(legacy) = self.trigger_event.as_deref().filter(|e| !e.is_empty()) {
            if !events.iter().any(|event| event == legacy) {
                events.push(legacy.to_string());
            }
        }
        events
    }

    pub fn triggers_on(&self, event_type: &str) -> bool {
        self.trigger_list().iter().any(|event| event == event_type)
    }

    pub fn to_automation(&self) -> Automation {
        Automation {
            id: self.id,
            guild_id: self.guild_id.clone(),
            name: self.name.clone(),
            enabled: self.enabled,
            trigger_events: self.trigger_list(),
            trigger_filters: self.trigger_filters.as_object().cloned().unwrap_or_default(),
            actions: normalize_actions(self.action_type.as_deref(), &self.action_config),
            created_by: self.created_by.clone(),
            trigger_count: self.trigger_count,
            last_triggered_at: self.last_triggered_at,
        }
    }
}

/// Input for [`AutomationStore::create_automation`](super::AutomationStore::create_automation)
/// and `update_automation`. The guild comes from the route, not the body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewAutomation {
    #[serde(default)]
    pub guild_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub trigger_events: Vec<String>,
    #[serde(default)]
    pub trigger_filters: Map<String, Value>,
    pub actions: Vec<ActionSpec>,
    #[serde(default)]
    pub created_by: Option<String>,
}

fn default_enabled() -> bool {
    true
}

/// Column values of a [`NewAutomation`] as they are written.
pub(crate) struct EncodedAutomation {
    pub trigger_event: Option<String>,
    pub trigger_events: String,
    pub trigger_filters: String,
    pub action_type: Option<String>,
    pub action_config: String,
}

impl NewAutomation {
    pub(crate) fn encode(&self) -> Result<EncodedAutomation, DatabaseError> {
        let actions: Vec<Value> = self
            .actions
            .iter()
            .map(|action| json!({ "type": action.action_type, "config": action.config }))
            .collect();

        Ok(EncodedAutomation {
            trigger_event: self.trigger_events.first().cloned(),
            trigger_events: serde_json::to_string(&self.trigger_events)?,
            trigger_filters: serde_json::to_string(&self.trigger_filters)?,
            action_type: self.actions.first().map(|action| action.action_type.clone()),
            action_config: serde_json::to_string(&json!({ "actions": actions }))?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionLogRecord {
    pub id: i64,
    pub automation_id: i64,
    pub guild_id: String,
    pub trigger_event: String,
    pub trigger_data: Value,
    pub action_result: Value,
    pub success: bool,
    pub error_message: Option<String>,
    pub execution_time_ms: i64,
    pub created_at: DateTime<Utc>,
}

pub(crate) struct EncodedExecutionLog {
    pub trigger_data: String,
    pub action_result: String,
    pub execution_time_ms: i64,
}

pub(crate) fn encode_execution_log(log: &ExecutionLog) -> Result<EncodedExecutionLog, DatabaseError> {
    Ok(EncodedExecutionLog {
        trigger_data: serde_json::to_string(&log.trigger_data)?,
        action_result: serde_json::to_string(&log.action_result)?,
        execution_time_ms: i64::try_from(log.execution_time_ms).unwrap_or(i64::MAX),
    })
}

pub(crate) fn parse_json(raw: &str) -> Result<Value, DatabaseError> {
    Ok(serde_json::from_str(raw)?)
}

/// One page of rows plus the number of rows matching the query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
}

impl<T> Page<T> {
    pub fn has_more(&self, offset: i64) -> bool {
        offset + (self.items.len() as i64) < self.total
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionLogQuery {
    pub limit: i64,
    pub offset: i64,
    pub automation_id: Option<i64>,
    pub success: Option<bool>,
}

impl Default for ExecutionLogQuery {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
            automation_id: None,
            success: None,
        }
    }
}

/// An `event_logs` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventLogRecord {
    pub id: i64,
    pub guild_id: String,
    pub event_type: String,
    pub event_category: String,
    pub actor_id: Option<String>,
    pub actor_name: Option<String>,
    pub target_id: Option<String>,
    pub target_name: Option<String>,
    pub channel_id: Option<String>,
    pub channel_name: Option<String>,
    pub details: Value,
    pub created_at: DateTime<Utc>,
}

pub(crate) fn encode_event_details(event: &Event) -> Result<Option<String>, DatabaseError> {
    event
        .details
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(DatabaseError::from)
}

pub(crate) fn parse_optional_json(raw: Option<&str>) -> Result<Value, DatabaseError> {
    raw.map(parse_json).transpose().map(Option::unwrap_or_default)
}

/// Filters for listing a guild's event log. Text search matches actor,
/// target and channel names.
#[derive(Debug, Clone, PartialEq)]
pub struct EventLogQuery {
    pub limit: i64,
    pub offset: i64,
    pub category: Option<String>,
    pub event_type: Option<String>,
    pub actor_id: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub search: Option<String>,
}

impl Default for EventLogQuery {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
            category: None,
            event_type: None,
            actor_id: None,
            start: None,
            end: None,
            search: None,
        }
    }
}

impl EventLogQuery {
    pub(crate) fn search_pattern(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|search| !search.is_empty())
            .map(|search| format!("%{search}%"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventTypeCount {
    pub event_type: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HourlyCount {
    pub hour: String,
    pub count: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventLogStats {
    pub total_events: i64,
    pub by_category: BTreeMap<String, i64>,
    pub top_events: Vec<EventTypeCount>,
    pub recent_activity: Vec<HourlyCount>,
}

pub(crate) const TOP_EVENT_TYPES: usize = 10;

impl EventLogStats {
    /// Builds the statistics from grouped counts and recent timestamps.
    pub(crate) fn from_counts(
        by_category: Vec<(String, i64)>,
        mut by_type: Vec<(String, i64)>,
        recent: &[DateTime<Utc>],
    ) -> Self {
        by_type.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        by_type.truncate(TOP_EVENT_TYPES);

        let by_category: BTreeMap<String, i64> = by_category.into_iter().collect();
        Self {
            total_events: by_category.values().sum(),
            by_category,
            top_events: by_type
                .into_iter()
                .map(|(event_type, count)| EventTypeCount { event_type, count })
                .collect(),
            recent_activity: hourly_activity(recent),
        }
    }
}

/// Event counts per hour, newest hour first.
pub(crate) fn hourly_activity(timestamps: &[DateTime<Utc>]) -> Vec<HourlyCount> {
    let mut buckets: BTreeMap<String, i64> = BTreeMap::new();
    for at in timestamps {
        *buckets.entry(at.format("%Y-%m-%d %H:00").to_string()).or_default() += 1;
    }
    buckets
        .into_iter()
        .rev()
        .map(|(hour, count)| HourlyCount { hour, count })
        .collect()
}

/// Per-guild event log settings. Guilds without a row log everything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuildSettings {
    #[serde(default)]
    pub guild_id: String,
    #[serde(default = "default_enabled")]
    pub logging_enabled: bool,
    #[serde(default)]
    pub log_channel_id: Option<String>,
    #[serde(default)]
    pub excluded_channels: Vec<String>,
    #[serde(default)]
    pub excluded_categories: Vec<String>,
}

impl GuildSettings {
    pub fn new(guild_id: impl Into<String>) -> Self {
        Self {
            guild_id: guild_id.into(),
            logging_enabled: true,
            log_channel_id: None,
            excluded_channels: Vec::new(),
            excluded_categories: Vec::new(),
        }
    }

    /// Whether `event` belongs in this guild's event log.
    pub fn allows(&self, event: &Event) -> bool {
        if !self.logging_enabled {
            return false;
        }
        if let Some(channel_id) = event.channel_id.as_deref() {
            if self.excluded_channels.iter().any(|excluded| excluded == channel_id) {
                return false;
            }
        }
        !self
            .excluded_categories
            .iter()
            .any(|excluded| *excluded == event.event_category)
    }

    pub(crate) fn encode_lists(&self) -> Result<(String, String), DatabaseError> {
        Ok((
            serde_json::to_string(&self.excluded_channels)?,
            serde_json::to_string(&self.excluded_categories)?,
        ))
    }
}

pub(crate) fn parse_string_list(raw: &str) -> Result<Vec<String>, DatabaseError> {
    Ok(serde_json::from_str(raw)?)
}
