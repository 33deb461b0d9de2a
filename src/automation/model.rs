use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::metadata;

/// A normalized record of something that happened in a guild.
///
/// Gateway normalization produces one of these per callback. Slash-command
/// options arrive either nested under `options` or flattened as
/// `option_<name>` keys, which land in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub guild_id: String,
    pub event_type: String,
    pub event_category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Map<String, Value>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Event {
    pub fn new(guild_id: impl Into<String>, event_type: impl Into<String>) -> Self {
        let event_type = event_type.into();
        Self {
            guild_id: guild_id.into(),
            event_category: metadata::event_category(&event_type).to_string(),
            event_type,
            ..Self::default()
        }
    }

    pub fn detail(&self, key: &str) -> Option<&Value> {
        self.details.as_ref().and_then(|details| details.get(key))
    }

    pub fn detail_str(&self, key: &str) -> Option<&str> {
        self.detail(key).and_then(Value::as_str)
    }

    pub fn is_bot(&self) -> bool {
        matches!(self.detail("isBot"), Some(Value::Bool(true)))
    }

    /// Looks up a command option, nested form first, then the flattened
    /// `option_<name>` field. Falsy values count as absent.
    pub fn option_value(&self, name: &str) -> Option<&Value> {
        let nested = self
            .options
            .as_ref()
            .and_then(|options| options.get(name))
            .filter(|value| is_truthy(value));
        nested.or_else(|| {
            self.extra
                .get(&format!("option_{name}"))
                .filter(|value| is_truthy(value))
        })
    }
}

/// JavaScript-style truthiness for loosely typed config values.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Plain string form of a JSON value, as used in ids and templates.
pub fn value_to_plain_string(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::String(text) => text.clone(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Null => String::new(),
                other => value_to_plain_string(other),
            })
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => "[object Object]".to_string(),
    }
}

/// One configured action of an automation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionSpec {
    #[serde(rename = "type")]
    pub action_type: String,
    #[serde(default)]
    pub config: Map<String, Value>,
}

impl ActionSpec {
    pub fn new(action_type: impl Into<String>, config: Map<String, Value>) -> Self {
        Self {
            action_type: action_type.into(),
            config,
        }
    }
}

/// A guild-scoped rule in its canonical in-memory shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Automation {
    pub id: i64,
    pub guild_id: String,
    pub name: String,
    pub enabled: bool,
    pub trigger_events: Vec<String>,
    #[serde(default)]
    pub trigger_filters: Map<String, Value>,
    pub actions: Vec<ActionSpec>,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub trigger_count: i64,
    #[serde(default)]
    pub last_triggered_at: Option<DateTime<Utc>>,
}

const LEGACY_PLACEHOLDER_ACTION_TYPES: [&str; 2] = ["NONE", "MULTIPLE"];

/// Collapses the two stored action layouts into one ordered list.
///
/// A non-empty `action_config.actions` array wins. Otherwise the top-level
/// `action_type` with the rest of `action_config` becomes a single action.
pub fn normalize_actions(action_type: Option<&str>, action_config: &Value) -> Vec<ActionSpec> {
    if let Some(stacked) = action_config
        .get("actions")
        .and_then(Value::as_array)
        .filter(|actions| !actions.is_empty())
    {
        return stacked
            .iter()
            .map(|action| {
                let action_type = action
                    .get("type")
                    .map(value_to_plain_string)
                    .unwrap_or_default();
                let config = action
                    .get("config")
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default();
                ActionSpec::new(action_type, config)
            })
            .collect();
    }

    match action_type {
        Some(kind) if !kind.is_empty() && !LEGACY_PLACEHOLDER_ACTION_TYPES.contains(&kind) => {
            let mut config = action_config.as_object().cloned().unwrap_or_default();
            config.remove("actions");
            vec![ActionSpec::new(kind, config)]
        }
        _ => Vec::new(),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionResult {
    pub fn ok(result: Value) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.into()),
        }
    }
}

/// An [`ActionResult`] tagged with its position in the automation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    #[serde(rename = "actionIndex")]
    pub action_index: usize,
    #[serde(rename = "actionType")]
    pub action_type: String,
    #[serde(flatten)]
    pub result: ActionResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionLog {
    pub automation_id: i64,
    pub guild_id: String,
    pub trigger_event: String,
    pub trigger_data: Event,
    pub action_result: Vec<ActionOutcome>,
    pub success: bool,
    pub error_message: Option<String>,
    pub execution_time_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildInfo {
    pub name: Option<String>,
}
