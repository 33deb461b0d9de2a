use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use serde_json::{Map, Value};
use tracing::warn;

use super::model::{Event, value_to_plain_string};

/// Value that disables a CSV-style filter.
const MATCH_ALL: &str = "ALL";

const REGEX_CACHE_CAPACITY: usize = 256;

/// Compiled `content_regex` patterns. Invalid patterns are cached as `None`
/// so they are reported once.
static REGEX_CACHE: Lazy<Mutex<HashMap<String, Option<Regex>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Case-insensitive regex for `pattern`, compiled at most once while cached.
fn cached_regex(pattern: &str) -> Option<Regex> {
    let mut cache = REGEX_CACHE.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(compiled) = cache.get(pattern) {
        return compiled.clone();
    }

    let compiled = match RegexBuilder::new(pattern).case_insensitive(true).build() {
        Ok(regex) => Some(regex),
        Err(err) => {
            warn!("Invalid content_regex filter {:?}: {}", pattern, err);
            None
        }
    };
    if cache.len() >= REGEX_CACHE_CAPACITY {
        cache.clear();
    }
    cache.insert(pattern.to_string(), compiled.clone());
    compiled
}

/// Facts about the event that the gateway had to look up separately.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterContext {
    pub actor_roles: Option<Vec<String>>,
    pub target_roles: Option<Vec<String>>,
    pub account_age_days: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKey {
    ChannelId,
    NotChannelId,
    ActorHasRole,
    ActorMissingRole,
    TargetHasRole,
    ContentContains,
    ContentRegex,
    BotFilter,
    ActorId,
    NotActorId,
    EmbedContains,
    MinAccountAgeDays,
    MaxAccountAgeDays,
}

impl FilterKey {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ChannelId => "channel_id",
            Self::NotChannelId => "not_channel_id",
            Self::ActorHasRole => "actor_has_role",
            Self::ActorMissingRole => "actor_missing_role",
            Self::TargetHasRole => "target_has_role",
            Self::ContentContains => "content_contains",
            Self::ContentRegex => "content_regex",
            Self::BotFilter => "bot_filter",
            Self::ActorId => "actor_id",
            Self::NotActorId => "not_actor_id",
            Self::EmbedContains => "embed_contains",
            Self::MinAccountAgeDays => "min_account_age_days",
            Self::MaxAccountAgeDays => "max_account_age_days",
        }
    }

    /// Evaluates this filter against one configured value.
    pub fn check(self, value: &Value, event: &Event, ctx: &FilterContext) -> bool {
        match self {
            Self::ChannelId => {
                csv_filter(value).is_none_or(|set| contains(&set, event.channel_id.as_deref()))
            }
            Self::NotChannelId => {
                csv_filter(value).is_none_or(|set| !contains(&set, event.channel_id.as_deref()))
            }
            Self::ActorHasRole => {
                csv_filter(value).is_none_or(|set| any_role(&set, ctx.actor_roles.as_deref()))
            }
            Self::ActorMissingRole => {
                csv_filter(value).is_none_or(|set| !any_role(&set, ctx.actor_roles.as_deref()))
            }
            Self::TargetHasRole => {
                csv_filter(value).is_none_or(|set| any_role(&set, ctx.target_roles.as_deref()))
            }
            Self::ActorId => {
                csv_filter(value).is_none_or(|set| contains(&set, event.actor_id.as_deref()))
            }
            Self::NotActorId => {
                csv_filter(value).is_none_or(|set| !contains(&set, event.actor_id.as_deref()))
            }
            Self::ContentContains => {
                let needle = value_to_plain_string(value).to_lowercase();
                event
                    .detail_str("content")
                    .is_some_and(|content| content.to_lowercase().contains(&needle))
            }
            Self::ContentRegex => {
                let pattern = value_to_plain_string(value);
                cached_regex(&pattern)
                    .is_some_and(|regex| regex.is_match(event.detail_str("content").unwrap_or_default()))
            }
            Self::BotFilter => match value.as_str() {
                Some("only_bots") => event.is_bot(),
                Some("only_humans") => !event.is_bot(),
                _ => true,
            },
            Self::EmbedContains => {
                let needle = value_to_plain_string(value).to_lowercase();
                event
                    .detail("embedTexts")
                    .and_then(Value::as_array)
                    .is_some_and(|texts| {
                        texts
                            .iter()
                            .filter_map(Value::as_str)
                            .any(|text| text.to_lowercase().contains(&needle))
                    })
            }
            Self::MinAccountAgeDays => match (ctx.account_age_days, numeric(value)) {
                (Some(age), Some(min)) => age >= min,
                _ => true,
            },
            Self::MaxAccountAgeDays => match (ctx.account_age_days, numeric(value)) {
                (Some(age), Some(max)) => age <= max,
                _ => true,
            },
        }
    }
}

impl FromStr for FilterKey {
    type Err = ();

    fn from_str(key: &str) -> Result<Self, Self::Err> {
        Ok(match key {
            "channel_id" => Self::ChannelId,
            "not_channel_id" => Self::NotChannelId,
            "actor_has_role" => Self::ActorHasRole,
            "actor_missing_role" => Self::ActorMissingRole,
            "target_has_role" => Self::TargetHasRole,
            "content_contains" => Self::ContentContains,
            "content_regex" => Self::ContentRegex,
            "bot_filter" => Self::BotFilter,
            "actor_id" => Self::ActorId,
            "not_actor_id" => Self::NotActorId,
            "embed_contains" => Self::EmbedContains,
            "min_account_age_days" => Self::MinAccountAgeDays,
            "max_account_age_days" => Self::MaxAccountAgeDays,
            _ => return Err(()),
        })
    }
}

/// True when every recognised filter in `filters` accepts the event.
///
/// Unknown keys are ignored so rules written by newer dashboards keep
/// working. Evaluation stops at the first rejecting filter.
pub fn matches(event: &Event, filters: &Map<String, Value>, ctx: &FilterContext) -> bool {
    filters.iter().all(|(key, value)| match key.parse::<FilterKey>() {
        Ok(filter) => filter.check(value, event, ctx),
        Err(()) => true,
    })
}

/// Splits a CSV filter value, or returns `None` when the filter is disabled.
fn csv_filter(value: &Value) -> Option<Vec<String>> {
    let raw = value_to_plain_string(value);
    if raw == MATCH_ALL {
        return None;
    }
    Some(raw.split(',').map(|part| part.trim().to_string()).collect())
}

fn contains(set: &[String], id: Option<&str>) -> bool {
    id.is_some_and(|id| set.iter().any(|entry| entry == id))
}

fn any_role(required: &[String], roles: Option<&[String]>) -> bool {
    roles.is_some_and(|roles| required.iter().any(|role| roles.contains(role)))
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}
