//! Typed action parameters.
//!
//! Stored configs are loose JSON: numbers arrive as strings, keys go
//! missing, booleans are sometimes `"false"`. [`ActionConfig::resolve`] is
//! the single place that coerces them. Required values that cannot be
//! resolved stay `None` so the handler can report which one is missing.

use serde_json::{Map, Value};

use super::ActionType;
use crate::automation::model::{Event, is_truthy, value_to_plain_string};
use crate::automation::template;
use crate::automation::values::{resolve_number, resolve_target_user, try_resolve_number};

const DEFAULT_REASON: &str = "Automated action";
const DEFAULT_TIMEOUT_REASON: &str = "Automated timeout";
const DEFAULT_TIMEOUT_MINUTES: f64 = 60.0;
const DEFAULT_DELETE_LIMIT: f64 = 100.0;
const MAX_BAN_DELETE_DAYS: f64 = 7.0;

pub const DEFAULT_AUTO_ARCHIVE_MINUTES: u16 = 1440;
pub const AUTO_ARCHIVE_MINUTES: [u16; 4] = [60, 1440, 4320, 10080];

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelSelection {
    /// Every text-capable, non-voice channel of the guild.
    All,
    Listed(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PurgeConfig {
    pub user_id: Option<String>,
    pub channels: ChannelSelection,
    pub max_age_days: Option<f64>,
    /// `None` means no limit.
    pub max_messages: Option<usize>,
    pub skip_pinned: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActionConfig {
    DeleteUserMessages(PurgeConfig),
    DeleteMessages(PurgeConfig),
    SendMessage {
        channel_id: Option<String>,
        content: Option<String>,
        embed: bool,
    },
    AddRole {
        user_id: Option<String>,
        role_id: Option<String>,
    },
    RemoveRole {
        user_id: Option<String>,
        role_id: Option<String>,
    },
    KickMember {
        user_id: Option<String>,
        reason: String,
    },
    BanMember {
        user_id: Option<String>,
        reason: String,
        delete_days: u8,
    },
    TimeoutMember {
        user_id: Option<String>,
        duration_minutes: f64,
        reason: String,
    },
    LogToChannel {
        channel_id: Option<String>,
        content: Option<String>,
        include_details: bool,
    },
    CreateThread {
        channel_id: Option<String>,
        thread_name: Option<String>,
        auto_archive_minutes: u16,
    },
}

impl ActionConfig {
    /// Coerces `config` for an action of `kind`, resolving user sources
    /// and option references against `event` and rendering templated
    /// fields against `context`.
    pub fn resolve(kind: ActionType, config: &Map<String, Value>, event: &Event, context: &Value) -> Self {
        let user_id = || resolve_target_user(config.get("target_user"), event);
        let render = |key: &str| {
            string_param(config, key)
                .map(|raw| template::render(&raw, context))
                .filter(|rendered| !rendered.is_empty())
        };
        let reason = |default: &str| {
            let raw = string_param(config, "reason").unwrap_or_else(|| default.to_string());
            template::render(&raw, context)
        };

        match kind {
            ActionType::DeleteUserMessages => Self::DeleteUserMessages(PurgeConfig {
                user_id: user_id(),
                channels: channel_selection(config.get("channel_ids")),
                max_age_days: positive_whole(try_resolve_number(config.get("max_age_days"), event)),
                max_messages: positive_whole(try_resolve_number(config.get("max_messages"), event))
                    .map(|count| count as usize),
                skip_pinned: skip_pinned(config.get("skip_pinned")),
            }),
            ActionType::DeleteMessages => Self::DeleteMessages(PurgeConfig {
                user_id: user_id(),
                channels: channel_selection(config.get("channel_ids")),
                max_age_days: positive_whole(try_resolve_number(config.get("max_age_days"), event)),
                max_messages: positive_whole(Some(resolve_number(
                    config.get("limit"),
                    event,
                    DEFAULT_DELETE_LIMIT,
                )))
                .map(|count| count as usize),
                skip_pinned: skip_pinned(config.get("skip_pinned")),
            }),
            ActionType::SendMessage => Self::SendMessage {
                channel_id: string_param(config, "channel_id"),
                content: render("content"),
                embed: config.get("embed").is_some_and(is_truthy),
            },
            ActionType::AddRole => Self::AddRole {
                user_id: user_id(),
                role_id: string_param(config, "role_id"),
            },
            ActionType::RemoveRole => Self::RemoveRole {
                user_id: user_id(),
                role_id: string_param(config, "role_id"),
            },
            ActionType::KickMember => Self::KickMember {
                user_id: user_id(),
                reason: reason(DEFAULT_REASON),
            },
            ActionType::BanMember => Self::BanMember {
                user_id: user_id(),
                reason: reason(DEFAULT_REASON),
                delete_days: resolve_number(config.get("delete_days"), event, 0.0)
                    .clamp(0.0, MAX_BAN_DELETE_DAYS) as u8,
            },
            ActionType::TimeoutMember => Self::TimeoutMember {
                user_id: user_id(),
                duration_minutes: positive(try_resolve_number(config.get("duration_minutes"), event))
                    .unwrap_or(DEFAULT_TIMEOUT_MINUTES),
                reason: reason(DEFAULT_TIMEOUT_REASON),
            },
            ActionType::LogToChannel => Self::LogToChannel {
                channel_id: string_param(config, "channel_id"),
                content: render("content"),
                include_details: config.get("include_details").is_some_and(is_truthy),
            },
            ActionType::CreateThread => Self::CreateThread {
                channel_id: string_param(config, "channel_id"),
                thread_name: render("thread_name"),
                auto_archive_minutes: auto_archive_minutes(try_resolve_number(
                    config.get("auto_archive_duration"),
                    event,
                )),
            },
        }
    }
}

/// A non-empty string parameter. Numbers are accepted and stringified.
fn string_param(config: &Map<String, Value>, key: &str) -> Option<String> {
    match config.get(key)? {
        Value::String(text) if text.trim().is_empty() => None,
        Value::String(text) => Some(text.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn channel_selection(value: Option<&Value>) -> ChannelSelection {
    let raw = value
        .filter(|value| is_truthy(value))
        .map(value_to_plain_string)
        .unwrap_or_default();
    if raw.is_empty() || raw == "ALL" {
        return ChannelSelection::All;
    }
    ChannelSelection::Listed(
        raw.split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect(),
    )
}

fn skip_pinned(value: Option<&Value>) -> bool {
    !matches!(value, Some(Value::Bool(false))) && value.and_then(Value::as_str) != Some("false")
}

fn positive(value: Option<f64>) -> Option<f64> {
    value.filter(|n| n.is_finite() && *n > 0.0)
}

/// Integer part of a positive value; fractions below one mean unset.
fn positive_whole(value: Option<f64>) -> Option<f64> {
    positive(value.map(f64::trunc))
}

fn auto_archive_minutes(value: Option<f64>) -> u16 {
    value
        .and_then(|minutes| {
            AUTO_ARCHIVE_MINUTES
                .into_iter()
                .find(|allowed| f64::from(*allowed) == minutes)
        })
        .unwrap_or(DEFAULT_AUTO_ARCHIVE_MINUTES)
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use test_case::test_case;

    use super::*;

    fn resolve(kind: ActionType, config: Value) -> ActionConfig {
        let mut event = Event::new("G", "MESSAGE_CREATE");
        event.actor_id = Some("A".into());
        event.options = json!({"minutes": "15"}).as_object().cloned();
        let context = json!({"user": {"name": "alice"}});
        ActionConfig::resolve(kind, config.as_object().unwrap(), &event, &context)
    }

    #[test]
    fn purge_defaults_cover_all_channels_and_skip_pins() {
        let ActionConfig::DeleteUserMessages(purge) =
            resolve(ActionType::DeleteUserMessages, json!({}))
        else {
            panic!("wrong variant");
        };

        assert_eq!(purge.user_id.as_deref(), Some("A"));
        assert_eq!(purge.channels, ChannelSelection::All);
        assert_eq!(purge.max_age_days, None);
        assert_eq!(purge.max_messages, None);
        assert!(purge.skip_pinned);
    }

    #[test]
    fn delete_messages_budget_defaults_to_one_hundred() {
        let ActionConfig::DeleteMessages(purge) =
            resolve(ActionType::DeleteMessages, json!({"channel_ids": " 1, 2 ,"}))
        else {
            panic!("wrong variant");
        };

        assert_eq!(purge.max_messages, Some(100));
        assert_eq!(
            purge.channels,
            ChannelSelection::Listed(vec!["1".into(), "2".into()])
        );
    }

    #[test]
    fn purge_numbers_accept_strings_and_option_references() {
        let ActionConfig::DeleteUserMessages(purge) = resolve(
            ActionType::DeleteUserMessages,
            json!({"max_age_days": "7", "max_messages": "option:minutes", "skip_pinned": "false"}),
        ) else {
            panic!("wrong variant");
        };

        assert_eq!(purge.max_age_days, Some(7.0));
        assert_eq!(purge.max_messages, Some(15));
        assert!(!purge.skip_pinned);
    }

    #[test]
    fn non_positive_limits_mean_unlimited() {
        let ActionConfig::DeleteUserMessages(purge) = resolve(
            ActionType::DeleteUserMessages,
            json!({"max_age_days": 0, "max_messages": "-5"}),
        ) else {
            panic!("wrong variant");
        };

        assert_eq!(purge.max_age_days, None);
        assert_eq!(purge.max_messages, None);
    }

    #[test_case(json!("0.5"), None ; "fraction below one is unlimited")]
    #[test_case(json!(2.9), Some(2) ; "fraction is truncated")]
    #[test_case(json!("3"), Some(3) ; "whole string")]
    fn fractional_message_budgets_truncate(raw: Value, expected: Option<usize>) {
        let ActionConfig::DeleteUserMessages(purge) = resolve(
            ActionType::DeleteUserMessages,
            json!({"max_messages": raw, "max_age_days": "0.5"}),
        ) else {
            panic!("wrong variant");
        };

        assert_eq!(purge.max_messages, expected);
        assert_eq!(purge.max_age_days, None);
    }

    #[test]
    fn templated_fields_are_rendered() {
        assert_eq!(
            resolve(
                ActionType::SendMessage,
                json!({"channel_id": 55, "content": "hi {user.name}", "embed": "yes"})
            ),
            ActionConfig::SendMessage {
                channel_id: Some("55".into()),
                content: Some("hi alice".into()),
                embed: true,
            }
        );
        assert_eq!(
            resolve(ActionType::KickMember, json!({})),
            ActionConfig::KickMember {
                user_id: Some("A".into()),
                reason: "Automated action".into(),
            }
        );
    }

    #[test]
    fn empty_content_counts_as_missing() {
        let ActionConfig::SendMessage { content, .. } =
            resolve(ActionType::SendMessage, json!({"channel_id": "C", "content": ""}))
        else {
            panic!("wrong variant");
        };
        assert_eq!(content, None);
    }

    #[test_case(json!(3), 3 ; "within range")]
    #[test_case(json!("12"), 7 ; "clamped high")]
    #[test_case(json!(-1), 0 ; "clamped low")]
    #[test_case(json!(null), 0 ; "absent")]
    fn ban_delete_days(value: Value, expected: u8) {
        let ActionConfig::BanMember { delete_days, .. } =
            resolve(ActionType::BanMember, json!({"delete_days": value}))
        else {
            panic!("wrong variant");
        };
        assert_eq!(delete_days, expected);
    }

    #[test_case(json!({}), 60.0 ; "default")]
    #[test_case(json!({"duration_minutes": "option:minutes"}), 15.0 ; "option reference")]
    #[test_case(json!({"duration_minutes": 0}), 60.0 ; "zero uses default")]
    fn timeout_duration(config: Value, expected: f64) {
        let ActionConfig::TimeoutMember {
            duration_minutes,
            reason,
            ..
        } = resolve(ActionType::TimeoutMember, config)
        else {
            panic!("wrong variant");
        };
        assert_eq!(duration_minutes, expected);
        assert_eq!(reason, "Automated timeout");
    }

    #[test_case(json!(60), 60 ; "one hour")]
    #[test_case(json!("10080"), 10080 ; "one week string")]
    #[test_case(json!(90), 1440 ; "unsupported value")]
    #[test_case(json!(null), 1440 ; "absent")]
    fn thread_auto_archive(value: Value, expected: u16) {
        let ActionConfig::CreateThread {
            auto_archive_minutes,
            ..
        } = resolve(
            ActionType::CreateThread,
            json!({"channel_id": "C", "thread_name": "t", "auto_archive_duration": value}),
        )
        else {
            panic!("wrong variant");
        };
        assert_eq!(auto_archive_minutes, expected);
    }
}
