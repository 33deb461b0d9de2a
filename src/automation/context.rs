use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use super::model::{Event, GuildInfo};

const UNKNOWN_GUILD_NAME: &str = "Unknown Server";

/// Variables available to action templates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Context {
    pub user: UserVars,
    pub target: UserVars,
    pub channel: ChannelVars,
    pub guild: GuildVars,
    pub trigger: TriggerVars,
    pub details: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserVars {
    pub id: Option<String>,
    pub name: Option<String>,
    pub tag: Option<String>,
    pub mention: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelVars {
    pub id: Option<String>,
    pub name: Option<String>,
    pub mention: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GuildVars {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TriggerVars {
    pub event: String,
    pub category: String,
    pub time: String,
}

impl Context {
    /// JSON form consumed by [`super::template::render`].
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| Value::Object(Map::new()))
    }
}

pub fn build_context(event: &Event, guild: &GuildInfo) -> Context {
    build_context_at(event, guild, Utc::now())
}

pub fn build_context_at(event: &Event, guild: &GuildInfo, now: DateTime<Utc>) -> Context {
    Context {
        user: user_vars(event.actor_id.as_deref(), event.actor_name.as_deref()),
        target: user_vars(event.target_id.as_deref(), event.target_name.as_deref()),
        channel: ChannelVars {
            id: event.channel_id.clone(),
            name: event.channel_name.clone(),
            mention: mention("<#", event.channel_id.as_deref()),
        },
        guild: GuildVars {
            id: event.guild_id.clone(),
            name: guild
                .name
                .clone()
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| UNKNOWN_GUILD_NAME.to_string()),
        },
        trigger: TriggerVars {
            event: event.event_type.clone(),
            category: event.event_category.clone(),
            time: now.to_rfc3339_opts(SecondsFormat::Millis, true),
        },
        details: event
            .details
            .clone()
            .unwrap_or_else(|| Value::Object(Map::new())),
    }
}

fn user_vars(id: Option<&str>, full_name: Option<&str>) -> UserVars {
    UserVars {
        id: id.map(str::to_string),
        name: full_name.map(display_name),
        tag: full_name.map(str::to_string),
        mention: mention("<@", id),
    }
}

/// Drops a legacy `#discriminator` suffix.
fn display_name(full_name: &str) -> String {
    match full_name.split('#').next() {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => full_name.to_string(),
    }
}

fn mention(prefix: &str, id: Option<&str>) -> String {
    match id {
        Some(id) if !id.is_empty() => format!("{prefix}{id}>"),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn builds_all_variable_groups() {
        let mut event = Event::new("G", "MEMBER_BAN");
        event.actor_id = Some("1".into());
        event.actor_name = Some("mod#0420".into());
        event.target_id = Some("2".into());
        event.target_name = Some("spammer".into());
        event.channel_id = Some("C".into());
        event.channel_name = Some("general".into());
        event.details = Some(json!({"reason": "spam"}));
        let guild = GuildInfo {
            name: Some("Rustaceans".into()),
        };

        let ctx = build_context_at(&event, &guild, fixed_now()).to_value();

        assert_eq!(
            ctx,
            json!({
                "user": {"id": "1", "name": "mod", "tag": "mod#0420", "mention": "<@1>"},
                "target": {"id": "2", "name": "spammer", "tag": "spammer", "mention": "<@2>"},
                "channel": {"id": "C", "name": "general", "mention": "<#C>"},
                "guild": {"id": "G", "name": "Rustaceans"},
                "trigger": {"event": "MEMBER_BAN", "category": "moderation", "time": "2024-05-01T12:00:00.000Z"},
                "details": {"reason": "spam"}
            })
        );
    }

    #[test]
    fn absent_ids_give_empty_mentions_not_null() {
        let event = Event::new("G", "GUILD_UPDATE");

        let ctx = build_context_at(&event, &GuildInfo::default(), fixed_now());

        assert_eq!(ctx.user.mention, "");
        assert_eq!(ctx.target.mention, "");
        assert_eq!(ctx.channel.mention, "");
        assert_eq!(ctx.guild.name, "Unknown Server");
        assert_eq!(ctx.details, json!({}));
    }

    #[test]
    fn leading_hash_name_keeps_full_value() {
        assert_eq!(display_name("#weird"), "#weird");
        assert_eq!(display_name("plain"), "plain");
    }

    #[test]
    fn unresolved_ids_stay_as_placeholders_when_rendered() {
        let event = Event::new("G", "GUILD_UPDATE");
        let ctx = build_context_at(&event, &GuildInfo::default(), fixed_now()).to_value();

        assert_eq!(
            crate::automation::template::render("by {user.id} in {guild.name}", &ctx),
            "by {user.id} in Unknown Server"
        );
    }
}
