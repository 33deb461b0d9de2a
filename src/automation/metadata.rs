//! Declared vocabularies for events, filters and actions.
//!
//! These tables describe what the dashboard offers. The engine never uses
//! them to reject a stored rule: a filter key present on an automation is
//! evaluated whatever the event type.

use serde::Serialize;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct EventTypeInfo {
    pub event_type: &'static str,
    pub category: &'static str,
    pub description: &'static str,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct EventCategoryInfo {
    pub key: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub color: &'static str,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct FilterInfo {
    pub key: &'static str,
    pub kind: &'static str,
    pub label: &'static str,
    pub description: &'static str,
    pub applicable_events: &'static [&'static str],
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ConfigField {
    pub key: &'static str,
    pub kind: &'static str,
    pub label: &'static str,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<&'static str>,
    pub supports_variables: bool,
    pub supports_option_ref: bool,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ActionInfo {
    pub action_type: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub targets_user: bool,
    pub config_schema: &'static [ConfigField],
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct UserSource {
    pub value: &'static str,
    pub label: &'static str,
    pub description: &'static str,
}

const fn field(key: &'static str, kind: &'static str, label: &'static str) -> ConfigField {
    ConfigField {
        key,
        kind,
        label,
        required: false,
        default: None,
        supports_variables: false,
        supports_option_ref: false,
    }
}

const fn required(mut field: ConfigField) -> ConfigField {
    field.required = true;
    field
}

const fn defaults_to(mut field: ConfigField, value: &'static str) -> ConfigField {
    field.default = Some(value);
    field
}

const fn templated(mut field: ConfigField) -> ConfigField {
    field.supports_variables = true;
    field
}

const fn option_ref(mut field: ConfigField) -> ConfigField {
    field.supports_option_ref = true;
    field
}

const TARGET_USER: ConfigField = required(field("target_user", "user_source", "Target User"));

pub const EVENT_CATEGORIES: &[EventCategoryInfo] = &[
    EventCategoryInfo { key: "member", name: "Member", description: "Member joins, leaves, updates", color: "#5865F2" },
    EventCategoryInfo { key: "message", name: "Message", description: "Message create, edit, delete", color: "#57F287" },
    EventCategoryInfo { key: "voice", name: "Voice", description: "Voice channel activity", color: "#FEE75C" },
    EventCategoryInfo { key: "channel", name: "Channel", description: "Channel modifications", color: "#EB459E" },
    EventCategoryInfo { key: "role", name: "Role", description: "Role changes", color: "#ED4245" },
    EventCategoryInfo { key: "guild", name: "Server", description: "Server settings changes", color: "#9B59B6" },
    EventCategoryInfo { key: "emoji", name: "Emoji", description: "Emoji and sticker changes", color: "#F1C40F" },
    EventCategoryInfo { key: "invite", name: "Invite", description: "Invite creation and deletion", color: "#3498DB" },
    EventCategoryInfo { key: "moderation", name: "Moderation", description: "Kicks, bans, timeouts", color: "#E74C3C" },
    EventCategoryInfo { key: "interaction", name: "Interaction", description: "Commands and interactions", color: "#1ABC9C" },
    EventCategoryInfo { key: "thread", name: "Thread", description: "Thread activity", color: "#2ECC71" },
    EventCategoryInfo { key: "reaction", name: "Reaction", description: "Message reactions", color: "#E91E63" },
];

macro_rules! event_types {
    ($($event_type:literal => $category:literal, $description:literal;)*) => {
        pub const EVENT_TYPES: &[EventTypeInfo] = &[
            $(EventTypeInfo { event_type: $event_type, category: $category, description: $description },)*
        ];
    };
}

event_types! {
    "MEMBER_JOIN" => "member", "Member joined the server";
    "MEMBER_LEAVE" => "member", "Member left the server";
    "MEMBER_UPDATE" => "member", "Member was updated";
    "MEMBER_BAN" => "moderation", "Member was banned";
    "MEMBER_UNBAN" => "moderation", "Member was unbanned";
    "MEMBER_KICK" => "moderation", "Member was kicked";
    "MEMBER_TIMEOUT" => "moderation", "Member was timed out";
    "MESSAGE_CREATE" => "message", "Message was sent";
    "MESSAGE_UPDATE" => "message", "Message was edited";
    "MESSAGE_DELETE" => "message", "Message was deleted";
    "MESSAGE_BULK_DELETE" => "message", "Messages were bulk deleted";
    "VOICE_JOIN" => "voice", "Joined voice channel";
    "VOICE_LEAVE" => "voice", "Left voice channel";
    "VOICE_MOVE" => "voice", "Moved between voice channels";
    "VOICE_MUTE" => "voice", "Voice mute state changed";
    "VOICE_DEAFEN" => "voice", "Voice deafen state changed";
    "VOICE_STREAM_START" => "voice", "Started streaming";
    "VOICE_STREAM_END" => "voice", "Stopped streaming";
    "VOICE_VIDEO_START" => "voice", "Started video";
    "VOICE_VIDEO_END" => "voice", "Stopped video";
    "CHANNEL_CREATE" => "channel", "Channel was created";
    "CHANNEL_DELETE" => "channel", "Channel was deleted";
    "CHANNEL_UPDATE" => "channel", "Channel was updated";
    "CHANNEL_PINS_UPDATE" => "channel", "Channel pins were updated";
    "ROLE_CREATE" => "role", "Role was created";
    "ROLE_DELETE" => "role", "Role was deleted";
    "ROLE_UPDATE" => "role", "Role was updated";
    "MEMBER_ROLE_ADD" => "role", "Role was added to member";
    "MEMBER_ROLE_REMOVE" => "role", "Role was removed from member";
    "GUILD_UPDATE" => "guild", "Server settings were updated";
    "EMOJI_CREATE" => "emoji", "Emoji was created";
    "EMOJI_DELETE" => "emoji", "Emoji was deleted";
    "EMOJI_UPDATE" => "emoji", "Emoji was updated";
    "STICKER_CREATE" => "emoji", "Sticker was created";
    "STICKER_DELETE" => "emoji", "Sticker was deleted";
    "STICKER_UPDATE" => "emoji", "Sticker was updated";
    "INVITE_CREATE" => "invite", "Invite was created";
    "INVITE_DELETE" => "invite", "Invite was deleted";
    "THREAD_CREATE" => "thread", "Thread was created";
    "THREAD_DELETE" => "thread", "Thread was deleted";
    "THREAD_UPDATE" => "thread", "Thread was updated";
    "THREAD_MEMBER_ADD" => "thread", "Member joined thread";
    "THREAD_MEMBER_REMOVE" => "thread", "Member left thread";
    "REACTION_ADD" => "reaction", "Reaction was added";
    "REACTION_REMOVE" => "reaction", "Reaction was removed";
    "REACTION_REMOVE_ALL" => "reaction", "All reactions were removed";
    "COMMAND_USE" => "interaction", "Slash command was used";
    "BUTTON_CLICK" => "interaction", "Button was clicked";
    "MODAL_SUBMIT" => "interaction", "Modal was submitted";
}

const CHANNEL_SCOPED_EVENTS: &[&str] = &["MESSAGE_", "VOICE_", "THREAD_", "REACTION_", "CHANNEL_PINS_UPDATE"];
const MESSAGE_CONTENT_EVENTS: &[&str] = &["MESSAGE_CREATE", "MESSAGE_UPDATE"];

pub const FILTER_TYPES: &[FilterInfo] = &[
    FilterInfo { key: "channel_id", kind: "channel", label: "In Channel(s)", description: "Only trigger in this channel", applicable_events: CHANNEL_SCOPED_EVENTS },
    FilterInfo { key: "not_channel_id", kind: "channel", label: "Not In Channel(s)", description: "Don't trigger in this channel", applicable_events: CHANNEL_SCOPED_EVENTS },
    FilterInfo { key: "actor_has_role", kind: "role", label: "Actor Has Role", description: "Actor must have this role", applicable_events: &["*"] },
    FilterInfo { key: "actor_missing_role", kind: "role", label: "Actor Missing Role", description: "Actor must NOT have this role", applicable_events: &["*"] },
    FilterInfo {
        key: "target_has_role",
        kind: "role",
        label: "Target Has Role",
        description: "Target must have this role",
        applicable_events: &["MEMBER_BAN", "MEMBER_UNBAN", "MEMBER_KICK", "MEMBER_TIMEOUT", "MEMBER_ROLE_ADD", "MEMBER_ROLE_REMOVE"],
    },
    FilterInfo { key: "content_contains", kind: "text", label: "Content Contains", description: "Message content must contain text", applicable_events: MESSAGE_CONTENT_EVENTS },
    FilterInfo { key: "content_regex", kind: "text", label: "Content Matches Regex", description: "Message content matches a case-insensitive pattern (Rust regex syntax: no lookaround or backreferences)", applicable_events: MESSAGE_CONTENT_EVENTS },
    FilterInfo { key: "embed_contains", kind: "text", label: "Embed Contains", description: "An embed must contain text", applicable_events: MESSAGE_CONTENT_EVENTS },
    FilterInfo {
        key: "bot_filter",
        kind: "select",
        label: "Bot Filter",
        description: "Filter by bot status",
        applicable_events: &["MESSAGE_", "MEMBER_JOIN", "MEMBER_LEAVE", "REACTION_"],
    },
    FilterInfo { key: "actor_id", kind: "user", label: "Actor Is", description: "Only these users or bots", applicable_events: &["*"] },
    FilterInfo { key: "not_actor_id", kind: "user", label: "Actor Is Not", description: "Exclude these users or bots", applicable_events: &["*"] },
    FilterInfo { key: "min_account_age_days", kind: "number", label: "Min Account Age (days)", description: "Account must be at least X days old", applicable_events: &["MEMBER_JOIN"] },
    FilterInfo { key: "max_account_age_days", kind: "number", label: "Max Account Age (days)", description: "Account must be less than X days old", applicable_events: &["MEMBER_JOIN"] },
];

pub const ACTION_TYPES: &[ActionInfo] = &[
    ActionInfo {
        action_type: "DELETE_USER_MESSAGES",
        name: "Delete User's Messages",
        description: "Delete messages from a user",
        targets_user: true,
        config_schema: &[
            TARGET_USER,
            defaults_to(field("channel_ids", "channel_multi", "Channel(s)"), "ALL"),
            option_ref(field("max_age_days", "number_source", "Delete messages from last X days")),
            option_ref(field("max_messages", "number_source", "Max messages to delete")),
            defaults_to(field("skip_pinned", "boolean", "Skip pinned messages"), "true"),
        ],
    },
    ActionInfo {
        action_type: "DELETE_MESSAGES",
        name: "Delete Messages",
        description: "Delete messages from a user in a channel",
        targets_user: true,
        config_schema: &[
            TARGET_USER,
            defaults_to(field("channel_ids", "channel_multi", "Channel(s)"), "ALL"),
            defaults_to(field("limit", "number", "Max messages to delete"), "100"),
        ],
    },
    ActionInfo {
        action_type: "SEND_MESSAGE",
        name: "Send Message",
        description: "Send a message to a channel",
        targets_user: false,
        config_schema: &[
            required(field("channel_id", "channel", "Channel")),
            templated(required(field("content", "text", "Message content"))),
            defaults_to(field("embed", "boolean", "Send as embed"), "false"),
        ],
    },
    ActionInfo {
        action_type: "ADD_ROLE",
        name: "Add Role",
        description: "Add a role to a user",
        targets_user: true,
        config_schema: &[TARGET_USER, required(field("role_id", "role", "Role"))],
    },
    ActionInfo {
        action_type: "REMOVE_ROLE",
        name: "Remove Role",
        description: "Remove a role from a user",
        targets_user: true,
        config_schema: &[TARGET_USER, required(field("role_id", "role", "Role"))],
    },
    ActionInfo {
        action_type: "KICK_MEMBER",
        name: "Kick Member",
        description: "Kick a member from the server",
        targets_user: true,
        config_schema: &[TARGET_USER, templated(field("reason", "text", "Reason"))],
    },
    ActionInfo {
        action_type: "BAN_MEMBER",
        name: "Ban Member",
        description: "Ban a member from the server",
        targets_user: true,
        config_schema: &[
            TARGET_USER,
            templated(field("reason", "text", "Reason")),
            defaults_to(field("delete_days", "number", "Delete message history (days)"), "0"),
        ],
    },
    ActionInfo {
        action_type: "TIMEOUT_MEMBER",
        name: "Timeout Member",
        description: "Timeout a member",
        targets_user: true,
        config_schema: &[
            TARGET_USER,
            option_ref(defaults_to(required(field("duration_minutes", "number_source", "Duration (minutes)")), "60")),
            templated(field("reason", "text", "Reason")),
        ],
    },
    ActionInfo {
        action_type: "LOG_TO_CHANNEL",
        name: "Log to Channel",
        description: "Send a log message to a channel with event details",
        targets_user: false,
        config_schema: &[
            required(field("channel_id", "channel", "Log channel")),
            templated(field("content", "text", "Custom message")),
            defaults_to(field("include_details", "boolean", "Include event details"), "true"),
        ],
    },
    ActionInfo {
        action_type: "CREATE_THREAD",
        name: "Create Thread",
        description: "Create a thread in a channel",
        targets_user: false,
        config_schema: &[
            required(field("channel_id", "channel", "Channel")),
            templated(required(field("thread_name", "text", "Thread name"))),
            defaults_to(field("auto_archive_duration", "select", "Auto-archive after (minutes)"), "1440"),
        ],
    },
];

pub const TEMPLATE_VARIABLES: &[(&str, &str)] = &[
    ("user.id", "Actor's Discord ID"),
    ("user.name", "Actor's username"),
    ("user.mention", "Mention the actor"),
    ("user.tag", "Actor's tag (username#0000)"),
    ("target.id", "Target's Discord ID"),
    ("target.name", "Target's username"),
    ("target.mention", "Mention the target"),
    ("channel.id", "Channel ID"),
    ("channel.name", "Channel name"),
    ("channel.mention", "Mention the channel"),
    ("guild.id", "Server ID"),
    ("guild.name", "Server name"),
    ("trigger.event", "Event type that triggered"),
    ("trigger.category", "Event category"),
    ("trigger.time", "When the event occurred"),
];

pub const AUTOMATION_USER_SOURCES: &[UserSource] = &[
    UserSource { value: "actor", label: "Event Actor", description: "The user who triggered the event" },
    UserSource { value: "target", label: "Event Target", description: "The user who was the target of the event (if any)" },
];

pub const COMMAND_USER_SOURCES: &[UserSource] = &[UserSource {
    value: "invoker",
    label: "Command Invoker",
    description: "The user who ran the command",
}];

pub fn event_category(event_type: &str) -> &'static str {
    EVENT_TYPES
        .iter()
        .find(|info| info.event_type == event_type)
        .map(|info| info.category)
        .unwrap_or("unknown")
}

pub fn filter_info(key: &str) -> Option<&'static FilterInfo> {
    FILTER_TYPES.iter().find(|info| info.key == key)
}

pub fn action_info(action_type: &str) -> Option<&'static ActionInfo> {
    ACTION_TYPES.iter().find(|info| info.action_type == action_type)
}

/// Patterns ending in `_` match by prefix, `*` matches everything, anything
/// else must equal the event type. An empty pattern list or event type
/// applies everywhere.
pub fn filter_applies_to_event(info: &FilterInfo, event_type: &str) -> bool {
    if info.applicable_events.is_empty() || event_type.is_empty() {
        return true;
    }

    info.applicable_events.iter().any(|pattern| {
        *pattern == "*"
            || (pattern.ends_with('_') && event_type.starts_with(pattern))
            || *pattern == event_type
    })
}

pub fn filters_for_event(event_type: &str) -> Vec<&'static FilterInfo> {
    FILTER_TYPES
        .iter()
        .filter(|info| filter_applies_to_event(info, event_type))
        .collect()
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case("channel_id", "MESSAGE_CREATE", true ; "prefix pattern matches")]
    #[test_case("channel_id", "CHANNEL_PINS_UPDATE", true ; "exact pattern matches")]
    #[test_case("channel_id", "CHANNEL_UPDATE", false ; "exact pattern is not a prefix")]
    #[test_case("actor_has_role", "GUILD_UPDATE", true ; "wildcard matches all")]
    #[test_case("min_account_age_days", "MEMBER_LEAVE", false ; "member join only")]
    #[test_case("content_regex", "", true ; "empty event type applies")]
    fn applicability(key: &str, event_type: &str, expected: bool) {
        let info = filter_info(key).unwrap();
        assert_eq!(filter_applies_to_event(info, event_type), expected);
    }

    #[test]
    fn filters_for_member_join_include_account_age_but_not_content() {
        let keys: Vec<_> = filters_for_event("MEMBER_JOIN").iter().map(|f| f.key).collect();

        assert!(keys.contains(&"min_account_age_days"));
        assert!(keys.contains(&"bot_filter"));
        assert!(!keys.contains(&"content_contains"));
        assert!(!keys.contains(&"channel_id"));
    }

    #[test]
    fn every_event_type_has_a_known_category() {
        for info in EVENT_TYPES {
            assert!(
                EVENT_CATEGORIES.iter().any(|c| c.key == info.category),
                "{} has unknown category {}",
                info.event_type,
                info.category
            );
        }
        assert_eq!(event_category("MEMBER_BAN"), "moderation");
        assert_eq!(event_category("SOMETHING_ELSE"), "unknown");
    }

    #[test]
    fn action_schemas_cover_all_ten_kinds() {
        assert_eq!(ACTION_TYPES.len(), 10);
        let timeout = action_info("TIMEOUT_MEMBER").unwrap();
        let duration = timeout
            .config_schema
            .iter()
            .find(|f| f.key == "duration_minutes")
            .unwrap();
        assert!(duration.supports_option_ref);
        assert_eq!(duration.default, Some("60"));
    }
}
