//! Automation events built from plain gateway values.
//!
//! Every constructor here is pure so the mapping from Discord state changes to
//! event types and detail keys is testable without gateway payloads. The
//! gateway handler only extracts values from serenity models.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};

use crate::automation::{Event, FilterContext};

/// The user behind a gateway event.
#[derive(Debug, Clone, PartialEq)]
pub struct EventUser {
    pub id: String,
    pub tag: String,
    pub bot: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventChannel {
    pub id: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageSummary {
    pub id: String,
    pub content: String,
    pub embed_texts: Vec<String>,
    pub attachment_count: usize,
    pub mention_count: usize,
    pub is_reply: bool,
}

/// Voice flags of one member at one point in time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VoiceSnapshot {
    pub channel: Option<EventChannel>,
    pub self_mute: bool,
    pub self_deaf: bool,
    pub server_mute: bool,
    pub server_deaf: bool,
    pub streaming: bool,
    pub video: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelInfo {
    pub id: String,
    pub name: String,
    pub kind: String,
    pub parent_id: Option<String>,
}

impl ChannelInfo {
    fn as_event_channel(&self) -> EventChannel {
        EventChannel {
            id: self.id.clone(),
            name: Some(self.name.clone()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoleInfo {
    pub id: String,
    pub name: String,
    pub color: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmojiInfo {
    pub id: String,
    pub name: String,
    pub animated: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StickerInfo {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub format: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InviteInfo {
    pub code: String,
    pub max_uses: u64,
    pub max_age: u64,
}

pub(crate) fn to_datetime(unix_seconds: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(unix_seconds, 0).unwrap_or_else(Utc::now)
}

fn with_actor(mut event: Event, user: &EventUser) -> Event {
    event.actor_id = Some(user.id.clone());
    event.actor_name = Some(user.tag.clone());
    event
}

fn with_target(mut event: Event, user: &EventUser) -> Event {
    event.target_id = Some(user.id.clone());
    event.target_name = Some(user.tag.clone());
    event
}

fn with_channel(mut event: Event, channel: &EventChannel) -> Event {
    event.channel_id = Some(channel.id.clone());
    event.channel_name = channel.name.clone();
    event
}

fn with_details(mut event: Event, details: Value) -> Event {
    event.details = Some(details);
    event
}

fn old_new<T: PartialEq + serde::Serialize>(old: &T, new: &T) -> Option<Value> {
    (old != new).then(|| json!({ "old": old, "new": new }))
}

pub fn account_age_days(user: &EventUser, now: DateTime<Utc>) -> f64 {
    (now - user.created_at).num_seconds().max(0) as f64 / 86_400.0
}

pub fn member_join_event(
    guild_id: &str,
    user: &EventUser,
    roles: &[String],
    joined_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> (Event, FilterContext) {
    let age_days = account_age_days(user, now);
    let event = with_details(
        with_actor(Event::new(guild_id, "MEMBER_JOIN"), user),
        json!({
            "accountCreated": user.created_at.to_rfc3339(),
            "accountAge": age_days.floor() as i64,
            "roles": roles,
            "isBot": user.bot,
            "joinedAt": joined_at.map(|at| at.to_rfc3339()),
        }),
    );

    let filter_ctx = FilterContext {
        actor_roles: Some(roles.to_vec()),
        target_roles: None,
        account_age_days: Some(age_days),
    };
    (event, filter_ctx)
}

pub fn member_leave_event(
    guild_id: &str,
    user: &EventUser,
    roles: Option<&[String]>,
    joined_at: Option<DateTime<Utc>>,
) -> Event {
    with_details(
        with_actor(Event::new(guild_id, "MEMBER_LEAVE"), user),
        json!({
            "roles": roles.unwrap_or_default(),
            "joinedAt": joined_at.map(|at| at.to_rfc3339()),
            "isBot": user.bot,
        }),
    )
}

/// `MEMBER_BAN` when `banned`, otherwise `MEMBER_UNBAN`. The user is the target.
pub fn ban_event(guild_id: &str, user: &EventUser, banned: bool) -> Event {
    let event_type = if banned { "MEMBER_BAN" } else { "MEMBER_UNBAN" };
    let mut event = with_target(Event::new(guild_id, event_type), user);
    if banned {
        event.details = Some(json!({ "reason": "No reason provided" }));
    }
    event
}

/// A kick read from the audit log. Only ids are known at that point.
pub fn kick_event(
    guild_id: &str,
    moderator_id: &str,
    target_id: Option<&str>,
    reason: Option<&str>,
) -> Event {
    let mut event = Event::new(guild_id, "MEMBER_KICK");
    event.actor_id = Some(moderator_id.to_string());
    event.target_id = target_id.map(str::to_string);
    with_details(
        event,
        json!({ "reason": reason.unwrap_or("No reason provided") }),
    )
}

/// `MEMBER_TIMEOUT` when the member received a new timeout that ends in the future.
pub fn timeout_event(
    guild_id: &str,
    member: &EventUser,
    old_until: Option<DateTime<Utc>>,
    new_until: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<Event> {
    let until = new_until.filter(|until| *until > now)?;
    if old_until == Some(until) {
        return None;
    }
    Some(with_details(
        with_target(Event::new(guild_id, "MEMBER_TIMEOUT"), member),
        json!({
            "timeoutUntil": until.to_rfc3339(),
            "durationMinutes": (until - now).num_minutes(),
        }),
    ))
}

/// `MEMBER_UPDATE` for nickname changes.
pub fn nickname_event(
    guild_id: &str,
    member: &EventUser,
    old_nick: Option<&str>,
    new_nick: Option<&str>,
) -> Option<Event> {
    let change = old_new(&old_nick, &new_nick)?;
    Some(with_details(
        with_target(Event::new(guild_id, "MEMBER_UPDATE"), member),
        json!({ "nickname": change }),
    ))
}

/// One `MEMBER_ROLE_ADD` or `MEMBER_ROLE_REMOVE` per role that changed.
pub fn member_role_events(
    guild_id: &str,
    member: &EventUser,
    old_roles: &[String],
    new_roles: &[String],
    role_names: &HashMap<String, String>,
) -> Vec<Event> {
    let role_event = |event_type: &str, role_id: &String| {
        let role_name = role_names
            .get(role_id)
            .map(String::as_str)
            .unwrap_or("Unknown");
        with_details(
            with_target(Event::new(guild_id, event_type), member),
            json!({ "roleId": role_id, "roleName": role_name }),
        )
    };

    let added = new_roles
        .iter()
        .filter(|role| !old_roles.contains(role))
        .map(|role| role_event("MEMBER_ROLE_ADD", role));
    let removed = old_roles
        .iter()
        .filter(|role| !new_roles.contains(role))
        .map(|role| role_event("MEMBER_ROLE_REMOVE", role));
    added.chain(removed).collect()
}

pub fn message_create_event(
    guild_id: &str,
    author: &EventUser,
    channel: &EventChannel,
    message: &MessageSummary,
) -> Event {
    with_details(
        with_channel(
            with_actor(Event::new(guild_id, "MESSAGE_CREATE"), author),
            channel,
        ),
        json!({
            "messageId": message.id,
            "content": message.content,
            "contentLength": message.content.chars().count(),
            "embedTexts": message.embed_texts,
            "hasEmbeds": !message.embed_texts.is_empty(),
            "hasAttachments": message.attachment_count > 0,
            "attachmentCount": message.attachment_count,
            "mentionCount": message.mention_count,
            "isReply": message.is_reply,
            "isBot": author.bot,
        }),
    )
}

/// Edits that change the content. `old_content` is known only when cached.
pub fn message_update_event(
    guild_id: &str,
    author: &EventUser,
    channel: &EventChannel,
    message_id: &str,
    old_content: Option<&str>,
    new_content: &str,
) -> Option<Event> {
    if old_content == Some(new_content) {
        return None;
    }
    Some(with_details(
        with_channel(
            with_actor(Event::new(guild_id, "MESSAGE_UPDATE"), author),
            channel,
        ),
        json!({
            "messageId": message_id,
            "content": new_content,
            "oldContentLength": old_content.map(|content| content.chars().count()),
            "newContentLength": new_content.chars().count(),
            "isBot": author.bot,
        }),
    ))
}

pub fn message_delete_event(guild_id: &str, channel: &EventChannel, message_id: &str) -> Event {
    with_details(
        with_channel(Event::new(guild_id, "MESSAGE_DELETE"), channel),
        json!({ "messageId": message_id }),
    )
}

pub fn message_bulk_delete_event(guild_id: &str, channel: &EventChannel, count: usize) -> Event {
    with_details(
        with_channel(Event::new(guild_id, "MESSAGE_BULK_DELETE"), channel),
        json!({ "count": count }),
    )
}

/// Voice events for one state change.
///
/// Joining and leaving produce a single event. A move and an update within
/// the same channel also report every toggled flag.
pub fn voice_events(
    guild_id: &str,
    user: &EventUser,
    old: Option<&VoiceSnapshot>,
    new: &VoiceSnapshot,
) -> Vec<Event> {
    let old_channel = old.and_then(|old| old.channel.as_ref());
    let actor_event = |event_type: &str, channel: &EventChannel, details: Value| {
        with_details(
            with_channel(with_actor(Event::new(guild_id, event_type), user), channel),
            details,
        )
    };

    let (old_state, channel) = match (old_channel, new.channel.as_ref()) {
        (None, Some(joined)) => {
            return vec![actor_event(
                "VOICE_JOIN",
                joined,
                json!({
                    "selfMute": new.self_mute,
                    "selfDeaf": new.self_deaf,
                    "streaming": new.streaming,
                    "selfVideo": new.video,
                }),
            )];
        }
        (Some(left), None) => {
            let old = old.cloned().unwrap_or_default();
            return vec![actor_event(
                "VOICE_LEAVE",
                left,
                json!({
                    "wasMuted": old.self_mute || old.server_mute,
                    "wasDeafened": old.self_deaf || old.server_deaf,
                    "wasStreaming": old.streaming,
                    "hadVideo": old.video,
                }),
            )];
        }
        (None, None) => return Vec::new(),
        (Some(_), Some(current)) => (old.cloned().unwrap_or_default(), current),
    };

    let mut events = Vec::new();
    if let Some(from) = old_channel.filter(|from| from.id != channel.id) {
        events.push(actor_event(
            "VOICE_MOVE",
            channel,
            json!({ "fromChannelId": from.id, "fromChannelName": from.name }),
        ));
    }

    if old_state.video != new.video {
        let event_type = if new.video { "VOICE_VIDEO_START" } else { "VOICE_VIDEO_END" };
        events.push(actor_event(event_type, channel, json!({ "videoEnabled": new.video })));
    }
    if old_state.streaming != new.streaming {
        let event_type = if new.streaming { "VOICE_STREAM_START" } else { "VOICE_STREAM_END" };
        events.push(actor_event(event_type, channel, json!({ "streaming": new.streaming })));
    }
    if old_state.self_mute != new.self_mute {
        events.push(actor_event("VOICE_MUTE", channel, json!({ "selfMute": new.self_mute })));
    }
    if old_state.self_deaf != new.self_deaf {
        events.push(actor_event("VOICE_DEAFEN", channel, json!({ "selfDeaf": new.self_deaf })));
    }

    // Server-side toggles are applied to the member by a moderator.
    let target_event = |event_type: &str, details: Value| {
        with_details(
            with_channel(with_target(Event::new(guild_id, event_type), user), channel),
            details,
        )
    };
    if old_state.server_mute != new.server_mute {
        events.push(target_event("VOICE_MUTE", json!({ "serverMute": new.server_mute })));
    }
    if old_state.server_deaf != new.server_deaf {
        events.push(target_event("VOICE_DEAFEN", json!({ "serverDeaf": new.server_deaf })));
    }
    events
}

pub fn channel_create_event(guild_id: &str, channel: &ChannelInfo) -> Event {
    with_details(
        with_channel(
            Event::new(guild_id, "CHANNEL_CREATE"),
            &channel.as_event_channel(),
        ),
        json!({ "type": channel.kind, "parentId": channel.parent_id }),
    )
}

pub fn channel_delete_event(guild_id: &str, channel: &ChannelInfo) -> Event {
    with_details(
        with_channel(
            Event::new(guild_id, "CHANNEL_DELETE"),
            &channel.as_event_channel(),
        ),
        json!({ "type": channel.kind }),
    )
}

/// Only renames are reported.
pub fn channel_update_event(guild_id: &str, old_name: &str, channel: &ChannelInfo) -> Option<Event> {
    let change = old_new(&old_name, &channel.name.as_str())?;
    Some(with_details(
        with_channel(
            Event::new(guild_id, "CHANNEL_UPDATE"),
            &channel.as_event_channel(),
        ),
        json!({ "name": change }),
    ))
}

pub fn channel_pins_update_event(
    guild_id: &str,
    channel: &EventChannel,
    last_pin_at: Option<DateTime<Utc>>,
) -> Event {
    with_details(
        with_channel(Event::new(guild_id, "CHANNEL_PINS_UPDATE"), channel),
        json!({ "lastPinAt": last_pin_at.map(|at| at.to_rfc3339()) }),
    )
}

pub fn role_create_event(guild_id: &str, role: &RoleInfo) -> Event {
    with_details(
        Event::new(guild_id, "ROLE_CREATE"),
        json!({ "roleId": role.id, "roleName": role.name, "color": role.color }),
    )
}

pub fn role_delete_event(guild_id: &str, role_id: &str, role_name: Option<&str>) -> Event {
    with_details(
        Event::new(guild_id, "ROLE_DELETE"),
        json!({ "roleId": role_id, "roleName": role_name.unwrap_or("Unknown") }),
    )
}

/// `changes` lists the fields that differ from the cached role, if any was cached.
pub fn role_update_event(guild_id: &str, old: Option<&RoleInfo>, role: &RoleInfo) -> Event {
    let mut changes = Map::new();
    if let Some(old) = old {
        changes.extend(old_new(&old.name, &role.name).map(|change| ("name".to_string(), change)));
        changes.extend(old_new(&old.color, &role.color).map(|change| ("color".to_string(), change)));
    }
    with_details(
        Event::new(guild_id, "ROLE_UPDATE"),
        json!({ "roleId": role.id, "roleName": role.name, "changes": changes }),
    )
}

pub fn guild_update_event(guild_id: &str, old_name: &str, new_name: &str) -> Option<Event> {
    let change = old_new(&old_name, &new_name)?;
    Some(with_details(
        Event::new(guild_id, "GUILD_UPDATE"),
        json!({ "name": change }),
    ))
}

/// Compares two emoji lists of a guild.
pub fn emoji_events(guild_id: &str, old: &[EmojiInfo], new: &[EmojiInfo]) -> Vec<Event> {
    let mut events = Vec::new();
    for emoji in new {
        match old.iter().find(|previous| previous.id == emoji.id) {
            None => events.push(with_details(
                Event::new(guild_id, "EMOJI_CREATE"),
                json!({ "emojiId": emoji.id, "emojiName": emoji.name, "animated": emoji.animated }),
            )),
            Some(previous) => {
                if let Some(change) = old_new(&previous.name, &emoji.name) {
                    events.push(with_details(
                        Event::new(guild_id, "EMOJI_UPDATE"),
                        json!({ "emojiId": emoji.id, "emojiName": emoji.name, "changes": { "name": change } }),
                    ));
                }
            }
        }
    }
    for emoji in old.iter().filter(|emoji| !new.iter().any(|current| current.id == emoji.id)) {
        events.push(with_details(
            Event::new(guild_id, "EMOJI_DELETE"),
            json!({ "emojiId": emoji.id, "emojiName": emoji.name }),
        ));
    }
    events
}

/// Compares two sticker lists of a guild.
pub fn sticker_events(guild_id: &str, old: &[StickerInfo], new: &[StickerInfo]) -> Vec<Event> {
    let mut events = Vec::new();
    for sticker in new {
        match old.iter().find(|previous| previous.id == sticker.id) {
            None => events.push(with_details(
                Event::new(guild_id, "STICKER_CREATE"),
                json!({
                    "stickerId": sticker.id,
                    "stickerName": sticker.name,
                    "description": sticker.description,
                    "format": sticker.format,
                    "tags": sticker.tags,
                }),
            )),
            Some(previous) => {
                let mut changes = Map::new();
                changes.extend(
                    old_new(&previous.name, &sticker.name).map(|change| ("name".to_string(), change)),
                );
                changes.extend(
                    old_new(&previous.description, &sticker.description)
                        .map(|change| ("description".to_string(), change)),
                );
                if !changes.is_empty() {
                    events.push(with_details(
                        Event::new(guild_id, "STICKER_UPDATE"),
                        json!({ "stickerId": sticker.id, "stickerName": sticker.name, "changes": changes }),
                    ));
                }
            }
        }
    }
    for sticker in old.iter().filter(|sticker| !new.iter().any(|current| current.id == sticker.id)) {
        events.push(with_details(
            Event::new(guild_id, "STICKER_DELETE"),
            json!({ "stickerId": sticker.id, "stickerName": sticker.name }),
        ));
    }
    events
}

pub fn invite_create_event(
    guild_id: &str,
    inviter: Option<&EventUser>,
    channel: &EventChannel,
    invite: &InviteInfo,
) -> Event {
    let mut event = with_channel(Event::new(guild_id, "INVITE_CREATE"), channel);
    if let Some(inviter) = inviter {
        event = with_actor(event, inviter);
    }
    with_details(
        event,
        json!({ "code": invite.code, "maxUses": invite.max_uses, "maxAge": invite.max_age }),
    )
}

pub fn invite_delete_event(guild_id: &str, channel: &EventChannel, code: &str) -> Event {
    with_details(
        with_channel(Event::new(guild_id, "INVITE_DELETE"), channel),
        json!({ "code": code }),
    )
}

/// The thread is the event channel. The owner is the actor when known.
pub fn thread_create_event(guild_id: &str, thread: &ChannelInfo, owner_id: Option<&str>) -> Event {
    let mut event = with_channel(
        Event::new(guild_id, "THREAD_CREATE"),
        &thread.as_event_channel(),
    );
    event.actor_id = owner_id.map(str::to_string);
    with_details(event, json!({ "parentId": thread.parent_id }))
}

/// Renames and archive toggles. `old` is the cached thread.
pub fn thread_update_event(
    guild_id: &str,
    old: (&str, bool),
    thread: &ChannelInfo,
    archived: bool,
) -> Option<Event> {
    let mut changes = Map::new();
    changes.extend(old_new(&old.0, &thread.name.as_str()).map(|change| ("name".to_string(), change)));
    changes.extend(old_new(&old.1, &archived).map(|change| ("archived".to_string(), change)));
    if changes.is_empty() {
        return None;
    }
    Some(with_details(
        with_channel(
            Event::new(guild_id, "THREAD_UPDATE"),
            &thread.as_event_channel(),
        ),
        json!({ "parentId": thread.parent_id, "changes": changes }),
    ))
}

pub fn thread_delete_event(guild_id: &str, thread: &EventChannel, parent_id: &str) -> Event {
    with_details(
        with_channel(Event::new(guild_id, "THREAD_DELETE"), thread),
        json!({ "parentId": parent_id }),
    )
}

/// One event per member added to or removed from the thread. Members are targets.
pub fn thread_member_events(
    guild_id: &str,
    thread: &EventChannel,
    added: &[String],
    removed: &[String],
) -> Vec<Event> {
    let member_event = |event_type: &str, user_id: &String| {
        let mut event = with_channel(Event::new(guild_id, event_type), thread);
        event.target_id = Some(user_id.clone());
        event
    };
    added
        .iter()
        .map(|user_id| member_event("THREAD_MEMBER_ADD", user_id))
        .chain(
            removed
                .iter()
                .map(|user_id| member_event("THREAD_MEMBER_REMOVE", user_id)),
        )
        .collect()
}

/// `REACTION_ADD` when `added`, otherwise `REACTION_REMOVE`.
pub fn reaction_event(
    guild_id: &str,
    user: &EventUser,
    channel: &EventChannel,
    message_id: &str,
    emoji: (Option<&str>, Option<&str>),
    added: bool,
) -> Event {
    let event_type = if added { "REACTION_ADD" } else { "REACTION_REMOVE" };
    let (emoji, emoji_id) = emoji;
    with_details(
        with_channel(with_actor(Event::new(guild_id, event_type), user), channel),
        json!({
            "messageId": message_id,
            "emoji": emoji,
            "emojiId": emoji_id,
            "isBot": user.bot,
        }),
    )
}

pub fn reaction_remove_all_event(guild_id: &str, channel: &EventChannel, message_id: &str) -> Event {
    with_details(
        with_channel(Event::new(guild_id, "REACTION_REMOVE_ALL"), channel),
        json!({ "messageId": message_id }),
    )
}

/// Options appear both under `options` and as flattened `option_<name>` keys.
pub fn command_event(
    guild_id: &str,
    user: &EventUser,
    channel: &EventChannel,
    command_name: &str,
    options: Vec<(String, Value)>,
) -> Event {
    let mut event = with_details(
        with_channel(with_actor(Event::new(guild_id, "COMMAND_USE"), user), channel),
        json!({
            "commandName": command_name,
            "isBot": user.bot,
        }),
    );

    let mut nested = Map::new();
    for (name, value) in options {
        event.extra.insert(format!("option_{name}"), value.clone());
        nested.insert(name, value);
    }
    event.options = Some(nested);
    event
}

/// `BUTTON_CLICK` for message components, `MODAL_SUBMIT` for modals.
pub fn component_event(
    guild_id: &str,
    user: &EventUser,
    channel: &EventChannel,
    custom_id: &str,
    modal: bool,
) -> Event {
    let event_type = if modal { "MODAL_SUBMIT" } else { "BUTTON_CLICK" };
    with_details(
        with_channel(with_actor(Event::new(guild_id, event_type), user), channel),
        json!({ "customId": custom_id, "isBot": user.bot }),
    )
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use test_case::test_case;

    use super::*;

    fn user(bot: bool, age_days: i64, now: DateTime<Utc>) -> EventUser {
        EventUser {
            id: "42".into(),
            tag: "newbie".into(),
            bot,
            created_at: now - Duration::days(age_days),
        }
    }

    fn channel() -> EventChannel {
        EventChannel {
            id: "C".into(),
            name: Some("general".into()),
        }
    }

    fn voice(channel_id: Option<&str>) -> VoiceSnapshot {
        VoiceSnapshot {
            channel: channel_id.map(|id| EventChannel {
                id: id.into(),
                name: Some(format!("voice-{id}")),
            }),
            ..VoiceSnapshot::default()
        }
    }

    fn types(events: &[Event]) -> Vec<&str> {
        events.iter().map(|event| event.event_type.as_str()).collect()
    }

    #[test]
    fn member_join_carries_age_and_roles() {
        let now = Utc::now();
        let roles = vec!["R1".to_string()];

        let (event, ctx) = member_join_event("G", &user(false, 3, now), &roles, None, now);

        assert_eq!(event.event_type, "MEMBER_JOIN");
        assert_eq!(event.event_category, "member");
        assert_eq!(event.actor_id.as_deref(), Some("42"));
        assert_eq!(event.detail("accountAge"), Some(&json!(3)));
        assert_eq!(event.detail("roles"), Some(&json!(["R1"])));
        assert!(!event.is_bot());
        assert_eq!(ctx.actor_roles, Some(roles));
        assert!((ctx.account_age_days.unwrap() - 3.0).abs() < 0.01);
    }

    #[test]
    fn bot_joins_are_marked() {
        let now = Utc::now();
        let (event, _) = member_join_event("G", &user(true, 100, now), &[], None, now);
        assert!(event.is_bot());
    }

    #[test]
    fn member_leave_keeps_roles_and_join_date() {
        let now = Utc::now();
        let roles = vec!["R1".to_string()];
        let event = member_leave_event("G", &user(false, 1, now), Some(&roles), Some(now));

        assert_eq!(event.event_type, "MEMBER_LEAVE");
        assert_eq!(event.detail("roles"), Some(&json!(["R1"])));
        assert_eq!(event.detail_str("joinedAt"), Some(now.to_rfc3339().as_str()));
    }

    #[test]
    fn bans_target_the_user() {
        let banned = ban_event("G", &user(false, 1, Utc::now()), true);
        let unbanned = ban_event("G", &user(false, 1, Utc::now()), false);

        assert_eq!(banned.event_type, "MEMBER_BAN");
        assert_eq!(banned.event_category, "moderation");
        assert_eq!(banned.target_id.as_deref(), Some("42"));
        assert_eq!(banned.actor_id, None);
        assert_eq!(unbanned.event_type, "MEMBER_UNBAN");
        assert_eq!(unbanned.details, None);
    }

    #[test]
    fn kicks_name_moderator_and_target() {
        let event = kick_event("G", "MOD", Some("42"), None);

        assert_eq!(event.event_type, "MEMBER_KICK");
        assert_eq!(event.actor_id.as_deref(), Some("MOD"));
        assert_eq!(event.target_id.as_deref(), Some("42"));
        assert_eq!(event.detail_str("reason"), Some("No reason provided"));
    }

    #[test]
    fn timeouts_only_fire_for_new_future_deadlines() {
        let now = Utc::now();
        let member = user(false, 1, now);
        let until = now + Duration::minutes(30);

        let event = timeout_event("G", &member, None, Some(until), now).expect("timeout event");
        assert_eq!(event.event_type, "MEMBER_TIMEOUT");
        assert_eq!(event.target_id.as_deref(), Some("42"));
        assert_eq!(event.detail("durationMinutes"), Some(&json!(30)));

        assert!(timeout_event("G", &member, Some(until), Some(until), now).is_none());
        assert!(timeout_event("G", &member, None, Some(now - Duration::minutes(1)), now).is_none());
        assert!(timeout_event("G", &member, Some(until), None, now).is_none());
    }

    #[test]
    fn nickname_changes_become_member_updates() {
        let member = user(false, 1, Utc::now());

        let event = nickname_event("G", &member, None, Some("Neo")).expect("nickname event");
        assert_eq!(event.event_type, "MEMBER_UPDATE");
        assert_eq!(event.detail("nickname"), Some(&json!({"old": null, "new": "Neo"})));
        assert!(nickname_event("G", &member, Some("Neo"), Some("Neo")).is_none());
    }

    #[test]
    fn role_diff_emits_one_event_per_role() {
        let member = user(false, 1, Utc::now());
        let names = HashMap::from([("R2".to_string(), "Verified".to_string())]);

        let events = member_role_events(
            "G",
            &member,
            &["R1".to_string()],
            &["R2".to_string(), "R3".to_string()],
            &names,
        );

        assert_eq!(types(&events), vec!["MEMBER_ROLE_ADD", "MEMBER_ROLE_ADD", "MEMBER_ROLE_REMOVE"]);
        assert_eq!(events[0].event_category, "role");
        assert_eq!(events[0].detail_str("roleName"), Some("Verified"));
        assert_eq!(events[1].detail_str("roleName"), Some("Unknown"));
        assert_eq!(events[2].detail_str("roleId"), Some("R1"));
    }

    #[test]
    fn message_create_exposes_content_and_embeds() {
        let message = MessageSummary {
            id: "M".into(),
            content: "hello there".into(),
            embed_texts: vec!["Server Rules".into()],
            ..MessageSummary::default()
        };

        let event = message_create_event("G", &user(true, 1, Utc::now()), &channel(), &message);

        assert_eq!(event.channel_id.as_deref(), Some("C"));
        assert_eq!(event.channel_name.as_deref(), Some("general"));
        assert_eq!(event.detail_str("content"), Some("hello there"));
        assert_eq!(event.detail("embedTexts"), Some(&json!(["Server Rules"])));
        assert_eq!(event.detail("contentLength"), Some(&json!(11)));
        assert!(event.is_bot());
    }

    #[test]
    fn message_update_skips_unchanged_content() {
        let author = user(false, 1, Utc::now());

        let event = message_update_event("G", &author, &channel(), "M", Some("hi"), "hello")
            .expect("update event");
        assert_eq!(event.event_type, "MESSAGE_UPDATE");
        assert_eq!(event.detail("oldContentLength"), Some(&json!(2)));
        assert_eq!(event.detail("newContentLength"), Some(&json!(5)));
        assert_eq!(event.detail_str("content"), Some("hello"));

        assert!(message_update_event("G", &author, &channel(), "M", Some("same"), "same").is_none());
        let uncached = message_update_event("G", &author, &channel(), "M", None, "x").expect("uncached edit");
        assert_eq!(uncached.detail("oldContentLength"), Some(&Value::Null));
    }

    #[test]
    fn message_delete_has_no_actor() {
        let event = message_delete_event("G", &channel(), "M");
        assert_eq!(event.event_category, "message");
        assert_eq!(event.actor_id, None);
        assert_eq!(event.detail_str("messageId"), Some("M"));
    }

    #[test]
    fn bulk_delete_counts_messages() {
        let event = message_bulk_delete_event("G", &channel(), 12);
        assert_eq!(event.event_type, "MESSAGE_BULK_DELETE");
        assert_eq!(event.detail("count"), Some(&json!(12)));
    }

    #[test]
    fn joining_voice_is_a_single_event() {
        let mut joined = voice(Some("V1"));
        joined.self_mute = true;

        let events = voice_events("G", &user(false, 1, Utc::now()), None, &joined);

        assert_eq!(types(&events), vec!["VOICE_JOIN"]);
        assert_eq!(events[0].channel_id.as_deref(), Some("V1"));
        assert_eq!(events[0].detail("selfMute"), Some(&json!(true)));
    }

    #[test]
    fn leaving_voice_reports_previous_state() {
        let mut before = voice(Some("V1"));
        before.streaming = true;

        let events = voice_events("G", &user(false, 1, Utc::now()), Some(&before), &voice(None));

        assert_eq!(types(&events), vec!["VOICE_LEAVE"]);
        assert_eq!(events[0].channel_id.as_deref(), Some("V1"));
        assert_eq!(events[0].detail("wasStreaming"), Some(&json!(true)));
    }

    #[test]
    fn moving_channels_also_reports_toggles() {
        let before = voice(Some("V1"));
        let mut after = voice(Some("V2"));
        after.video = true;

        let events = voice_events("G", &user(false, 1, Utc::now()), Some(&before), &after);

        assert_eq!(types(&events), vec!["VOICE_MOVE", "VOICE_VIDEO_START"]);
        assert_eq!(events[0].detail_str("fromChannelId"), Some("V1"));
        assert_eq!(events[0].channel_id.as_deref(), Some("V2"));
    }

    #[test]
    fn server_mutes_target_the_member() {
        let before = voice(Some("V1"));
        let mut after = voice(Some("V1"));
        after.server_mute = true;
        after.self_deaf = true;

        let events = voice_events("G", &user(false, 1, Utc::now()), Some(&before), &after);

        assert_eq!(types(&events), vec!["VOICE_DEAFEN", "VOICE_MUTE"]);
        assert_eq!(events[0].actor_id.as_deref(), Some("42"));
        assert_eq!(events[1].actor_id, None);
        assert_eq!(events[1].target_id.as_deref(), Some("42"));
        assert_eq!(events[1].detail("serverMute"), Some(&json!(true)));
    }

    #[test_case(false, true, "VOICE_STREAM_START" ; "stream starts")]
    #[test_case(true, false, "VOICE_STREAM_END" ; "stream ends")]
    fn stream_toggles(before_streaming: bool, after_streaming: bool, expected: &str) {
        let mut before = voice(Some("V1"));
        before.streaming = before_streaming;
        let mut after = voice(Some("V1"));
        after.streaming = after_streaming;

        let events = voice_events("G", &user(false, 1, Utc::now()), Some(&before), &after);
        assert_eq!(types(&events), vec![expected]);
    }

    #[test]
    fn channel_lifecycle() {
        let text = ChannelInfo {
            id: "C2".into(),
            name: "rules".into(),
            kind: "text".into(),
            parent_id: Some("CAT".into()),
        };

        let created = channel_create_event("G", &text);
        assert_eq!(created.event_category, "channel");
        assert_eq!(created.channel_name.as_deref(), Some("rules"));
        assert_eq!(created.detail_str("parentId"), Some("CAT"));
        assert_eq!(channel_delete_event("G", &text).detail_str("type"), Some("text"));

        let renamed = channel_update_event("G", "old-rules", &text).expect("rename event");
        assert_eq!(renamed.detail("name"), Some(&json!({"old": "old-rules", "new": "rules"})));
        assert!(channel_update_event("G", "rules", &text).is_none());
    }

    #[test]
    fn role_update_lists_changed_fields() {
        let old = RoleInfo {
            id: "R".into(),
            name: "Members".into(),
            color: 1,
        };
        let new = RoleInfo {
            name: "Verified".into(),
            ..old.clone()
        };

        let event = role_update_event("G", Some(&old), &new);
        assert_eq!(event.event_type, "ROLE_UPDATE");
        assert_eq!(event.detail("changes"), Some(&json!({"name": {"old": "Members", "new": "Verified"}})));
        assert_eq!(role_update_event("G", None, &new).detail("changes"), Some(&json!({})));
        assert_eq!(role_delete_event("G", "R", None).detail_str("roleName"), Some("Unknown"));
        assert_eq!(role_create_event("G", &new).detail("color"), Some(&json!(1)));
    }

    #[test]
    fn guild_renames_only() {
        assert!(guild_update_event("G", "Home", "Home").is_none());
        let event = guild_update_event("G", "Home", "Hub").expect("guild update");
        assert_eq!(event.event_category, "guild");
    }

    #[test]
    fn emoji_diff_finds_creates_updates_and_deletes() {
        let emoji = |id: &str, name: &str| EmojiInfo {
            id: id.into(),
            name: name.into(),
            animated: false,
        };
        let old = vec![emoji("1", "wave"), emoji("2", "old")];
        let new = vec![emoji("1", "hello"), emoji("3", "fresh")];

        let events = emoji_events("G", &old, &new);

        assert_eq!(types(&events), vec!["EMOJI_UPDATE", "EMOJI_CREATE", "EMOJI_DELETE"]);
        assert_eq!(events[1].detail_str("emojiName"), Some("fresh"));
        assert_eq!(events[2].detail_str("emojiId"), Some("2"));
        assert!(emoji_events("G", &new, &new).is_empty());
    }

    #[test]
    fn sticker_diff_reports_description_changes() {
        let sticker = StickerInfo {
            id: "S".into(),
            name: "cat".into(),
            description: Some("a cat".into()),
            format: "png".into(),
            tags: vec!["cat".into()],
        };
        let edited = StickerInfo {
            description: Some("a cute cat".into()),
            ..sticker.clone()
        };

        assert_eq!(types(&sticker_events("G", &[], &[sticker.clone()])), vec!["STICKER_CREATE"]);
        let updated = sticker_events("G", &[sticker.clone()], &[edited]);
        assert_eq!(types(&updated), vec!["STICKER_UPDATE"]);
        assert!(updated[0].detail("changes").and_then(|changes| changes.get("name")).is_none());
        assert_eq!(types(&sticker_events("G", &[sticker], &[])), vec!["STICKER_DELETE"]);
    }

    #[test]
    fn invites_carry_code_and_inviter() {
        let invite = InviteInfo {
            code: "abc".into(),
            max_uses: 5,
            max_age: 3600,
        };
        let inviter = user(false, 1, Utc::now());

        let created = invite_create_event("G", Some(&inviter), &channel(), &invite);
        assert_eq!(created.actor_id.as_deref(), Some("42"));
        assert_eq!(created.detail("maxUses"), Some(&json!(5)));

        let deleted = invite_delete_event("G", &channel(), "abc");
        assert_eq!(deleted.event_category, "invite");
        assert_eq!(deleted.detail_str("code"), Some("abc"));
    }

    #[test]
    fn thread_events_use_the_thread_as_channel() {
        let thread = ChannelInfo {
            id: "T".into(),
            name: "help".into(),
            kind: "public_thread".into(),
            parent_id: Some("C".into()),
        };

        let created = thread_create_event("G", &thread, Some("42"));
        assert_eq!(created.channel_id.as_deref(), Some("T"));
        assert_eq!(created.actor_id.as_deref(), Some("42"));

        let archived = thread_update_event("G", ("help", false), &thread, true).expect("archive event");
        assert_eq!(archived.detail("changes"), Some(&json!({"archived": {"old": false, "new": true}})));
        assert!(thread_update_event("G", ("help", true), &thread, true).is_none());

        let members = thread_member_events("G", &thread.as_event_channel(), &["1".into()], &["2".into()]);
        assert_eq!(types(&members), vec!["THREAD_MEMBER_ADD", "THREAD_MEMBER_REMOVE"]);
        assert_eq!(members[1].target_id.as_deref(), Some("2"));

        let deleted = thread_delete_event("G", &thread.as_event_channel(), "C");
        assert_eq!(deleted.event_type, "THREAD_DELETE");
    }

    #[test]
    fn reactions_record_emoji() {
        let added = reaction_event("G", &user(false, 1, Utc::now()), &channel(), "M", (Some("👍"), None), true);
        assert_eq!(added.event_type, "REACTION_ADD");
        assert_eq!(added.detail_str("emoji"), Some("👍"));
        assert_eq!(added.detail("emojiId"), Some(&Value::Null));

        let removed = reaction_event("G", &user(false, 1, Utc::now()), &channel(), "M", (Some("party"), Some("9")), false);
        assert_eq!(removed.event_type, "REACTION_REMOVE");
        assert_eq!(removed.detail_str("emojiId"), Some("9"));

        let cleared = reaction_remove_all_event("G", &channel(), "M");
        assert_eq!(cleared.event_category, "reaction");
        assert_eq!(cleared.actor_id, None);
    }

    #[test]
    fn command_options_are_nested_and_flattened() {
        let event = command_event(
            "G",
            &user(false, 10, Utc::now()),
            &channel(),
            "purge",
            vec![
                ("amount".into(), json!(25)),
                ("member".into(), json!("77")),
            ],
        );

        assert_eq!(event.event_category, "interaction");
        assert_eq!(event.detail_str("commandName"), Some("purge"));
        assert_eq!(event.option_value("amount"), Some(&json!(25)));
        assert_eq!(event.extra.get("option_member"), Some(&json!("77")));
        assert_eq!(
            event.options.as_ref().and_then(|options| options.get("member")),
            Some(&json!("77"))
        );
    }

    #[test_case(false, "BUTTON_CLICK" ; "button")]
    #[test_case(true, "MODAL_SUBMIT" ; "modal")]
    fn components_carry_custom_id(modal: bool, expected: &str) {
        let event = component_event("G", &user(false, 1, Utc::now()), &channel(), "verify", modal);
        assert_eq!(event.event_type, expected);
        assert_eq!(event.event_category, "interaction");
        assert_eq!(event.detail_str("customId"), Some("verify"));
    }

    #[test]
    fn every_declared_event_type_has_a_constructor() {
        let now = Utc::now();
        let member = user(false, 1, now);
        let text = ChannelInfo {
            id: "C".into(),
            name: "general".into(),
            kind: "text".into(),
            parent_id: None,
        };
        let role = RoleInfo::default();
        let emoji = EmojiInfo {
            id: "E".into(),
            name: "wave".into(),
            animated: false,
        };
        let sticker = StickerInfo {
            id: "S".into(),
            name: "cat".into(),
            ..StickerInfo::default()
        };
        let mut voice_flags = voice(Some("V1"));
        voice_flags.video = true;
        voice_flags.streaming = true;
        voice_flags.self_mute = true;
        voice_flags.self_deaf = true;

        let mut produced: Vec<Event> = vec![
            member_join_event("G", &member, &[], None, now).0,
            member_leave_event("G", &member, None, None),
            ban_event("G", &member, true),
            ban_event("G", &member, false),
            kick_event("G", "MOD", Some("42"), None),
            message_create_event("G", &member, &channel(), &MessageSummary::default()),
            message_delete_event("G", &channel(), "M"),
            message_bulk_delete_event("G", &channel(), 2),
            channel_create_event("G", &text),
            channel_delete_event("G", &text),
            channel_pins_update_event("G", &channel(), None),
            role_create_event("G", &role),
            role_delete_event("G", "R", None),
            role_update_event("G", None, &role),
            invite_create_event("G", None, &channel(), &InviteInfo::default()),
            invite_delete_event("G", &channel(), "abc"),
            thread_create_event("G", &text, None),
            thread_delete_event("G", &channel(), "C"),
            reaction_event("G", &member, &channel(), "M", (None, None), true),
            reaction_event("G", &member, &channel(), "M", (None, None), false),
            reaction_remove_all_event("G", &channel(), "M"),
            command_event("G", &member, &channel(), "ping", Vec::new()),
            component_event("G", &member, &channel(), "id", false),
            component_event("G", &member, &channel(), "id", true),
        ];
        produced.extend(timeout_event("G", &member, None, Some(now + Duration::hours(1)), now));
        produced.extend(nickname_event("G", &member, None, Some("Neo")));
        produced.extend(member_role_events("G", &member, &["A".into()], &["B".into()], &HashMap::new()));
        produced.extend(message_update_event("G", &member, &channel(), "M", None, "edited"));
        produced.extend(voice_events("G", &member, None, &voice(Some("V1"))));
        produced.extend(voice_events("G", &member, Some(&voice(Some("V1"))), &voice(None)));
        produced.extend(voice_events("G", &member, Some(&voice(Some("V1"))), &voice_flags));
        produced.extend(voice_events("G", &member, Some(&voice_flags), &voice(Some("V2"))));
        produced.extend(channel_update_event("G", "old", &text));
        produced.extend(guild_update_event("G", "Home", "Hub"));
        produced.extend(emoji_events("G", &[], &[emoji.clone()]));
        produced.extend(emoji_events("G", &[emoji.clone()], &[EmojiInfo { name: "hi".into(), ..emoji.clone() }]));
        produced.extend(emoji_events("G", &[emoji], &[]));
        produced.extend(sticker_events("G", &[], &[sticker.clone()]));
        produced.extend(sticker_events("G", &[sticker.clone()], &[StickerInfo { name: "dog".into(), ..sticker.clone() }]));
        produced.extend(sticker_events("G", &[sticker], &[]));
        produced.extend(thread_update_event("G", ("old", false), &text, false));
        produced.extend(thread_member_events("G", &channel(), &["1".into()], &["2".into()]));

        for declared in crate::automation::metadata::EVENT_TYPES {
            let event = produced
                .iter()
                .find(|event| event.event_type == declared.event_type)
                .unwrap_or_else(|| panic!("no constructor emits {}", declared.event_type));
            assert_eq!(event.event_category, declared.category, "{}", declared.event_type);
        }
    }

    #[test]
    fn account_age_never_negative() {
        let now = Utc::now();
        let future = EventUser {
            created_at: now + Duration::days(1),
            ..user(false, 0, now)
        };
        assert_eq!(account_age_days(&future, now), 0.0);
    }
}
