//! Gateway callbacks normalized into automation events.
//!
//! The handler extracts plain values from serenity models and hands them to
//! the constructors in [`super::events`], then spawns one runner task per
//! event.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::{Value, json};
use serenity::all::{
    Cache, ChannelId, ChannelPinsUpdateEvent, CommandDataOption,
    CommandDataOptionValue, CommandInteraction, ComponentInteraction, Context as SerenityContext,
    CreateInteractionResponse, CreateInteractionResponseMessage, Emoji, EmojiId,
    EventHandler as SerenityEventHandler, Guild, GuildChannel, GuildId, GuildMemberUpdateEvent,
    Http, Interaction, InviteCreateEvent, InviteDeleteEvent, Member,
    Message as SerenityMessage, MessageId, MessageUpdateEvent, ModalInteraction, PartialGuild,
    PartialGuildChannel, Reaction, ReactionType, Ready, Role, RoleId, Sticker,
    StickerFormatType, StickerId, ThreadMembersUpdateEvent, User, UserId, VoiceState,
};
use serenity::model::guild::audit_log::{Action as AuditAction, AuditLogEntry, MemberAction};
use tokio::sync::{Mutex as AsyncMutex, RwLock, oneshot};
use tracing::{debug, info, warn};

use super::events::{
    self, ChannelInfo, EmojiInfo, EventChannel, EventUser, InviteInfo, MessageSummary, RoleInfo,
    StickerInfo, VoiceSnapshot, to_datetime,
};
use crate::automation::{AutomationRunner, Event, FilterContext, GuildInfo};

const COMMAND_ACK: &str = "✅ Command received.";

fn event_user(user: &User) -> EventUser {
    EventUser {
        id: user.id.to_string(),
        tag: user.tag(),
        bot: user.bot,
        created_at: to_datetime(user.id.created_at().unix_timestamp()),
    }
}

/// Cached user, or a placeholder carrying only the id.
fn user_by_id(cache: &Cache, user_id: UserId) -> EventUser {
    if let Some(user) = cache.user(user_id) {
        return event_user(&user);
    }
    EventUser {
        id: user_id.to_string(),
        tag: user_id.to_string(),
        bot: false,
        created_at: to_datetime(user_id.created_at().unix_timestamp()),
    }
}

fn option_value(value: &CommandDataOptionValue) -> Value {
    match value {
        CommandDataOptionValue::String(text) => Value::String(text.clone()),
        CommandDataOptionValue::Integer(number) => json!(number),
        CommandDataOptionValue::Number(number) => json!(number),
        CommandDataOptionValue::Boolean(flag) => Value::Bool(*flag),
        CommandDataOptionValue::User(id) => Value::String(id.to_string()),
        CommandDataOptionValue::Channel(id) => Value::String(id.to_string()),
        CommandDataOptionValue::Role(id) => Value::String(id.to_string()),
        CommandDataOptionValue::Mentionable(id) => Value::String(id.to_string()),
        CommandDataOptionValue::Attachment(id) => Value::String(id.to_string()),
        _ => Value::Null,
    }
}

/// Leaf options of a command, descending into subcommands.
fn flatten_options(options: &[CommandDataOption]) -> Vec<(String, Value)> {
    let mut flattened = Vec::new();
    for option in options {
        match &option.value {
            CommandDataOptionValue::SubCommand(children)
            | CommandDataOptionValue::SubCommandGroup(children) => {
                flattened.extend(flatten_options(children));
            }
            value => flattened.push((option.name.clone(), option_value(value))),
        }
    }
    flattened
}

fn message_summary(message: &SerenityMessage) -> MessageSummary {
    let mut embed_texts = Vec::new();
    for embed in &message.embeds {
        embed_texts.extend(embed.title.clone());
        embed_texts.extend(embed.description.clone());
        for field in &embed.fields {
            embed_texts.push(field.name.clone());
            embed_texts.push(field.value.clone());
        }
        embed_texts.extend(embed.footer.as_ref().map(|footer| footer.text.clone()));
    }

    MessageSummary {
        id: message.id.to_string(),
        content: message.content.clone(),
        embed_texts,
        attachment_count: message.attachments.len(),
        mention_count: message.mentions.len(),
        is_reply: message.message_reference.is_some(),
    }
}

fn role_ids(roles: &[RoleId]) -> Vec<String> {
    roles.iter().map(ToString::to_string).collect()
}

fn channel_info(channel: &GuildChannel) -> ChannelInfo {
    ChannelInfo {
        id: channel.id.to_string(),
        name: channel.name.clone(),
        kind: channel.kind.name().to_string(),
        parent_id: channel.parent_id.map(|id| id.to_string()),
    }
}

fn role_info(role: &Role) -> RoleInfo {
    RoleInfo {
        id: role.id.to_string(),
        name: role.name.clone(),
        color: role.colour.0,
    }
}

fn emoji_infos(emojis: &HashMap<EmojiId, Emoji>) -> Vec<EmojiInfo> {
    let mut infos: Vec<EmojiInfo> = emojis
        .values()
        .map(|emoji| EmojiInfo {
            id: emoji.id.to_string(),
            name: emoji.name.clone(),
            animated: emoji.animated,
        })
        .collect();
    infos.sort_by(|a, b| a.id.cmp(&b.id));
    infos
}

fn sticker_format(format: StickerFormatType) -> &'static str {
    match format {
        StickerFormatType::Png => "png",
        StickerFormatType::Apng => "apng",
        StickerFormatType::Lottie => "lottie",
        StickerFormatType::Gif => "gif",
        _ => "unknown",
    }
}

fn sticker_infos(stickers: &HashMap<StickerId, Sticker>) -> Vec<StickerInfo> {
    let mut infos: Vec<StickerInfo> = stickers
        .values()
        .map(|sticker| StickerInfo {
            id: sticker.id.to_string(),
            name: sticker.name.clone(),
            description: sticker.description.clone(),
            format: sticker_format(sticker.format_type).to_string(),
            tags: sticker.tags.clone(),
        })
        .collect();
    infos.sort_by(|a, b| a.id.cmp(&b.id));
    infos
}

/// Guild and channel names from the cache. Neither is required.
fn cached_names(
    cache: &Cache,
    guild_id: GuildId,
    channel_id: Option<ChannelId>,
) -> (GuildInfo, Option<String>) {
    let Some(guild) = cache.guild(guild_id) else {
        return (GuildInfo::default(), None);
    };
    let channel_name = channel_id.and_then(|id| {
        guild
            .channels
            .get(&id)
            .map(|channel| channel.name.clone())
            .or_else(|| {
                guild
                    .threads
                    .iter()
                    .find(|thread| thread.id == id)
                    .map(|thread| thread.name.clone())
            })
    });
    (
        GuildInfo {
            name: Some(guild.name.clone()),
        },
        channel_name,
    )
}

fn cached_role_names(cache: &Cache, guild_id: GuildId) -> HashMap<String, String> {
    cache
        .guild(guild_id)
        .map(|guild| {
            guild
                .roles
                .iter()
                .map(|(id, role)| (id.to_string(), role.name.clone()))
                .collect()
        })
        .unwrap_or_default()
}

fn event_channel(cache: &Cache, guild_id: GuildId, channel_id: ChannelId) -> (GuildInfo, EventChannel) {
    let (guild, name) = cached_names(cache, guild_id, Some(channel_id));
    (
        guild,
        EventChannel {
            id: channel_id.to_string(),
            name,
        },
    )
}

fn voice_snapshot(cache: &Cache, guild_id: GuildId, state: &VoiceState) -> VoiceSnapshot {
    VoiceSnapshot {
        channel: state
            .channel_id
            .map(|channel_id| event_channel(cache, guild_id, channel_id).1),
        self_mute: state.self_mute,
        self_deaf: state.self_deaf,
        server_mute: state.mute,
        server_deaf: state.deaf,
        streaming: state.self_stream.unwrap_or(false),
        video: state.self_video,
    }
}

#[derive(Default)]
struct GuildAssets {
    emojis: Option<Vec<EmojiInfo>>,
    stickers: Option<Vec<StickerInfo>>,
}

pub struct GatewayHandler {
    ready_sender: AsyncMutex<Option<oneshot::Sender<()>>>,
    http_sender: AsyncMutex<Option<oneshot::Sender<Arc<Http>>>>,
    runner: Arc<RwLock<Option<Arc<AutomationRunner>>>>,
    // Emoji and sticker updates carry only the new state.
    assets: AsyncMutex<HashMap<GuildId, GuildAssets>>,
}

impl GatewayHandler {
    pub fn new(
        ready_sender: oneshot::Sender<()>,
        http_sender: oneshot::Sender<Arc<Http>>,
        runner: Arc<RwLock<Option<Arc<AutomationRunner>>>>,
    ) -> Self {
        Self {
            ready_sender: AsyncMutex::new(Some(ready_sender)),
            http_sender: AsyncMutex::new(Some(http_sender)),
            runner,
            assets: AsyncMutex::new(HashMap::new()),
        }
    }

    async fn dispatch(&self, event: Event, guild: GuildInfo, filter_ctx: FilterContext) {
        let Some(runner) = self.runner.read().await.clone() else {
            debug!("ignoring {} before runner binding", event.event_type);
            return;
        };

        tokio::spawn(async move {
            runner.process(&event, &guild, &filter_ctx).await;
        });
    }

    async fn dispatch_all(
        &self,
        events: Vec<Event>,
        guild: GuildInfo,
        filter_ctx: FilterContext,
    ) {
        for event in events {
            self.dispatch(event, guild.clone(), filter_ctx.clone()).await;
        }
    }

    async fn dispatch_plain(&self, ctx: &SerenityContext, guild_id: GuildId, event: Option<Event>) {
        if let Some(event) = event {
            let (guild, _) = cached_names(&ctx.cache, guild_id, None);
            self.dispatch(event, guild, FilterContext::default()).await;
        }
    }

    async fn handle_command(&self, ctx: &SerenityContext, command: CommandInteraction) {
        let Some(guild_id) = command.guild_id else {
            return;
        };

        let response = CreateInteractionResponse::Message(
            CreateInteractionResponseMessage::new()
                .content(COMMAND_ACK)
                .ephemeral(true),
        );
        if let Err(err) = command.create_response(&ctx.http, response).await {
            warn!("failed to acknowledge command /{}: {err}", command.data.name);
        }

        let (guild, channel) = event_channel(&ctx.cache, guild_id, command.channel_id);
        let event = events::command_event(
            &guild_id.to_string(),
            &event_user(&command.user),
            &channel,
            &command.data.name,
            flatten_options(&command.data.options),
        );
        let filter_ctx = FilterContext {
            actor_roles: command.member.as_deref().map(|member| role_ids(&member.roles)),
            ..FilterContext::default()
        };
        self.dispatch(event, guild, filter_ctx).await;
    }

    async fn handle_component(&self, ctx: &SerenityContext, component: ComponentInteraction) {
        let Some(guild_id) = component.guild_id else {
            return;
        };
        if let Err(err) = component
            .create_response(&ctx.http, CreateInteractionResponse::Acknowledge)
            .await
        {
            warn!("failed to acknowledge component {}: {err}", component.data.custom_id);
        }

        let (guild, channel) = event_channel(&ctx.cache, guild_id, component.channel_id);
        let event = events::component_event(
            &guild_id.to_string(),
            &event_user(&component.user),
            &channel,
            &component.data.custom_id,
            false,
        );
        let filter_ctx = FilterContext {
            actor_roles: component.member.as_ref().map(|member| role_ids(&member.roles)),
            ..FilterContext::default()
        };
        self.dispatch(event, guild, filter_ctx).await;
    }

    async fn handle_modal(&self, ctx: &SerenityContext, modal: ModalInteraction) {
        let Some(guild_id) = modal.guild_id else {
            return;
        };
        if let Err(err) = modal
            .create_response(&ctx.http, CreateInteractionResponse::Acknowledge)
            .await
        {
            warn!("failed to acknowledge modal {}: {err}", modal.data.custom_id);
        }

        let (guild, channel) = event_channel(&ctx.cache, guild_id, modal.channel_id);
        let event = events::component_event(
            &guild_id.to_string(),
            &event_user(&modal.user),
            &channel,
            &modal.data.custom_id,
            true,
        );
        let filter_ctx = FilterContext {
            actor_roles: modal.member.as_ref().map(|member| role_ids(&member.roles)),
            ..FilterContext::default()
        };
        self.dispatch(event, guild, filter_ctx).await;
    }

    async fn handle_reaction(&self, ctx: &SerenityContext, reaction: Reaction, added: bool) {
        let Some(guild_id) = reaction.guild_id else {
            return;
        };
        let user = match (reaction.member.as_ref(), reaction.user_id) {
            (Some(member), _) => event_user(&member.user),
            (None, Some(user_id)) if !added => user_by_id(&ctx.cache, user_id),
            _ => return,
        };
        if user.bot {
            return;
        }

        let (emoji, emoji_id) = match &reaction.emoji {
            ReactionType::Custom { id, name, .. } => (name.clone(), Some(id.to_string())),
            ReactionType::Unicode(name) => (Some(name.clone()), None),
            _ => (None, None),
        };

        let (guild, channel) = event_channel(&ctx.cache, guild_id, reaction.channel_id);
        let event = events::reaction_event(
            &guild_id.to_string(),
            &user,
            &channel,
            &reaction.message_id.to_string(),
            (emoji.as_deref(), emoji_id.as_deref()),
            added,
        );
        let filter_ctx = FilterContext {
            actor_roles: reaction.member.as_ref().map(|member| role_ids(&member.roles)),
            ..FilterContext::default()
        };
        self.dispatch(event, guild, filter_ctx).await;
    }

    async fn channel_created(&self, ctx: &SerenityContext, channel: &GuildChannel) {
        let event = events::channel_create_event(&channel.guild_id.to_string(), &channel_info(channel));
        self.dispatch_plain(ctx, channel.guild_id, Some(event)).await;
    }

    async fn channel_deleted(&self, ctx: &SerenityContext, channel: &GuildChannel) {
        let event = events::channel_delete_event(&channel.guild_id.to_string(), &channel_info(channel));
        self.dispatch_plain(ctx, channel.guild_id, Some(event)).await;
    }
}

#[serenity::async_trait]
impl SerenityEventHandler for GatewayHandler {
    async fn ready(&self, ctx: SerenityContext, ready: Ready) {
        info!(
            "discord gateway ready as {} ({})",
            ready.user.name, ready.user.id
        );
        if let Some(sender) = self.ready_sender.lock().await.take() {
            let _ = sender.send(());
        }
        if let Some(sender) = self.http_sender.lock().await.take() {
            let _ = sender.send(ctx.http);
        }
    }

    async fn guild_create(&self, _ctx: SerenityContext, guild: Guild, _is_new: Option<bool>) {
        self.assets.lock().await.insert(
            guild.id,
            GuildAssets {
                emojis: Some(emoji_infos(&guild.emojis)),
                stickers: Some(sticker_infos(&guild.stickers)),
            },
        );
    }

    async fn guild_member_addition(&self, ctx: SerenityContext, new_member: Member) {
        let (guild, _) = cached_names(&ctx.cache, new_member.guild_id, None);
        let (event, filter_ctx) = events::member_join_event(
            &new_member.guild_id.to_string(),
            &event_user(&new_member.user),
            &role_ids(&new_member.roles),
            new_member.joined_at.map(|at| to_datetime(at.unix_timestamp())),
            Utc::now(),
        );
        self.dispatch(event, guild, filter_ctx).await;
    }

    async fn guild_member_removal(
        &self,
        ctx: SerenityContext,
        guild_id: GuildId,
        user: User,
        member_data_if_available: Option<Member>,
    ) {
        let (guild, _) = cached_names(&ctx.cache, guild_id, None);
        let roles = member_data_if_available
            .as_ref()
            .map(|member| role_ids(&member.roles));
        let joined_at = member_data_if_available
            .as_ref()
            .and_then(|member| member.joined_at)
            .map(|at| to_datetime(at.unix_timestamp()));
        let event = events::member_leave_event(
            &guild_id.to_string(),
            &event_user(&user),
            roles.as_deref(),
            joined_at,
        );
        let filter_ctx = FilterContext {
            actor_roles: roles,
            ..FilterContext::default()
        };
        self.dispatch(event, guild, filter_ctx).await;
    }

    async fn guild_member_update(
        &self,
        ctx: SerenityContext,
        old_if_available: Option<Member>,
        _new: Option<Member>,
        event: GuildMemberUpdateEvent,
    ) {
        let guild_id = event.guild_id;
        let guild_key = guild_id.to_string();
        let member = event_user(&event.user);
        let new_roles = role_ids(&event.roles);
        let now = Utc::now();

        let mut updates = Vec::new();
        let old_timeout = old_if_available
            .as_ref()
            .and_then(|old| old.communication_disabled_until)
            .map(|at| to_datetime(at.unix_timestamp()));
        let new_timeout = event
            .communication_disabled_until
            .map(|at| to_datetime(at.unix_timestamp()));
        updates.extend(events::timeout_event(&guild_key, &member, old_timeout, new_timeout, now));

        if let Some(old) = old_if_available.as_ref() {
            updates.extend(events::nickname_event(
                &guild_key,
                &member,
                old.nick.as_deref(),
                event.nick.as_deref(),
            ));
            updates.extend(events::member_role_events(
                &guild_key,
                &member,
                &role_ids(&old.roles),
                &new_roles,
                &cached_role_names(&ctx.cache, guild_id),
            ));
        }

        let (guild, _) = cached_names(&ctx.cache, guild_id, None);
        let filter_ctx = FilterContext {
            target_roles: Some(new_roles),
            ..FilterContext::default()
        };
        self.dispatch_all(updates, guild, filter_ctx).await;
    }

    async fn guild_ban_addition(&self, ctx: SerenityContext, guild_id: GuildId, banned_user: User) {
        let event = events::ban_event(&guild_id.to_string(), &event_user(&banned_user), true);
        self.dispatch_plain(&ctx, guild_id, Some(event)).await;
    }

    async fn guild_ban_removal(&self, ctx: SerenityContext, guild_id: GuildId, unbanned_user: User) {
        let event = events::ban_event(&guild_id.to_string(), &event_user(&unbanned_user), false);
        self.dispatch_plain(&ctx, guild_id, Some(event)).await;
    }

    async fn guild_audit_log_entry_create(
        &self,
        ctx: SerenityContext,
        entry: AuditLogEntry,
        guild_id: GuildId,
    ) {
        if !matches!(entry.action, AuditAction::Member(MemberAction::Kick)) {
            return;
        }
        let target_id = entry.target_id.map(|id| id.to_string());
        let event = events::kick_event(
            &guild_id.to_string(),
            &entry.user_id.to_string(),
            target_id.as_deref(),
            entry.reason.as_deref(),
        );
        self.dispatch_plain(&ctx, guild_id, Some(event)).await;
    }

    async fn message(&self, ctx: SerenityContext, new_message: SerenityMessage) {
        let Some(guild_id) = new_message.guild_id else {
            return;
        };

        let (guild, channel) = event_channel(&ctx.cache, guild_id, new_message.channel_id);
        let event = events::message_create_event(
            &guild_id.to_string(),
            &event_user(&new_message.author),
            &channel,
            &message_summary(&new_message),
        );
        let filter_ctx = FilterContext {
            actor_roles: new_message
                .member
                .as_ref()
                .map(|member| role_ids(&member.roles)),
            ..FilterContext::default()
        };
        self.dispatch(event, guild, filter_ctx).await;
    }

    async fn message_update(
        &self,
        ctx: SerenityContext,
        old_if_available: Option<SerenityMessage>,
        new: Option<SerenityMessage>,
        event: MessageUpdateEvent,
    ) {
        let (Some(guild_id), Some(content)) = (event.guild_id, event.content.as_deref()) else {
            return;
        };
        let Some(author) = event
            .author
            .as_ref()
            .or_else(|| new.as_ref().map(|message| &message.author))
        else {
            return;
        };

        let (guild, channel) = event_channel(&ctx.cache, guild_id, event.channel_id);
        let updated = events::message_update_event(
            &guild_id.to_string(),
            &event_user(author),
            &channel,
            &event.id.to_string(),
            old_if_available.as_ref().map(|old| old.content.as_str()),
            content,
        );
        if let Some(updated) = updated {
            self.dispatch(updated, guild, FilterContext::default()).await;
        }
    }

    async fn message_delete(
        &self,
        ctx: SerenityContext,
        channel_id: ChannelId,
        deleted_message_id: MessageId,
        guild_id: Option<GuildId>,
    ) {
        let Some(guild_id) = guild_id else {
            return;
        };

        let (guild, channel) = event_channel(&ctx.cache, guild_id, channel_id);
        let event = events::message_delete_event(
            &guild_id.to_string(),
            &channel,
            &deleted_message_id.to_string(),
        );
        self.dispatch(event, guild, FilterContext::default()).await;
    }

    async fn message_delete_bulk(
        &self,
        ctx: SerenityContext,
        channel_id: ChannelId,
        multiple_deleted_messages_ids: Vec<MessageId>,
        guild_id: Option<GuildId>,
    ) {
        let Some(guild_id) = guild_id else {
            return;
        };

        let (guild, channel) = event_channel(&ctx.cache, guild_id, channel_id);
        let event = events::message_bulk_delete_event(
            &guild_id.to_string(),
            &channel,
            multiple_deleted_messages_ids.len(),
        );
        self.dispatch(event, guild, FilterContext::default()).await;
    }

    async fn voice_state_update(&self, ctx: SerenityContext, old: Option<VoiceState>, new: VoiceState) {
        let Some(guild_id) = new.guild_id else {
            return;
        };
        let user = match new.member.as_ref() {
            Some(member) => event_user(&member.user),
            None => user_by_id(&ctx.cache, new.user_id),
        };

        let old_snapshot = old
            .as_ref()
            .map(|state| voice_snapshot(&ctx.cache, guild_id, state));
        let new_snapshot = voice_snapshot(&ctx.cache, guild_id, &new);
        let updates = events::voice_events(
            &guild_id.to_string(),
            &user,
            old_snapshot.as_ref(),
            &new_snapshot,
        );

        let (guild, _) = cached_names(&ctx.cache, guild_id, None);
        let filter_ctx = FilterContext {
            actor_roles: new.member.as_ref().map(|member| role_ids(&member.roles)),
            ..FilterContext::default()
        };
        self.dispatch_all(updates, guild, filter_ctx).await;
    }

    async fn channel_create(&self, ctx: SerenityContext, channel: GuildChannel) {
        self.channel_created(&ctx, &channel).await;
    }

    async fn category_create(&self, ctx: SerenityContext, category: GuildChannel) {
        self.channel_created(&ctx, &category).await;
    }

    async fn channel_delete(
        &self,
        ctx: SerenityContext,
        channel: GuildChannel,
        _messages: Option<Vec<SerenityMessage>>,
    ) {
        self.channel_deleted(&ctx, &channel).await;
    }

    async fn category_delete(&self, ctx: SerenityContext, category: GuildChannel) {
        self.channel_deleted(&ctx, &category).await;
    }

    async fn channel_update(&self, ctx: SerenityContext, old: Option<GuildChannel>, new: GuildChannel) {
        let Some(old) = old else {
            return;
        };
        let event = events::channel_update_event(&new.guild_id.to_string(), &old.name, &channel_info(&new));
        self.dispatch_plain(&ctx, new.guild_id, event).await;
    }

    async fn channel_pins_update(&self, ctx: SerenityContext, pin: ChannelPinsUpdateEvent) {
        let Some(guild_id) = pin.guild_id else {
            return;
        };
        let (guild, channel) = event_channel(&ctx.cache, guild_id, pin.channel_id);
        let event = events::channel_pins_update_event(
            &guild_id.to_string(),
            &channel,
            pin.last_pin_timestamp.map(|at| to_datetime(at.unix_timestamp())),
        );
        self.dispatch(event, guild, FilterContext::default()).await;
    }

    async fn guild_role_create(&self, ctx: SerenityContext, new: Role) {
        let event = events::role_create_event(&new.guild_id.to_string(), &role_info(&new));
        self.dispatch_plain(&ctx, new.guild_id, Some(event)).await;
    }

    async fn guild_role_delete(
        &self,
        ctx: SerenityContext,
        guild_id: GuildId,
        removed_role_id: RoleId,
        removed_role_data_if_available: Option<Role>,
    ) {
        let event = events::role_delete_event(
            &guild_id.to_string(),
            &removed_role_id.to_string(),
            removed_role_data_if_available.as_ref().map(|role| role.name.as_str()),
        );
        self.dispatch_plain(&ctx, guild_id, Some(event)).await;
    }

    async fn guild_role_update(&self, ctx: SerenityContext, old_data_if_available: Option<Role>, new: Role) {
        let old = old_data_if_available.as_ref().map(role_info);
        let event = events::role_update_event(&new.guild_id.to_string(), old.as_ref(), &role_info(&new));
        self.dispatch_plain(&ctx, new.guild_id, Some(event)).await;
    }

    async fn guild_update(
        &self,
        ctx: SerenityContext,
        old_data_if_available: Option<Guild>,
        new_data: PartialGuild,
    ) {
        let Some(old) = old_data_if_available else {
            return;
        };
        let event = events::guild_update_event(&new_data.id.to_string(), &old.name, &new_data.name);
        self.dispatch_plain(&ctx, new_data.id, event).await;
    }

    async fn guild_emojis_update(
        &self,
        ctx: SerenityContext,
        guild_id: GuildId,
        current_state: HashMap<EmojiId, Emoji>,
    ) {
        let current = emoji_infos(&current_state);
        let previous = {
            let mut assets = self.assets.lock().await;
            assets.entry(guild_id).or_default().emojis.replace(current.clone())
        };
        let Some(previous) = previous else {
            debug!("no emoji snapshot for guild {guild_id}, storing current state");
            return;
        };

        let (guild, _) = cached_names(&ctx.cache, guild_id, None);
        let updates = events::emoji_events(&guild_id.to_string(), &previous, &current);
        self.dispatch_all(updates, guild, FilterContext::default()).await;
    }

    async fn guild_stickers_update(
        &self,
        ctx: SerenityContext,
        guild_id: GuildId,
        current_state: HashMap<StickerId, Sticker>,
    ) {
        let current = sticker_infos(&current_state);
        let previous = {
            let mut assets = self.assets.lock().await;
            assets.entry(guild_id).or_default().stickers.replace(current.clone())
        };
        let Some(previous) = previous else {
            debug!("no sticker snapshot for guild {guild_id}, storing current state");
            return;
        };

        let (guild, _) = cached_names(&ctx.cache, guild_id, None);
        let updates = events::sticker_events(&guild_id.to_string(), &previous, &current);
        self.dispatch_all(updates, guild, FilterContext::default()).await;
    }

    async fn invite_create(&self, ctx: SerenityContext, data: InviteCreateEvent) {
        let Some(guild_id) = data.guild_id else {
            return;
        };
        let (guild, channel) = event_channel(&ctx.cache, guild_id, data.channel_id);
        let inviter = data.inviter.as_ref().map(event_user);
        let invite = InviteInfo {
            code: data.code.clone(),
            max_uses: u64::from(data.max_uses),
            max_age: u64::from(data.max_age),
        };
        let event = events::invite_create_event(&guild_id.to_string(), inviter.as_ref(), &channel, &invite);
        self.dispatch(event, guild, FilterContext::default()).await;
    }

    async fn invite_delete(&self, ctx: SerenityContext, data: InviteDeleteEvent) {
        let Some(guild_id) = data.guild_id else {
            return;
        };
        let (guild, channel) = event_channel(&ctx.cache, guild_id, data.channel_id);
        let event = events::invite_delete_event(&guild_id.to_string(), &channel, &data.code);
        self.dispatch(event, guild, FilterContext::default()).await;
    }

    async fn thread_create(&self, ctx: SerenityContext, thread: GuildChannel) {
        let owner_id = thread.owner_id.map(|id| id.to_string());
        let event = events::thread_create_event(
            &thread.guild_id.to_string(),
            &channel_info(&thread),
            owner_id.as_deref(),
        );
        self.dispatch_plain(&ctx, thread.guild_id, Some(event)).await;
    }

    async fn thread_update(&self, ctx: SerenityContext, old: Option<GuildChannel>, new: GuildChannel) {
        let Some(old) = old else {
            return;
        };
        let archived = |thread: &GuildChannel| {
            thread
                .thread_metadata
                .map(|metadata| metadata.archived)
                .unwrap_or(false)
        };
        let event = events::thread_update_event(
            &new.guild_id.to_string(),
            (&old.name, archived(&old)),
            &channel_info(&new),
            archived(&new),
        );
        self.dispatch_plain(&ctx, new.guild_id, event).await;
    }

    async fn thread_delete(
        &self,
        ctx: SerenityContext,
        thread: PartialGuildChannel,
        full_thread_data: Option<GuildChannel>,
    ) {
        let channel = EventChannel {
            id: thread.id.to_string(),
            name: full_thread_data.map(|full| full.name),
        };
        let event = events::thread_delete_event(
            &thread.guild_id.to_string(),
            &channel,
            &thread.parent_id.to_string(),
        );
        self.dispatch_plain(&ctx, thread.guild_id, Some(event)).await;
    }

    async fn thread_members_update(&self, ctx: SerenityContext, thread_members_update: ThreadMembersUpdateEvent) {
        let guild_id = thread_members_update.guild_id;
        let (guild, channel) = event_channel(&ctx.cache, guild_id, thread_members_update.id);
        let added: Vec<String> = thread_members_update
            .added_members
            .iter()
            .map(|member| member.user_id.to_string())
            .collect();
        let removed: Vec<String> = thread_members_update
            .removed_member_ids
            .iter()
            .map(ToString::to_string)
            .collect();
        let updates = events::thread_member_events(&guild_id.to_string(), &channel, &added, &removed);
        self.dispatch_all(updates, guild, FilterContext::default()).await;
    }

    async fn reaction_add(&self, ctx: SerenityContext, add_reaction: Reaction) {
        self.handle_reaction(&ctx, add_reaction, true).await;
    }

    async fn reaction_remove(&self, ctx: SerenityContext, removed_reaction: Reaction) {
        self.handle_reaction(&ctx, removed_reaction, false).await;
    }

    async fn reaction_remove_all(
        &self,
        ctx: SerenityContext,
        channel_id: ChannelId,
        removed_from_message_id: MessageId,
    ) {
        let Some(guild_id) = ctx.cache.channel(channel_id).map(|channel| channel.guild_id) else {
            return;
        };
        let (guild, channel) = event_channel(&ctx.cache, guild_id, channel_id);
        let event = events::reaction_remove_all_event(
            &guild_id.to_string(),
            &channel,
            &removed_from_message_id.to_string(),
        );
        self.dispatch(event, guild, FilterContext::default()).await;
    }

    async fn interaction_create(&self, ctx: SerenityContext, interaction: Interaction) {
        match interaction {
            Interaction::Command(command) => self.handle_command(&ctx, command).await,
            Interaction::Component(component) => self.handle_component(&ctx, component).await,
            Interaction::Modal(modal) => self.handle_modal(&ctx, modal).await,
            _ => {}
        }
    }
}
