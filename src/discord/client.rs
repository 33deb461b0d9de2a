use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serenity::all::{
    AutoArchiveDuration, Channel, ChannelId, ChannelType, Client as SerenityClient,
    CreateMessage, CreateThread, EditMember, GatewayIntents, GetMessages, GuildId, Http,
    MessageId, RoleId, Timestamp, UserId,
};
use serenity::http::HttpError;
use tokio::sync::{Mutex as AsyncMutex, RwLock, oneshot};
use tracing::{debug, error, info};

use super::api::{
    ApiResult, ChannelHandle, ChannelMessage, DiscordApi, DiscordApiError, GuildHandle,
    MemberHandle, OutgoingMessage,
};
use super::gateway::GatewayHandler;
use crate::automation::AutomationRunner;
use crate::config::DiscordConfig;

const INITIAL_LOGIN_RETRY_SECONDS: u64 = 2;
const MAX_LOGIN_RETRY_SECONDS: u64 = 300;
const READY_TIMEOUT: Duration = Duration::from_secs(30);
const SECONDS_PER_DAY: u32 = 86_400;

#[derive(Clone)]
pub struct DiscordClient {
    token: SecretString,
    use_privileged_intents: bool,
    login_state: Arc<AsyncMutex<DiscordLoginState>>,
    runner: Arc<RwLock<Option<Arc<AutomationRunner>>>>,
    http: Arc<RwLock<Option<Arc<Http>>>>,
}

#[derive(Default)]
struct DiscordLoginState {
    is_logged_in: bool,
    gateway_task: Option<tokio::task::JoinHandle<()>>,
}

impl DiscordClient {
    pub fn new(config: &DiscordConfig) -> Self {
        info!("initializing discord client");
        Self {
            token: SecretString::from(config.bot_token.clone()),
            use_privileged_intents: config.use_privileged_intents,
            login_state: Arc::new(AsyncMutex::new(DiscordLoginState::default())),
            runner: Arc::new(RwLock::new(None)),
            http: Arc::new(RwLock::new(None)),
        }
    }

    /// Events received before a runner is bound are dropped.
    pub async fn set_runner(&self, runner: Arc<AutomationRunner>) {
        *self.runner.write().await = Some(runner);
    }

    pub async fn login(&self) -> Result<()> {
        let mut state = self.login_state.lock().await;
        if state.is_logged_in {
            return Ok(());
        }

        let intents = if self.use_privileged_intents {
            GatewayIntents::non_privileged()
                | GatewayIntents::GUILD_MEMBERS
                | GatewayIntents::MESSAGE_CONTENT
        } else {
            GatewayIntents::non_privileged()
        };

        let (ready_tx, ready_rx) = oneshot::channel();
        let (http_tx, http_rx) = oneshot::channel();
        let handler = GatewayHandler::new(ready_tx, http_tx, self.runner.clone());

        let mut gateway_client = SerenityClient::builder(self.token.expose_secret(), intents)
            .event_handler(handler)
            .await
            .map_err(|err| anyhow!("failed to build discord gateway client: {err}"))?;

        let gateway_task = tokio::spawn(async move {
            if let Err(err) = gateway_client.start_autosharded().await {
                error!("discord gateway stopped: {err}");
            }
        });

        match tokio::time::timeout(READY_TIMEOUT, ready_rx).await {
            Ok(Ok(())) => {
                state.is_logged_in = true;
                state.gateway_task = Some(gateway_task);
                info!("discord bot login succeeded and gateway is connected");

                if let Ok(Ok(http)) = tokio::time::timeout(Duration::from_secs(5), http_rx).await {
                    *self.http.write().await = Some(http);
                }

                Ok(())
            }
            Ok(Err(_)) => {
                gateway_task.abort();
                Err(anyhow!("discord gateway exited before receiving Ready event"))
            }
            Err(_) => {
                gateway_task.abort();
                Err(anyhow!("timed out waiting for discord Ready event"))
            }
        }
    }

    pub async fn start(&self) -> Result<()> {
        let mut retry_seconds = INITIAL_LOGIN_RETRY_SECONDS;

        loop {
            match self.login().await {
                Ok(()) => {
                    info!("discord client is ready");
                    return Ok(());
                }
                Err(err) => {
                    error!(
                        "failed to start discord client: {err}. retrying in {} seconds",
                        retry_seconds
                    );
                    tokio::time::sleep(Duration::from_secs(retry_seconds)).await;
                    retry_seconds = next_retry_delay(retry_seconds);
                }
            }
        }
    }

    pub async fn stop(&self) -> Result<()> {
        let mut state = self.login_state.lock().await;
        if !state.is_logged_in {
            return Ok(());
        }

        if let Some(gateway_task) = state.gateway_task.take() {
            gateway_task.abort();
            match gateway_task.await {
                Ok(()) => info!("discord gateway task exited"),
                Err(join_err) if join_err.is_cancelled() => {
                    info!("discord gateway task aborted")
                }
                Err(join_err) => {
                    error!("discord gateway task join error: {join_err}");
                }
            }
        }

        *self.http.write().await = None;
        state.is_logged_in = false;
        info!("discord client stopped");
        Ok(())
    }

    async fn http(&self) -> ApiResult<Arc<Http>> {
        self.http
            .read()
            .await
            .clone()
            .ok_or(DiscordApiError::NotConnected)
    }
}

fn next_retry_delay(current: u64) -> u64 {
    (current * 2).min(MAX_LOGIN_RETRY_SECONDS)
}

fn parse_id(kind: &'static str, value: &str) -> ApiResult<u64> {
    value
        .parse::<u64>()
        .ok()
        .filter(|id| *id != 0)
        .ok_or_else(|| DiscordApiError::invalid_id(kind, value))
}

/// Maps Discord's 404 onto `Ok(None)`.
fn optional<T>(result: serenity::Result<T>) -> ApiResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(serenity::Error::Http(HttpError::UnsuccessfulRequest(response)))
            if response.status_code.as_u16() == 404 =>
        {
            Ok(None)
        }
        Err(err) => Err(err.into()),
    }
}

fn is_text_channel(kind: ChannelType) -> bool {
    matches!(
        kind,
        ChannelType::Text
            | ChannelType::News
            | ChannelType::PublicThread
            | ChannelType::PrivateThread
            | ChannelType::NewsThread
    )
}

fn archive_duration(minutes: u16) -> AutoArchiveDuration {
    match minutes {
        60 => AutoArchiveDuration::OneHour,
        4320 => AutoArchiveDuration::ThreeDays,
        10080 => AutoArchiveDuration::OneWeek,
        _ => AutoArchiveDuration::OneDay,
    }
}

fn timestamp_to_datetime(timestamp: Timestamp) -> DateTime<Utc> {
    DateTime::from_timestamp(timestamp.unix_timestamp(), 0).unwrap_or_else(Utc::now)
}

#[async_trait]
impl DiscordApi for DiscordClient {
    async fn fetch_guild(&self, guild_id: &str) -> ApiResult<Option<GuildHandle>> {
        let Ok(id) = parse_id("guild", guild_id) else {
            return Ok(None);
        };
        let http = self.http().await?;
        let guild = optional(http.get_guild(GuildId::new(id)).await)?;
        Ok(guild.map(|guild| GuildHandle {
            id: guild.id.to_string(),
            name: guild.name,
        }))
    }

    async fn guild_text_channels(&self, guild_id: &str) -> ApiResult<Vec<String>> {
        let id = parse_id("guild", guild_id)?;
        let http = self.http().await?;
        let mut channels: Vec<_> = GuildId::new(id)
            .channels(&http)
            .await?
            .into_values()
            .filter(|channel| matches!(channel.kind, ChannelType::Text | ChannelType::News))
            .collect();
        channels.sort_by_key(|channel| channel.position);
        Ok(channels.into_iter().map(|channel| channel.id.to_string()).collect())
    }

    async fn fetch_channel(&self, channel_id: &str) -> ApiResult<Option<ChannelHandle>> {
        let Ok(id) = parse_id("channel", channel_id) else {
            return Ok(None);
        };
        let http = self.http().await?;
        let channel = optional(http.get_channel(ChannelId::new(id)).await)?;
        Ok(channel.map(|channel| match channel {
            Channel::Guild(channel) => ChannelHandle {
                id: channel.id.to_string(),
                guild_id: Some(channel.guild_id.to_string()),
                text_based: is_text_channel(channel.kind),
            },
            Channel::Private(channel) => ChannelHandle {
                id: channel.id.to_string(),
                guild_id: None,
                text_based: true,
            },
            other => ChannelHandle {
                id: other.id().to_string(),
                guild_id: None,
                text_based: false,
            },
        }))
    }

    async fn fetch_member(&self, guild_id: &str, user_id: &str) -> ApiResult<Option<MemberHandle>> {
        let (Ok(guild), Ok(user)) = (parse_id("guild", guild_id), parse_id("user", user_id)) else {
            return Ok(None);
        };
        let http = self.http().await?;
        let member = optional(http.get_member(GuildId::new(guild), UserId::new(user)).await)?;
        Ok(member.map(|member| MemberHandle {
            guild_id: member.guild_id.to_string(),
            user_id: member.user.id.to_string(),
            roles: member.roles.iter().map(ToString::to_string).collect(),
        }))
    }

    async fn add_role(&self, member: &MemberHandle, role_id: &str) -> ApiResult<()> {
        let guild = parse_id("guild", &member.guild_id)?;
        let user = parse_id("user", &member.user_id)?;
        let role = parse_id("role", role_id)?;
        let http = self.http().await?;
        http.add_member_role(GuildId::new(guild), UserId::new(user), RoleId::new(role), None)
            .await?;
        debug!("added role {} to {} in {}", role_id, member.user_id, member.guild_id);
        Ok(())
    }

    async fn remove_role(&self, member: &MemberHandle, role_id: &str) -> ApiResult<()> {
        let guild = parse_id("guild", &member.guild_id)?;
        let user = parse_id("user", &member.user_id)?;
        let role = parse_id("role", role_id)?;
        let http = self.http().await?;
        http.remove_member_role(GuildId::new(guild), UserId::new(user), RoleId::new(role), None)
            .await?;
        debug!("removed role {} from {} in {}", role_id, member.user_id, member.guild_id);
        Ok(())
    }

    async fn kick(&self, member: &MemberHandle, reason: &str) -> ApiResult<()> {
        let guild = parse_id("guild", &member.guild_id)?;
        let user = parse_id("user", &member.user_id)?;
        let http = self.http().await?;
        http.kick_member(GuildId::new(guild), UserId::new(user), Some(reason))
            .await?;
        Ok(())
    }

    async fn ban(
        &self,
        guild_id: &str,
        user_id: &str,
        reason: &str,
        delete_message_seconds: u32,
    ) -> ApiResult<()> {
        let guild = parse_id("guild", guild_id)?;
        let user = parse_id("user", user_id)?;
        let delete_days = u8::try_from(delete_message_seconds / SECONDS_PER_DAY).unwrap_or(7);
        let http = self.http().await?;
        http.ban_user(GuildId::new(guild), UserId::new(user), delete_days, Some(reason))
            .await?;
        Ok(())
    }

    async fn timeout(&self, member: &MemberHandle, duration_ms: u64, reason: &str) -> ApiResult<()> {
        let guild = parse_id("guild", &member.guild_id)?;
        let user = parse_id("user", &member.user_id)?;
        let until = timeout_end(Utc::now(), duration_ms)?;
        let until = Timestamp::from_unix_timestamp(until.timestamp())
            .map_err(|err| DiscordApiError::Request(format!("invalid timeout end: {err}")))?;

        let http = self.http().await?;
        GuildId::new(guild)
            .edit_member(
                &http,
                UserId::new(user),
                EditMember::new()
                    .disable_communication_until_datetime(until)
                    .audit_log_reason(reason),
            )
            .await?;
        Ok(())
    }

    async fn send_message(&self, channel_id: &str, message: OutgoingMessage) -> ApiResult<String> {
        let channel = parse_id("channel", channel_id)?;
        let builder = match message {
            OutgoingMessage::Text(content) => CreateMessage::new().content(content),
            OutgoingMessage::Embeds(embeds) => CreateMessage::new()
                .embeds(embeds.iter().map(|embed| embed.to_create_embed()).collect()),
        };

        let http = self.http().await?;
        let sent = ChannelId::new(channel).send_message(&http, builder).await?;
        debug!("sent message {} to channel {}", sent.id, channel_id);
        Ok(sent.id.to_string())
    }

    async fn fetch_messages(&self, channel_id: &str, limit: u8) -> ApiResult<Vec<ChannelMessage>> {
        let channel = parse_id("channel", channel_id)?;
        let http = self.http().await?;
        let messages = ChannelId::new(channel)
            .messages(&http, GetMessages::new().limit(limit))
            .await?;
        Ok(messages
            .into_iter()
            .map(|message| ChannelMessage {
                id: message.id.to_string(),
                author_id: message.author.id.to_string(),
                created_at: timestamp_to_datetime(message.timestamp),
                pinned: message.pinned,
            })
            .collect())
    }

    async fn bulk_delete(&self, channel_id: &str, message_ids: &[String]) -> ApiResult<()> {
        let channel = parse_id("channel", channel_id)?;
        let ids = message_ids
            .iter()
            .map(|id| parse_id("message", id).map(MessageId::new))
            .collect::<ApiResult<Vec<_>>>()?;
        let http = self.http().await?;
        ChannelId::new(channel).delete_messages(&http, ids).await?;
        Ok(())
    }

    async fn delete_message(&self, channel_id: &str, message_id: &str) -> ApiResult<()> {
        let channel = parse_id("channel", channel_id)?;
        let message = parse_id("message", message_id)?;
        let http = self.http().await?;
        ChannelId::new(channel)
            .delete_message(&http, MessageId::new(message))
            .await?;
        Ok(())
    }

    async fn create_thread(
        &self,
        channel_id: &str,
        name: &str,
        auto_archive_minutes: u16,
    ) -> ApiResult<String> {
        let channel = parse_id("channel", channel_id)?;
        let http = self.http().await?;
        let thread = ChannelId::new(channel)
            .create_thread(
                &http,
                CreateThread::new(name)
                    .kind(ChannelType::PublicThread)
                    .auto_archive_duration(archive_duration(auto_archive_minutes)),
            )
            .await?;
        Ok(thread.id.to_string())
    }
}

fn timeout_end(now: DateTime<Utc>, duration_ms: u64) -> ApiResult<DateTime<Utc>> {
    i64::try_from(duration_ms)
        .ok()
        .and_then(chrono::TimeDelta::try_milliseconds)
        .and_then(|duration| now.checked_add_signed(duration))
        .ok_or_else(|| DiscordApiError::Request(format!("timeout of {duration_ms}ms is out of range")))
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;
    use crate::config::DiscordConfig;

    #[test]
    fn login_retry_doubles_up_to_five_minutes() {
        let mut delays = vec![INITIAL_LOGIN_RETRY_SECONDS];
        for _ in 0..9 {
            delays.push(next_retry_delay(*delays.last().unwrap()));
        }
        assert_eq!(delays, vec![2, 4, 8, 16, 32, 64, 128, 256, 300, 300]);
    }

    #[test_case("123", true ; "snowflake")]
    #[test_case("0", false ; "zero")]
    #[test_case("abc", false ; "not a number")]
    #[test_case("", false ; "empty")]
    fn ids_must_be_non_zero_snowflakes(value: &str, valid: bool) {
        assert_eq!(parse_id("channel", value).is_ok(), valid);
    }

    #[test]
    fn invalid_id_error_names_kind() {
        let err = parse_id("role", "x").unwrap_err();
        assert_eq!(err.to_string(), "invalid role id: x");
    }

    #[test_case(60, AutoArchiveDuration::OneHour)]
    #[test_case(1440, AutoArchiveDuration::OneDay)]
    #[test_case(4320, AutoArchiveDuration::ThreeDays)]
    #[test_case(10080, AutoArchiveDuration::OneWeek)]
    #[test_case(5, AutoArchiveDuration::OneDay)]
    fn archive_minutes_map_to_discord_durations(minutes: u16, expected: AutoArchiveDuration) {
        assert_eq!(archive_duration(minutes), expected);
    }

    #[test]
    fn timeout_end_rejects_out_of_range_durations() {
        let now = Utc::now();
        assert_eq!(
            timeout_end(now, 60_000).unwrap(),
            now + chrono::TimeDelta::minutes(1)
        );
        assert!(matches!(
            timeout_end(now, 60_000_000_000_000_000),
            Err(DiscordApiError::Request(_))
        ));
        assert!(timeout_end(now, u64::MAX).is_err());
    }

    #[test]
    fn voice_channels_are_not_text_based() {
        assert!(is_text_channel(ChannelType::Text));
        assert!(is_text_channel(ChannelType::PublicThread));
        assert!(!is_text_channel(ChannelType::Voice));
        assert!(!is_text_channel(ChannelType::Category));
    }

    #[tokio::test]
    async fn api_calls_fail_before_login() {
        let client = DiscordClient::new(&DiscordConfig {
            bot_token: "token".to_string(),
            use_privileged_intents: false,
        });

        assert!(matches!(
            client.fetch_guild("123").await,
            Err(DiscordApiError::NotConnected)
        ));
        assert!(matches!(client.fetch_channel("not-an-id").await, Ok(None)));
        assert!(matches!(
            client.delete_message("1", "x").await,
            Err(DiscordApiError::InvalidId { kind: "message", .. })
        ));
    }
}
