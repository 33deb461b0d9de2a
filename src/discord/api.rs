use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use super::embed::DiscordEmbed;

#[derive(Debug, Error)]
pub enum DiscordApiError {
    #[error("invalid {kind} id: {value}")]
    InvalidId { kind: &'static str, value: String },

    #[error("discord http client not available")]
    NotConnected,

    #[error("{0}")]
    Request(String),
}

impl DiscordApiError {
    pub fn invalid_id(kind: &'static str, value: &str) -> Self {
        Self::InvalidId {
            kind,
            value: value.to_string(),
        }
    }
}

impl From<serenity::Error> for DiscordApiError {
    fn from(err: serenity::Error) -> Self {
        Self::Request(err.to_string())
    }
}

pub type ApiResult<T> = Result<T, DiscordApiError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildHandle {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelHandle {
    pub id: String,
    pub guild_id: Option<String>,
    /// Whether messages can be read from and deleted in this channel.
    pub text_based: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberHandle {
    pub guild_id: String,
    pub user_id: String,
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMessage {
    pub id: String,
    pub author_id: String,
    pub created_at: DateTime<Utc>,
    pub pinned: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutgoingMessage {
    Text(String),
    Embeds(Vec<DiscordEmbed>),
}

/// The Discord operations automations are allowed to perform.
///
/// Fetches resolve to `Ok(None)` when the entity does not exist or is not
/// visible to the bot. Every other failure is an error.
#[async_trait]
pub trait DiscordApi: Send + Sync {
    async fn fetch_guild(&self, guild_id: &str) -> ApiResult<Option<GuildHandle>>;

    /// Ids of the guild's text-capable, non-voice channels.
    async fn guild_text_channels(&self, guild_id: &str) -> ApiResult<Vec<String>>;

    async fn fetch_channel(&self, channel_id: &str) -> ApiResult<Option<ChannelHandle>>;

    async fn fetch_member(&self, guild_id: &str, user_id: &str) -> ApiResult<Option<MemberHandle>>;

    async fn add_role(&self, member: &MemberHandle, role_id: &str) -> ApiResult<()>;

    async fn remove_role(&self, member: &MemberHandle, role_id: &str) -> ApiResult<()>;

    async fn kick(&self, member: &MemberHandle, reason: &str) -> ApiResult<()>;

    async fn ban(
        &self,
        guild_id: &str,
        user_id: &str,
        reason: &str,
        delete_message_seconds: u32,
    ) -> ApiResult<()>;

    async fn timeout(&self, member: &MemberHandle, duration_ms: u64, reason: &str) -> ApiResult<()>;

    /// Returns the id of the created message.
    async fn send_message(&self, channel_id: &str, message: OutgoingMessage) -> ApiResult<String>;

    /// Most recent messages first.
    async fn fetch_messages(&self, channel_id: &str, limit: u8) -> ApiResult<Vec<ChannelMessage>>;

    async fn bulk_delete(&self, channel_id: &str, message_ids: &[String]) -> ApiResult<()>;

    async fn delete_message(&self, channel_id: &str, message_id: &str) -> ApiResult<()>;

    /// Returns the id of the created thread.
    async fn create_thread(
        &self,
        channel_id: &str,
        name: &str,
        auto_archive_minutes: u16,
    ) -> ApiResult<String>;
}
