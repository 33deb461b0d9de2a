use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error};

use crate::discord::api::{DiscordApi, DiscordApiError};

use super::model::{ActionResult, ActionSpec, Automation, Event};

mod channels;
pub mod config;
mod members;
mod messages;

pub use self::config::{ActionConfig, ChannelSelection, PurgeConfig};

pub const DEFAULT_EMBED_COLOR: u32 = 0x5865F2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionType {
    DeleteUserMessages,
    DeleteMessages,
    SendMessage,
    AddRole,
    RemoveRole,
    KickMember,
    BanMember,
    TimeoutMember,
    LogToChannel,
    CreateThread,
}

impl ActionType {
    pub const ALL: [ActionType; 10] = [
        Self::DeleteUserMessages,
        Self::DeleteMessages,
        Self::SendMessage,
        Self::AddRole,
        Self::RemoveRole,
        Self::KickMember,
        Self::BanMember,
        Self::TimeoutMember,
        Self::LogToChannel,
        Self::CreateThread,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::DeleteUserMessages => "DELETE_USER_MESSAGES",
            Self::DeleteMessages => "DELETE_MESSAGES",
            Self::SendMessage => "SEND_MESSAGE",
            Self::AddRole => "ADD_ROLE",
            Self::RemoveRole => "REMOVE_ROLE",
            Self::KickMember => "KICK_MEMBER",
            Self::BanMember => "BAN_MEMBER",
            Self::TimeoutMember => "TIMEOUT_MEMBER",
            Self::LogToChannel => "LOG_TO_CHANNEL",
            Self::CreateThread => "CREATE_THREAD",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = ActionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == value)
            .ok_or_else(|| ActionError::UnknownActionType(value.to_string()))
    }
}

/// Why an action did not complete. The display text is what lands in the
/// execution log.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("Unknown action type: {0}")]
    UnknownActionType(String),

    #[error("Missing user ID")]
    MissingUserId,

    #[error("Missing role or user ID")]
    MissingRoleOrUserId,

    #[error("Missing channel or content")]
    MissingChannelOrContent,

    #[error("Missing channel ID")]
    MissingChannelId,

    #[error("Missing channel or thread name")]
    MissingChannelOrThreadName,

    #[error("Guild not found")]
    GuildNotFound,

    #[error("Channel not found")]
    ChannelNotFound,

    #[error("Channel not found or not text-based")]
    ChannelNotTextBased,

    #[error("Member not found")]
    MemberNotFound,

    #[error(transparent)]
    Discord(#[from] DiscordApiError),
}

#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    /// Pause between individual (non-bulk) message deletions.
    pub delete_pacing: Duration,
    /// Messages fetched per channel when purging, at most 100.
    pub message_fetch_limit: u8,
    pub embed_color: u32,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            delete_pacing: Duration::from_millis(500),
            message_fetch_limit: 100,
            embed_color: DEFAULT_EMBED_COLOR,
        }
    }
}

/// Runs single actions against Discord.
///
/// `execute` never fails: every error, including upstream Discord errors,
/// is folded into an unsuccessful [`ActionResult`].
#[derive(Clone)]
pub struct ActionExecutor {
    discord: Arc<dyn DiscordApi>,
    settings: ExecutorSettings,
}

impl ActionExecutor {
    pub fn new(discord: Arc<dyn DiscordApi>, settings: ExecutorSettings) -> Self {
        Self { discord, settings }
    }

    pub fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    pub async fn execute(
        &self,
        automation: &Automation,
        spec: &ActionSpec,
        event: &Event,
        context: &Value,
    ) -> ActionResult {
        match self.try_execute(automation, spec, event, context).await {
            Ok(result) => {
                debug!(
                    automation_id = automation.id,
                    action_type = %spec.action_type,
                    "action succeeded"
                );
                ActionResult::ok(result)
            }
            Err(err) => {
                if let ActionError::Discord(inner) = &err {
                    error!(
                        automation_id = automation.id,
                        action_type = %spec.action_type,
                        "action execution error: {inner}"
                    );
                }
                ActionResult::failed(err.to_string())
            }
        }
    }

    async fn try_execute(
        &self,
        automation: &Automation,
        spec: &ActionSpec,
        event: &Event,
        context: &Value,
    ) -> Result<Value, ActionError> {
        let kind: ActionType = spec.action_type.parse()?;
        let config = ActionConfig::resolve(kind, &spec.config, event, context);
        let guild_id = event.guild_id.as_str();

        match config {
            ActionConfig::DeleteUserMessages(purge) | ActionConfig::DeleteMessages(purge) => {
                self.purge_messages(guild_id, &purge).await
            }
            ActionConfig::SendMessage {
                channel_id,
                content,
                embed,
            } => self.send_message(channel_id, content, embed).await,
            ActionConfig::AddRole { user_id, role_id } => {
                self.add_role(guild_id, user_id, role_id).await
            }
            ActionConfig::RemoveRole { user_id, role_id } => {
                self.remove_role(guild_id, user_id, role_id).await
            }
            ActionConfig::KickMember { user_id, reason } => {
                self.kick_member(guild_id, user_id, &reason).await
            }
            ActionConfig::BanMember {
                user_id,
                reason,
                delete_days,
            } => self.ban_member(guild_id, user_id, &reason, delete_days).await,
            ActionConfig::TimeoutMember {
                user_id,
                duration_minutes,
                reason,
            } => {
                self.timeout_member(guild_id, user_id, duration_minutes, &reason)
                    .await
            }
            ActionConfig::LogToChannel {
                channel_id,
                content,
                include_details,
            } => {
                self.log_to_channel(automation, event, channel_id, content, include_details)
                    .await
            }
            ActionConfig::CreateThread {
                channel_id,
                thread_name,
                auto_archive_minutes,
            } => {
                self.create_thread(channel_id, thread_name, auto_archive_minutes)
                    .await
            }
        }
    }
}
