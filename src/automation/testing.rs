//! In-memory collaborators for engine tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::Value;

use super::actions::{ActionExecutor, ExecutorSettings};
use super::model::{ActionSpec, Automation, Event, ExecutionLog};
use super::runner::AutomationSource;
use crate::db::DatabaseError;
use crate::discord::api::{
    ApiResult, ChannelHandle, ChannelMessage, DiscordApi, DiscordApiError, GuildHandle,
    MemberHandle, OutgoingMessage,
};

/// A mutating call received by [`FakeDiscord`].
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    AddRole { user_id: String, role_id: String },
    RemoveRole { user_id: String, role_id: String },
    Kick { user_id: String, reason: String },
    Ban { user_id: String, reason: String, delete_message_seconds: u32 },
    Timeout { user_id: String, duration_ms: u64, reason: String },
    Send { channel_id: String, message: OutgoingMessage },
    BulkDelete { channel_id: String, message_ids: Vec<String> },
    DeleteMessage { channel_id: String, message_id: String },
    CreateThread { channel_id: String, name: String, auto_archive_minutes: u16 },
}

struct FakeChannel {
    guild_id: String,
    text_based: bool,
    messages: Vec<ChannelMessage>,
}

#[derive(Default)]
pub struct FakeDiscord {
    guilds: HashMap<String, String>,
    channels: Vec<(String, FakeChannel)>,
    members: HashSet<(String, String)>,
    failing: HashSet<&'static str>,
    calls: Mutex<Vec<Call>>,
}

impl FakeDiscord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_guild(mut self, id: &str, name: &str) -> Self {
        self.guilds.insert(id.to_string(), name.to_string());
        self
    }

    pub fn with_text_channel(mut self, guild_id: &str, id: &str, messages: Vec<ChannelMessage>) -> Self {
        self.channels.push((
            id.to_string(),
            FakeChannel {
                guild_id: guild_id.to_string(),
                text_based: true,
                messages,
            },
        ));
        self
    }

    pub fn with_voice_channel(mut self, guild_id: &str, id: &str) -> Self {
        self.channels.push((
            id.to_string(),
            FakeChannel {
                guild_id: guild_id.to_string(),
                text_based: false,
                messages: Vec::new(),
            },
        ));
        self
    }

    pub fn with_member(mut self, guild_id: &str, user_id: &str) -> Self {
        self.members.insert((guild_id.to_string(), user_id.to_string()));
        self
    }

    /// Makes the named mutating operation record its call and then fail.
    pub fn failing(mut self, operation: &'static str) -> Self {
        self.failing.insert(operation);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, operation: &'static str, call: Call) -> ApiResult<()> {
        self.calls.lock().unwrap().push(call);
        if self.failing.contains(operation) {
            return Err(DiscordApiError::Request(format!("{operation} failed")));
        }
        Ok(())
    }

    fn channel(&self, id: &str) -> Option<&FakeChannel> {
        self.channels
            .iter()
            .find(|(channel_id, _)| channel_id == id)
            .map(|(_, channel)| channel)
    }
}

#[async_trait]
impl DiscordApi for FakeDiscord {
    async fn fetch_guild(&self, guild_id: &str) -> ApiResult<Option<GuildHandle>> {
        Ok(self.guilds.get(guild_id).map(|name| GuildHandle {
            id: guild_id.to_string(),
            name: name.clone(),
        }))
    }

    async fn guild_text_channels(&self, guild_id: &str) -> ApiResult<Vec<String>> {
        Ok(self
            .channels
            .iter()
            .filter(|(_, channel)| channel.guild_id == guild_id && channel.text_based)
            .map(|(id, _)| id.clone())
            .collect())
    }

    async fn fetch_channel(&self, channel_id: &str) -> ApiResult<Option<ChannelHandle>> {
        Ok(self.channel(channel_id).map(|channel| ChannelHandle {
            id: channel_id.to_string(),
            guild_id: Some(channel.guild_id.clone()),
            text_based: channel.text_based,
        }))
    }

    async fn fetch_member(&self, guild_id: &str, user_id: &str) -> ApiResult<Option<MemberHandle>> {
        let key = (guild_id.to_string(), user_id.to_string());
        Ok(self.members.contains(&key).then(|| MemberHandle {
            guild_id: guild_id.to_string(),
            user_id: user_id.to_string(),
            roles: Vec::new(),
        }))
    }

    async fn add_role(&self, member: &MemberHandle, role_id: &str) -> ApiResult<()> {
        self.record(
            "add_role",
            Call::AddRole {
                user_id: member.user_id.clone(),
                role_id: role_id.to_string(),
            },
        )
    }

    async fn remove_role(&self, member: &MemberHandle, role_id: &str) -> ApiResult<()> {
        self.record(
            "remove_role",
            Call::RemoveRole {
                user_id: member.user_id.clone(),
                role_id: role_id.to_string(),
            },
        )
    }

    async fn kick(&self, member: &MemberHandle, reason: &str) -> ApiResult<()> {
        self.record(
            "kick",
            Call::Kick {
                user_id: member.user_id.clone(),
                reason: reason.to_string(),
            },
        )
    }

    async fn ban(
        &self,
        _guild_id: &str,
        user_id: &str,
        reason: &str,
        delete_message_seconds: u32,
    ) -> ApiResult<()> {
        self.record(
            "ban",
            Call::Ban {
                user_id: user_id.to_string(),
                reason: reason.to_string(),
                delete_message_seconds,
            },
        )
    }

    async fn timeout(&self, member: &MemberHandle, duration_ms: u64, reason: &str) -> ApiResult<()> {
        self.record(
            "timeout",
            Call::Timeout {
                user_id: member.user_id.clone(),
                duration_ms,
                reason: reason.to_string(),
            },
        )
    }

    async fn send_message(&self, channel_id: &str, message: OutgoingMessage) -> ApiResult<String> {
        self.record(
            "send_message",
            Call::Send {
                channel_id: channel_id.to_string(),
                message,
            },
        )?;
        Ok(format!("message-{}", self.calls.lock().unwrap().len()))
    }

    async fn fetch_messages(&self, channel_id: &str, limit: u8) -> ApiResult<Vec<ChannelMessage>> {
        if self.failing.contains("fetch_messages") {
            return Err(DiscordApiError::Request("fetch_messages failed".into()));
        }
        Ok(self
            .channel(channel_id)
            .map(|channel| channel.messages.iter().take(limit as usize).cloned().collect())
            .unwrap_or_default())
    }

    async fn bulk_delete(&self, channel_id: &str, message_ids: &[String]) -> ApiResult<()> {
        self.record(
            "bulk_delete",
            Call::BulkDelete {
                channel_id: channel_id.to_string(),
                message_ids: message_ids.to_vec(),
            },
        )
    }

    async fn delete_message(&self, channel_id: &str, message_id: &str) -> ApiResult<()> {
        self.record(
            "delete_message",
            Call::DeleteMessage {
                channel_id: channel_id.to_string(),
                message_id: message_id.to_string(),
            },
        )
    }

    async fn create_thread(
        &self,
        channel_id: &str,
        name: &str,
        auto_archive_minutes: u16,
    ) -> ApiResult<String> {
        self.record(
            "create_thread",
            Call::CreateThread {
                channel_id: channel_id.to_string(),
                name: name.to_string(),
                auto_archive_minutes,
            },
        )?;
        Ok("thread-1".to_string())
    }
}

/// A message by `author_id` posted `age_days` ago.
pub fn message(id: &str, author_id: &str, age_days: i64, pinned: bool) -> ChannelMessage {
    ChannelMessage {
        id: id.to_string(),
        author_id: author_id.to_string(),
        created_at: Utc::now() - ChronoDuration::days(age_days),
        pinned,
    }
}

/// Executor without delete pacing.
pub fn executor(discord: Arc<dyn DiscordApi>) -> ActionExecutor {
    executor_with(
        discord,
        ExecutorSettings {
            delete_pacing: Duration::ZERO,
            ..ExecutorSettings::default()
        },
    )
}

pub fn executor_with(discord: Arc<dyn DiscordApi>, settings: ExecutorSettings) -> ActionExecutor {
    ActionExecutor::new(discord, settings)
}

pub fn automation_with(actions: Vec<ActionSpec>) -> Automation {
    stored_automation(1, &["MEMBER_JOIN"], Value::Object(Default::default()), actions)
}

pub fn stored_automation(
    id: i64,
    trigger_events: &[&str],
    trigger_filters: Value,
    actions: Vec<ActionSpec>,
) -> Automation {
    Automation {
        id,
        guild_id: "G".to_string(),
        name: "test automation".to_string(),
        enabled: true,
        trigger_events: trigger_events.iter().map(|event| event.to_string()).collect(),
        trigger_filters: trigger_filters.as_object().cloned().unwrap_or_default(),
        actions,
        created_by: None,
        trigger_count: 0,
        last_triggered_at: None,
    }
}

#[derive(Default)]
pub struct MemorySource {
    automations: Vec<Automation>,
    fail_fetch: bool,
    fail_logs: bool,
    fail_event_log: bool,
    logs: Mutex<Vec<ExecutionLog>>,
    events: Mutex<Vec<Event>>,
}

impl MemorySource {
    pub fn new(automations: Vec<Automation>) -> Self {
        Self {
            automations,
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_fetch: true,
            ..Self::default()
        }
    }

    pub fn with_failing_logs(mut self) -> Self {
        self.fail_logs = true;
        self
    }

    pub fn with_failing_event_log(mut self) -> Self {
        self.fail_event_log = true;
        self
    }

    pub fn logs(&self) -> Vec<ExecutionLog> {
        self.logs.lock().unwrap().clone()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl AutomationSource for MemorySource {
    async fn triggered_automations(
        &self,
        guild_id: &str,
        event_type: &str,
    ) -> Result<Vec<Automation>, DatabaseError> {
        if self.fail_fetch {
            return Err(DatabaseError::Query("connection reset".to_string()));
        }
        Ok(self
            .automations
            .iter()
            .filter(|automation| {
                automation.enabled
                    && automation.guild_id == guild_id
                    && automation.trigger_events.iter().any(|event| event == event_type)
            })
            .cloned()
            .collect())
    }

    async fn log_execution(&self, log: &ExecutionLog) -> Result<(), DatabaseError> {
        if self.fail_logs {
            return Err(DatabaseError::Query("disk full".to_string()));
        }
        self.logs.lock().unwrap().push(log.clone());
        Ok(())
    }

    async fn record_event(&self, event: &Event) -> Result<(), DatabaseError> {
        if self.fail_event_log {
            return Err(DatabaseError::Query("event log unavailable".to_string()));
        }
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}
