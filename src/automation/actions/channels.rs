use chrono::Utc;
use serde_json::{Value, json};

use super::{ActionError, ActionExecutor};
use crate::automation::model::{Automation, Event, value_to_plain_string};
use crate::discord::api::{ChannelHandle, OutgoingMessage};
use crate::discord::embed::{DiscordEmbed, EMBED_FIELD_VALUE_LIMIT, truncate_chars};

const THREAD_NAME_LIMIT: usize = 100;

impl ActionExecutor {
    pub(super) async fn send_message(
        &self,
        channel_id: Option<String>,
        content: Option<String>,
        embed: bool,
    ) -> Result<Value, ActionError> {
        let (Some(channel_id), Some(content)) = (channel_id, content) else {
            return Err(ActionError::MissingChannelOrContent);
        };
        self.channel(&channel_id).await?;

        let message = if embed {
            OutgoingMessage::Embeds(vec![
                DiscordEmbed::new()
                    .description(content)
                    .color(self.settings.embed_color)
                    .timestamp(Utc::now()),
            ])
        } else {
            OutgoingMessage::Text(content)
        };
        self.discord.send_message(&channel_id, message).await?;
        Ok(json!({ "sent": true }))
    }

    pub(super) async fn log_to_channel(
        &self,
        automation: &Automation,
        event: &Event,
        channel_id: Option<String>,
        content: Option<String>,
        include_details: bool,
    ) -> Result<Value, ActionError> {
        let channel_id = channel_id.ok_or(ActionError::MissingChannelId)?;
        self.channel(&channel_id).await?;

        let embed = log_embed(automation, event, content, include_details, self.settings.embed_color);
        self.discord
            .send_message(&channel_id, OutgoingMessage::Embeds(vec![embed]))
            .await?;
        Ok(json!({ "logged": true }))
    }

    pub(super) async fn create_thread(
        &self,
        channel_id: Option<String>,
        thread_name: Option<String>,
        auto_archive_minutes: u16,
    ) -> Result<Value, ActionError> {
        let (Some(channel_id), Some(thread_name)) = (channel_id, thread_name) else {
            return Err(ActionError::MissingChannelOrThreadName);
        };
        self.channel(&channel_id).await?;

        let thread_id = self
            .discord
            .create_thread(
                &channel_id,
                &truncate_chars(&thread_name, THREAD_NAME_LIMIT),
                auto_archive_minutes,
            )
            .await?;
        Ok(json!({ "threadId": thread_id }))
    }

    async fn channel(&self, channel_id: &str) -> Result<ChannelHandle, ActionError> {
        self.discord
            .fetch_channel(channel_id)
            .await?
            .ok_or(ActionError::ChannelNotFound)
    }
}

fn log_embed(
    automation: &Automation,
    event: &Event,
    content: Option<String>,
    include_details: bool,
    color: u32,
) -> DiscordEmbed {
    let mut embed = DiscordEmbed::new()
        .title(format!("🤖 Automation: {}", automation.name))
        .description(content.unwrap_or_else(|| format!("Triggered by **{}**", event.event_type)))
        .color(color)
        .timestamp(Utc::now())
        .footer(format!("Automation ID: {}", automation.id));

    if let Some(actor_id) = event.actor_id.as_deref().filter(|id| !id.is_empty()) {
        let name = event.actor_name.as_deref().unwrap_or("Unknown");
        embed = embed.field("Actor", format!("<@{actor_id}> ({name})"), true);
    }
    if let Some(target_id) = event.target_id.as_deref().filter(|id| !id.is_empty()) {
        let name = event.target_name.as_deref().unwrap_or("Unknown");
        embed = embed.field("Target", format!("<@{target_id}> ({name})"), true);
    }
    if let Some(channel_id) = event.channel_id.as_deref().filter(|id| !id.is_empty()) {
        embed = embed.field("Channel", format!("<#{channel_id}>"), true);
    }

    if include_details {
        let details = details_text(event.details.as_ref());
        if !details.is_empty() {
            embed = embed.field(
                "Details",
                truncate_chars(&details, EMBED_FIELD_VALUE_LIMIT),
                false,
            );
        }
    }

    embed
}

/// `**key:** value` lines for every non-null detail.
fn details_text(details: Option<&Value>) -> String {
    let Some(Value::Object(details)) = details else {
        return String::new();
    };

    details
        .iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(key, value)| {
            let rendered = match value {
                Value::Object(_) | Value::Array(_) => value.to_string(),
                other => value_to_plain_string(other),
            };
            format!("**{key}:** {rendered}")
        })
        .collect::<Vec<_>>()
        .join("\n")
}
