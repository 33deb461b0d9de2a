use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use super::config::{ChannelSelection, PurgeConfig};
use super::{ActionError, ActionExecutor};
use crate::discord::api::ChannelMessage;

/// Discord refuses to bulk delete messages older than this.
const BULK_DELETE_MAX_AGE_DAYS: i64 = 14;

impl ActionExecutor {
    pub(super) async fn purge_messages(
        &self,
        guild_id: &str,
        config: &PurgeConfig,
    ) -> Result<Value, ActionError> {
        let user_id = config.user_id.as_deref().ok_or(ActionError::MissingUserId)?;

        self.discord
            .fetch_guild(guild_id)
            .await?
            .ok_or(ActionError::GuildNotFound)?;

        let channels = match &config.channels {
            ChannelSelection::All => self.discord.guild_text_channels(guild_id).await?,
            ChannelSelection::Listed(ids) => ids.clone(),
        };

        let cutoff = config
            .max_age_days
            .and_then(|days| age_cutoff(Utc::now(), days));

        let mut total_deleted = 0usize;
        let mut channel_results = Map::new();

        for channel_id in channels {
            let remaining = match config.max_messages {
                Some(max) if total_deleted >= max => break,
                Some(max) => max - total_deleted,
                None => usize::MAX,
            };

            match self
                .purge_channel(&channel_id, user_id, cutoff, config.skip_pinned, remaining)
                .await
            {
                Ok(deleted) => {
                    total_deleted += deleted;
                    channel_results.insert(channel_id, json!({ "deleted": deleted }));
                }
                Err(err) => {
                    debug!(channel_id = %channel_id, "skipping channel: {err}");
                    channel_results.insert(channel_id, json!({ "error": err.to_string() }));
                }
            }
        }

        Ok(json!({
            "totalDeleted": total_deleted,
            "channelResults": channel_results,
        }))
    }

    async fn purge_channel(
        &self,
        channel_id: &str,
        user_id: &str,
        cutoff: Option<DateTime<Utc>>,
        skip_pinned: bool,
        remaining: usize,
    ) -> Result<usize, ActionError> {
        let channel = match self.discord.fetch_channel(channel_id).await {
            Ok(channel) => channel,
            Err(err) => {
                debug!(channel_id, "channel fetch failed: {err}");
                None
            }
        };
        if !channel.is_some_and(|channel| channel.text_based) {
            return Err(ActionError::ChannelNotTextBased);
        }

        let messages = self
            .discord
            .fetch_messages(channel_id, self.settings.message_fetch_limit)
            .await?;

        let to_delete: Vec<ChannelMessage> = messages
            .into_iter()
            .filter(|message| message.author_id == user_id)
            .filter(|message| cutoff.is_none_or(|cutoff| message.created_at >= cutoff))
            .filter(|message| !(skip_pinned && message.pinned))
            .take(remaining)
            .collect();

        if to_delete.is_empty() {
            return Ok(0);
        }

        let (recent, old) = partition_by_bulk_eligibility(to_delete, Utc::now());
        let mut deleted = 0;

        match recent.as_slice() {
            [] => {}
            [single] => {
                if let Err(err) = self.discord.delete_message(channel_id, &single.id).await {
                    warn!(channel_id, message_id = %single.id, "failed to delete message: {err}");
                }
                deleted += 1;
            }
            batch => {
                let ids: Vec<String> = batch.iter().map(|message| message.id.clone()).collect();
                if let Err(err) = self.discord.bulk_delete(channel_id, &ids).await {
                    warn!(channel_id, count = ids.len(), "bulk delete failed: {err}");
                }
                deleted += batch.len();
            }
        }

        for (index, message) in old.iter().enumerate() {
            if index > 0 && !self.settings.delete_pacing.is_zero() {
                tokio::time::sleep(self.settings.delete_pacing).await;
            }
            if let Err(err) = self.discord.delete_message(channel_id, &message.id).await {
                warn!(channel_id, message_id = %message.id, "failed to delete message: {err}");
            }
            deleted += 1;
        }

        Ok(deleted)
    }
}

/// Oldest creation time still eligible for deletion. Ages beyond chrono's
/// range mean no cutoff.
fn age_cutoff(now: DateTime<Utc>, max_age_days: f64) -> Option<DateTime<Utc>> {
    let millis = max_age_days * 86_400_000.0;
    if !millis.is_finite() || millis.abs() >= i64::MAX as f64 {
        return None;
    }
    ChronoDuration::try_milliseconds(millis as i64)
        .and_then(|age| now.checked_sub_signed(age))
}

/// Splits messages into those young enough for bulk deletion and the rest.
fn partition_by_bulk_eligibility(
    messages: Vec<ChannelMessage>,
    now: DateTime<Utc>,
) -> (Vec<ChannelMessage>, Vec<ChannelMessage>) {
    let max_age = ChronoDuration::days(BULK_DELETE_MAX_AGE_DAYS);
    messages
        .into_iter()
        .partition(|message| now - message.created_at < max_age)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::automation::model::{ActionSpec, Event};
    use crate::automation::testing::{
        Call, FakeDiscord, automation_with, executor, executor_with, message,
    };
    use crate::automation::actions::ExecutorSettings;

    fn purge_spec(kind: &str, config: Value) -> ActionSpec {
        ActionSpec::new(kind, config.as_object().cloned().unwrap())
    }

    fn event_by(user: &str) -> Event {
        let mut event = Event::new("G", "MESSAGE_CREATE");
        event.actor_id = Some(user.to_string());
        event
    }

    fn deleted_ids(calls: &[Call]) -> Vec<String> {
        calls
            .iter()
            .flat_map(|call| match call {
                Call::BulkDelete { message_ids, .. } => message_ids.clone(),
                Call::DeleteMessage { message_id, .. } => vec![message_id.clone()],
                _ => Vec::new(),
            })
            .collect()
    }

    #[tokio::test]
    async fn budget_stops_before_later_channels() {
        let discord = Arc::new(
            FakeDiscord::new()
                .with_guild("G", "Guild")
                .with_text_channel("G", "A", vec![message("a1", "U", 1, false), message("a2", "U", 1, false), message("a3", "U", 1, false)])
                .with_text_channel("G", "B", vec![message("b1", "U", 1, false), message("b2", "U", 1, false)]),
        );
        let spec = purge_spec(
            "DELETE_USER_MESSAGES",
            json!({"channel_ids": "A,B", "max_messages": 3}),
        );

        let result = executor(discord.clone())
            .execute(&automation_with(vec![spec.clone()]), &spec, &event_by("U"), &json!({}))
            .await;

        assert!(result.success);
        let payload = result.result.unwrap();
        assert_eq!(payload["totalDeleted"], json!(3));
        assert_eq!(payload["channelResults"], json!({"A": {"deleted": 3}}));
        assert_eq!(deleted_ids(&discord.calls()), vec!["a1", "a2", "a3"]);
    }

    #[tokio::test]
    async fn budget_caps_second_channel_to_remaining_quota() {
        let discord = Arc::new(
            FakeDiscord::new()
                .with_guild("G", "Guild")
                .with_text_channel("G", "A", vec![message("a1", "U", 1, false), message("a2", "U", 1, false)])
                .with_text_channel("G", "B", vec![message("b1", "U", 1, false), message("b2", "U", 1, false), message("b3", "U", 1, false)]),
        );
        let spec = purge_spec(
            "DELETE_USER_MESSAGES",
            json!({"channel_ids": "A,B", "max_messages": "3"}),
        );

        let result = executor(discord.clone())
            .execute(&automation_with(vec![spec.clone()]), &spec, &event_by("U"), &json!({}))
            .await;

        let payload = result.result.unwrap();
        assert_eq!(payload["totalDeleted"], json!(3));
        assert_eq!(payload["channelResults"]["B"], json!({"deleted": 1}));
        assert_eq!(
            discord.calls().last(),
            Some(&Call::DeleteMessage {
                channel_id: "B".into(),
                message_id: "b1".into()
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn old_messages_are_never_bulk_deleted() {
        let discord = Arc::new(
            FakeDiscord::new().with_guild("G", "Guild").with_text_channel(
                "G",
                "A",
                vec![
                    message("new1", "U", 1, false),
                    message("new2", "U", 2, false),
                    message("old1", "U", 20, false),
                    message("old2", "U", 30, false),
                    message("other", "V", 1, false),
                ],
            ),
        );
        let spec = purge_spec("DELETE_MESSAGES", json!({"channel_ids": "A"}));
        let exec = executor_with(
            discord.clone(),
            ExecutorSettings {
                delete_pacing: Duration::from_millis(500),
                ..ExecutorSettings::default()
            },
        );

        let started = tokio::time::Instant::now();
        let result = exec
            .execute(&automation_with(vec![spec.clone()]), &spec, &event_by("U"), &json!({}))
            .await;

        assert_eq!(result.result.unwrap()["totalDeleted"], json!(4));
        assert_eq!(
            discord.calls(),
            vec![
                Call::BulkDelete {
                    channel_id: "A".into(),
                    message_ids: vec!["new1".into(), "new2".into()]
                },
                Call::DeleteMessage {
                    channel_id: "A".into(),
                    message_id: "old1".into()
                },
                Call::DeleteMessage {
                    channel_id: "A".into(),
                    message_id: "old2".into()
                },
            ]
        );
        assert!(started.elapsed() >= Duration::from_millis(500));
    }

    #[tokio::test]
    async fn single_recent_message_uses_plain_delete() {
        let discord = Arc::new(
            FakeDiscord::new()
                .with_guild("G", "Guild")
                .with_text_channel("G", "A", vec![message("m1", "U", 0, false)]),
        );
        let spec = purge_spec("DELETE_MESSAGES", json!({"channel_ids": "A"}));

        executor(discord.clone())
            .execute(&automation_with(vec![spec.clone()]), &spec, &event_by("U"), &json!({}))
            .await;

        assert_eq!(
            discord.calls(),
            vec![Call::DeleteMessage {
                channel_id: "A".into(),
                message_id: "m1".into()
            }]
        );
    }

    #[tokio::test]
    async fn failed_single_deletes_still_count() {
        let discord = Arc::new(
            FakeDiscord::new()
                .with_guild("G", "Guild")
                .with_text_channel(
                    "G",
                    "A",
                    vec![message("old1", "U", 20, false), message("old2", "U", 30, false)],
                )
                .failing("delete_message"),
        );
        let spec = purge_spec("DELETE_MESSAGES", json!({"channel_ids": "A"}));

        let result = executor(discord.clone())
            .execute(&automation_with(vec![spec.clone()]), &spec, &event_by("U"), &json!({}))
            .await;

        assert!(result.success);
        let payload = result.result.unwrap();
        assert_eq!(payload["totalDeleted"], json!(2));
        assert_eq!(payload["channelResults"]["A"]["deleted"], json!(2));
        assert_eq!(discord.calls().len(), 2);
    }

    #[tokio::test]
    async fn pinned_and_expired_messages_are_kept() {
        let discord = Arc::new(
            FakeDiscord::new().with_guild("G", "Guild").with_text_channel(
                "G",
                "A",
                vec![
                    message("pinned", "U", 1, true),
                    message("fresh", "U", 1, false),
                    message("stale", "U", 10, false),
                ],
            ),
        );
        let spec = purge_spec(
            "DELETE_USER_MESSAGES",
            json!({"channel_ids": "A", "max_age_days": 7}),
        );

        let result = executor(discord.clone())
            .execute(&automation_with(vec![spec.clone()]), &spec, &event_by("U"), &json!({}))
            .await;

        assert_eq!(result.result.unwrap()["totalDeleted"], json!(1));
        assert_eq!(deleted_ids(&discord.calls()), vec!["fresh"]);
    }

    #[tokio::test]
    async fn all_channels_expand_to_guild_text_channels() {
        let discord = Arc::new(
            FakeDiscord::new()
                .with_guild("G", "Guild")
                .with_text_channel("G", "A", vec![message("a1", "U", 1, false)])
                .with_voice_channel("G", "V")
                .with_text_channel("OTHER", "X", vec![message("x1", "U", 1, false)]),
        );
        let spec = purge_spec("DELETE_USER_MESSAGES", json!({"channel_ids": "ALL"}));

        let result = executor(discord.clone())
            .execute(&automation_with(vec![spec.clone()]), &spec, &event_by("U"), &json!({}))
            .await;

        assert_eq!(
            result.result.unwrap()["channelResults"],
            json!({"A": {"deleted": 1}})
        );
    }

    #[tokio::test]
    async fn unusable_channels_are_reported_per_channel() {
        let discord = Arc::new(
            FakeDiscord::new()
                .with_guild("G", "Guild")
                .with_voice_channel("G", "V")
                .with_text_channel("G", "A", vec![message("a1", "U", 1, false)]),
        );
        let spec = purge_spec("DELETE_USER_MESSAGES", json!({"channel_ids": "missing,V,A"}));

        let result = executor(discord.clone())
            .execute(&automation_with(vec![spec.clone()]), &spec, &event_by("U"), &json!({}))
            .await;

        assert!(result.success);
        assert_eq!(
            result.result.unwrap()["channelResults"],
            json!({
                "missing": {"error": "Channel not found or not text-based"},
                "V": {"error": "Channel not found or not text-based"},
                "A": {"deleted": 1}
            })
        );
    }

    #[tokio::test]
    async fn purge_requires_user_and_guild() {
        let discord = Arc::new(FakeDiscord::new());
        let spec = purge_spec("DELETE_USER_MESSAGES", json!({}));
        let automation = automation_with(vec![spec.clone()]);
        let exec = executor(discord.clone());

        let no_user = exec
            .execute(&automation, &spec, &Event::new("G", "MESSAGE_CREATE"), &json!({}))
            .await;
        let no_guild = exec
            .execute(&automation, &spec, &event_by("U"), &json!({}))
            .await;

        assert_eq!(no_user.error.as_deref(), Some("Missing user ID"));
        assert_eq!(no_guild.error.as_deref(), Some("Guild not found"));
        assert!(discord.calls().is_empty());
    }

    #[tokio::test]
    async fn huge_option_age_means_no_cutoff() {
        let discord = Arc::new(
            FakeDiscord::new()
                .with_guild("G", "Guild")
                .with_text_channel("G", "A", vec![message("a1", "U", 400, false)]),
        );
        let spec = purge_spec(
            "DELETE_USER_MESSAGES",
            json!({"channel_ids": "A", "max_age_days": "option:days"}),
        );
        let mut event = event_by("U");
        event.options = json!({"days": "100000000"}).as_object().cloned();

        let result = executor(discord.clone())
            .execute(&automation_with(vec![spec.clone()]), &spec, &event, &json!({}))
            .await;

        assert!(result.success);
        assert_eq!(result.result.unwrap()["totalDeleted"], json!(1));
    }

    #[test]
    fn age_cutoff_handles_out_of_range_ages() {
        let now = Utc::now();
        assert_eq!(age_cutoff(now, 1.0), Some(now - ChronoDuration::days(1)));
        assert_eq!(age_cutoff(now, 1e8), None);
        assert_eq!(age_cutoff(now, 1e300), None);
        assert_eq!(age_cutoff(now, f64::INFINITY), None);
    }

    #[test]
    fn partition_splits_at_fourteen_days() {
        let now = Utc::now();
        let at = |days: i64, id: &str| ChannelMessage {
            id: id.to_string(),
            author_id: "U".into(),
            created_at: now - ChronoDuration::days(days) + ChronoDuration::seconds(1),
            pinned: false,
        };

        let (recent, old) =
            partition_by_bulk_eligibility(vec![at(13, "a"), at(14, "b"), at(15, "c")], now);

        assert_eq!(recent.iter().map(|m| m.id.as_str()).collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(old.iter().map(|m| m.id.as_str()).collect::<Vec<_>>(), vec!["c"]);
    }
}
