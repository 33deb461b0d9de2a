use serde_json::{Value, json};

use super::{ActionError, ActionExecutor};
use crate::discord::api::MemberHandle;

const SECONDS_PER_DAY: u32 = 86_400;

impl ActionExecutor {
    pub(super) async fn add_role(
        &self,
        guild_id: &str,
        user_id: Option<String>,
        role_id: Option<String>,
    ) -> Result<Value, ActionError> {
        let (Some(user_id), Some(role_id)) = (user_id, role_id) else {
            return Err(ActionError::MissingRoleOrUserId);
        };
        let member = self.guild_member(guild_id, &user_id).await?;
        self.discord.add_role(&member, &role_id).await?;
        Ok(json!({ "roleAdded": role_id }))
    }

    pub(super) async fn remove_role(
        &self,
        guild_id: &str,
        user_id: Option<String>,
        role_id: Option<String>,
    ) -> Result<Value, ActionError> {
        let (Some(user_id), Some(role_id)) = (user_id, role_id) else {
            return Err(ActionError::MissingRoleOrUserId);
        };
        let member = self.guild_member(guild_id, &user_id).await?;
        self.discord.remove_role(&member, &role_id).await?;
        Ok(json!({ "roleRemoved": role_id }))
    }

    pub(super) async fn kick_member(
        &self,
        guild_id: &str,
        user_id: Option<String>,
        reason: &str,
    ) -> Result<Value, ActionError> {
        let user_id = user_id.ok_or(ActionError::MissingUserId)?;
        let member = self.guild_member(guild_id, &user_id).await?;
        self.discord.kick(&member, reason).await?;
        Ok(json!({ "kicked": user_id }))
    }

    /// Bans do not require the user to still be a member.
    pub(super) async fn ban_member(
        &self,
        guild_id: &str,
        user_id: Option<String>,
        reason: &str,
        delete_days: u8,
    ) -> Result<Value, ActionError> {
        let user_id = user_id.ok_or(ActionError::MissingUserId)?;
        self.discord
            .fetch_guild(guild_id)
            .await?
            .ok_or(ActionError::GuildNotFound)?;
        self.discord
            .ban(guild_id, &user_id, reason, u32::from(delete_days) * SECONDS_PER_DAY)
            .await?;
        Ok(json!({ "banned": user_id }))
    }

    pub(super) async fn timeout_member(
        &self,
        guild_id: &str,
        user_id: Option<String>,
        duration_minutes: f64,
        reason: &str,
    ) -> Result<Value, ActionError> {
        let user_id = user_id.ok_or(ActionError::MissingUserId)?;
        let member = self.guild_member(guild_id, &user_id).await?;
        let duration_ms = (duration_minutes * 60_000.0).round() as u64;
        self.discord.timeout(&member, duration_ms, reason).await?;
        Ok(json!({ "timedOut": user_id, "duration": duration_ms }))
    }

    async fn guild_member(&self, guild_id: &str, user_id: &str) -> Result<MemberHandle, ActionError> {
        self.discord
            .fetch_guild(guild_id)
            .await?
            .ok_or(ActionError::GuildNotFound)?;
        self.discord
            .fetch_member(guild_id, user_id)
            .await?
            .ok_or(ActionError::MemberNotFound)
    }
}
