use super::InboundMessage;
use crate::error::ActionError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use poise::serenity_prelude as serenity;
use poise::serenity_prelude::{
    Cache, ChannelId, CreateAllowedMentions, CreateEmbed, CreateMessage, EditMember, Guild,
    GuildId, Http, Member, MessageId, Timestamp, UserId,
};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Timeout,
    Kick,
    Ban,
    VoiceMute,
}

/// Everything the moderation engine asks of the chat platform.
#[async_trait]
pub trait ModerationActions: Send + Sync {
    fn bot_id(&self) -> UserId;

    async fn delete_message(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
    ) -> Result<(), ActionError>;

    /// Visible in-channel reply to the triggering message.
    async fn reply_warning(&self, message: &InboundMessage, content: &str)
        -> Result<(), ActionError>;

    async fn post_embed(&self, channel_id: ChannelId, embed: CreateEmbed)
        -> Result<(), ActionError>;

    async fn can_moderate(&self, guild_id: GuildId, user_id: UserId, capability: Capability)
        -> bool;

    async fn timeout_member(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        until: DateTime<Utc>,
        reason: &str,
    ) -> Result<(), ActionError>;

    async fn clear_timeout(&self, guild_id: GuildId, user_id: UserId) -> Result<(), ActionError>;

    async fn kick_member(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        reason: &str,
    ) -> Result<(), ActionError>;

    async fn ban_member(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        delete_message_days: u8,
        reason: &str,
    ) -> Result<(), ActionError>;

    /// `ActionError::NotBanned` when there is no ban to lift.
    async fn unban_member(&self, guild_id: GuildId, user_id: UserId) -> Result<(), ActionError>;

    /// Server-side voice mute. `ActionError::NotInVoice` when the member is not connected.
    async fn set_voice_mute(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        muted: bool,
        reason: &str,
    ) -> Result<(), ActionError>;
}

/// `ModerationActions` backed by the serenity HTTP client and gateway cache.
#[derive(Clone)]
pub struct SerenityActions {
    http: Arc<Http>,
    cache: Arc<Cache>,
    bot_id: UserId,
}

impl SerenityActions {
    pub fn new(http: Arc<Http>, cache: Arc<Cache>, bot_id: UserId) -> Self {
        Self { http, cache, bot_id }
    }

    pub fn from_context(ctx: &serenity::Context, bot_id: UserId) -> Self {
        Self::new(ctx.http.clone(), ctx.cache.clone(), bot_id)
    }
}

fn top_role_position(guild: &Guild, member: &Member) -> u16 {
    member
        .roles
        .iter()
        .filter_map(|id| guild.roles.get(id))
        .map(|role| role.position)
        .max()
        .unwrap_or(0)
}

/// Role hierarchy rule: the bot can only act on members strictly below its top role.
pub fn outranks(actor_top: u16, target_top: u16) -> bool {
    actor_top > target_top
}

#[async_trait]
impl ModerationActions for SerenityActions {
    fn bot_id(&self) -> UserId {
        self.bot_id
    }

    async fn delete_message(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
    ) -> Result<(), ActionError> {
        channel_id
            .delete_message(self.http.as_ref(), message_id)
            .await?;
        Ok(())
    }

    async fn reply_warning(
        &self,
        message: &InboundMessage,
        content: &str,
    ) -> Result<(), ActionError> {
        let builder = CreateMessage::new()
            .content(content)
            .reference_message((message.channel_id, message.message_id))
            .allowed_mentions(CreateAllowedMentions::new().users(vec![message.author_id]));
        message
            .channel_id
            .send_message(self.http.as_ref(), builder)
            .await?;
        Ok(())
    }

    async fn post_embed(&self, channel_id: ChannelId, embed: CreateEmbed) -> Result<(), ActionError> {
        channel_id
            .send_message(self.http.as_ref(), CreateMessage::new().embed(embed))
            .await?;
        Ok(())
    }

    async fn can_moderate(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        capability: Capability,
    ) -> bool {
        // Cache guard must not live across an await.
        let Some(guild) = self.cache.guild(guild_id) else {
            return false;
        };
        if user_id == guild.owner_id || user_id == self.bot_id {
            return false;
        }
        let (Some(bot), Some(target)) = (guild.members.get(&self.bot_id), guild.members.get(&user_id))
        else {
            return false;
        };

        let perms = guild.member_permissions(bot);
        let allowed = perms.administrator()
            || match capability {
                Capability::Timeout => perms.moderate_members(),
                Capability::Kick => perms.kick_members(),
                Capability::Ban => perms.ban_members(),
                Capability::VoiceMute => perms.mute_members(),
            };
        if !allowed {
            return false;
        }
        // Administrators cannot be timed out.
        if capability == Capability::Timeout && guild.member_permissions(target).administrator() {
            return false;
        }

        outranks(top_role_position(&guild, bot), top_role_position(&guild, target))
    }

    async fn timeout_member(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        until: DateTime<Utc>,
        reason: &str,
    ) -> Result<(), ActionError> {
        let until = Timestamp::from_unix_timestamp(until.timestamp())
            .map_err(|_| ActionError::InvalidTimestamp)?;
        let builder = EditMember::new()
            .disable_communication_until_datetime(until)
            .audit_log_reason(reason);
        guild_id
            .edit_member(self.http.as_ref(), user_id, builder)
            .await?;
        Ok(())
    }

    async fn clear_timeout(&self, guild_id: GuildId, user_id: UserId) -> Result<(), ActionError> {
        guild_id
            .edit_member(self.http.as_ref(), user_id, EditMember::new().enable_communication())
            .await?;
        Ok(())
    }

    async fn kick_member(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        reason: &str,
    ) -> Result<(), ActionError> {
        guild_id
            .kick_with_reason(self.http.as_ref(), user_id, reason)
            .await?;
        Ok(())
    }

    async fn ban_member(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        delete_message_days: u8,
        reason: &str,
    ) -> Result<(), ActionError> {
        guild_id
            .ban_with_reason(self.http.as_ref(), user_id, delete_message_days, reason)
            .await?;
        Ok(())
    }

    async fn unban_member(&self, guild_id: GuildId, user_id: UserId) -> Result<(), ActionError> {
        guild_id
            .unban(self.http.as_ref(), user_id)
            .await
            .map_err(|e| ActionError::from(e).for_unban())
    }

    async fn set_voice_mute(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        muted: bool,
        reason: &str,
    ) -> Result<(), ActionError> {
        let builder = EditMember::new().mute(muted).audit_log_reason(reason);
        guild_id
            .edit_member(self.http.as_ref(), user_id, builder)
            .await
            .map(|_| ())
            .map_err(|e| ActionError::from(e).for_voice())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub(crate) enum Recorded {
        Delete(MessageId),
        Warn(String),
        Embed(ChannelId),
        Timeout(UserId),
        ClearTimeout(UserId),
        Kick(UserId),
        Ban(UserId),
        Unban(UserId),
        VoiceMute(UserId, bool),
    }

    /// In-memory platform double that records every call.
    pub(crate) struct RecordingActions {
        pub(crate) eligible: bool,
        pub(crate) fail_delete: bool,
        pub(crate) fail_embed: bool,
        /// Unban fails with a non-specific platform error.
        pub(crate) fail_unban: bool,
        pub(crate) not_banned: bool,
        pub(crate) not_in_voice: bool,
        pub(crate) calls: Mutex<Vec<Recorded>>,
    }

    impl RecordingActions {
        pub(crate) fn new() -> Self {
            Self {
                eligible: true,
                fail_delete: false,
                fail_embed: false,
                fail_unban: false,
                not_banned: false,
                not_in_voice: false,
                calls: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn calls(&self) -> Vec<Recorded> {
            self.calls.lock().unwrap().clone()
        }

        fn push(&self, call: Recorded) {
            self.calls.lock().unwrap().push(call);
        }
    }

    pub(crate) const BOT_ID: u64 = 999;

    #[async_trait]
    impl ModerationActions for RecordingActions {
        fn bot_id(&self) -> UserId {
            UserId::new(BOT_ID)
        }

        async fn delete_message(&self, _: ChannelId, message_id: MessageId) -> Result<(), ActionError> {
            if self.fail_delete {
                return Err(ActionError::NotEligible);
            }
            self.push(Recorded::Delete(message_id));
            Ok(())
        }

        async fn reply_warning(&self, _: &InboundMessage, content: &str) -> Result<(), ActionError> {
            self.push(Recorded::Warn(content.to_string()));
            Ok(())
        }

        async fn post_embed(&self, channel_id: ChannelId, _: CreateEmbed) -> Result<(), ActionError> {
            if self.fail_embed {
                return Err(ActionError::NotEligible);
            }
            self.push(Recorded::Embed(channel_id));
            Ok(())
        }

        async fn can_moderate(&self, _: GuildId, _: UserId, _: Capability) -> bool {
            self.eligible
        }

        async fn timeout_member(
            &self,
            _: GuildId,
            user_id: UserId,
            _: DateTime<Utc>,
            _: &str,
        ) -> Result<(), ActionError> {
            self.push(Recorded::Timeout(user_id));
            Ok(())
        }

        async fn clear_timeout(&self, _: GuildId, user_id: UserId) -> Result<(), ActionError> {
            self.push(Recorded::ClearTimeout(user_id));
            Ok(())
        }

        async fn kick_member(&self, _: GuildId, user_id: UserId, _: &str) -> Result<(), ActionError> {
            self.push(Recorded::Kick(user_id));
            Ok(())
        }

        async fn ban_member(&self, _: GuildId, user_id: UserId, _: u8, _: &str) -> Result<(), ActionError> {
            self.push(Recorded::Ban(user_id));
            Ok(())
        }

        async fn unban_member(&self, _: GuildId, user_id: UserId) -> Result<(), ActionError> {
            if self.fail_unban {
                return Err(ActionError::NotEligible);
            }
            if self.not_banned {
                return Err(ActionError::NotBanned);
            }
            self.push(Recorded::Unban(user_id));
            Ok(())
        }

        async fn set_voice_mute(
            &self,
            _: GuildId,
            user_id: UserId,
            muted: bool,
            _: &str,
        ) -> Result<(), ActionError> {
            if self.not_in_voice {
                return Err(ActionError::NotInVoice);
            }
            self.push(Recorded::VoiceMute(user_id, muted));
            Ok(())
        }
    }
}
