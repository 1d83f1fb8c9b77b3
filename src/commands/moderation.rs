use super::guild_id;
use crate::automod::{Capability, ModerationActions, SerenityActions};
use crate::db::{ExpiryKind, NewModlogEntry};
use crate::embeds::{self, COLOR_AUTOMOD, COLOR_SEVERE, COLOR_SUCCESS};
use crate::error::ActionError;
use crate::{Context, Error};
use chrono::Utc;
use poise::serenity_prelude as serenity;
use poise::serenity_prelude::{ChannelId, CreateEmbed, GuildId, UserId};
use std::time::Duration;
use tracing::{info, warn};

const NO_REASON: &str = "No reason provided";

/// Discord refuses timeouts longer than 28 days.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(28 * 24 * 60 * 60);
pub const MAX_TEMPBAN: Duration = Duration::from_secs(365 * 24 * 60 * 60);
pub const MAX_VOICE_MUTE: Duration = Duration::from_secs(28 * 24 * 60 * 60);
const MIN_DURATION: Duration = Duration::from_secs(60);

/// Parses a human duration such as `10m`, `2h 30m` or `7days`.
pub fn parse_duration(raw: &str, max: Duration) -> Result<Duration, String> {
    let duration = humantime::parse_duration(raw.trim())
        .map_err(|_| format!("`{}` is not a valid duration. Try `10m`, `2h` or `7d`.", raw))?;
    if duration < MIN_DURATION {
        return Err("Duration must be at least one minute.".to_string());
    }
    if duration > max {
        return Err(format!(
            "Duration cannot exceed {}.",
            humantime::format_duration(max)
        ));
    }
    Ok(duration)
}

fn actions(ctx: Context<'_>) -> SerenityActions {
    SerenityActions::from_context(ctx.serenity_context(), ctx.data().bot_id)
}

fn audit_reason(ctx: Context<'_>, reason: &str) -> String {
    format!("{}: {}", ctx.author().name, reason)
}

/// Rejects self-targeting and, when the member is cached, anyone the bot cannot act on.
/// Uncached members are left for Discord to accept or refuse.
async fn check_target(
    ctx: Context<'_>,
    actions: &SerenityActions,
    target: &serenity::User,
    capability: Capability,
    verb: &str,
) -> Result<bool, Error> {
    if target.id == ctx.author().id {
        ctx.say(format!("❌ You cannot {} yourself!", verb)).await?;
        return Ok(false);
    }
    if target.id == ctx.data().bot_id {
        ctx.say(format!("❌ I cannot {} myself.", verb)).await?;
        return Ok(false);
    }

    let guild_id = GuildId::new(guild_id(ctx)?);
    let cached = ctx
        .guild()
        .map(|g| g.members.contains_key(&target.id))
        .unwrap_or(false);
    if cached && !actions.can_moderate(guild_id, target.id, capability).await {
        ctx.say(format!(
            "❌ I can't {} **{}**. Check my permissions and that my role is above theirs.",
            verb,
            target.tag()
        ))
        .await?;
        return Ok(false);
    }
    Ok(true)
}

fn announcement(
    ctx: Context<'_>,
    entry: &NewModlogEntry,
    case_id: i64,
    title: &str,
    color: u32,
    target: &serenity::User,
) -> CreateEmbed {
    let reason = entry.reason.as_deref().unwrap_or(NO_REASON);
    let embed = embeds::action_embed(title, color, target, ctx.author(), reason, case_id);
    match &entry.duration {
        Some(duration) => embed.field("Duration", duration, true),
        None => embed,
    }
}

/// Replies with the action embed and mirrors it to the modlog channel.
/// The mirror is attempted even when the reply fails.
async fn announce(
    ctx: Context<'_>,
    actions: &SerenityActions,
    guild_id: u64,
    embed: CreateEmbed,
) -> Result<(), Error> {
    let reply = ctx
        .send(poise::CreateReply::default().embed(embed.clone()))
        .await;
    ctx.data().moderation.notify(actions, guild_id, embed).await;
    reply?;
    Ok(())
}

/// Appends the case, then announces it.
async fn record_and_announce(
    ctx: Context<'_>,
    actions: &SerenityActions,
    entry: NewModlogEntry,
    title: &str,
    color: u32,
    target: &serenity::User,
) -> Result<i64, Error> {
    let case_id = ctx.data().moderation.record(entry.clone()).await?;
    let embed = announcement(ctx, &entry, case_id, title, color, target);
    announce(ctx, actions, entry.guild_id, embed).await?;
    Ok(case_id)
}

struct VoiceStatus {
    channel_id: ChannelId,
    muted: bool,
}

/// The member's cached voice state, if they are connected to a channel.
fn voice_status(ctx: Context<'_>, user_id: UserId) -> Option<VoiceStatus> {
    let guild = ctx.guild()?;
    let state = guild.voice_states.get(&user_id)?;
    Some(VoiceStatus {
        channel_id: state.channel_id?,
        muted: state.mute,
    })
}

/// Ban a member from the server
#[poise::command(
    slash_command,
    guild_only,
    required_permissions = "BAN_MEMBERS",
    required_bot_permissions = "BAN_MEMBERS"
)]
pub async fn ban(
    ctx: Context<'_>,
    #[description = "User to ban"] user: serenity::User,
    #[description = "Reason"]
    #[max_length = 512]
    reason: Option<String>,
    #[description = "Days of messages to delete"]
    #[min = 0]
    #[max = 7]
    delete_days: Option<u8>,
) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    let actions = actions(ctx);
    if !check_target(ctx, &actions, &user, Capability::Ban, "ban").await? {
        return Ok(());
    }
    let reason = reason.unwrap_or_else(|| NO_REASON.to_string());

    if let Err(e) = actions
        .ban_member(
            GuildId::new(guild_id),
            user.id,
            delete_days.unwrap_or(0),
            &audit_reason(ctx, &reason),
        )
        .await
    {
        warn!("Ban of {} in guild {} failed: {}", user.id, guild_id, e);
        ctx.say(format!("❌ Failed to ban member: {}", e)).await?;
        return Ok(());
    }

    // A permanent ban supersedes any pending automatic unban.
    let cancelled = ctx
        .data()
        .expiries
        .cancel(ExpiryKind::Unban, guild_id, user.id.get())
        .await?;
    if cancelled > 0 {
        info!("Cancelled {} pending tempban(s) for {}", cancelled, user.id);
    }

    let entry = NewModlogEntry::new(guild_id, user.id.get(), ctx.author().id.get(), "ban")
        .reason(reason);
    record_and_announce(ctx, &actions, entry, "🔨 Banned", COLOR_SEVERE, &user).await?;
    Ok(())
}

/// Temporarily ban a member; they are unbanned automatically
#[poise::command(
    slash_command,
    guild_only,
    required_permissions = "BAN_MEMBERS",
    required_bot_permissions = "BAN_MEMBERS"
)]
pub async fn tempban(
    ctx: Context<'_>,
    #[description = "User to ban"] user: serenity::User,
    #[description = "How long, e.g. 1d or 12h"] duration: String,
    #[description = "Reason"]
    #[max_length = 512]
    reason: Option<String>,
    #[description = "Days of messages to delete"]
    #[min = 0]
    #[max = 7]
    delete_days: Option<u8>,
) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    let length = match parse_duration(&duration, MAX_TEMPBAN) {
        Ok(length) => length,
        Err(msg) => {
            ctx.say(format!("❌ {}", msg)).await?;
            return Ok(());
        }
    };
    let actions = actions(ctx);
    if !check_target(ctx, &actions, &user, Capability::Ban, "ban").await? {
        return Ok(());
    }
    let reason = reason.unwrap_or_else(|| NO_REASON.to_string());

    if let Err(e) = actions
        .ban_member(
            GuildId::new(guild_id),
            user.id,
            delete_days.unwrap_or(0),
            &audit_reason(ctx, &reason),
        )
        .await
    {
        warn!("Tempban of {} in guild {} failed: {}", user.id, guild_id, e);
        ctx.say(format!("❌ Failed to ban member: {}", e)).await?;
        return Ok(());
    }

    // Schedule before replying so a failed reply cannot leave the ban without an expiry.
    let expires_at = Utc::now() + chrono::Duration::from_std(length)?;
    let entry = NewModlogEntry::new(guild_id, user.id.get(), ctx.author().id.get(), "tempban")
        .reason(reason)
        .duration(humantime::format_duration(length).to_string());
    let case_id = ctx
        .data()
        .expiries
        .record_with_expiry(entry.clone(), ExpiryKind::Unban, expires_at)
        .await?;
    info!(
        "Scheduled unban of {} in guild {} at {} (case #{})",
        user.id, guild_id, expires_at, case_id
    );

    let embed = announcement(ctx, &entry, case_id, "⏳ Temporarily Banned", COLOR_SEVERE, &user);
    announce(ctx, &actions, guild_id, embed).await
}

/// Unban a user
#[poise::command(
    slash_command,
    guild_only,
    required_permissions = "BAN_MEMBERS",
    required_bot_permissions = "BAN_MEMBERS"
)]
pub async fn unban(
    ctx: Context<'_>,
    #[description = "User (or user ID) to unban"] user: serenity::User,
    #[description = "Reason"]
    #[max_length = 512]
    reason: Option<String>,
) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    let actions = actions(ctx);

    if let Err(e) = actions.unban_member(GuildId::new(guild_id), user.id).await {
        ctx.say(format!("❌ User not found or not banned: {}", e))
            .await?;
        return Ok(());
    }
    ctx.data()
        .expiries
        .cancel(ExpiryKind::Unban, guild_id, user.id.get())
        .await?;

    let entry = NewModlogEntry::new(guild_id, user.id.get(), ctx.author().id.get(), "unban")
        .reason(reason.unwrap_or_else(|| NO_REASON.to_string()));
    record_and_announce(ctx, &actions, entry, "🔓 Unbanned", COLOR_SUCCESS, &user).await?;
    Ok(())
}

/// Kick a member from the server
#[poise::command(
    slash_command,
    guild_only,
    required_permissions = "KICK_MEMBERS",
    required_bot_permissions = "KICK_MEMBERS"
)]
pub async fn kick(
    ctx: Context<'_>,
    #[description = "Member to kick"] user: serenity::User,
    #[description = "Reason"]
    #[max_length = 512]
    reason: Option<String>,
) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    let actions = actions(ctx);
    if !check_target(ctx, &actions, &user, Capability::Kick, "kick").await? {
        return Ok(());
    }
    let reason = reason.unwrap_or_else(|| NO_REASON.to_string());

    if let Err(e) = actions
        .kick_member(GuildId::new(guild_id), user.id, &audit_reason(ctx, &reason))
        .await
    {
        warn!("Kick of {} in guild {} failed: {}", user.id, guild_id, e);
        ctx.say(format!("❌ Failed to kick member: {}", e)).await?;
        return Ok(());
    }

    let entry = NewModlogEntry::new(guild_id, user.id.get(), ctx.author().id.get(), "kick")
        .reason(reason);
    record_and_announce(ctx, &actions, entry, "👢 Kicked", COLOR_SEVERE, &user).await?;
    Ok(())
}

/// Warn a member
#[poise::command(slash_command, guild_only, required_permissions = "MODERATE_MEMBERS")]
pub async fn warn(
    ctx: Context<'_>,
    #[description = "Member to warn"] user: serenity::User,
    #[description = "Reason"]
    #[max_length = 512]
    reason: Option<String>,
) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    if user.id == ctx.author().id {
        ctx.say("❌ You cannot warn yourself!").await?;
        return Ok(());
    }
    let actions = actions(ctx);

    let entry = NewModlogEntry::new(guild_id, user.id.get(), ctx.author().id.get(), "warn")
        .reason(reason.unwrap_or_else(|| NO_REASON.to_string()));
    record_and_announce(ctx, &actions, entry, "⚠️ Warning", COLOR_AUTOMOD, &user).await?;
    Ok(())
}

/// Time out a member
#[poise::command(
    slash_command,
    guild_only,
    required_permissions = "MODERATE_MEMBERS",
    required_bot_permissions = "MODERATE_MEMBERS"
)]
pub async fn timeout(
    ctx: Context<'_>,
    #[description = "Member to time out"] user: serenity::User,
    #[description = "How long, e.g. 10m or 1h (max 28d)"] duration: String,
    #[description = "Reason"]
    #[max_length = 512]
    reason: Option<String>,
) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    let length = match parse_duration(&duration, MAX_TIMEOUT) {
        Ok(length) => length,
        Err(msg) => {
            ctx.say(format!("❌ {}", msg)).await?;
            return Ok(());
        }
    };
    let actions = actions(ctx);
    if !check_target(ctx, &actions, &user, Capability::Timeout, "time out").await? {
        return Ok(());
    }
    let reason = reason.unwrap_or_else(|| NO_REASON.to_string());

    let until = Utc::now() + chrono::Duration::from_std(length)?;
    if let Err(e) = actions
        .timeout_member(GuildId::new(guild_id), user.id, until, &audit_reason(ctx, &reason))
        .await
    {
        warn!("Timeout of {} in guild {} failed: {}", user.id, guild_id, e);
        ctx.say(format!("❌ Failed to timeout member: {}", e)).await?;
        return Ok(());
    }

    let entry = NewModlogEntry::new(guild_id, user.id.get(), ctx.author().id.get(), "timeout")
        .reason(reason)
        .duration(humantime::format_duration(length).to_string());
    record_and_announce(ctx, &actions, entry, "🔇 Timed Out", COLOR_AUTOMOD, &user).await?;
    Ok(())
}

/// Remove a member's timeout
#[poise::command(
    slash_command,
    guild_only,
    required_permissions = "MODERATE_MEMBERS",
    required_bot_permissions = "MODERATE_MEMBERS"
)]
pub async fn untimeout(
    ctx: Context<'_>,
    #[description = "Member to release"] user: serenity::User,
    #[description = "Reason"]
    #[max_length = 512]
    reason: Option<String>,
) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    let actions = actions(ctx);

    if let Err(e) = actions.clear_timeout(GuildId::new(guild_id), user.id).await {
        warn!("Clearing timeout of {} in guild {} failed: {}", user.id, guild_id, e);
        ctx.say(format!("❌ Failed to remove timeout: {}", e)).await?;
        return Ok(());
    }

    let entry = NewModlogEntry::new(guild_id, user.id.get(), ctx.author().id.get(), "untimeout")
        .reason(reason.unwrap_or_else(|| NO_REASON.to_string()));
    record_and_announce(ctx, &actions, entry, "🔊 Timeout Removed", COLOR_SUCCESS, &user).await?;
    Ok(())
}

/// Server-mute a member in voice
#[poise::command(
    slash_command,
    guild_only,
    required_permissions = "MUTE_MEMBERS",
    required_bot_permissions = "MUTE_MEMBERS"
)]
pub async fn voicemute(
    ctx: Context<'_>,
    #[description = "Member to mute"] user: serenity::User,
    #[description = "How long, e.g. 30m or 2h (max 28d). Omit to mute indefinitely"]
    duration: Option<String>,
    #[description = "Reason"]
    #[max_length = 512]
    reason: Option<String>,
) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    let length = match duration
        .as_deref()
        .map(|raw| parse_duration(raw, MAX_VOICE_MUTE))
        .transpose()
    {
        Ok(length) => length,
        Err(msg) => {
            ctx.say(format!("❌ {}", msg)).await?;
            return Ok(());
        }
    };
    let actions = actions(ctx);
    if !check_target(ctx, &actions, &user, Capability::VoiceMute, "voice mute").await? {
        return Ok(());
    }
    let Some(status) = voice_status(ctx, user.id) else {
        ctx.say("❌ This user is not in a voice channel!").await?;
        return Ok(());
    };
    if status.muted {
        ctx.say("❌ This user is already voice muted!").await?;
        return Ok(());
    }
    let reason = reason.unwrap_or_else(|| NO_REASON.to_string());

    match actions
        .set_voice_mute(GuildId::new(guild_id), user.id, true, &audit_reason(ctx, &reason))
        .await
    {
        Ok(()) => {}
        Err(ActionError::NotInVoice) => {
            ctx.say("❌ This user is not in a voice channel!").await?;
            return Ok(());
        }
        Err(e) => {
            warn!("Voice mute of {} in guild {} failed: {}", user.id, guild_id, e);
            ctx.say(format!("❌ Failed to voice mute member: {}", e)).await?;
            return Ok(());
        }
    }

    let entry = NewModlogEntry::new(guild_id, user.id.get(), ctx.author().id.get(), "voicemute")
        .reason(reason);
    let expiries = &ctx.data().expiries;
    let (entry, case_id) = match length {
        Some(length) => {
            let expires_at = Utc::now() + chrono::Duration::from_std(length)?;
            let entry = entry.duration(humantime::format_duration(length).to_string());
            let case_id = expiries
                .record_with_expiry(entry.clone(), ExpiryKind::VoiceUnmute, expires_at)
                .await?;
            info!(
                "Scheduled voice unmute of {} in guild {} at {} (case #{})",
                user.id, guild_id, expires_at, case_id
            );
            (entry, case_id)
        }
        None => {
            // An indefinite mute must not be undone by an older timed one.
            expiries
                .cancel(ExpiryKind::VoiceUnmute, guild_id, user.id.get())
                .await?;
            let case_id = ctx.data().moderation.record(entry.clone()).await?;
            (entry, case_id)
        }
    };

    let mut embed = announcement(ctx, &entry, case_id, "🔇 User Voice Muted", COLOR_AUTOMOD, &user);
    if entry.duration.is_none() {
        embed = embed.field("Duration", "Indefinite", true);
    }
    let embed = embed.field("Voice Channel", format!("<#{}>", status.channel_id), true);
    announce(ctx, &actions, guild_id, embed).await
}

/// Remove a member's server voice mute
#[poise::command(
    slash_command,
    guild_only,
    required_permissions = "MUTE_MEMBERS",
    required_bot_permissions = "MUTE_MEMBERS"
)]
pub async fn voiceunmute(
    ctx: Context<'_>,
    #[description = "Member to unmute"] user: serenity::User,
    #[description = "Reason"]
    #[max_length = 512]
    reason: Option<String>,
) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    let Some(status) = voice_status(ctx, user.id) else {
        ctx.say("❌ This user is not in a voice channel!").await?;
        return Ok(());
    };
    if !status.muted {
        ctx.say("❌ This user is not voice muted!").await?;
        return Ok(());
    }
    let actions = actions(ctx);
    let reason = reason.unwrap_or_else(|| NO_REASON.to_string());

    if let Err(e) = actions
        .set_voice_mute(GuildId::new(guild_id), user.id, false, &audit_reason(ctx, &reason))
        .await
    {
        warn!("Voice unmute of {} in guild {} failed: {}", user.id, guild_id, e);
        ctx.say(format!("❌ Failed to voice unmute member: {}", e)).await?;
        return Ok(());
    }
    ctx.data()
        .expiries
        .cancel(ExpiryKind::VoiceUnmute, guild_id, user.id.get())
        .await?;

    let entry = NewModlogEntry::new(guild_id, user.id.get(), ctx.author().id.get(), "voiceunmute")
        .reason(reason);
    record_and_announce(ctx, &actions, entry, "🔊 User Voice Unmuted", COLOR_SUCCESS, &user)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_accepts_common_forms() {
        assert_eq!(parse_duration("10m", MAX_TIMEOUT).unwrap(), Duration::from_secs(600));
        assert_eq!(
            parse_duration("2h 30m", MAX_TIMEOUT).unwrap(),
            Duration::from_secs(9000)
        );
        assert_eq!(
            parse_duration(" 7d ", MAX_TEMPBAN).unwrap(),
            Duration::from_secs(7 * 86400)
        );
    }

    #[test]
    fn test_parse_duration_bounds() {
        assert!(parse_duration("30s", MAX_TIMEOUT).is_err());
        assert!(parse_duration("28d", MAX_TIMEOUT).is_ok());
        assert!(parse_duration("29d", MAX_TIMEOUT).is_err());
        assert!(parse_duration("29d", MAX_TEMPBAN).is_ok());
        assert!(parse_duration("soon", MAX_TEMPBAN).is_err());
    }

    #[test]
    fn test_voice_mute_allows_up_to_28_days() {
        assert!(parse_duration("28d", MAX_VOICE_MUTE).is_ok());
        assert!(parse_duration("40320m", MAX_VOICE_MUTE).is_ok());
        assert!(parse_duration("40321m", MAX_VOICE_MUTE).is_err());
    }
}
