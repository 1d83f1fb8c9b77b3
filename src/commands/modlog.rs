use super::guild_id;
use crate::embeds;
use crate::{Context, Error};
use poise::serenity_prelude as serenity;
use tracing::info;

const HISTORY_LIMIT: usize = 10;

/// Moderation log
#[poise::command(
    slash_command,
    subcommands("view", "purge"),
    required_permissions = "MODERATE_MEMBERS",
    guild_only
)]
pub async fn modlog(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// View a case, a member's history or recent server activity
#[poise::command(slash_command)]
pub async fn view(
    ctx: Context<'_>,
    #[description = "Show this member's history"] user: Option<serenity::User>,
    #[description = "Show a single case"]
    #[min = 1]
    case: Option<i64>,
) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    let moderation = &ctx.data().moderation;

    let embed = if let Some(case_id) = case {
        match moderation.case(guild_id, case_id).await? {
            Some(entry) => embeds::case_embed(&entry),
            None => {
                ctx.say(format!("❌ Case #{} not found.", case_id)).await?;
                return Ok(());
            }
        }
    } else if let Some(user) = user {
        let entries = moderation
            .user_history(guild_id, user.id.get(), HISTORY_LIMIT)
            .await?;
        if entries.is_empty() {
            ctx.say(format!("✅ **{}** has a clean record.", user.tag()))
                .await?;
            return Ok(());
        }
        embeds::history_embed(format!("📋 Modlog for {}", user.tag()), &entries, false)
    } else {
        let entries = moderation.guild_history(guild_id, HISTORY_LIMIT).await?;
        if entries.is_empty() {
            ctx.say("📭 No moderation actions recorded yet.").await?;
            return Ok(());
        }
        embeds::history_embed("📋 Recent Moderation Actions".to_string(), &entries, true)
    };

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Delete log entries older than the given number of days
#[poise::command(slash_command, required_permissions = "MANAGE_GUILD")]
pub async fn purge(
    ctx: Context<'_>,
    #[description = "Delete entries older than this many days"]
    #[min = 1]
    #[max = 3650]
    days: u64,
) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    ctx.defer().await?;

    let removed = ctx
        .data()
        .moderation
        .purge_older_than(guild_id, days)
        .await?;
    info!(
        "Guild {}: {} purged {} modlog entries older than {} days",
        guild_id,
        ctx.author().name,
        removed,
        days
    );
    ctx.say(format!(
        "🗑️ Removed **{}** entries older than {} days. Remaining case numbers are unchanged.",
        removed, days
    ))
    .await?;
    Ok(())
}
