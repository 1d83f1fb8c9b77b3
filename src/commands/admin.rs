use crate::{Context, Error};
use tracing::{info, warn};

/// Stop the bot. Scheduled unbans and unmutes stay in the database (Owner only)
#[poise::command(slash_command, owners_only, hide_in_help)]
pub async fn shutdown(ctx: Context<'_>) -> Result<(), Error> {
    let pending = match ctx.data().expiries.pending().await {
        Ok(count) => count,
        Err(e) => {
            warn!("Could not count pending expiries before shutdown: {}", e);
            0
        }
    };
    info!(
        "Shutdown requested by {} with {} pending expiries",
        ctx.author().name,
        pending
    );

    let message = if pending == 0 {
        "👋 Shutting down...".to_string()
    } else {
        format!(
            "👋 Shutting down... {} scheduled unban(s)/unmute(s) will run after the next start.",
            pending
        )
    };
    ctx.say(message).await?;
    ctx.framework().shard_manager().shutdown_all().await;
    Ok(())
}
