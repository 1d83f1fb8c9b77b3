use crate::automod::ModerationActions;
use crate::db::{ExpiryKind, ExpiryRecord, NewModlogEntry};
use crate::embeds::COLOR_SUCCESS;
use crate::error::ActionError;
use crate::services::{expiry::ExpiryService, moderation::ModerationService};
use poise::serenity_prelude::{CreateEmbed, GuildId, Timestamp, UserId};
use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing::{debug, error, info};

pub const AUTO_UNBAN_REASON: &str = "Temporary ban expired";
pub const AUTO_VOICE_UNMUTE_REASON: &str = "Voice mute duration expired";

/// Polls for due expiries (temporary bans and voice mutes) and reverses them.
pub struct ExpiryDispatcher {
    expiries: ExpiryService,
    moderation: ModerationService,
    actions: Arc<dyn ModerationActions>,
    poll_interval: Duration,
    batch_size: usize,
}

impl ExpiryDispatcher {
    pub fn new(
        expiries: ExpiryService,
        moderation: ModerationService,
        actions: Arc<dyn ModerationActions>,
        poll_interval_secs: u64,
        batch_size: usize,
    ) -> Self {
        Self {
            expiries,
            moderation,
            actions,
            poll_interval: Duration::from_secs(poll_interval_secs.max(1)),
            batch_size,
        }
    }

    pub async fn run(self) {
        let mut ticker = interval(self.poll_interval);
        loop {
            ticker.tick().await;
            if let Err(e) = self.dispatch_due().await {
                error!("Expiry dispatch cycle failed: {}", e);
            }
        }
    }

    /// Returns how many expiries were completed this cycle. Rows whose action
    /// failed stay pending and are retried on the next cycle.
    pub async fn dispatch_due(&self) -> anyhow::Result<usize> {
        let due = self.expiries.get_due(self.batch_size).await?;
        let mut completed = 0;

        for expiry in due {
            match self.complete(&expiry).await {
                Ok(()) => completed += 1,
                Err(e) => error!(
                    "Failed to complete {} expiry {} for user {} in guild {}: {:#}",
                    expiry.kind, expiry.id, expiry.user_id, expiry.guild_id, e
                ),
            }
        }
        Ok(completed)
    }

    async fn complete(&self, expiry: &ExpiryRecord) -> anyhow::Result<()> {
        let guild = GuildId::new(expiry.guild_id);
        let user = UserId::new(expiry.user_id);
        debug!(
            "Completing {} expiry {} for user {} in guild {}",
            expiry.kind, expiry.id, expiry.user_id, expiry.guild_id
        );

        let (action, reason, title) = match expiry.kind {
            ExpiryKind::Unban => match self.actions.unban_member(guild, user).await {
                Ok(()) => ("autounban", AUTO_UNBAN_REASON, "✅ Automatic Unban"),
                Err(ActionError::NotBanned) => {
                    info!(
                        "User {} in guild {} was already unbanned; closing expiry {}",
                        expiry.user_id, expiry.guild_id, expiry.id
                    );
                    self.expiries.mark_done(expiry.id).await?;
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            },
            ExpiryKind::VoiceUnmute => {
                match self
                    .actions
                    .set_voice_mute(guild, user, false, AUTO_VOICE_UNMUTE_REASON)
                    .await
                {
                    Ok(()) => (
                        "autovoiceunmute",
                        AUTO_VOICE_UNMUTE_REASON,
                        "🔊 Automatic Voice Unmute",
                    ),
                    Err(ActionError::NotInVoice) => {
                        info!(
                            "User {} left voice in guild {}; closing expiry {}",
                            expiry.user_id, expiry.guild_id, expiry.id
                        );
                        self.expiries.mark_done(expiry.id).await?;
                        return Ok(());
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        };
        self.expiries.mark_done(expiry.id).await?;

        let entry = NewModlogEntry::new(
            expiry.guild_id,
            expiry.user_id,
            self.actions.bot_id().get(),
            action,
        )
        .reason(reason);
        let case_id = self.moderation.record(entry).await?;

        let embed = CreateEmbed::new()
            .title(title)
            .description(format!("<@{}> ({})", expiry.user_id, expiry.user_id))
            .field("Reason", reason, true)
            .field("Case ID", format!("#{}", case_id), true)
            .field("Original Case", format!("#{}", expiry.case_id), true)
            .timestamp(Timestamp::now())
            .color(COLOR_SUCCESS);
        self.moderation
            .notify(self.actions.as_ref(), expiry.guild_id, embed)
            .await;

        Ok(())
    }
}
