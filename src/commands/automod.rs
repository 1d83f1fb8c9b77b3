use super::guild_id;
use crate::automod::MasterSwitch;
use crate::db::{AutoModAction, Feature, GuildSettings};
use crate::embeds;
use crate::{Context, Error};
use std::ops::RangeInclusive;
use tracing::info;

/// Configure auto-moderation
#[poise::command(
    slash_command,
    subcommands("view", "enable", "disable", "threshold", "action", "words", "master"),
    required_permissions = "MANAGE_GUILD",
    guild_only
)]
pub async fn automod(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Features that carry a numeric threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, poise::ChoiceParameter)]
pub enum ThresholdFeature {
    #[name = "Anti Spam"]
    AntiSpam,
    #[name = "Anti Caps"]
    AntiCaps,
    #[name = "Mass Mention"]
    MassMention,
}

impl ThresholdFeature {
    pub fn feature(self) -> Feature {
        match self {
            ThresholdFeature::AntiSpam => Feature::AntiSpam,
            ThresholdFeature::AntiCaps => Feature::AntiCaps,
            ThresholdFeature::MassMention => Feature::MassMention,
        }
    }

    /// Accepted values. Caps is a percentage, the others are counts.
    pub fn range(self) -> RangeInclusive<u32> {
        match self {
            ThresholdFeature::AntiSpam => 1..=50,
            ThresholdFeature::AntiCaps => 1..=100,
            ThresholdFeature::MassMention => 1..=50,
        }
    }

    fn unit(self) -> &'static str {
        match self {
            ThresholdFeature::AntiSpam => "messages per 10 seconds",
            ThresholdFeature::AntiCaps => "% uppercase",
            ThresholdFeature::MassMention => "mentions",
        }
    }
}

/// Appended to a reply whenever the invite rule cannot fire.
pub fn masking_note(settings: &GuildSettings) -> &'static str {
    if settings.invite_rule_masked() {
        "\n⚠️ Anti Links is also enabled and runs first, so Anti Invite's action will never be used."
    } else {
        ""
    }
}

/// Normalizes a banned word for storage. `None` if nothing usable remains.
pub fn normalize_word(raw: &str) -> Option<String> {
    let word = raw.trim().to_lowercase();
    if word.is_empty() {
        None
    } else {
        Some(word)
    }
}

/// Show the current auto-moderation settings
#[poise::command(slash_command)]
pub async fn view(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    let settings = ctx.data().moderation.settings_or_defaults(guild_id).await?;
    let guild_name = ctx
        .guild()
        .map(|g| g.name.clone())
        .unwrap_or_else(|| guild_id.to_string());
    let enforced = ctx.data().automod.master_switch() == MasterSwitch::Enforce;

    let embed = embeds::settings_embed(&guild_name, &settings, enforced);
    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Enable an auto-moderation feature
#[poise::command(slash_command)]
pub async fn enable(
    ctx: Context<'_>,
    #[description = "Feature to enable"] feature: Feature,
) -> Result<(), Error> {
    set_enabled(ctx, feature, true).await
}

/// Disable an auto-moderation feature
#[poise::command(slash_command)]
pub async fn disable(
    ctx: Context<'_>,
    #[description = "Feature to disable"] feature: Feature,
) -> Result<(), Error> {
    set_enabled(ctx, feature, false).await
}

async fn set_enabled(ctx: Context<'_>, feature: Feature, enabled: bool) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    let result = ctx
        .data()
        .moderation
        .update_settings(guild_id, move |s| s.detector_mut(feature).enabled = enabled)
        .await;

    match result {
        Ok(settings) => {
            info!(
                "Guild {}: {} {} by {}",
                guild_id,
                feature.key(),
                if enabled { "enabled" } else { "disabled" },
                ctx.author().name
            );
            ctx.say(format!(
                "✅ **{}** has been {}.{}",
                feature.label(),
                if enabled { "enabled" } else { "disabled" },
                masking_note(&settings)
            ))
            .await?;
        }
        Err(e) => {
            ctx.say(format!("❌ Failed to update settings: {}", e)).await?;
        }
    }
    Ok(())
}

/// Set the threshold for a feature
#[poise::command(slash_command)]
pub async fn threshold(
    ctx: Context<'_>,
    #[description = "Feature to configure"] feature: ThresholdFeature,
    #[description = "New threshold"] value: u32,
) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    let range = feature.range();
    if !range.contains(&value) {
        ctx.say(format!(
            "❌ {} threshold must be between {} and {}.",
            feature.feature().label(),
            range.start(),
            range.end()
        ))
        .await?;
        return Ok(());
    }

    let target = feature.feature();
    let result = ctx
        .data()
        .moderation
        .update_settings(guild_id, move |s| {
            s.set_threshold(target, value);
        })
        .await;

    match result {
        Ok(_) => {
            ctx.say(format!(
                "✅ **{}** threshold set to **{}** {}.",
                target.label(),
                value,
                feature.unit()
            ))
            .await?;
        }
        Err(e) => {
            ctx.say(format!("❌ Failed to update settings: {}", e)).await?;
        }
    }
    Ok(())
}

/// Set the action taken when a feature fires
#[poise::command(slash_command)]
pub async fn action(
    ctx: Context<'_>,
    #[description = "Feature to configure"] feature: Feature,
    #[description = "Action to take"] action: AutoModAction,
) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    let result = ctx
        .data()
        .moderation
        .update_settings(guild_id, move |s| s.detector_mut(feature).action = action)
        .await;

    match result {
        Ok(settings) => {
            ctx.say(format!(
                "✅ **{}** will now **{}**.{}",
                feature.label(),
                action,
                masking_note(&settings)
            ))
            .await?;
        }
        Err(e) => {
            ctx.say(format!("❌ Failed to update settings: {}", e)).await?;
        }
    }
    Ok(())
}

/// Manage the word filter list
#[poise::command(slash_command, subcommands("add", "remove", "list"))]
pub async fn words(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Add a word to the filter
#[poise::command(slash_command)]
pub async fn add(
    ctx: Context<'_>,
    #[description = "Word or phrase to block"]
    #[max_length = 100]
    word: String,
) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    let Some(word) = normalize_word(&word) else {
        ctx.say("❌ The word cannot be empty.").await?;
        return Ok(());
    };

    let existing = ctx.data().moderation.ensure_settings(guild_id).await?;
    if existing.banned_words.contains(&word) {
        ctx.say(format!("❌ `{}` is already filtered.", word)).await?;
        return Ok(());
    }

    let stored = word.clone();
    ctx.data()
        .moderation
        .update_settings(guild_id, move |s| {
            if !s.banned_words.contains(&stored) {
                s.banned_words.push(stored);
            }
        })
        .await?;
    ctx.send(
        poise::CreateReply::default()
            .content(format!("✅ Added `{}` to the word filter.", word))
            .ephemeral(true),
    )
    .await?;
    Ok(())
}

/// Remove a word from the filter
#[poise::command(slash_command)]
pub async fn remove(
    ctx: Context<'_>,
    #[description = "Word or phrase to unblock"] word: String,
) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    let Some(word) = normalize_word(&word) else {
        ctx.say("❌ The word cannot be empty.").await?;
        return Ok(());
    };

    let existing = ctx.data().moderation.settings_or_defaults(guild_id).await?;
    if !existing.banned_words.contains(&word) {
        ctx.say(format!("❌ `{}` is not in the word filter.", word))
            .await?;
        return Ok(());
    }

    let stored = word.clone();
    ctx.data()
        .moderation
        .update_settings(guild_id, move |s| s.banned_words.retain(|w| *w != stored))
        .await?;
    ctx.send(
        poise::CreateReply::default()
            .content(format!("✅ Removed `{}` from the word filter.", word))
            .ephemeral(true),
    )
    .await?;
    Ok(())
}

/// List the filtered words
#[poise::command(slash_command)]
pub async fn list(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    let settings = ctx.data().moderation.settings_or_defaults(guild_id).await?;

    let content = if settings.banned_words.is_empty() {
        "📭 The word filter is empty.".to_string()
    } else {
        let words = settings
            .banned_words
            .iter()
            .map(|w| format!("`{}`", w))
            .collect::<Vec<_>>()
            .join(", ");
        format!("🚫 **Filtered words ({}):** {}", settings.banned_words.len(), words)
    };
    // Only moderators should see the list.
    ctx.send(poise::CreateReply::default().content(content).ephemeral(true))
        .await?;
    Ok(())
}

/// Turn the guild-wide auto-moderation switch on or off
#[poise::command(slash_command)]
pub async fn master(
    ctx: Context<'_>,
    #[description = "Whether auto-moderation is on for this server"] enabled: bool,
) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    ctx.data()
        .moderation
        .update_settings(guild_id, move |s| s.automod_enabled = enabled)
        .await?;

    let mut reply = format!(
        "✅ Auto-moderation master switch is now **{}**.",
        if enabled { "on" } else { "off" }
    );
    if ctx.data().automod.master_switch() == MasterSwitch::Ignore {
        reply.push_str(
            "\nℹ️ This bot evaluates each feature on its own flag; the master switch is stored but not enforced.",
        );
    }
    ctx.say(reply).await?;
    Ok(())
}
