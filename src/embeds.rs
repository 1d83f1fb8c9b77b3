use crate::automod::{InboundMessage, Trigger};
use crate::config::DISCORD_EMBED_LIMIT;
use crate::db::{GuildSettings, ModlogEntry};
use poise::serenity_prelude as serenity;
use poise::serenity_prelude::{CreateEmbed, CreateEmbedFooter, Timestamp};

pub const COLOR_INFO: u32 = 0x0099ff;
pub const COLOR_AUTOMOD: u32 = 0xff8800;
pub const COLOR_SEVERE: u32 = 0xff0000;
pub const COLOR_SUCCESS: u32 = 0x00ff00;

/// Discord rejects embed field values longer than this.
pub const FIELD_LIMIT: usize = 1024;
const HISTORY_REASON_LIMIT: usize = 256;

/// Shortens `text` to at most `max` characters, marking the cut with an ellipsis.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

pub fn automod_embed(message: &InboundMessage, trigger: &Trigger, case_id: i64) -> CreateEmbed {
    CreateEmbed::new()
        .title("🛡️ Auto-Mod Action")
        .description(format!(
            "**{}** triggered auto-moderation",
            message.author_tag
        ))
        .field("Reason", trigger.feature.label(), true)
        .field("Action", trigger.action.as_str(), true)
        .field("Channel", format!("<#{}>", message.channel_id), true)
        .field("Case ID", format!("#{}", case_id), true)
        .timestamp(Timestamp::now())
        .color(COLOR_AUTOMOD)
}

/// Embed for a manual action, used both as the command reply and in the modlog channel.
pub fn action_embed(
    title: &str,
    color: u32,
    target: &serenity::User,
    moderator: &serenity::User,
    reason: &str,
    case_id: i64,
) -> CreateEmbed {
    CreateEmbed::new()
        .title(title)
        .description(format!("**{}** ({})", target.tag(), target.id))
        .field("Reason", truncate(reason, FIELD_LIMIT), true)
        .field("Moderator", format!("<@{}>", moderator.id), true)
        .field("Case ID", format!("#{}", case_id), true)
        .thumbnail(target.face())
        .timestamp(Timestamp::now())
        .color(color)
}

pub fn case_embed(entry: &ModlogEntry) -> CreateEmbed {
    let mut embed = CreateEmbed::new()
        .title(format!("📋 Case #{}", entry.case_id))
        .field("Action", entry.action.to_uppercase(), true)
        .field("User", format!("<@{}>", entry.user_id), true)
        .field("Moderator", format!("<@{}>", entry.moderator_id), true)
        .field(
            "Reason",
            truncate(
                entry.reason.as_deref().unwrap_or("No reason provided"),
                FIELD_LIMIT,
            ),
            false,
        )
        .field("Date", format!("<t:{}:F>", entry.timestamp.timestamp()), true)
        .color(COLOR_INFO);
    if let Some(duration) = &entry.duration {
        embed = embed.field("Duration", duration, true);
    }
    embed
}

/// One block per entry; `show_user` is off when the listing is already about a single user.
pub fn history_text(entries: &[ModlogEntry], show_user: bool) -> String {
    let mut text = String::new();
    for entry in entries {
        let mut block = format!(
            "**Case #{}** - {} by <@{}>\n",
            entry.case_id,
            entry.action.to_uppercase(),
            entry.moderator_id
        );
        if show_user {
            block.push_str(&format!("└ User: <@{}>\n", entry.user_id));
        }
        block.push_str(&format!(
            "└ Reason: {}\n└ Date: <t:{}:d>\n\n",
            truncate(
                entry.reason.as_deref().unwrap_or("No reason provided"),
                HISTORY_REASON_LIMIT
            ),
            entry.timestamp.timestamp()
        ));

        if text.chars().count() + block.chars().count() > DISCORD_EMBED_LIMIT {
            break;
        }
        text.push_str(&block);
    }
    text
}

pub fn history_embed(title: String, entries: &[ModlogEntry], show_user: bool) -> CreateEmbed {
    CreateEmbed::new()
        .title(title)
        .description(history_text(entries, show_user))
        .footer(CreateEmbedFooter::new(format!(
            "Showing last {} entries",
            entries.len()
        )))
        .color(COLOR_INFO)
}

fn flag(enabled: bool) -> &'static str {
    if enabled {
        "✅"
    } else {
        "❌"
    }
}

pub fn settings_embed(guild_name: &str, settings: &GuildSettings, master_enforced: bool) -> CreateEmbed {
    use crate::db::Feature;

    let status = Feature::EVALUATION_ORDER
        .iter()
        .map(|f| format!("**{}:** {}", f.label(), flag(settings.detector(*f).enabled)))
        .collect::<Vec<_>>()
        .join("\n");
    let actions = Feature::EVALUATION_ORDER
        .iter()
        .map(|f| format!("**{}:** {}", f.label(), settings.detector(*f).action))
        .collect::<Vec<_>>()
        .join("\n");
    let thresholds = format!(
        "**Anti Spam:** {} msgs / 10s\n**Anti Caps:** {}%\n**Mass Mention:** {} mentions",
        settings.antispam_threshold, settings.anticaps_threshold, settings.massmention_threshold
    );
    let master = if master_enforced {
        flag(settings.automod_enabled).to_string()
    } else {
        format!("{} (not enforced)", flag(settings.automod_enabled))
    };

    let mut embed = CreateEmbed::new()
        .title("🛡️ Auto-Mod Settings")
        .description(format!(
            "Current auto-moderation settings for **{}**",
            guild_name
        ))
        .field("📊 Features Status", status, false)
        .field("⚙️ Thresholds", thresholds, true)
        .field("🔨 Actions", actions, true)
        .field("Master Switch", master, true)
        .field(
            "Banned Words",
            format!("{} configured", settings.banned_words.len()),
            true,
        )
        .timestamp(Timestamp::now())
        .color(COLOR_INFO);
    if settings.invite_rule_masked() {
        embed = embed.footer(CreateEmbedFooter::new(
            "Anti Links is enabled, so Anti Invite never fires: invite links are handled by Anti Links.",
        ));
    }
    embed
}
