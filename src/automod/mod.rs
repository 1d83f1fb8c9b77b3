//! Auto-moderation: runs the guild's detectors over every inbound message.

use crate::db::{AutoModAction, Database, Feature, GuildSettings, NewModlogEntry};
use crate::embeds;
use crate::error::{ActionError, StorageError};
use chrono::{Duration, Utc};
use poise::serenity_prelude as serenity;
use poise::serenity_prelude::{ChannelId, GuildId, MessageId, UserId};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub mod actions;
pub mod rules;
pub mod spam;

pub use actions::{Capability, ModerationActions, SerenityActions};
pub use spam::{Clock, SpamTracker, SystemClock};

/// Length of the communication suspension applied by the `timeout` action.
pub const AUTOMOD_TIMEOUT_MINUTES: i64 = 5;

/// How the per-guild `automod_enabled` flag is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MasterSwitch {
    /// The flag is stored but detectors run on their own `enabled` flags alone.
    #[default]
    Ignore,
    /// A guild with the flag off skips every detector, spam tracking included.
    Enforce,
}

impl FromStr for MasterSwitch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ignore" => Ok(MasterSwitch::Ignore),
            "enforce" => Ok(MasterSwitch::Enforce),
            other => Err(format!("unknown master switch policy '{other}'")),
        }
    }
}

impl fmt::Display for MasterSwitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MasterSwitch::Ignore => f.write_str("ignore"),
            MasterSwitch::Enforce => f.write_str("enforce"),
        }
    }
}

/// The parts of a guild message the evaluator looks at.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub message_id: MessageId,
    pub author_id: UserId,
    pub author_tag: String,
    pub content: String,
}

impl InboundMessage {
    /// `None` for DMs and bot authors, which are never moderated.
    pub fn from_message(message: &serenity::Message) -> Option<Self> {
        if message.author.bot {
            return None;
        }
        Some(Self {
            guild_id: message.guild_id?,
            channel_id: message.channel_id,
            message_id: message.id,
            author_id: message.author.id,
            author_tag: message.author.tag(),
            content: message.content.clone(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trigger {
    pub feature: Feature,
    pub action: AutoModAction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoModOutcome {
    pub case_id: i64,
    pub trigger: Trigger,
    /// `false` when the action was skipped (member not eligible) or the platform refused it.
    pub executed: bool,
}

pub struct AutoModEvaluator {
    spam: SpamTracker,
    master_switch: MasterSwitch,
}

impl AutoModEvaluator {
    pub fn new(spam: SpamTracker, master_switch: MasterSwitch) -> Self {
        Self {
            spam,
            master_switch,
        }
    }

    pub fn with_system_clock(capacity: usize, master_switch: MasterSwitch) -> Self {
        Self::new(SpamTracker::new(Arc::new(SystemClock), capacity), master_switch)
    }

    pub fn master_switch(&self) -> MasterSwitch {
        self.master_switch
    }

    /// Picks the first rule that fires, in `Feature::EVALUATION_ORDER`.
    pub fn evaluate(&self, message: &InboundMessage, settings: &GuildSettings) -> Option<Trigger> {
        if self.master_switch == MasterSwitch::Enforce && !settings.automod_enabled {
            return None;
        }

        let lowered = message.content.to_lowercase();
        for feature in Feature::EVALUATION_ORDER {
            let detector = settings.detector(feature);
            if !detector.enabled {
                continue;
            }

            let fired = match feature {
                Feature::AntiSpam => {
                    self.spam.record(message.author_id.get()) > settings.antispam_threshold as usize
                }
                Feature::AntiCaps => rules::exceeds_caps(&message.content, settings.anticaps_threshold),
                Feature::AntiLinks => rules::contains_link(&lowered),
                Feature::AntiInvite => rules::contains_invite(&lowered),
                Feature::MassMention => {
                    rules::mention_count(&lowered) > settings.massmention_threshold as usize
                }
                Feature::WordFilter => rules::contains_banned_word(&lowered, &settings.banned_words),
            };

            if fired {
                return Some(Trigger {
                    feature,
                    action: detector.action,
                });
            }
        }
        None
    }

    /// Evaluates one message end to end: log the case, notify the modlog channel,
    /// then apply the configured action. Only storage failures are returned;
    /// platform failures are logged and reflected in `AutoModOutcome::executed`.
    pub async fn handle_message(
        &self,
        db: &Database,
        actions: &dyn ModerationActions,
        message: &InboundMessage,
    ) -> Result<Option<AutoModOutcome>, StorageError> {
        let guild_id = message.guild_id.get();
        let Some(settings) = db
            .run_blocking(move |db| db.get_guild_settings(guild_id))
            .await?
        else {
            return Ok(None);
        };

        let Some(trigger) = self.evaluate(message, &settings) else {
            return Ok(None);
        };
        info!(
            "Auto-mod: {} fired for user {} in guild {} (action: {})",
            trigger.feature.label(),
            message.author_id,
            message.guild_id,
            trigger.action
        );

        let entry = NewModlogEntry::new(
            guild_id,
            message.author_id.get(),
            actions.bot_id().get(),
            format!("auto_{}", trigger.action),
        )
        .reason(trigger.feature.label());
        let case_id = db.run_blocking(move |db| db.append_modlog(&entry)).await?;

        if let Some(channel_id) = settings.modlog_channel_id {
            let embed = embeds::automod_embed(message, &trigger, case_id);
            if let Err(e) = actions.post_embed(ChannelId::new(channel_id), embed).await {
                warn!("Auto-mod: failed to post case #{} to modlog channel {}: {}", case_id, channel_id, e);
            }
        }

        let executed = match execute(actions, message, &trigger).await {
            Ok(executed) => executed,
            Err(e) => {
                warn!(
                    "Auto-mod: {} action failed for user {} (case #{}): {}",
                    trigger.action, message.author_id, case_id, e
                );
                false
            }
        };

        Ok(Some(AutoModOutcome {
            case_id,
            trigger,
            executed,
        }))
    }
}

async fn execute(
    actions: &dyn ModerationActions,
    message: &InboundMessage,
    trigger: &Trigger,
) -> Result<bool, ActionError> {
    let reason = format!("Auto-mod: {}", trigger.feature.label());
    match trigger.action {
        AutoModAction::Delete => {
            actions
                .delete_message(message.channel_id, message.message_id)
                .await?;
        }
        AutoModAction::Warn => {
            let content = format!(
                "⚠️ <@{}>, your message was flagged by auto-moderation for: **{}**",
                message.author_id,
                trigger.feature.label()
            );
            actions.reply_warning(message, &content).await?;
        }
        AutoModAction::Timeout => {
            if !actions
                .can_moderate(message.guild_id, message.author_id, Capability::Timeout)
                .await
            {
                debug!("Auto-mod: cannot time out {}, skipping", message.author_id);
                return Ok(false);
            }
            let until = Utc::now() + Duration::minutes(AUTOMOD_TIMEOUT_MINUTES);
            actions
                .timeout_member(message.guild_id, message.author_id, until, &reason)
                .await?;
        }
        AutoModAction::Kick => {
            if !actions
                .can_moderate(message.guild_id, message.author_id, Capability::Kick)
                .await
            {
                debug!("Auto-mod: cannot kick {}, skipping", message.author_id);
                return Ok(false);
            }
            actions
                .kick_member(message.guild_id, message.author_id, &reason)
                .await?;
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::actions::testing::{Recorded, RecordingActions, BOT_ID};
    use super::spam::ManualClock;
    use super::*;
    use crate::db::{test_db, Detector};

    const GUILD: u64 = 100;
    const CHANNEL: u64 = 200;
    const MODLOG: u64 = 300;
    const USER: u64 = 400;

    fn message(id: u64, content: &str) -> InboundMessage {
        InboundMessage {
            guild_id: GuildId::new(GUILD),
            channel_id: ChannelId::new(CHANNEL),
            message_id: MessageId::new(id),
            author_id: UserId::new(USER),
            author_tag: "someone".to_string(),
            content: content.to_string(),
        }
    }

    fn evaluator(clock: Arc<ManualClock>, master_switch: MasterSwitch) -> AutoModEvaluator {
        AutoModEvaluator::new(SpamTracker::new(clock, 100), master_switch)
    }

    fn enabled(action: AutoModAction) -> Detector {
        Detector {
            enabled: true,
            action,
        }
    }

    #[test]
    fn test_spam_fires_on_sixth_message_and_resets() {
        let clock = ManualClock::new(0);
        let eval = evaluator(clock.clone(), MasterSwitch::Ignore);
        let settings = GuildSettings {
            antispam: enabled(AutoModAction::Timeout),
            ..GuildSettings::new(GUILD)
        };

        for i in 1..=5 {
            assert_eq!(eval.evaluate(&message(i, "hi"), &settings), None);
            clock.advance(1_000);
        }
        let sixth = eval.evaluate(&message(6, "hi"), &settings);
        assert_eq!(
            sixth,
            Some(Trigger {
                feature: Feature::AntiSpam,
                action: AutoModAction::Timeout
            })
        );

        clock.advance(11_000);
        assert_eq!(eval.evaluate(&message(7, "hi"), &settings), None);
    }

    #[test]
    fn test_caps_threshold_decides() {
        let eval = evaluator(ManualClock::new(0), MasterSwitch::Ignore);
        let mut settings = GuildSettings {
            anticaps: enabled(AutoModAction::Warn),
            ..GuildSettings::new(GUILD)
        };

        let shouting = message(1, "THIS IS SHOUTING!!");
        assert_eq!(
            eval.evaluate(&shouting, &settings).map(|t| t.feature),
            Some(Feature::AntiCaps)
        );
        settings.anticaps_threshold = 90;
        assert_eq!(eval.evaluate(&shouting, &settings), None);
    }

    #[test]
    fn test_links_mask_invites() {
        let eval = evaluator(ManualClock::new(0), MasterSwitch::Ignore);
        let settings = GuildSettings {
            antilinks: enabled(AutoModAction::Delete),
            antiinvite: enabled(AutoModAction::Kick),
            ..GuildSettings::new(GUILD)
        };
        let trigger = eval
            .evaluate(&message(1, "join discord.gg/abc123"), &settings)
            .unwrap();
        assert_eq!(trigger.feature, Feature::AntiLinks);
        assert_eq!(trigger.action, AutoModAction::Delete);

        let invite_only = GuildSettings {
            antiinvite: enabled(AutoModAction::Kick),
            ..GuildSettings::new(GUILD)
        };
        let trigger = eval
            .evaluate(&message(2, "join DISCORD.GG/abc123"), &invite_only)
            .unwrap();
        assert_eq!(trigger.feature, Feature::AntiInvite);
    }

    #[test]
    fn test_mentions_and_word_filter() {
        let eval = evaluator(ManualClock::new(0), MasterSwitch::Ignore);
        let settings = GuildSettings {
            massmention: enabled(AutoModAction::Delete),
            massmention_threshold: 2,
            wordfilter: enabled(AutoModAction::Warn),
            banned_words: vec!["heck".to_string()],
            ..GuildSettings::new(GUILD)
        };

        assert_eq!(eval.evaluate(&message(1, "@a @b"), &settings), None);
        assert_eq!(
            eval.evaluate(&message(2, "@a @b @c"), &settings).map(|t| t.feature),
            Some(Feature::MassMention)
        );
        assert_eq!(
            eval.evaluate(&message(3, "what the HECK"), &settings).map(|t| t.feature),
            Some(Feature::WordFilter)
        );
        assert_eq!(eval.evaluate(&message(4, "spam is fine here"), &settings), None);
    }

    #[test]
    fn test_disabled_rules_are_skipped() {
        let eval = evaluator(ManualClock::new(0), MasterSwitch::Ignore);
        let settings = GuildSettings::new(GUILD);
        let noisy = message(1, "SPAM HTTPS://X.Y @a @b @c @d @e @f discord.gg/x");
        assert_eq!(eval.evaluate(&noisy, &settings), None);
    }

    #[test]
    fn test_master_switch_ignore_runs_detectors() {
        let eval = evaluator(ManualClock::new(0), MasterSwitch::Ignore);
        let settings = GuildSettings {
            automod_enabled: false,
            antilinks: enabled(AutoModAction::Delete),
            ..GuildSettings::new(GUILD)
        };
        assert!(eval.evaluate(&message(1, "https://x.y"), &settings).is_some());
    }

    #[test]
    fn test_master_switch_enforce_short_circuits() {
        let clock = ManualClock::new(0);
        let eval = evaluator(clock, MasterSwitch::Enforce);
        let mut settings = GuildSettings {
            automod_enabled: false,
            antispam: enabled(AutoModAction::Delete),
            antispam_threshold: 1,
            antilinks: enabled(AutoModAction::Delete),
            ..GuildSettings::new(GUILD)
        };
        assert_eq!(eval.evaluate(&message(1, "https://x.y"), &settings), None);
        assert_eq!(eval.evaluate(&message(2, "https://x.y"), &settings), None);

        // No spam history was recorded while the switch was off.
        settings.automod_enabled = true;
        settings.antilinks.enabled = false;
        assert_eq!(eval.evaluate(&message(3, "hello"), &settings), None);
        assert!(eval.evaluate(&message(4, "hello"), &settings).is_some());
    }

    #[test]
    fn test_master_switch_parsing() {
        assert_eq!("Enforce".parse::<MasterSwitch>(), Ok(MasterSwitch::Enforce));
        assert_eq!(" ignore ".parse::<MasterSwitch>(), Ok(MasterSwitch::Ignore));
        assert!("maybe".parse::<MasterSwitch>().is_err());
    }

    #[tokio::test]
    async fn test_absent_settings_disable_automod() {
        let db = test_db();
        let eval = evaluator(ManualClock::new(0), MasterSwitch::Ignore);
        let actions = RecordingActions::new();

        let outcome = eval
            .handle_message(&db, &actions, &message(1, "https://spam.example"))
            .await
            .unwrap();
        assert!(outcome.is_none());
        assert!(actions.calls().is_empty());
        assert!(db.get_guild_settings(GUILD).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_overlapping_rules_log_exactly_once() {
        let db = test_db();
        db.upsert_guild_settings(&GuildSettings {
            antilinks: enabled(AutoModAction::Delete),
            antiinvite: enabled(AutoModAction::Warn),
            modlog_channel_id: Some(MODLOG),
            ..GuildSettings::new(GUILD)
        })
        .unwrap();
        let eval = evaluator(ManualClock::new(0), MasterSwitch::Ignore);
        let actions = RecordingActions::new();

        let outcome = eval
            .handle_message(&db, &actions, &message(55, "discord.gg/abc123"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome.case_id, 1);
        assert_eq!(outcome.trigger.feature, Feature::AntiLinks);
        assert!(outcome.executed);

        let log = db.get_guild_modlog(GUILD, 10).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].action, "auto_delete");
        assert_eq!(log[0].reason.as_deref(), Some("Anti Links"));
        assert_eq!(log[0].moderator_id, BOT_ID);
        assert_eq!(log[0].user_id, USER);

        assert_eq!(
            actions.calls(),
            vec![
                Recorded::Embed(ChannelId::new(MODLOG)),
                Recorded::Delete(MessageId::new(55)),
            ]
        );
    }

    #[tokio::test]
    async fn test_warn_is_posted_in_channel() {
        let db = test_db();
        db.upsert_guild_settings(&GuildSettings {
            wordfilter: enabled(AutoModAction::Warn),
            ..GuildSettings::new(GUILD)
        })
        .unwrap();
        let eval = evaluator(ManualClock::new(0), MasterSwitch::Ignore);
        let actions = RecordingActions::new();

        eval.handle_message(&db, &actions, &message(1, "buy spam"))
            .await
            .unwrap();
        let calls = actions.calls();
        assert_eq!(calls.len(), 1);
        match &calls[0] {
            Recorded::Warn(text) => {
                assert!(text.contains(&format!("<@{}>", USER)));
                assert!(text.contains("Word Filter"));
            }
            other => panic!("expected a warning, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_ineligible_member_is_skipped_but_logged() {
        let db = test_db();
        db.upsert_guild_settings(&GuildSettings {
            antilinks: enabled(AutoModAction::Kick),
            ..GuildSettings::new(GUILD)
        })
        .unwrap();
        let eval = evaluator(ManualClock::new(0), MasterSwitch::Ignore);
        let mut actions = RecordingActions::new();
        actions.eligible = false;

        let outcome = eval
            .handle_message(&db, &actions, &message(1, "http://x.y"))
            .await
            .unwrap()
            .unwrap();
        assert!(!outcome.executed);
        assert!(actions.calls().is_empty());
        assert_eq!(db.get_guild_modlog(GUILD, 10).unwrap()[0].action, "auto_kick");
    }

    #[tokio::test]
    async fn test_timeout_applies_when_eligible() {
        let db = test_db();
        db.upsert_guild_settings(&GuildSettings {
            antilinks: enabled(AutoModAction::Timeout),
            ..GuildSettings::new(GUILD)
        })
        .unwrap();
        let eval = evaluator(ManualClock::new(0), MasterSwitch::Ignore);
        let actions = RecordingActions::new();

        eval.handle_message(&db, &actions, &message(1, "http://x.y"))
            .await
            .unwrap();
        assert_eq!(actions.calls(), vec![Recorded::Timeout(UserId::new(USER))]);
    }

    #[tokio::test]
    async fn test_platform_failures_do_not_roll_back() {
        let db = test_db();
        db.upsert_guild_settings(&GuildSettings {
            antilinks: enabled(AutoModAction::Delete),
            modlog_channel_id: Some(MODLOG),
            ..GuildSettings::new(GUILD)
        })
        .unwrap();
        let eval = evaluator(ManualClock::new(0), MasterSwitch::Ignore);
        let mut actions = RecordingActions::new();
        actions.fail_delete = true;
        actions.fail_embed = true;

        let outcome = eval
            .handle_message(&db, &actions, &message(1, "http://x.y"))
            .await
            .unwrap()
            .unwrap();
        assert!(!outcome.executed);
        assert_eq!(db.get_guild_modlog(GUILD, 10).unwrap().len(), 1);

        // The next trigger still gets the next case number.
        let outcome = eval
            .handle_message(&db, &actions, &message(2, "http://x.y"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome.case_id, 2);
    }
}
