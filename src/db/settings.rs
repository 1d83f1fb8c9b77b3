use super::{Database, Result};
use crate::error::StorageError;
use rusqlite::{params, Row};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

pub const DEFAULT_PREFIX: &str = "!";
pub const DEFAULT_ANTISPAM_THRESHOLD: u32 = 5;
pub const DEFAULT_ANTICAPS_THRESHOLD: u32 = 70;
pub const DEFAULT_MASSMENTION_THRESHOLD: u32 = 5;
pub const DEFAULT_BANNED_WORDS: &[&str] = &["spam", "badword"];

/// What the auto-moderator does to a member whose message fired a rule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, poise::ChoiceParameter)]
pub enum AutoModAction {
    #[default]
    #[name = "Delete Message"]
    Delete,
    #[name = "Warn User"]
    Warn,
    #[name = "Timeout User"]
    Timeout,
    #[name = "Kick User"]
    Kick,
}

impl AutoModAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AutoModAction::Delete => "delete",
            AutoModAction::Warn => "warn",
            AutoModAction::Timeout => "timeout",
            AutoModAction::Kick => "kick",
        }
    }
}

impl fmt::Display for AutoModAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AutoModAction {
    type Err = StorageError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "delete" => Ok(AutoModAction::Delete),
            "warn" => Ok(AutoModAction::Warn),
            "timeout" => Ok(AutoModAction::Timeout),
            "kick" => Ok(AutoModAction::Kick),
            other => Err(StorageError::InvalidData(format!(
                "unknown automod action '{other}'"
            ))),
        }
    }
}

/// The six auto-moderation detectors, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, poise::ChoiceParameter)]
pub enum Feature {
    #[name = "Anti Spam"]
    AntiSpam,
    #[name = "Anti Caps"]
    AntiCaps,
    #[name = "Anti Links"]
    AntiLinks,
    #[name = "Anti Invite"]
    AntiInvite,
    #[name = "Mass Mention"]
    MassMention,
    #[name = "Word Filter"]
    WordFilter,
}

impl Feature {
    pub const EVALUATION_ORDER: [Feature; 6] = [
        Feature::AntiSpam,
        Feature::AntiCaps,
        Feature::AntiLinks,
        Feature::AntiInvite,
        Feature::MassMention,
        Feature::WordFilter,
    ];

    /// Human-readable rule name, also used as the modlog reason.
    pub fn label(&self) -> &'static str {
        match self {
            Feature::AntiSpam => "Anti Spam",
            Feature::AntiCaps => "Anti Caps",
            Feature::AntiLinks => "Anti Links",
            Feature::AntiInvite => "Anti Invite",
            Feature::MassMention => "Mass Mention",
            Feature::WordFilter => "Word Filter",
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            Feature::AntiSpam => "antispam",
            Feature::AntiCaps => "anticaps",
            Feature::AntiLinks => "antilinks",
            Feature::AntiInvite => "antiinvite",
            Feature::MassMention => "massmention",
            Feature::WordFilter => "wordfilter",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Detector {
    pub enabled: bool,
    pub action: AutoModAction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildSettings {
    pub guild_id: u64,
    /// Master switch. Whether the evaluator honors it is decided by `MasterSwitch`.
    pub automod_enabled: bool,
    pub antispam: Detector,
    pub antispam_threshold: u32,
    pub anticaps: Detector,
    pub anticaps_threshold: u32,
    pub antilinks: Detector,
    pub antiinvite: Detector,
    pub massmention: Detector,
    pub massmention_threshold: u32,
    pub wordfilter: Detector,
    pub banned_words: Vec<String>,
    pub modlog_channel_id: Option<u64>,
    pub welcome_channel_id: Option<u64>,
    pub prefix: String,
}

impl GuildSettings {
    /// Documented defaults: everything disabled, every action `delete`.
    pub fn new(guild_id: u64) -> Self {
        Self {
            guild_id,
            automod_enabled: false,
            antispam: Detector::default(),
            antispam_threshold: DEFAULT_ANTISPAM_THRESHOLD,
            anticaps: Detector::default(),
            anticaps_threshold: DEFAULT_ANTICAPS_THRESHOLD,
            antilinks: Detector::default(),
            antiinvite: Detector::default(),
            massmention: Detector::default(),
            massmention_threshold: DEFAULT_MASSMENTION_THRESHOLD,
            wordfilter: Detector::default(),
            banned_words: DEFAULT_BANNED_WORDS.iter().map(|w| w.to_string()).collect(),
            modlog_channel_id: None,
            welcome_channel_id: None,
            prefix: DEFAULT_PREFIX.to_string(),
        }
    }

    pub fn detector(&self, feature: Feature) -> &Detector {
        match feature {
            Feature::AntiSpam => &self.antispam,
            Feature::AntiCaps => &self.anticaps,
            Feature::AntiLinks => &self.antilinks,
            Feature::AntiInvite => &self.antiinvite,
            Feature::MassMention => &self.massmention,
            Feature::WordFilter => &self.wordfilter,
        }
    }

    pub fn detector_mut(&mut self, feature: Feature) -> &mut Detector {
        match feature {
            Feature::AntiSpam => &mut self.antispam,
            Feature::AntiCaps => &mut self.anticaps,
            Feature::AntiLinks => &mut self.antilinks,
            Feature::AntiInvite => &mut self.antiinvite,
            Feature::MassMention => &mut self.massmention,
            Feature::WordFilter => &mut self.wordfilter,
        }
    }

    pub fn threshold(&self, feature: Feature) -> Option<u32> {
        match feature {
            Feature::AntiSpam => Some(self.antispam_threshold),
            Feature::AntiCaps => Some(self.anticaps_threshold),
            Feature::MassMention => Some(self.massmention_threshold),
            _ => None,
        }
    }

    /// Returns `false` when the feature has no threshold.
    pub fn set_threshold(&mut self, feature: Feature, value: u32) -> bool {
        let slot = match feature {
            Feature::AntiSpam => &mut self.antispam_threshold,
            Feature::AntiCaps => &mut self.anticaps_threshold,
            Feature::MassMention => &mut self.massmention_threshold,
            _ => return false,
        };
        *slot = value;
        true
    }

    /// Anti-invite never fires while anti-links is enabled, since every
    /// invite URL is also a link and anti-links is evaluated first.
    pub fn invite_rule_masked(&self) -> bool {
        self.antilinks.enabled && self.antiinvite.enabled
    }

    fn validate(&self) -> Result<()> {
        for feature in Feature::EVALUATION_ORDER {
            if self.threshold(feature) == Some(0) {
                return Err(StorageError::InvalidData(format!(
                    "{} threshold must be positive",
                    feature.key()
                )));
            }
        }
        Ok(())
    }
}

fn parse_id(raw: Option<String>) -> Result<Option<u64>> {
    raw.map(|s| {
        s.parse::<u64>()
            .map_err(|_| StorageError::InvalidData(format!("invalid snowflake '{s}'")))
    })
    .transpose()
}

fn read_detector(row: &Row<'_>, enabled: &str, action: &str) -> Result<Detector> {
    let action: String = row.get(action)?;
    Ok(Detector {
        enabled: row.get(enabled)?,
        action: action.parse()?,
    })
}

fn read_threshold(row: &Row<'_>, column: &str) -> Result<u32> {
    let value: i64 = row.get(column)?;
    u32::try_from(value)
        .map_err(|_| StorageError::InvalidData(format!("{column} out of range: {value}")))
}

fn settings_from_row(row: &Row<'_>) -> Result<GuildSettings> {
    let guild_id: String = row.get("guild_id")?;
    let words: String = row.get("wordfilter_words")?;
    let banned_words: Vec<String> = serde_json::from_str(&words)
        .map_err(|e| StorageError::InvalidData(format!("wordfilter_words: {e}")))?;

    Ok(GuildSettings {
        guild_id: parse_id(Some(guild_id))?.unwrap_or_default(),
        automod_enabled: row.get("automod_enabled")?,
        antispam: read_detector(row, "antispam_enabled", "antispam_action")?,
        antispam_threshold: read_threshold(row, "antispam_threshold")?,
        anticaps: read_detector(row, "anticaps_enabled", "anticaps_action")?,
        anticaps_threshold: read_threshold(row, "anticaps_threshold")?,
        antilinks: read_detector(row, "antilinks_enabled", "antilinks_action")?,
        antiinvite: read_detector(row, "antiinvite_enabled", "antiinvite_action")?,
        massmention: read_detector(row, "massmention_enabled", "massmention_action")?,
        massmention_threshold: read_threshold(row, "massmention_threshold")?,
        wordfilter: read_detector(row, "wordfilter_enabled", "wordfilter_action")?,
        banned_words,
        modlog_channel_id: parse_id(row.get("modlog_channel_id")?)?,
        welcome_channel_id: parse_id(row.get("welcome_channel_id")?)?,
        prefix: row.get("prefix")?,
    })
}

impl Database {
    pub fn get_guild_settings(&self, guild_id: u64) -> Result<Option<GuildSettings>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT * FROM guild_settings WHERE guild_id = ?1")?;
        let mut rows = stmt.query([guild_id.to_string()])?;

        match rows.next()? {
            Some(row) => Ok(Some(settings_from_row(row)?)),
            None => Ok(None),
        }
    }

    /// Full replace-or-insert of the guild's row. Last writer wins.
    pub fn upsert_guild_settings(&self, settings: &GuildSettings) -> Result<()> {
        settings.validate()?;
        let words = serde_json::to_string(&settings.banned_words)
            .map_err(|e| StorageError::InvalidData(format!("wordfilter_words: {e}")))?;
        debug!("Database: Upserting settings for guild {}", settings.guild_id);

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO guild_settings (
                guild_id, automod_enabled,
                antispam_enabled, antispam_threshold, antispam_action,
                anticaps_enabled, anticaps_threshold, anticaps_action,
                antilinks_enabled, antilinks_action,
                antiinvite_enabled, antiinvite_action,
                wordfilter_enabled, wordfilter_action, wordfilter_words,
                massmention_enabled, massmention_threshold, massmention_action,
                modlog_channel_id, welcome_channel_id, prefix, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, CURRENT_TIMESTAMP)
             ON CONFLICT(guild_id) DO UPDATE SET
                automod_enabled = excluded.automod_enabled,
                antispam_enabled = excluded.antispam_enabled,
                antispam_threshold = excluded.antispam_threshold,
                antispam_action = excluded.antispam_action,
                anticaps_enabled = excluded.anticaps_enabled,
                anticaps_threshold = excluded.anticaps_threshold,
                anticaps_action = excluded.anticaps_action,
                antilinks_enabled = excluded.antilinks_enabled,
                antilinks_action = excluded.antilinks_action,
                antiinvite_enabled = excluded.antiinvite_enabled,
                antiinvite_action = excluded.antiinvite_action,
                wordfilter_enabled = excluded.wordfilter_enabled,
                wordfilter_action = excluded.wordfilter_action,
                wordfilter_words = excluded.wordfilter_words,
                massmention_enabled = excluded.massmention_enabled,
                massmention_threshold = excluded.massmention_threshold,
                massmention_action = excluded.massmention_action,
                modlog_channel_id = excluded.modlog_channel_id,
                welcome_channel_id = excluded.welcome_channel_id,
                prefix = excluded.prefix,
                updated_at = CURRENT_TIMESTAMP",
            params![
                settings.guild_id.to_string(),
                settings.automod_enabled,
                settings.antispam.enabled,
                settings.antispam_threshold,
                settings.antispam.action.as_str(),
                settings.anticaps.enabled,
                settings.anticaps_threshold,
                settings.anticaps.action.as_str(),
                settings.antilinks.enabled,
                settings.antilinks.action.as_str(),
                settings.antiinvite.enabled,
                settings.antiinvite.action.as_str(),
                settings.wordfilter.enabled,
                settings.wordfilter.action.as_str(),
                words,
                settings.massmention.enabled,
                settings.massmention_threshold,
                settings.massmention.action.as_str(),
                settings.modlog_channel_id.map(|id| id.to_string()),
                settings.welcome_channel_id.map(|id| id.to_string()),
                settings.prefix,
            ],
        )?;
        Ok(())
    }

    /// Returns the guild's settings, materializing the defaults if no row exists yet.
    pub fn ensure_guild_settings(&self, guild_id: u64) -> Result<GuildSettings> {
        let defaults = GuildSettings::new(guild_id);
        let words = serde_json::to_string(&defaults.banned_words)
            .map_err(|e| StorageError::InvalidData(format!("wordfilter_words: {e}")))?;
        {
            let conn = self.conn()?;
            conn.execute(
                "INSERT OR IGNORE INTO guild_settings (guild_id, wordfilter_words) VALUES (?1, ?2)",
                (guild_id.to_string(), words),
            )?;
        }
        self.get_guild_settings(guild_id)?
            .ok_or_else(|| StorageError::InvalidData(format!("settings row for {guild_id} vanished")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;

    #[test]
    fn test_absent_guild_has_no_settings() {
        let db = test_db();
        assert!(db.get_guild_settings(42).unwrap().is_none());
        assert_eq!(AutoModAction::default(), AutoModAction::Delete);
    }

    #[test]
    fn test_upsert_merges_with_defaults() {
        let db = test_db();
        let settings = GuildSettings {
            antispam: Detector {
                enabled: true,
                action: AutoModAction::Timeout,
            },
            antispam_threshold: 3,
            modlog_channel_id: Some(999),
            ..GuildSettings::new(42)
        };
        db.upsert_guild_settings(&settings).unwrap();

        let stored = db.get_guild_settings(42).unwrap().unwrap();
        assert_eq!(stored, settings);
        assert_eq!(stored.prefix, "!");
        assert_eq!(stored.anticaps_threshold, 70);
        assert_eq!(stored.massmention_threshold, 5);
        assert_eq!(stored.anticaps.action, AutoModAction::Delete);
        assert!(!stored.wordfilter.enabled);
        assert_eq!(stored.banned_words, vec!["spam", "badword"]);
    }

    #[test]
    fn test_upsert_replaces_whole_row() {
        let db = test_db();
        let mut first = GuildSettings::new(7);
        first.anticaps.enabled = true;
        first.welcome_channel_id = Some(5);
        db.upsert_guild_settings(&first).unwrap();

        // Second write omits the welcome channel and caps flag: no merge with the first.
        let second = GuildSettings {
            prefix: "?".to_string(),
            ..GuildSettings::new(7)
        };
        db.upsert_guild_settings(&second).unwrap();

        let stored = db.get_guild_settings(7).unwrap().unwrap();
        assert_eq!(stored, second);
        assert!(!stored.anticaps.enabled);
        assert_eq!(stored.welcome_channel_id, None);
    }

    #[test]
    fn test_zero_threshold_rejected_and_prior_row_kept() {
        let db = test_db();
        db.upsert_guild_settings(&GuildSettings::new(1)).unwrap();

        let mut bad = GuildSettings::new(1);
        bad.massmention_threshold = 0;
        bad.prefix = "$".to_string();
        let err = db.upsert_guild_settings(&bad).unwrap_err();
        assert!(matches!(err, StorageError::InvalidData(_)));

        assert_eq!(db.get_guild_settings(1).unwrap().unwrap().prefix, "!");
    }

    #[test]
    fn test_ensure_defaults_materializes_once() {
        let db = test_db();
        let created = db.ensure_guild_settings(5).unwrap();
        assert_eq!(created, GuildSettings::new(5));

        let mut changed = created.clone();
        changed.antilinks.enabled = true;
        db.upsert_guild_settings(&changed).unwrap();

        // A second call returns the existing row untouched.
        let again = db.ensure_guild_settings(5).unwrap();
        assert!(again.antilinks.enabled);
    }

    #[test]
    fn test_unknown_action_is_invalid_data() {
        let db = test_db();
        db.ensure_guild_settings(3).unwrap();
        {
            let conn = db.conn().unwrap();
            conn.execute(
                "UPDATE guild_settings SET antispam_action = 'explode' WHERE guild_id = '3'",
                [],
            )
            .unwrap();
        }
        assert!(matches!(
            db.get_guild_settings(3),
            Err(StorageError::InvalidData(_))
        ));
    }

    #[test]
    fn test_feature_accessors() {
        let mut settings = GuildSettings::new(1);
        assert!(settings.set_threshold(Feature::AntiCaps, 90));
        assert_eq!(settings.threshold(Feature::AntiCaps), Some(90));
        assert!(!settings.set_threshold(Feature::AntiLinks, 3));
        assert_eq!(settings.threshold(Feature::WordFilter), None);

        settings.detector_mut(Feature::AntiInvite).enabled = true;
        assert!(!settings.invite_rule_masked());
        settings.detector_mut(Feature::AntiLinks).enabled = true;
        assert!(settings.invite_rule_masked());
    }
}
