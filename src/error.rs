use thiserror::Error;

/// Failure of the persistence layer. Never swallowed by the stores themselves.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("database connection lock was poisoned")]
    Poisoned,
    #[error("blocking database task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("invalid stored data: {0}")]
    InvalidData(String),
}

/// Discord JSON error codes the executor translates into dedicated variants.
const UNKNOWN_MEMBER: isize = 10007;
const UNKNOWN_BAN: isize = 10026;
const TARGET_NOT_IN_VOICE: isize = 40032;

/// The platform declined or failed a moderation action.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("discord api error: {0}")]
    Discord(#[from] serenity::Error),
    #[error("timestamp out of range for discord")]
    InvalidTimestamp,
    #[error("bot cannot moderate this member")]
    NotEligible,
    #[error("user is not banned")]
    NotBanned,
    #[error("member is not connected to voice")]
    NotInVoice,
}

impl ActionError {
    fn discord_code(&self) -> Option<isize> {
        match self {
            ActionError::Discord(serenity::Error::Http(
                serenity::http::HttpError::UnsuccessfulRequest(response),
            )) => Some(response.error.code),
            _ => None,
        }
    }

    /// Maps "Unknown Ban" to `NotBanned`; everything else is returned unchanged.
    pub(crate) fn for_unban(self) -> Self {
        match self.discord_code() {
            Some(UNKNOWN_BAN) => ActionError::NotBanned,
            _ => self,
        }
    }

    /// Maps "not connected to voice" and "Unknown Member" to `NotInVoice`.
    pub(crate) fn for_voice(self) -> Self {
        match self.discord_code() {
            Some(TARGET_NOT_IN_VOICE) | Some(UNKNOWN_MEMBER) => ActionError::NotInVoice,
            _ => self,
        }
    }
}
