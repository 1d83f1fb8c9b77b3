pub mod expiry;
pub mod moderation;
