//! Stateless detectors. Everything except the caps check expects lowercased content.

use once_cell::sync::Lazy;
use regex::Regex;

/// Caps are only judged on messages longer than this many characters.
pub const CAPS_MIN_LENGTH: usize = 10;

static LINK_PATTERNS: Lazy<[Regex; 3]> = Lazy::new(|| {
    [
        Regex::new(r"https?://\S+").expect("valid link pattern"),
        Regex::new(r"discord\.gg/\S+").expect("valid invite pattern"),
        Regex::new(r"discord\.com/invite/\S+").expect("valid invite pattern"),
    ]
});

static INVITE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"discord\.gg/\S+|discord\.com/invite/\S+").expect("valid invite pattern")
});

/// Percentage of ASCII uppercase letters over the full character count.
pub fn caps_percentage(content: &str) -> f64 {
    let len = content.chars().count();
    if len == 0 {
        return 0.0;
    }
    let caps = content.chars().filter(char::is_ascii_uppercase).count();
    caps as f64 / len as f64 * 100.0
}

pub fn exceeds_caps(content: &str, threshold: u32) -> bool {
    content.chars().count() > CAPS_MIN_LENGTH && caps_percentage(content) > f64::from(threshold)
}

pub fn contains_link(lowered: &str) -> bool {
    LINK_PATTERNS.iter().any(|p| p.is_match(lowered))
}

pub fn contains_invite(lowered: &str) -> bool {
    INVITE_PATTERN.is_match(lowered)
}

/// Counts literal `@` characters, so `@everyone` and user mentions weigh the same.
pub fn mention_count(content: &str) -> usize {
    content.matches('@').count()
}

pub fn contains_banned_word(lowered: &str, words: &[String]) -> bool {
    words
        .iter()
        .map(|w| w.trim())
        .filter(|w| !w.is_empty())
        .any(|w| lowered.contains(&w.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caps_threshold() {
        let shouting = "THIS IS SHOUTING!!";
        assert!(exceeds_caps(shouting, 70));
        assert!(!exceeds_caps(shouting, 90));
        // Short messages are never judged.
        assert!(!exceeds_caps("HELLO", 10));
        assert!(!exceeds_caps("quiet words here", 10));
    }

    #[test]
    fn test_caps_percentage_counts_every_char() {
        assert_eq!(caps_percentage(""), 0.0);
        assert_eq!(caps_percentage("AB  "), 50.0);
    }

    #[test]
    fn test_links_and_invites() {
        assert!(contains_link("see https://example.com now"));
        assert!(contains_link("http://x.y"));
        assert!(contains_link("join discord.gg/abc123"));
        assert!(contains_link("discord.com/invite/abc"));
        assert!(!contains_link("https:// nothing"));
        assert!(!contains_link("plain text"));

        assert!(contains_invite("join discord.gg/abc123"));
        assert!(contains_invite("discord.com/invite/abc"));
        assert!(!contains_invite("https://example.com"));
    }

    #[test]
    fn test_mentions_and_words() {
        assert_eq!(mention_count("@a @b @c"), 3);
        assert_eq!(mention_count("no mentions"), 0);

        let words = vec!["Spam".to_string(), " ".to_string()];
        assert!(contains_banned_word("this is spammy", &words));
        assert!(!contains_banned_word("clean message", &words));
        assert!(!contains_banned_word("anything", &[]));
    }
}
