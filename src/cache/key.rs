//! Content-addressed cache keys.

use crate::defaults::{CACHE_KEY_DIGEST_LEN, CACHE_KEY_PREFIX};
use sha2::{Digest, Sha256};

/// Key under which one (text, voice, speed) rendition is stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Store key: `vox:tts:{voice}:{digest prefix}`.
    pub key: String,
    /// Full hex SHA-256 of the normalized request, kept to detect prefix collisions.
    pub digest: String,
}

/// Trim and lowercase so equivalent requests collide.
pub fn normalize_text(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Render speed the same way for every caller (`1.0`, `1.2`).
fn format_speed(speed: f32) -> String {
    format!("{:?}", speed)
}

impl CacheKey {
    pub fn new(text: &str, voice_id: &str, speed: f32) -> Self {
        let content = format!(
            "{}:{}:{}",
            normalize_text(text),
            voice_id,
            format_speed(speed)
        );
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        let digest = format!("{:x}", hasher.finalize());
        let key = format!(
            "{}{}:{}",
            CACHE_KEY_PREFIX,
            voice_id,
            &digest[..CACHE_KEY_DIGEST_LEN]
        );
        Self { key, digest }
    }
}

/// Prefix covering every key of one voice, or every key when `voice_id` is `None`.
pub fn key_prefix(voice_id: Option<&str>) -> String {
    match voice_id {
        Some(voice) => format!("{}{}:", CACHE_KEY_PREFIX, voice),
        None => CACHE_KEY_PREFIX.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_deterministic() {
        assert_eq!(
            CacheKey::new("Hello", "mallory", 1.0),
            CacheKey::new("Hello", "mallory", 1.0)
        );
    }

    #[test]
    fn key_layout() {
        let key = CacheKey::new("Hello", "mallory", 1.0);
        assert!(key.key.starts_with("vox:tts:mallory:"));
        assert_eq!(key.key.len(), "vox:tts:mallory:".len() + 16);
        assert_eq!(key.digest.len(), 64);
        assert!(key.digest.starts_with(&key.key["vox:tts:mallory:".len()..]));
    }

    #[test]
    fn key_ignores_case_and_surrounding_whitespace() {
        assert_eq!(
            CacheKey::new("  Hello There ", "mallory", 1.0),
            CacheKey::new("hello there", "mallory", 1.0)
        );
    }

    #[test]
    fn key_distinguishes_voice_and_speed() {
        let base = CacheKey::new("Hello", "mallory", 1.0);
        assert_ne!(base, CacheKey::new("Hello", "orion", 1.0));
        assert_ne!(base, CacheKey::new("Hello", "mallory", 1.2));
    }

    #[test]
    fn digest_matches_known_sha256() {
        // sha256("hello:mallory:1.0")
        let mut hasher = Sha256::new();
        hasher.update(b"hello:mallory:1.0");
        let expected = format!("{:x}", hasher.finalize());
        assert_eq!(CacheKey::new("Hello", "mallory", 1.0).digest, expected);
    }

    #[test]
    fn speed_formatting_keeps_decimal() {
        assert_eq!(format_speed(1.0), "1.0");
        assert_eq!(format_speed(1.2), "1.2");
    }

    #[test]
    fn prefixes() {
        assert_eq!(key_prefix(Some("mallory")), "vox:tts:mallory:");
        assert_eq!(key_prefix(None), "vox:tts:");
    }
}
