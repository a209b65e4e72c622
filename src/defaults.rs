//! Default configuration constants for voxbot.
//!
//! Shared by the config layer and by components constructed without a config
//! file (tests, CLI tooling).

/// Default audio sample rate in Hz.
///
/// 16kHz linear PCM is what both the transcription and synthesis services
/// are asked to produce and consume.
pub const SAMPLE_RATE: u32 = 16000;

/// Sample rates the frame classifier accepts.
pub const SUPPORTED_SAMPLE_RATES: [u32; 4] = [8000, 16000, 32000, 48000];

/// Default classifier frame duration in milliseconds.
pub const FRAME_DURATION_MS: u32 = 30;

/// Frame durations the frame classifier accepts.
pub const SUPPORTED_FRAME_DURATIONS_MS: [u32; 3] = [10, 20, 30];

/// Default classifier aggressiveness (0 = permissive, 3 = most conservative).
pub const VAD_AGGRESSIVENESS: u8 = 3;

/// RMS thresholds indexed by aggressiveness.
///
/// Normalized RMS (0.0 to 1.0) a frame must exceed to count as speech.
pub const ENERGY_THRESHOLDS: [f32; 4] = [0.005, 0.01, 0.02, 0.03];

/// Contiguous speech needed before speech is considered started.
pub const SPEECH_THRESHOLD_MS: u32 = 100;

/// Contiguous silence needed before speech is considered ended.
pub const SILENCE_THRESHOLD_MS: u32 = 500;

/// Silence threshold used by the interruption arbiter's own tracker.
///
/// Shorter than [`SILENCE_THRESHOLD_MS`] so a caller who stops talking is
/// released quickly.
pub const BARGE_IN_SILENCE_THRESHOLD_MS: u32 = 300;

/// Default synthesis cache entry lifetime (24 hours).
pub const CACHE_TTL_SECS: u64 = 86_400;

/// Longest accepted synthesis cache entry lifetime (365 days).
pub const MAX_CACHE_TTL_SECS: u64 = 31_536_000;

/// Default maximum number of cached utterances.
pub const CACHE_MAX_ENTRIES: u64 = 10_000;

/// Namespace prefix of every synthesis cache key.
pub const CACHE_KEY_PREFIX: &str = "vox:tts:";

/// Hex characters of the digest kept in a cache key.
pub const CACHE_KEY_DIGEST_LEN: usize = 16;

/// Default synthesis voice.
pub const VOICE_ID: &str = "mallory";

/// Default synthesis speed multiplier.
pub const VOICE_SPEED: f32 = 1.0;

/// Default language model identifier.
pub const LLM_MODEL: &str = "groq/llama-3.1-8b-instant";

/// Default system prompt for new assistants.
pub const SYSTEM_PROMPT: &str = "You are a helpful voice assistant. Keep responses short and conversational.";

/// Default sampling temperature for replies.
pub const LLM_TEMPERATURE: f32 = 0.7;

/// Default token cap per reply; spoken replies stay short.
pub const LLM_MAX_TOKENS: u32 = 256;

/// Default capacity of the audio output queue, in chunks.
pub const OUTPUT_QUEUE_CAPACITY: usize = 256;

/// Default poll interval for blocking waits inside stage loops.
pub const POLL_INTERVAL_MS: u64 = 100;

/// Size of the chunks cached audio is replayed in (100ms at 16kHz).
pub const PLAYBACK_CHUNK_BYTES: usize = 3200;

/// Default HTTP request timeout for hosted services.
pub const HTTP_TIMEOUT_SECS: u64 = 30;

/// Default OpenRouter-compatible chat completions base URL.
pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Default Minimax synthesis base URL.
pub const MINIMAX_BASE_URL: &str = "https://api.minimax.chat/v1";

/// Default Minimax synthesis model.
pub const MINIMAX_MODEL: &str = "speech-01-turbo";

/// Phrases pre-synthesized into the cache for each voice.
pub const COMMON_PHRASES: &[&str] = &[
    // Greetings
    "Hello",
    "Hi there",
    "Good morning",
    "Good afternoon",
    "Good evening",
    "Welcome",
    // Acknowledgements
    "I understand",
    "Got it",
    "Sure thing",
    "Of course",
    "Absolutely",
    "Certainly",
    "Right away",
    // Hold messages
    "One moment please",
    "Please hold",
    "Just a second",
    "Let me check that for you",
    "I'll look into that",
    // Confirmations
    "Yes",
    "No problem",
    "That's correct",
    "Perfect",
    "Great",
    // Clarifications
    "Could you please repeat that?",
    "I didn't catch that",
    "Could you speak a bit slower?",
    // Closings
    "Goodbye",
    "Thank you for calling",
    "Have a great day",
    "Take care",
    "Is there anything else I can help you with?",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn energy_thresholds_increase_with_aggressiveness() {
        for pair in ENERGY_THRESHOLDS.windows(2) {
            assert!(pair[0] < pair[1]);
        }
        assert_eq!(ENERGY_THRESHOLDS.len(), VAD_AGGRESSIVENESS as usize + 1);
    }

    #[test]
    fn default_frame_duration_is_supported() {
        assert!(SUPPORTED_FRAME_DURATIONS_MS.contains(&FRAME_DURATION_MS));
        assert!(SUPPORTED_SAMPLE_RATES.contains(&SAMPLE_RATE));
    }

    #[test]
    fn common_phrases_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for phrase in COMMON_PHRASES {
            assert!(seen.insert(phrase.to_lowercase()), "duplicate: {phrase}");
        }
    }
}
