//! voxbot - real-time spoken conversation core
//!
//! Caller audio in, bot speech out: frame classification, barge-in,
//! sentence-by-sentence synthesis with a cache, and the threads tying them
//! together.

// Enforce error handling discipline
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
pub mod cache;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
pub mod error;
pub mod pipeline;
pub mod services;

// Collaborators (recognize → generate → synthesize → transport)
pub use services::{LanguageModel, MediaTransport, SpeechRecognizer, SpeechSynthesizer};

// Conversation
pub use pipeline::orchestrator::{Services, VoiceBot, VoiceBotHandle};
pub use pipeline::barge_in::InterruptionArbiter;
pub use cache::SynthesisCache;

// Audio
pub use audio::classifier::{EnergyClassifier, FrameClassifier};
pub use audio::tracker::{SpeechActivityTracker, SpeechEvent};

// Error handling
pub use error::{Result, VoxbotError};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
