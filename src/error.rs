//! Error types for voxbot.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoxbotError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Audio errors
    #[error("Audio format mismatch: expected {expected}, got {actual}")]
    AudioFormatMismatch { expected: String, actual: String },

    #[error("Audio file error: {message}")]
    AudioFile { message: String },

    // Collaborator errors
    #[error("Transcription error: {message}")]
    Transcription { message: String },

    #[error("Language model error: {message}")]
    LanguageModel { message: String },

    #[error("Speech synthesis error: {message}")]
    Synthesis { message: String },

    #[error("Media transport error: {message}")]
    Transport { message: String },

    /// The inbound stream ended; loops reading from it should exit cleanly.
    #[error("{source_name} closed")]
    Closed { source_name: String },

    #[error("Cache store error: {message}")]
    CacheStore { message: String },

    #[error("Connection pool is closed")]
    PoolClosed,

    #[cfg(feature = "http")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl VoxbotError {
    /// True when the error reports an orderly end of an inbound stream.
    pub fn is_closed(&self) -> bool {
        matches!(self, VoxbotError::Closed { .. })
    }
}

pub type Result<T> = std::result::Result<T, VoxbotError>;
