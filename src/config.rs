use crate::defaults;
use crate::error::VoxbotError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
#[cfg(feature = "cli")]
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub audio: AudioConfig,
    pub vad: VadConfig,
    pub cache: CacheConfig,
    pub assistant: AssistantConfig,
    pub pipeline: PipelineConfig,
    pub services: ServicesConfig,
}

/// Inbound audio format and frame classification
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub frame_duration_ms: u32,
    pub vad_aggressiveness: u8,
}

/// Speech activity hysteresis
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VadConfig {
    pub speech_threshold_ms: u32,
    pub silence_threshold_ms: u32,
    pub barge_in_silence_ms: u32,
}

/// Synthesis cache
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl_secs: u64,
    pub max_entries: u64,
}

/// Per-assistant conversation settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AssistantConfig {
    pub voice_id: String,
    pub speed: f32,
    pub llm_model: String,
    pub system_prompt: String,
    pub first_message: Option<String>,
}

/// Stage plumbing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    pub output_queue_capacity: usize,
    pub poll_interval_ms: u64,
    pub playback_chunk_bytes: usize,
}

/// Hosted service endpoints
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ServicesConfig {
    pub openrouter: OpenRouterConfig,
    pub minimax: MinimaxConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OpenRouterConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MinimaxConfig {
    pub api_key: Option<String>,
    pub group_id: Option<String>,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: defaults::SAMPLE_RATE,
            frame_duration_ms: defaults::FRAME_DURATION_MS,
            vad_aggressiveness: defaults::VAD_AGGRESSIVENESS,
        }
    }
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            speech_threshold_ms: defaults::SPEECH_THRESHOLD_MS,
            silence_threshold_ms: defaults::SILENCE_THRESHOLD_MS,
            barge_in_silence_ms: defaults::BARGE_IN_SILENCE_THRESHOLD_MS,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: defaults::CACHE_TTL_SECS,
            max_entries: defaults::CACHE_MAX_ENTRIES,
        }
    }
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            voice_id: defaults::VOICE_ID.to_string(),
            speed: defaults::VOICE_SPEED,
            llm_model: defaults::LLM_MODEL.to_string(),
            system_prompt: defaults::SYSTEM_PROMPT.to_string(),
            first_message: None,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_queue_capacity: defaults::OUTPUT_QUEUE_CAPACITY,
            poll_interval_ms: defaults::POLL_INTERVAL_MS,
            playback_chunk_bytes: defaults::PLAYBACK_CHUNK_BYTES,
        }
    }
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: defaults::OPENROUTER_BASE_URL.to_string(),
            temperature: defaults::LLM_TEMPERATURE,
            max_tokens: defaults::LLM_MAX_TOKENS,
            timeout_secs: defaults::HTTP_TIMEOUT_SECS,
        }
    }
}

impl Default for MinimaxConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            group_id: None,
            base_url: defaults::MINIMAX_BASE_URL.to_string(),
            model: defaults::MINIMAX_MODEL.to_string(),
            timeout_secs: defaults::HTTP_TIMEOUT_SECS,
        }
    }
}

impl CacheConfig {
    /// Entry lifetime, capped at [`defaults::MAX_CACHE_TTL_SECS`].
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs.min(defaults::MAX_CACHE_TTL_SECS))
    }
}

impl PipelineConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML or invalid values.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Returns errors for invalid TOML.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e)
                if e.downcast_ref::<std::io::Error>()
                    .is_some_and(|io_err| io_err.kind() == std::io::ErrorKind::NotFound) =>
            {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e.context(format!("Failed to load config from {}", path.display()))),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - VOXBOT_VOICE → assistant.voice_id
    /// - VOXBOT_LLM_MODEL → assistant.llm_model
    /// - VOXBOT_CACHE_ENABLED → cache.enabled ("0"/"false" disables)
    /// - OPENROUTER_API_KEY → services.openrouter.api_key
    /// - MINIMAX_API_KEY → services.minimax.api_key
    /// - MINIMAX_GROUP_ID → services.minimax.group_id
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(voice) = std::env::var("VOXBOT_VOICE")
            && !voice.is_empty()
        {
            self.assistant.voice_id = voice;
        }

        if let Ok(model) = std::env::var("VOXBOT_LLM_MODEL")
            && !model.is_empty()
        {
            self.assistant.llm_model = model;
        }

        if let Ok(enabled) = std::env::var("VOXBOT_CACHE_ENABLED")
            && !enabled.is_empty()
        {
            self.cache.enabled = !matches!(enabled.to_lowercase().as_str(), "0" | "false" | "no");
        }

        if let Ok(key) = std::env::var("OPENROUTER_API_KEY")
            && !key.is_empty()
        {
            self.services.openrouter.api_key = Some(key);
        }

        if let Ok(key) = std::env::var("MINIMAX_API_KEY")
            && !key.is_empty()
        {
            self.services.minimax.api_key = Some(key);
        }

        if let Ok(group) = std::env::var("MINIMAX_GROUP_ID")
            && !group.is_empty()
        {
            self.services.minimax.group_id = Some(group);
        }

        self
    }

    /// Check values the frame classifier and stage loops depend on.
    pub fn validate(&self) -> Result<(), VoxbotError> {
        if !defaults::SUPPORTED_SAMPLE_RATES.contains(&self.audio.sample_rate) {
            return Err(invalid(
                "audio.sample_rate",
                format!(
                    "{} Hz is not one of {:?}",
                    self.audio.sample_rate,
                    defaults::SUPPORTED_SAMPLE_RATES
                ),
            ));
        }
        if !defaults::SUPPORTED_FRAME_DURATIONS_MS.contains(&self.audio.frame_duration_ms) {
            return Err(invalid(
                "audio.frame_duration_ms",
                format!("{} ms is not one of 10, 20, 30", self.audio.frame_duration_ms),
            ));
        }
        if usize::from(self.audio.vad_aggressiveness) >= defaults::ENERGY_THRESHOLDS.len() {
            return Err(invalid(
                "audio.vad_aggressiveness",
                format!("{} is outside 0..=3", self.audio.vad_aggressiveness),
            ));
        }
        if self.assistant.speed <= 0.0 || !self.assistant.speed.is_finite() {
            return Err(invalid("assistant.speed", "must be a positive number".into()));
        }
        if self.pipeline.output_queue_capacity == 0 {
            return Err(invalid(
                "pipeline.output_queue_capacity",
                "must be at least 1".into(),
            ));
        }
        if self.pipeline.playback_chunk_bytes == 0 || self.pipeline.playback_chunk_bytes % 2 != 0 {
            return Err(invalid(
                "pipeline.playback_chunk_bytes",
                "must be a positive, even number of bytes".into(),
            ));
        }
        if self.pipeline.poll_interval_ms == 0 {
            return Err(invalid("pipeline.poll_interval_ms", "must be at least 1".into()));
        }
        if self.cache.ttl_secs == 0 || self.cache.ttl_secs > defaults::MAX_CACHE_TTL_SECS {
            return Err(invalid(
                "cache.ttl_secs",
                format!(
                    "{} is outside 1..={}",
                    self.cache.ttl_secs,
                    defaults::MAX_CACHE_TTL_SECS
                ),
            ));
        }
        Ok(())
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/voxbot/config.toml on Linux, or `None` when the
    /// platform has no config directory.
    #[cfg(feature = "cli")]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("voxbot").join("config.toml"))
    }
}

fn invalid(key: &str, message: String) -> VoxbotError {
    VoxbotError::ConfigInvalidValue {
        key: key.to_string(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    // Mutex to serialize tests that modify environment variables
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    // SAFETY: These helpers are only used in tests with ENV_LOCK held,
    // ensuring no concurrent access to environment variables.
    fn set_env(key: &str, value: &str) {
        unsafe { std::env::set_var(key, value) }
    }

    fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) }
    }

    fn clear_voxbot_env() {
        for key in [
            "VOXBOT_VOICE",
            "VOXBOT_LLM_MODEL",
            "VOXBOT_CACHE_ENABLED",
            "OPENROUTER_API_KEY",
            "MINIMAX_API_KEY",
            "MINIMAX_GROUP_ID",
        ] {
            remove_env(key);
        }
    }

    fn write_temp(contents: &str) -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(contents.as_bytes()).unwrap();
        temp_file
    }

    #[test]
    fn test_default_config_has_correct_values() {
        let config = Config::default();

        assert_eq!(config.audio.sample_rate, 16000);
        assert_eq!(config.audio.frame_duration_ms, 30);
        assert_eq!(config.audio.vad_aggressiveness, 3);

        assert_eq!(config.vad.speech_threshold_ms, 100);
        assert_eq!(config.vad.silence_threshold_ms, 500);
        assert_eq!(config.vad.barge_in_silence_ms, 300);

        assert!(config.cache.enabled);
        assert_eq!(config.cache.ttl(), Duration::from_secs(86_400));

        assert_eq!(config.assistant.voice_id, "mallory");
        assert_eq!(config.assistant.speed, 1.0);
        assert_eq!(config.assistant.first_message, None);

        assert_eq!(config.services.openrouter.temperature, 0.7);
        assert_eq!(config.services.openrouter.max_tokens, 256);
        assert_eq!(config.services.minimax.model, "speech-01-turbo");

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_toml_file() {
        let temp_file = write_temp(
            r#"
            [audio]
            sample_rate = 8000
            frame_duration_ms = 20
            vad_aggressiveness = 1

            [vad]
            speech_threshold_ms = 200
            silence_threshold_ms = 800

            [cache]
            enabled = false
            ttl_secs = 60

            [assistant]
            voice_id = "orion"
            speed = 1.2
            first_message = "Thanks for calling."

            [services.minimax]
            group_id = "g-1"
        "#,
        );

        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(config.audio.sample_rate, 8000);
        assert_eq!(config.audio.frame_duration_ms, 20);
        assert_eq!(config.audio.vad_aggressiveness, 1);
        assert_eq!(config.vad.speech_threshold_ms, 200);
        assert_eq!(config.vad.silence_threshold_ms, 800);
        assert_eq!(config.vad.barge_in_silence_ms, 300);
        assert!(!config.cache.enabled);
        assert_eq!(config.cache.ttl_secs, 60);
        assert_eq!(config.assistant.voice_id, "orion");
        assert_eq!(config.assistant.speed, 1.2);
        assert_eq!(
            config.assistant.first_message.as_deref(),
            Some("Thanks for calling.")
        );
        assert_eq!(config.services.minimax.group_id.as_deref(), Some("g-1"));
    }

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let temp_file = write_temp(
            r#"
            [assistant]
            voice_id = "nova"
        "#,
        );

        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(config.assistant.voice_id, "nova");
        assert_eq!(config.audio, AudioConfig::default());
        assert_eq!(config.vad, VadConfig::default());
        assert_eq!(config.cache, CacheConfig::default());
        assert_eq!(config.pipeline, PipelineConfig::default());
    }

    #[test]
    fn test_load_rejects_unsupported_frame_duration() {
        let temp_file = write_temp(
            r#"
            [audio]
            frame_duration_ms = 25
        "#,
        );

        let err = Config::load(temp_file.path()).unwrap_err();
        assert!(err.to_string().contains("audio.frame_duration_ms"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.audio.vad_aggressiveness = 4;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.audio.sample_rate = 44100;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.assistant.speed = 0.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.pipeline.playback_chunk_bytes = 3;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.pipeline.output_queue_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_bounds_cache_ttl() {
        let mut config = Config::default();
        config.cache.ttl_secs = u64::MAX;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("cache.ttl_secs"));
        assert_eq!(config.cache.ttl(), Duration::from_secs(defaults::MAX_CACHE_TTL_SECS));

        config.cache.ttl_secs = 0;
        assert!(config.validate().is_err());

        config.cache.ttl_secs = defaults::MAX_CACHE_TTL_SECS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_override_voice_and_keys() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_voxbot_env();

        set_env("VOXBOT_VOICE", "aria");
        set_env("OPENROUTER_API_KEY", "or-key");
        set_env("MINIMAX_API_KEY", "mm-key");
        set_env("MINIMAX_GROUP_ID", "group");
        let config = Config::default().with_env_overrides();

        assert_eq!(config.assistant.voice_id, "aria");
        assert_eq!(config.assistant.llm_model, defaults::LLM_MODEL);
        assert_eq!(config.services.openrouter.api_key.as_deref(), Some("or-key"));
        assert_eq!(config.services.minimax.api_key.as_deref(), Some("mm-key"));
        assert_eq!(config.services.minimax.group_id.as_deref(), Some("group"));

        clear_voxbot_env();
    }

    #[test]
    fn test_env_override_cache_disabled() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_voxbot_env();

        set_env("VOXBOT_CACHE_ENABLED", "false");
        let config = Config::default().with_env_overrides();
        assert!(!config.cache.enabled);

        set_env("VOXBOT_CACHE_ENABLED", "1");
        let config = Config::default().with_env_overrides();
        assert!(config.cache.enabled);

        clear_voxbot_env();
    }

    #[test]
    fn test_env_override_empty_string_ignored() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_voxbot_env();

        set_env("VOXBOT_LLM_MODEL", "");
        let config = Config::default().with_env_overrides();
        assert_eq!(config.assistant.llm_model, defaults::LLM_MODEL);

        clear_voxbot_env();
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let temp_file = write_temp(
            r#"
            [audio
            sample_rate = "broken
        "#,
        );

        assert!(Config::load(temp_file.path()).is_err());
    }

    #[test]
    fn test_load_or_default_returns_default_for_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing_path = dir.path().join("nonexistent.toml");
        let config = Config::load_or_default(&missing_path).unwrap();

        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_or_default_errors_on_invalid_toml() {
        let temp_file = write_temp("[audio\nsample_rate = ");

        let err = Config::load_or_default(temp_file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to load config"));
    }

    #[test]
    fn test_config_round_trips_through_toml() {
        let mut config = Config::default();
        config.assistant.first_message = Some("Hi!".to_string());
        let text = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[cfg(feature = "cli")]
    #[test]
    fn test_default_path_ends_with_config_toml() {
        if let Some(path) = Config::default_path() {
            let path_str = path.to_string_lossy();
            assert!(path_str.contains("voxbot"));
            assert!(path_str.ends_with("config.toml"));
        }
    }
}
