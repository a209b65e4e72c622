//! Streaming speech synthesis.

use crate::error::{Result, VoxbotError};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Lazy, finite sequence of PCM chunks.
pub type AudioStream = Box<dyn Iterator<Item = Result<Vec<u8>>> + Send>;

/// Trait for text-to-speech.
///
/// Output is linear PCM, 16-bit little-endian, mono, at the configured rate.
pub trait SpeechSynthesizer: Send + Sync {
    /// Start synthesizing `text`.
    fn stream(&self, text: &str, voice_id: &str, speed: f32) -> Result<AudioStream>;

    /// Synthesize `text` and collect the full audio.
    fn synthesize(&self, text: &str, voice_id: &str, speed: f32) -> Result<Vec<u8>> {
        let mut audio = Vec::new();
        for chunk in self.stream(text, voice_id, speed)? {
            audio.extend_from_slice(&chunk?);
        }
        Ok(audio)
    }
}

impl<T: SpeechSynthesizer> SpeechSynthesizer for Arc<T> {
    fn stream(&self, text: &str, voice_id: &str, speed: f32) -> Result<AudioStream> {
        (**self).stream(text, voice_id, speed)
    }
}

/// One request seen by [`MockSynthesizer`].
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisRequest {
    pub text: String,
    pub voice_id: String,
    pub speed: f32,
}

/// Mock synthesizer for testing
///
/// Produces `chunk_count` chunks of `chunk_bytes` each. The audio is a square
/// wave whose amplitude is derived from the text, so different texts yield
/// different bytes.
#[derive(Clone)]
pub struct MockSynthesizer {
    chunk_count: usize,
    chunk_bytes: usize,
    chunk_delay: Duration,
    fail_on: Option<String>,
    requests: Arc<Mutex<Vec<SynthesisRequest>>>,
}

impl MockSynthesizer {
    pub fn new() -> Self {
        Self {
            chunk_count: 4,
            chunk_bytes: 960,
            chunk_delay: Duration::ZERO,
            fail_on: None,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_chunks(mut self, count: usize, bytes: usize) -> Self {
        self.chunk_count = count;
        self.chunk_bytes = bytes;
        self
    }

    /// Sleep before yielding each chunk, simulating real-time synthesis.
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    /// Fail requests whose text contains `needle`.
    pub fn with_failure_on(mut self, needle: &str) -> Self {
        self.fail_on = Some(needle.to_string());
        self
    }

    pub fn requests(&self) -> Vec<SynthesisRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Audio this mock produces for `text`.
    pub fn audio_for(&self, text: &str) -> Vec<u8> {
        let amplitude = 1000 + (text.len() as i16 % 100) * 10;
        let samples = self.chunk_count * self.chunk_bytes / 2;
        (0..samples)
            .flat_map(|i| {
                let sample = if i % 2 == 0 { amplitude } else { -amplitude };
                sample.to_le_bytes()
            })
            .collect()
    }
}

impl Default for MockSynthesizer {
    fn default() -> Self {
        Self::new()
    }
}

impl SpeechSynthesizer for MockSynthesizer {
    fn stream(&self, text: &str, voice_id: &str, speed: f32) -> Result<AudioStream> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(SynthesisRequest {
                text: text.to_string(),
                voice_id: voice_id.to_string(),
                speed,
            });

        if let Some(needle) = &self.fail_on
            && text.contains(needle.as_str())
        {
            return Err(VoxbotError::Synthesis {
                message: format!("mock synthesis failure for {:?}", text),
            });
        }

        let audio = self.audio_for(text);
        let chunk_bytes = self.chunk_bytes.max(1);
        let delay = self.chunk_delay;
        let chunks: Vec<Vec<u8>> = audio.chunks(chunk_bytes).map(<[u8]>::to_vec).collect();
        Ok(Box::new(chunks.into_iter().map(move |chunk| {
            if !delay.is_zero() {
                std::thread::sleep(delay);
            }
            Ok(chunk)
        })))
    }
}

/// Splits any reader into fixed-size chunks. The last chunk may be short.
pub struct ChunkReader<R> {
    reader: R,
    chunk_bytes: usize,
    done: bool,
}

impl<R: std::io::Read> ChunkReader<R> {
    pub fn new(reader: R, chunk_bytes: usize) -> Self {
        Self {
            reader,
            chunk_bytes: chunk_bytes.max(1),
            done: false,
        }
    }
}

impl<R: std::io::Read> Iterator for ChunkReader<R> {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut chunk = vec![0u8; self.chunk_bytes];
        let mut filled = 0;
        while filled < chunk.len() {
            match self.reader.read(&mut chunk[filled..]) {
                Ok(0) => {
                    self.done = true;
                    break;
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e.into()));
                }
            }
        }
        if filled == 0 {
            return None;
        }
        chunk.truncate(filled);
        Some(Ok(chunk))
    }
}

#[cfg(feature = "http")]
pub use minimax::MinimaxClient;

#[cfg(feature = "http")]
mod minimax {
    use super::{AudioStream, ChunkReader, SpeechSynthesizer};
    use crate::config::MinimaxConfig;
    use crate::error::{Result, VoxbotError};
    use crate::services::pool::ConnectionPool;
    use serde::Serialize;
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Serialize)]
    struct VoiceSetting<'a> {
        voice_id: &'a str,
        speed: f32,
    }

    #[derive(Serialize)]
    struct AudioSetting {
        sample_rate: u32,
        format: &'static str,
        channel: u8,
    }

    #[derive(Serialize)]
    struct SpeechRequest<'a> {
        model: &'a str,
        text: &'a str,
        stream: bool,
        voice_setting: VoiceSetting<'a>,
        audio_setting: AudioSetting,
    }

    /// Minimax streaming text-to-speech client.
    pub struct MinimaxClient {
        pool: Arc<ConnectionPool>,
        config: MinimaxConfig,
        sample_rate: u32,
        chunk_bytes: usize,
    }

    impl MinimaxClient {
        pub fn new(
            pool: Arc<ConnectionPool>,
            config: MinimaxConfig,
            sample_rate: u32,
            chunk_bytes: usize,
        ) -> Self {
            Self {
                pool,
                config,
                sample_rate,
                chunk_bytes,
            }
        }

        pub(crate) fn endpoint(&self) -> String {
            let base = self.config.base_url.trim_end_matches('/');
            match &self.config.group_id {
                Some(group) => format!("{}/text_to_speech?GroupId={}", base, group),
                None => format!("{}/text_to_speech", base),
            }
        }
    }

    impl SpeechSynthesizer for MinimaxClient {
        fn stream(&self, text: &str, voice_id: &str, speed: f32) -> Result<AudioStream> {
            let api_key = self
                .config
                .api_key
                .as_deref()
                .ok_or_else(|| VoxbotError::Synthesis {
                    message: "Minimax API key is not configured".to_string(),
                })?;
            let body = serde_json::to_vec(&SpeechRequest {
                model: &self.config.model,
                text,
                stream: true,
                voice_setting: VoiceSetting { voice_id, speed },
                audio_setting: AudioSetting {
                    sample_rate: self.sample_rate,
                    format: "pcm",
                    channel: 1,
                },
            })?;

            tracing::debug!(voice_id, speed, chars = text.len(), "requesting synthesis");
            let response = self
                .pool
                .client()?
                .post(self.endpoint())
                .bearer_auth(api_key)
                .header("Content-Type", "application/json")
                .timeout(Duration::from_secs(self.config.timeout_secs))
                .body(body)
                .send()?;

            let status = response.status();
            if !status.is_success() {
                let detail = response.text().unwrap_or_default();
                return Err(VoxbotError::Synthesis {
                    message: format!("status {}: {}", status, detail),
                });
            }

            Ok(Box::new(ChunkReader::new(response, self.chunk_bytes)))
        }
    }

}
