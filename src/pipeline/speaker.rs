//! Speaking one sentence: cache lookup, streamed synthesis, and queueing
//! audio for playback while watching for barge-in.

use crate::cache::SynthesisCache;
use crate::error::Result;
use crate::pipeline::barge_in::{InterruptionArbiter, PlaybackGuard};
use crate::pipeline::queue::AudioOutputQueue;
use crate::services::tts::SpeechSynthesizer;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Poll interval while waiting for queued audio to finish playing.
const DRAIN_POLL: Duration = Duration::from_millis(10);

/// How a sentence ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakOutcome {
    /// All audio was queued and played.
    Completed,
    /// The caller barged in. `started` is true if any audio had been
    /// queued for the caller before that.
    Interrupted { started: bool },
    /// The bot is shutting down.
    Stopped,
}

/// Why a sentence stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Halt {
    Interrupted,
    Stopped,
}

/// Voice settings and plumbing shared by every sentence of a conversation.
pub struct Speaker {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    cache: Arc<SynthesisCache>,
    arbiter: Arc<InterruptionArbiter>,
    queue: AudioOutputQueue,
    running: Arc<AtomicBool>,
    voice_id: String,
    speed: f32,
    chunk_bytes: usize,
    poll_interval: Duration,
}

impl Speaker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        synthesizer: Arc<dyn SpeechSynthesizer>,
        cache: Arc<SynthesisCache>,
        arbiter: Arc<InterruptionArbiter>,
        queue: AudioOutputQueue,
        running: Arc<AtomicBool>,
        voice_id: &str,
        speed: f32,
        chunk_bytes: usize,
        poll_interval: Duration,
    ) -> Self {
        Self {
            synthesizer,
            cache,
            arbiter,
            queue,
            running,
            voice_id: voice_id.to_string(),
            speed,
            chunk_bytes: chunk_bytes.max(2),
            poll_interval,
        }
    }

    /// Speak `text`, returning once its audio has played or playback was cut short.
    ///
    /// Playback is bracketed by the arbiter for the whole call, so caller
    /// speech anywhere in that window interrupts it. An interrupted sentence
    /// leaves nothing of its audio in the output queue.
    pub fn speak(&self, text: &str) -> Result<SpeakOutcome> {
        let guard = PlaybackGuard::start(&self.arbiter);
        let mut started = false;
        let outcome = match self.play(text, &guard, &mut started)? {
            None => SpeakOutcome::Completed,
            Some(Halt::Stopped) => SpeakOutcome::Stopped,
            Some(Halt::Interrupted) => {
                self.queue.drain();
                SpeakOutcome::Interrupted { started }
            }
        };
        Ok(outcome)
    }

    /// Queue the sentence's audio and wait for it to play. Sets `started` once
    /// the first chunk is queued.
    fn play(&self, text: &str, guard: &PlaybackGuard<'_>, started: &mut bool) -> Result<Option<Halt>> {
        if let Some(audio) = self.cache.get(text, &self.voice_id, self.speed) {
            tracing::debug!(chars = text.len(), bytes = audio.len(), "speaking from cache");
            for chunk in audio.chunks(self.chunk_bytes) {
                if let Some(halt) = self.enqueue(guard, chunk.to_vec()) {
                    return Ok(Some(halt));
                }
                *started = true;
            }
            return Ok(self.wait_for_playback(guard));
        }

        let stream = self.synthesizer.stream(text, &self.voice_id, self.speed)?;
        let mut full_audio = Vec::new();
        for chunk in stream {
            if let Some(halt) = self.cut_short(guard) {
                return Ok(Some(halt));
            }
            let chunk = chunk?;
            if chunk.is_empty() {
                continue;
            }
            full_audio.extend_from_slice(&chunk);
            if let Some(halt) = self.enqueue(guard, chunk) {
                return Ok(Some(halt));
            }
            *started = true;
        }

        if !full_audio.is_empty() {
            self.cache
                .set(text, &self.voice_id, &full_audio, self.speed, None);
        }
        Ok(self.wait_for_playback(guard))
    }

    fn cut_short(&self, guard: &PlaybackGuard<'_>) -> Option<Halt> {
        if guard.interrupted() {
            Some(Halt::Interrupted)
        } else if !self.running.load(Ordering::SeqCst) {
            Some(Halt::Stopped)
        } else {
            None
        }
    }

    /// Push one chunk. Returns why speaking must stop, if it must.
    fn enqueue(&self, guard: &PlaybackGuard<'_>, chunk: Vec<u8>) -> Option<Halt> {
        let mut pending = chunk;
        loop {
            if let Some(halt) = self.cut_short(guard) {
                return Some(halt);
            }
            match self.queue.push(pending, self.poll_interval) {
                Ok(()) => break,
                Err(chunk) => pending = chunk,
            }
        }
        // Pushed just after the interrupt handler drained the queue.
        if guard.interrupted() {
            return Some(Halt::Interrupted);
        }
        None
    }

    fn wait_for_playback(&self, guard: &PlaybackGuard<'_>) -> Option<Halt> {
        while !self.queue.is_empty() {
            if self.arbiter.wait_for_interruption(Some(DRAIN_POLL)) {
                return Some(Halt::Interrupted);
            }
            if !self.running.load(Ordering::SeqCst) {
                return Some(Halt::Stopped);
            }
        }
        guard.interrupted().then_some(Halt::Interrupted)
    }
}
