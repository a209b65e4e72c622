//! Streaming speech recognition.

use crate::error::{Result, VoxbotError};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Recognition result for a stretch of caller audio.
#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    pub text: String,
    /// False for interim hypotheses that may still change.
    pub is_final: bool,
    pub confidence: f32,
}

impl Transcript {
    pub fn final_text(text: &str) -> Self {
        Self {
            text: text.to_string(),
            is_final: true,
            confidence: 1.0,
        }
    }

    pub fn interim(text: &str) -> Self {
        Self {
            text: text.to_string(),
            is_final: false,
            confidence: 0.5,
        }
    }
}

/// Trait for a streaming recognizer session.
pub trait SpeechRecognizer: Send + Sync {
    fn connect(&self) -> Result<()>;

    /// Forward caller audio (PCM, 16-bit LE, mono).
    fn send_audio(&self, pcm: &[u8]) -> Result<()>;

    /// Wait up to `timeout` for the next result.
    ///
    /// `Ok(None)` means nothing arrived in time. A
    /// [`VoxbotError::Closed`] error means the session has ended.
    fn next_transcript(&self, timeout: Duration) -> Result<Option<Transcript>>;

    fn close(&self) -> Result<()>;
}

impl<T: SpeechRecognizer> SpeechRecognizer for Arc<T> {
    fn connect(&self) -> Result<()> {
        (**self).connect()
    }

    fn send_audio(&self, pcm: &[u8]) -> Result<()> {
        (**self).send_audio(pcm)
    }

    fn next_transcript(&self, timeout: Duration) -> Result<Option<Transcript>> {
        (**self).next_transcript(timeout)
    }

    fn close(&self) -> Result<()> {
        (**self).close()
    }
}

/// Mock recognizer for testing
///
/// Transcripts can be pushed directly, or scheduled to fire once a number of
/// audio frames have been received.
pub struct MockRecognizer {
    tx: Sender<Transcript>,
    rx: Receiver<Transcript>,
    scheduled: Mutex<VecDeque<(usize, Transcript)>>,
    frames_received: AtomicUsize,
    connected: AtomicBool,
    closed: AtomicBool,
    fail_connect: bool,
}

impl MockRecognizer {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self {
            tx,
            rx,
            scheduled: Mutex::new(VecDeque::new()),
            frames_received: AtomicUsize::new(0),
            connected: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            fail_connect: false,
        }
    }

    /// Emit a final transcript once `frames` audio frames have arrived in total.
    pub fn with_utterance_after(self, frames: usize, text: &str) -> Self {
        self.scheduled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back((frames, Transcript::final_text(text)));
        self
    }

    pub fn with_connect_failure(mut self) -> Self {
        self.fail_connect = true;
        self
    }

    /// Deliver a transcript immediately.
    pub fn push_transcript(&self, transcript: Transcript) {
        // Receiver lives in self; send cannot fail.
        self.tx.send(transcript).ok();
    }

    pub fn frames_received(&self) -> usize {
        self.frames_received.load(Ordering::SeqCst)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Default for MockRecognizer {
    fn default() -> Self {
        Self::new()
    }
}

impl SpeechRecognizer for MockRecognizer {
    fn connect(&self) -> Result<()> {
        if self.fail_connect {
            return Err(VoxbotError::Transcription {
                message: "mock connect failure".to_string(),
            });
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn send_audio(&self, _pcm: &[u8]) -> Result<()> {
        if !self.is_connected() || self.is_closed() {
            return Err(VoxbotError::Transcription {
                message: "not connected".to_string(),
            });
        }
        let received = self.frames_received.fetch_add(1, Ordering::SeqCst) + 1;
        let mut scheduled = self.scheduled.lock().unwrap_or_else(PoisonError::into_inner);
        while scheduled
            .front()
            .is_some_and(|(after, _)| *after <= received)
        {
            if let Some((_, transcript)) = scheduled.pop_front() {
                self.push_transcript(transcript);
            }
        }
        Ok(())
    }

    fn next_transcript(&self, timeout: Duration) -> Result<Option<Transcript>> {
        if self.is_closed() {
            return Err(VoxbotError::Closed {
                source_name: "transcription".to_string(),
            });
        }
        match self.rx.recv_timeout(timeout) {
            Ok(transcript) => Ok(Some(transcript)),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => Ok(None),
        }
    }

    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
