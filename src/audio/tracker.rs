//! Speech activity tracking.
//!
//! Converts a stream of per-frame speech decisions into discrete
//! speech-start and speech-end events using contiguous-duration hysteresis.

use crate::defaults;

/// Tracker thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerConfig {
    /// Duration of each frame fed to the tracker.
    pub frame_duration_ms: u32,
    /// Contiguous speech needed to enter `Speaking`.
    pub speech_threshold_ms: u32,
    /// Contiguous silence needed to return to `Idle`.
    pub silence_threshold_ms: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            frame_duration_ms: defaults::FRAME_DURATION_MS,
            speech_threshold_ms: defaults::SPEECH_THRESHOLD_MS,
            silence_threshold_ms: defaults::SILENCE_THRESHOLD_MS,
        }
    }
}

/// Current phase of the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActivityPhase {
    #[default]
    Idle,
    Speaking,
}

/// Edge produced by a single frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechEvent {
    SpeechStarted,
    SpeechEnded,
}

/// Snapshot of tracker counters and flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpeechActivityState {
    pub silence_frame_count: u32,
    pub speech_frame_count: u32,
    pub is_speaking: bool,
    /// True only right after the frame that entered `Speaking`.
    pub speech_started: bool,
    /// True only right after the frame that returned to `Idle`.
    pub speech_ended: bool,
}

/// Hysteresis filter over per-frame speech decisions.
#[derive(Debug, Clone)]
pub struct SpeechActivityTracker {
    config: TrackerConfig,
    state: SpeechActivityState,
}

impl SpeechActivityTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            state: SpeechActivityState::default(),
        }
    }

    /// Feed one frame decision. Returns the edge this frame produced, if any.
    pub fn update(&mut self, is_speech: bool) -> Option<SpeechEvent> {
        let frame_ms = self.config.frame_duration_ms;
        let state = &mut self.state;
        state.speech_started = false;
        state.speech_ended = false;

        if is_speech {
            state.speech_frame_count = state.speech_frame_count.saturating_add(1);
            state.silence_frame_count = 0;
            let speech_ms = state.speech_frame_count.saturating_mul(frame_ms);
            if !state.is_speaking && speech_ms >= self.config.speech_threshold_ms {
                state.is_speaking = true;
                state.speech_started = true;
                return Some(SpeechEvent::SpeechStarted);
            }
        } else {
            state.silence_frame_count = state.silence_frame_count.saturating_add(1);
            state.speech_frame_count = 0;
            let silence_ms = state.silence_frame_count.saturating_mul(frame_ms);
            if state.is_speaking && silence_ms >= self.config.silence_threshold_ms {
                state.is_speaking = false;
                state.speech_ended = true;
                return Some(SpeechEvent::SpeechEnded);
            }
        }
        None
    }

    /// Force `Idle` and clear every counter and edge flag.
    pub fn reset(&mut self) {
        self.state = SpeechActivityState::default();
    }

    pub fn phase(&self) -> ActivityPhase {
        if self.state.is_speaking {
            ActivityPhase::Speaking
        } else {
            ActivityPhase::Idle
        }
    }

    pub fn is_speaking(&self) -> bool {
        self.state.is_speaking
    }

    pub fn state(&self) -> SpeechActivityState {
        self.state
    }

    pub fn config(&self) -> TrackerConfig {
        self.config
    }
}

impl Default for SpeechActivityTracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}
