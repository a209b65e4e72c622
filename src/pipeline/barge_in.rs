//! Barge-in detection.
//!
//! The [`InterruptionArbiter`] watches caller audio while the bot is speaking
//! and cancels playback when the caller starts talking over it. Each playback
//! session gets a fresh [`CancellationSignal`] that the speaking side can poll
//! or wait on.

use crate::audio::tracker::{SpeechActivityTracker, SpeechEvent, TrackerConfig};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// One-way latch shared between the arbiter and whoever is speaking.
#[derive(Debug, Clone, Default)]
pub struct CancellationSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancellationSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the signal and wake every waiter. Raising twice is harmless.
    pub fn raise(&self) {
        let (flag, condvar) = &*self.inner;
        *flag.lock().unwrap_or_else(PoisonError::into_inner) = true;
        condvar.notify_all();
    }

    pub fn is_raised(&self) -> bool {
        *self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until raised or until `timeout` elapses. `None` waits forever.
    ///
    /// Returns whether the signal is raised.
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        let (flag, condvar) = &*self.inner;
        let mut raised = flag.lock().unwrap_or_else(PoisonError::into_inner);
        let deadline = timeout.map(|t| Instant::now() + t);
        while !*raised {
            match deadline {
                None => {
                    raised = condvar
                        .wait(raised)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        break;
                    }
                    raised = condvar
                        .wait_timeout(raised, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                }
            }
        }
        *raised
    }
}

#[derive(Debug, Default)]
struct PlaybackSession {
    is_playing: bool,
    interrupted: bool,
    /// Set once `cancel` has run for this session.
    cancelled: bool,
    signal: Option<CancellationSignal>,
}

struct ArbiterState {
    tracker: SpeechActivityTracker,
    session: PlaybackSession,
}

type InterruptHandler = Box<dyn Fn() + Send + Sync>;

/// Detects caller speech during bot playback and cancels it once per session.
pub struct InterruptionArbiter {
    state: Mutex<ArbiterState>,
    on_interrupt: Option<InterruptHandler>,
}

impl InterruptionArbiter {
    /// Create an arbiter whose tracker uses `config`.
    ///
    /// The silence threshold is normally the shorter barge-in threshold.
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            state: Mutex::new(ArbiterState {
                tracker: SpeechActivityTracker::new(config),
                session: PlaybackSession::default(),
            }),
            on_interrupt: None,
        }
    }

    /// Register a handler invoked by [`cancel`](Self::cancel), outside the arbiter lock.
    pub fn with_interrupt_handler(mut self, handler: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_interrupt = Some(Box::new(handler));
        self
    }

    fn lock(&self) -> MutexGuard<'_, ArbiterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Begin a playback session. Any previous session's signal is discarded.
    pub fn start_playback(&self) -> CancellationSignal {
        let signal = CancellationSignal::new();
        let mut state = self.lock();
        state.tracker.reset();
        state.session = PlaybackSession {
            is_playing: true,
            interrupted: false,
            cancelled: false,
            signal: Some(signal.clone()),
        };
        tracing::debug!("playback started");
        signal
    }

    /// Feed one classified inbound frame.
    ///
    /// Returns true exactly once per session: on the frame where caller speech
    /// starts while the bot is playing. That frame also cancels the session
    /// (see [`cancel`](Self::cancel)) before the lock is released, so the
    /// speaking side never observes the edge without the signal. Outside
    /// playback this is a no-op.
    pub fn process_frame(&self, is_speech: bool) -> bool {
        {
            let mut state = self.lock();
            if !state.session.is_playing {
                return false;
            }
            let event = state.tracker.update(is_speech);
            if event != Some(SpeechEvent::SpeechStarted) || !Self::interrupt(&mut state.session) {
                return false;
            }
        }
        tracing::info!("barge-in detected");
        self.run_handler();
        true
    }

    /// Cancel the live session: mark it interrupted, raise its signal, and run
    /// the interrupt handler.
    ///
    /// Returns false without side effects when no session is playing or the
    /// session was already cancelled, including by a barge-in edge.
    pub fn cancel(&self) -> bool {
        if !Self::interrupt(&mut self.lock().session) {
            return false;
        }
        self.run_handler();
        tracing::debug!("playback cancelled");
        true
    }

    /// Mark a playing session interrupted and raise its signal, once.
    fn interrupt(session: &mut PlaybackSession) -> bool {
        if !session.is_playing || session.cancelled {
            return false;
        }
        session.interrupted = true;
        session.cancelled = true;
        if let Some(signal) = &session.signal {
            signal.raise();
        }
        true
    }

    /// Runs outside the arbiter lock.
    fn run_handler(&self) {
        if let Some(handler) = &self.on_interrupt {
            handler();
        }
    }

    /// End the session. Waiters are released; `interrupted` keeps its value.
    pub fn stop_playback(&self) {
        let mut state = self.lock();
        state.session.is_playing = false;
        if let Some(signal) = &state.session.signal {
            signal.raise();
        }
        tracing::debug!(interrupted = state.session.interrupted, "playback stopped");
    }

    /// Wait for the live session to end.
    ///
    /// Returns true only if it ended by interruption; a wait that times out
    /// returns false.
    pub fn wait_for_interruption(&self, timeout: Option<Duration>) -> bool {
        let signal = {
            let state = self.lock();
            match &state.session.signal {
                Some(signal) => signal.clone(),
                None => return false,
            }
        };
        signal.wait(timeout) && self.lock().session.interrupted
    }

    /// Drop the session entirely and reset the tracker.
    pub fn reset(&self) {
        let mut state = self.lock();
        state.tracker.reset();
        state.session = PlaybackSession::default();
    }

    pub fn is_playing(&self) -> bool {
        self.lock().session.is_playing
    }

    pub fn is_interrupted(&self) -> bool {
        self.lock().session.interrupted
    }

    /// Signal of the current session, if one was started since the last reset.
    pub fn signal(&self) -> Option<CancellationSignal> {
        self.lock().session.signal.clone()
    }
}

impl std::fmt::Debug for InterruptionArbiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("InterruptionArbiter")
            .field("session", &state.session)
            .field("tracker", &state.tracker)
            .field("has_handler", &self.on_interrupt.is_some())
            .finish()
    }
}

/// Brackets one utterance: starts playback on creation, stops it on drop.
pub struct PlaybackGuard<'a> {
    arbiter: &'a InterruptionArbiter,
    signal: CancellationSignal,
}

impl<'a> PlaybackGuard<'a> {
    pub fn start(arbiter: &'a InterruptionArbiter) -> Self {
        let signal = arbiter.start_playback();
        Self { arbiter, signal }
    }

    /// True once this utterance has been interrupted.
    pub fn interrupted(&self) -> bool {
        self.arbiter.is_interrupted()
    }

    pub fn signal(&self) -> &CancellationSignal {
        &self.signal
    }
}

impl Drop for PlaybackGuard<'_> {
    fn drop(&mut self) {
        self.arbiter.stop_playback();
    }
}
