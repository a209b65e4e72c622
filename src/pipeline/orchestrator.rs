//! Conversation orchestrator.
//!
//! Runs four stages on their own threads from startup until shutdown:
//! audio intake, transcript intake, response generation, and playback.

use crate::audio::classifier::{EnergyClassifier, FrameClassifier};
use crate::audio::frame::FrameSpec;
use crate::audio::tracker::TrackerConfig;
use crate::cache::SynthesisCache;
use crate::config::Config;
use crate::error::Result;
use crate::pipeline::barge_in::InterruptionArbiter;
use crate::pipeline::error::{ErrorReporter, LogReporter, StageError};
use crate::pipeline::history::{ConversationHistory, ConversationTurn};
use crate::pipeline::queue::AudioOutputQueue;
use crate::pipeline::segmenter::SentenceSegmenter;
use crate::pipeline::speaker::{SpeakOutcome, Speaker};
use crate::pipeline::station::{Station, StationRunner};
use crate::services::llm::LanguageModel;
#[cfg(feature = "http")]
use crate::services::pool::ConnectionPool;
use crate::services::transcriber::SpeechRecognizer;
use crate::services::transport::MediaTransport;
use crate::services::tts::SpeechSynthesizer;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Consecutive collaborator errors tolerated before a loop gives up.
const MAX_CONSECUTIVE_ERRORS: u32 = 10;

/// External collaborators a bot talks to.
#[derive(Clone)]
pub struct Services {
    pub recognizer: Arc<dyn SpeechRecognizer>,
    pub language_model: Arc<dyn LanguageModel>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub transport: Arc<dyn MediaTransport>,
    pub cache: Arc<SynthesisCache>,
}

/// Work for the response stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseRequest {
    /// Generate and speak a reply to the current history.
    Reply,
    /// Speak fixed text, such as the opening line.
    Scripted(String),
}

/// How a reply ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseOutcome {
    Completed { text: String },
    /// Only `spoken` was started before the caller barged in.
    Interrupted { spoken: String },
    Failed { reason: String },
    Stopped,
}

/// Response stage: streams a reply, segments it, and speaks each sentence.
struct ResponseStation {
    language_model: Arc<dyn LanguageModel>,
    speaker: Speaker,
    history: ConversationHistory,
    system_prompt: String,
    running: Arc<AtomicBool>,
    error_reporter: Arc<dyn ErrorReporter>,
}

/// Text spoken so far in one reply, and whether speaking must stop.
#[derive(Default)]
struct ReplyProgress {
    spoken: Vec<String>,
    halted: Option<ResponseOutcome>,
}

impl ResponseStation {
    const NAME: &'static str = "response";

    fn say(&self, sentence: &str, progress: &mut ReplyProgress) {
        match self.speaker.speak(sentence) {
            Ok(SpeakOutcome::Completed) => progress.spoken.push(sentence.to_string()),
            Ok(SpeakOutcome::Interrupted { started }) => {
                if started {
                    progress.spoken.push(sentence.to_string());
                }
                progress.halted = Some(ResponseOutcome::Interrupted {
                    spoken: progress.spoken.join(" "),
                });
            }
            Ok(SpeakOutcome::Stopped) => progress.halted = Some(ResponseOutcome::Stopped),
            Err(e) => {
                self.error_reporter.report(Self::NAME, &e.into());
                progress.halted = Some(ResponseOutcome::Failed {
                    reason: "synthesis failed".to_string(),
                });
            }
        }
    }

    fn reply(&self) -> ResponseOutcome {
        let turns = self.history.snapshot();
        let tokens = match self
            .language_model
            .stream_completion(&turns, &self.system_prompt)
        {
            Ok(tokens) => tokens,
            Err(e) => {
                let reason = e.to_string();
                self.error_reporter.report(Self::NAME, &e.into());
                return ResponseOutcome::Failed { reason };
            }
        };

        let mut segmenter = SentenceSegmenter::new();
        let mut full_text = String::new();
        let mut progress = ReplyProgress::default();

        for token in tokens {
            if !self.running.load(Ordering::SeqCst) {
                progress.halted = Some(ResponseOutcome::Stopped);
                break;
            }
            let token = match token {
                Ok(token) => token,
                Err(e) => {
                    let reason = e.to_string();
                    self.error_reporter.report(Self::NAME, &e.into());
                    progress.halted = Some(ResponseOutcome::Failed { reason });
                    break;
                }
            };
            full_text.push_str(&token);
            if let Some(sentence) = segmenter.push(&token) {
                self.say(&sentence, &mut progress);
                if progress.halted.is_some() {
                    break;
                }
            }
        }
        if progress.halted.is_none()
            && let Some(rest) = segmenter.finish()
        {
            self.say(&rest, &mut progress);
        }

        let outcome = progress.halted.unwrap_or_else(|| ResponseOutcome::Completed {
            text: full_text.trim().to_string(),
        });
        match &outcome {
            ResponseOutcome::Completed { text } if !text.is_empty() => {
                self.history.push(ConversationTurn::assistant(text.clone()));
            }
            ResponseOutcome::Interrupted { spoken } if !spoken.is_empty() => {
                self.history.push(ConversationTurn::assistant(spoken.clone()));
            }
            _ if !progress.spoken.is_empty() => {
                self.history
                    .push(ConversationTurn::assistant(progress.spoken.join(" ")));
            }
            _ => {}
        }
        outcome
    }
}

impl Station for ResponseStation {
    type Input = ResponseRequest;
    type Output = ResponseOutcome;

    fn process(&mut self, input: ResponseRequest) -> std::result::Result<Option<ResponseOutcome>, StageError> {
        match input {
            ResponseRequest::Reply => {
                let started = Instant::now();
                let outcome = self.reply();
                tracing::info!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    outcome = ?outcome,
                    "reply finished"
                );
                Ok(Some(outcome))
            }
            ResponseRequest::Scripted(text) => {
                let outcome = self.speaker.speak(&text)?;
                if matches!(
                    outcome,
                    SpeakOutcome::Completed | SpeakOutcome::Interrupted { started: true }
                ) {
                    self.history.push(ConversationTurn::assistant(text));
                }
                tracing::info!(outcome = ?outcome, "scripted line finished");
                Ok(None)
            }
        }
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }
}

/// Handle to a running bot.
pub struct VoiceBotHandle {
    running: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
    history: ConversationHistory,
    arbiter: Arc<InterruptionArbiter>,
    recognizer: Arc<dyn SpeechRecognizer>,
    transport: Arc<dyn MediaTransport>,
    #[cfg(feature = "http")]
    pool: Option<Arc<ConnectionPool>>,
}

impl VoiceBotHandle {
    /// Stops every stage, closes the collaborators and the HTTP pool, and
    /// returns the history.
    ///
    /// Threads get 2s to finish; after that they are detached.
    pub fn stop(mut self) -> Vec<ConversationTurn> {
        self.running.store(false, Ordering::SeqCst);
        self.arbiter.stop_playback();

        if let Err(e) = self.recognizer.close() {
            tracing::warn!(error = %e, "failed to close transcription");
        }
        if let Err(e) = self.transport.disconnect() {
            tracing::warn!(error = %e, "failed to disconnect media transport");
        }

        let deadline = Instant::now() + Duration::from_secs(2);
        let poll_interval = Duration::from_millis(50);

        loop {
            let mut remaining = Vec::new();
            for handle in self.threads.drain(..) {
                if handle.is_finished() {
                    if let Err(panic_info) = handle.join() {
                        let msg = panic_info
                            .downcast_ref::<&str>()
                            .copied()
                            .or_else(|| panic_info.downcast_ref::<String>().map(|s| s.as_str()))
                            .unwrap_or("unknown panic");
                        tracing::error!(panic = msg, "bot thread panicked");
                    }
                } else {
                    remaining.push(handle);
                }
            }
            self.threads = remaining;

            if self.threads.is_empty() {
                break;
            }

            if Instant::now() >= deadline {
                tracing::warn!(
                    threads = self.threads.len(),
                    "shutdown timeout, detaching remaining threads"
                );
                break;
            }

            thread::sleep(poll_interval);
        }

        #[cfg(feature = "http")]
        if let Some(pool) = &self.pool {
            pool.close();
        }

        let turns = self.history.snapshot();
        tracing::info!(turns = turns.len(), "conversation ended");
        turns
    }

    /// False once shutdown was requested or the caller hung up.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Current history, oldest first.
    pub fn history(&self) -> Vec<ConversationTurn> {
        self.history.snapshot()
    }
}

/// Real-time spoken conversation: caller audio in, bot speech out.
pub struct VoiceBot {
    config: Config,
    services: Services,
    classifier: Option<Arc<dyn FrameClassifier>>,
    error_reporter: Arc<dyn ErrorReporter>,
    #[cfg(feature = "http")]
    pool: Option<Arc<ConnectionPool>>,
}

impl VoiceBot {
    pub fn new(config: Config, services: Services) -> Self {
        Self {
            config,
            services,
            classifier: None,
            error_reporter: Arc::new(LogReporter),
            #[cfg(feature = "http")]
            pool: None,
        }
    }

    /// Use a custom frame classifier instead of the energy classifier.
    pub fn with_classifier(mut self, classifier: Arc<dyn FrameClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn with_error_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.error_reporter = reporter;
        self
    }

    /// Pool shared by the hosted collaborators; closed by [`VoiceBotHandle::stop`].
    #[cfg(feature = "http")]
    pub fn with_connection_pool(mut self, pool: Arc<ConnectionPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Connect the collaborators and start every stage.
    ///
    /// The opening line, if configured, is spoken once the stages are running.
    pub fn start(self) -> Result<VoiceBotHandle> {
        self.config.validate()?;
        let config = self.config;
        let services = self.services;

        let classifier: Arc<dyn FrameClassifier> = match self.classifier {
            Some(classifier) => classifier,
            None => Arc::new(EnergyClassifier::new(
                FrameSpec::new(config.audio.sample_rate, config.audio.frame_duration_ms),
                config.audio.vad_aggressiveness,
            )?),
        };

        services.recognizer.connect()?;
        if let Err(e) = services.transport.connect() {
            if let Err(close_err) = services.recognizer.close() {
                tracing::warn!(error = %close_err, "failed to close transcription");
            }
            return Err(e);
        }
        tracing::info!(
            voice = %config.assistant.voice_id,
            model = services.language_model.model_name(),
            "conversation started"
        );

        let running = Arc::new(AtomicBool::new(true));
        let history = ConversationHistory::new();
        let poll = config.pipeline.poll_interval();

        let queue = AudioOutputQueue::new(config.pipeline.output_queue_capacity);
        let drain_queue = queue.clone();
        let arbiter = Arc::new(
            InterruptionArbiter::new(TrackerConfig {
                frame_duration_ms: config.audio.frame_duration_ms,
                speech_threshold_ms: config.vad.speech_threshold_ms,
                silence_threshold_ms: config.vad.barge_in_silence_ms,
            })
            .with_interrupt_handler(move || {
                let dropped = drain_queue.drain();
                tracing::debug!(dropped, "flushed queued audio");
            }),
        );

        let speaker = Speaker::new(
            services.synthesizer.clone(),
            services.cache.clone(),
            arbiter.clone(),
            queue.clone(),
            running.clone(),
            &config.assistant.voice_id,
            config.assistant.speed,
            config.pipeline.playback_chunk_bytes,
            poll,
        );

        let (request_tx, request_rx) = bounded::<ResponseRequest>(4);
        let (outcome_tx, outcome_rx) = bounded::<ResponseOutcome>(1);

        let response_runner = StationRunner::spawn(
            ResponseStation {
                language_model: services.language_model.clone(),
                speaker,
                history: history.clone(),
                system_prompt: config.assistant.system_prompt.clone(),
                running: running.clone(),
                error_reporter: self.error_reporter.clone(),
            },
            request_rx,
            outcome_tx,
            self.error_reporter.clone(),
        );

        let mut threads = Vec::new();

        threads.push(spawn_audio_intake(
            services.transport.clone(),
            services.recognizer.clone(),
            classifier,
            arbiter.clone(),
            running.clone(),
            poll,
        ));

        if let Some(first_message) = config
            .assistant
            .first_message
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            && request_tx
                .send(ResponseRequest::Scripted(first_message.to_string()))
                .is_err()
        {
            tracing::warn!("response stage unavailable, skipping opening line");
        }

        threads.push(spawn_transcript_intake(
            services.recognizer.clone(),
            history.clone(),
            request_tx,
            outcome_rx,
            running.clone(),
            poll,
        ));

        threads.push(spawn_playback(
            services.transport.clone(),
            queue,
            running.clone(),
            poll,
        ));

        threads.push(thread::spawn(move || {
            if let Err(msg) = response_runner.join() {
                tracing::error!("{msg}");
            }
        }));

        Ok(VoiceBotHandle {
            running,
            threads,
            history,
            arbiter,
            recognizer: services.recognizer,
            transport: services.transport,
            #[cfg(feature = "http")]
            pool: self.pool,
        })
    }
}

/// Classify caller frames, detect barge-in, and forward speech to transcription.
fn spawn_audio_intake(
    transport: Arc<dyn MediaTransport>,
    recognizer: Arc<dyn SpeechRecognizer>,
    classifier: Arc<dyn FrameClassifier>,
    arbiter: Arc<InterruptionArbiter>,
    running: Arc<AtomicBool>,
    poll: Duration,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut consecutive_errors: u32 = 0;
        let mut frames: u64 = 0;

        while running.load(Ordering::SeqCst) {
            let frame = match transport.next_frame(poll) {
                Ok(Some(frame)) => {
                    consecutive_errors = 0;
                    frame
                }
                Ok(None) => continue,
                Err(e) if e.is_closed() => {
                    tracing::info!("caller disconnected");
                    running.store(false, Ordering::SeqCst);
                    break;
                }
                Err(e) => {
                    consecutive_errors += 1;
                    if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                        tracing::error!(error = %e, consecutive_errors, "inbound audio failing, ending conversation");
                        running.store(false, Ordering::SeqCst);
                        break;
                    }
                    tracing::warn!(error = %e, "inbound audio error");
                    thread::sleep(poll);
                    continue;
                }
            };
            frames += 1;

            let is_speech = classifier.is_speech(&frame);
            if arbiter.process_frame(is_speech) {
                tracing::debug!(frame = frames, "caller barged in");
            }

            if is_speech && let Err(e) = recognizer.send_audio(&frame) {
                tracing::warn!(error = %e, "failed to forward audio to transcription");
            }
        }
        tracing::debug!(frames, "audio intake stopped");
    })
}

/// Turn final transcripts into user turns and wait for each reply.
fn spawn_transcript_intake(
    recognizer: Arc<dyn SpeechRecognizer>,
    history: ConversationHistory,
    request_tx: Sender<ResponseRequest>,
    outcome_rx: Receiver<ResponseOutcome>,
    running: Arc<AtomicBool>,
    poll: Duration,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut consecutive_errors: u32 = 0;

        'intake: while running.load(Ordering::SeqCst) {
            let transcript = match recognizer.next_transcript(poll) {
                Ok(Some(transcript)) => {
                    consecutive_errors = 0;
                    transcript
                }
                Ok(None) => continue,
                Err(e) if e.is_closed() => {
                    tracing::info!("transcription closed, ending conversation");
                    running.store(false, Ordering::SeqCst);
                    break;
                }
                Err(e) => {
                    consecutive_errors += 1;
                    if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                        tracing::error!(error = %e, consecutive_errors, "transcription failing, ending conversation");
                        running.store(false, Ordering::SeqCst);
                        break;
                    }
                    tracing::warn!(error = %e, "transcription error");
                    thread::sleep(poll);
                    continue;
                }
            };

            let text = transcript.text.trim();
            if !transcript.is_final || text.is_empty() {
                continue;
            }
            tracing::info!(text, confidence = transcript.confidence, "caller said");
            history.push(ConversationTurn::user(text));

            if request_tx.send(ResponseRequest::Reply).is_err() {
                tracing::error!("response stage stopped, ending conversation");
                running.store(false, Ordering::SeqCst);
                break;
            }
            loop {
                match outcome_rx.recv_timeout(poll) {
                    Ok(_) => break,
                    Err(RecvTimeoutError::Timeout) => {
                        if !running.load(Ordering::SeqCst) {
                            break 'intake;
                        }
                    }
                    Err(RecvTimeoutError::Disconnected) => {
                        running.store(false, Ordering::SeqCst);
                        break 'intake;
                    }
                }
            }
        }
        tracing::debug!("transcript intake stopped");
    })
}

/// Send queued bot audio to the caller.
fn spawn_playback(
    transport: Arc<dyn MediaTransport>,
    queue: AudioOutputQueue,
    running: Arc<AtomicBool>,
    poll: Duration,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut sent: u64 = 0;
        while running.load(Ordering::SeqCst) {
            let Some(chunk) = queue.pop(poll) else {
                continue;
            };
            match transport.send_frame(&chunk) {
                Ok(()) => sent += 1,
                Err(e) => tracing::warn!(error = %e, "failed to send audio"),
            }
        }
        tracing::debug!(chunks = sent, "playback stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::frame::samples_to_bytes;
    use crate::pipeline::history::Role;
    use crate::services::llm::MockLanguageModel;
    use crate::services::transcriber::{MockRecognizer, Transcript};
    use crate::services::transport::MockTransport;
    use crate::services::tts::MockSynthesizer;
    use std::sync::Mutex;

    struct Mocks {
        recognizer: Arc<MockRecognizer>,
        language_model: MockLanguageModel,
        synthesizer: MockSynthesizer,
        transport: Arc<MockTransport>,
    }

    impl Mocks {
        fn new() -> Self {
            Self {
                recognizer: Arc::new(MockRecognizer::new()),
                language_model: MockLanguageModel::new(),
                synthesizer: MockSynthesizer::new().with_chunks(2, 320),
                transport: Arc::new(MockTransport::new()),
            }
        }

        fn services(&self) -> Services {
            Services {
                recognizer: self.recognizer.clone(),
                language_model: Arc::new(self.language_model.clone()),
                synthesizer: Arc::new(self.synthesizer.clone()),
                transport: self.transport.clone(),
                cache: Arc::new(SynthesisCache::disabled()),
            }
        }
    }

    fn test_config() -> Config {
        let mut config = Config::default();
        config.pipeline.poll_interval_ms = 10;
        config
    }

    fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        condition()
    }

    #[derive(Default)]
    struct CollectingReporter {
        errors: Mutex<Vec<String>>,
    }

    impl ErrorReporter for CollectingReporter {
        fn report(&self, stage: &str, error: &StageError) {
            self.errors
                .lock()
                .unwrap()
                .push(format!("{stage}: {error}"));
        }
    }

    #[test]
    fn start_connects_collaborators() {
        let mocks = Mocks::new();
        let handle = VoiceBot::new(test_config(), mocks.services()).start().unwrap();
        assert!(mocks.recognizer.is_connected());
        assert!(mocks.transport.is_connected());
        assert!(handle.is_running());
        let history = handle.stop();
        assert!(history.is_empty());
        assert!(mocks.recognizer.is_closed());
        assert!(!mocks.transport.is_connected());
    }

    #[test]
    fn start_fails_when_transcription_cannot_connect() {
        let mut mocks = Mocks::new();
        mocks.recognizer = Arc::new(MockRecognizer::new().with_connect_failure());
        assert!(VoiceBot::new(test_config(), mocks.services()).start().is_err());
        assert!(!mocks.transport.is_connected());
    }

    #[test]
    fn start_rejects_invalid_config() {
        let mocks = Mocks::new();
        let mut config = test_config();
        config.audio.frame_duration_ms = 15;
        assert!(VoiceBot::new(config, mocks.services()).start().is_err());
        assert!(!mocks.recognizer.is_connected());
    }

    #[test]
    fn opening_line_is_spoken_and_recorded() {
        let mocks = Mocks::new();
        let mut config = test_config();
        config.assistant.first_message = Some("Thanks for calling.".to_string());

        let handle = VoiceBot::new(config, mocks.services()).start().unwrap();
        assert!(wait_until(Duration::from_secs(2), || mocks.transport.sent_count() >= 2));
        assert!(wait_until(Duration::from_secs(2), || !handle.history().is_empty()));
        let history = handle.stop();

        assert_eq!(history, vec![ConversationTurn::assistant("Thanks for calling.")]);
        assert_eq!(mocks.synthesizer.requests()[0].text, "Thanks for calling.");
    }

    #[test]
    fn final_transcript_triggers_sentence_by_sentence_reply() {
        let mut mocks = Mocks::new();
        mocks.language_model = MockLanguageModel::new()
            .with_reply(&["Hello", " there", ".", " How", " are", " you", "?"]);

        let handle = VoiceBot::new(test_config(), mocks.services()).start().unwrap();
        mocks.recognizer.push_transcript(Transcript::interim("hi th"));
        mocks.recognizer.push_transcript(Transcript::final_text("   "));
        mocks.recognizer.push_transcript(Transcript::final_text("Hi there"));

        assert!(wait_until(Duration::from_secs(3), || handle.history().len() == 2));
        let history = handle.stop();

        assert_eq!(history[0], ConversationTurn::user("Hi there"));
        assert_eq!(history[1].role, Role::Assistant);
        assert_eq!(history[1].content, "Hello there. How are you?");

        let texts: Vec<String> = mocks
            .synthesizer
            .requests()
            .into_iter()
            .map(|r| r.text)
            .collect();
        assert_eq!(texts, vec!["Hello there.", "How are you?"]);

        let requests = mocks.language_model.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0][0].role, Role::System);
        assert_eq!(requests[0][1], ConversationTurn::user("Hi there"));
    }

    #[test]
    fn generation_failure_is_reported_and_bot_keeps_running() {
        let mut mocks = Mocks::new();
        mocks.language_model = MockLanguageModel::new().with_failure();
        let reporter = Arc::new(CollectingReporter::default());

        let handle = VoiceBot::new(test_config(), mocks.services())
            .with_error_reporter(reporter.clone())
            .start()
            .unwrap();
        mocks.recognizer.push_transcript(Transcript::final_text("hello?"));
        mocks.recognizer.push_transcript(Transcript::final_text("anyone?"));

        assert!(wait_until(Duration::from_secs(2), || {
            reporter.errors.lock().unwrap().len() == 2
        }));
        assert!(handle.is_running());
        let history = handle.stop();

        assert_eq!(
            history,
            vec![ConversationTurn::user("hello?"), ConversationTurn::user("anyone?")]
        );
        assert_eq!(mocks.transport.sent_count(), 0);
    }

    #[test]
    fn speech_frames_are_forwarded_to_transcription() {
        let loud = samples_to_bytes(&[8000i16, -8000].repeat(240));
        let silent = vec![0u8; 960];
        let mut mocks = Mocks::new();
        mocks.transport = Arc::new(MockTransport::new().with_inbound(vec![
            loud.clone(),
            silent.clone(),
            loud.clone(),
            silent,
            loud,
        ]));

        let handle = VoiceBot::new(test_config(), mocks.services()).start().unwrap();
        assert!(wait_until(Duration::from_secs(2), || {
            mocks.recognizer.frames_received() == 3
        }));
        handle.stop();
    }

    #[test]
    fn caller_hang_up_ends_conversation() {
        let mut mocks = Mocks::new();
        mocks.transport = Arc::new(MockTransport::new());
        let handle = VoiceBot::new(test_config(), mocks.services()).start().unwrap();
        mocks.transport.hang_up();
        assert!(wait_until(Duration::from_secs(2), || !handle.is_running()));
        handle.stop();
    }

    /// Transport whose inbound side fails on every read.
    struct BrokenTransport {
        reads: std::sync::atomic::AtomicU32,
    }

    impl MediaTransport for BrokenTransport {
        fn connect(&self) -> Result<()> {
            Ok(())
        }

        fn next_frame(&self, _timeout: Duration) -> Result<Option<Vec<u8>>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Err(crate::error::VoxbotError::Transport {
                message: "socket reset".to_string(),
            })
        }

        fn send_frame(&self, _pcm: &[u8]) -> Result<()> {
            Ok(())
        }

        fn disconnect(&self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn persistent_inbound_errors_end_conversation() {
        let mocks = Mocks::new();
        let transport = Arc::new(BrokenTransport {
            reads: std::sync::atomic::AtomicU32::new(0),
        });
        let mut services = mocks.services();
        services.transport = transport.clone();

        let handle = VoiceBot::new(test_config(), services).start().unwrap();
        assert!(wait_until(Duration::from_secs(2), || !handle.is_running()));
        handle.stop();
        assert_eq!(transport.reads.load(Ordering::SeqCst), MAX_CONSECUTIVE_ERRORS);
    }

    #[test]
    fn transcription_closing_ends_conversation() {
        let mocks = Mocks::new();
        let handle = VoiceBot::new(test_config(), mocks.services()).start().unwrap();
        mocks.recognizer.close().unwrap();
        assert!(wait_until(Duration::from_secs(2), || !handle.is_running()));
        handle.stop();
    }

    #[test]
    fn barge_in_before_any_audio_records_no_assistant_turn() {
        let mut mocks = Mocks::new();
        mocks.language_model = MockLanguageModel::new().with_reply(&["Hello", " there", "."]);
        mocks.synthesizer = MockSynthesizer::new()
            .with_chunks(2, 960)
            .with_chunk_delay(Duration::from_millis(200));
        let loud = samples_to_bytes(&[8000i16, -8000].repeat(240));

        let handle = VoiceBot::new(test_config(), mocks.services()).start().unwrap();
        mocks.recognizer.push_transcript(Transcript::final_text("hi"));
        assert!(wait_until(Duration::from_secs(2), || handle.arbiter.is_playing()));
        for _ in 0..6 {
            mocks.transport.push_inbound(loud.clone());
        }
        assert!(wait_until(Duration::from_secs(2), || handle.arbiter.is_interrupted()));

        mocks.recognizer.push_transcript(Transcript::final_text("hello?"));
        assert!(wait_until(Duration::from_secs(3), || handle.history().len() == 3));
        let history = handle.stop();

        assert_eq!(
            history,
            vec![
                ConversationTurn::user("hi"),
                ConversationTurn::user("hello?"),
                ConversationTurn::assistant("Hello there."),
            ]
        );
    }

    #[cfg(feature = "http")]
    #[test]
    fn stop_closes_connection_pool() {
        let mocks = Mocks::new();
        let pool = Arc::new(ConnectionPool::new(Duration::from_secs(5)).unwrap());
        let handle = VoiceBot::new(test_config(), mocks.services())
            .with_connection_pool(pool.clone())
            .start()
            .unwrap();
        assert!(!pool.is_closed());
        handle.stop();
        assert!(pool.is_closed());
        assert!(pool.client().is_err());
    }
}
