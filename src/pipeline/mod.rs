//! Conversation pipeline.
//!
//! Stages run on their own threads and hand work over crossbeam channels.
//! The orchestrator wires them together around a single interruption arbiter.

pub mod barge_in;
pub mod error;
pub mod history;
pub mod orchestrator;
pub mod queue;
pub mod segmenter;
pub mod speaker;
pub mod station;

pub use barge_in::{CancellationSignal, InterruptionArbiter, PlaybackGuard};
pub use error::{ErrorReporter, LogReporter, StageError};
pub use history::{ConversationHistory, ConversationTurn, Role};
pub use orchestrator::{ResponseOutcome, ResponseRequest, Services, VoiceBot, VoiceBotHandle};
pub use queue::AudioOutputQueue;
pub use segmenter::SentenceSegmenter;
pub use speaker::{SpeakOutcome, Speaker};
pub use station::{Station, StationRunner};
