//! External collaborators: recognition, generation, synthesis, transport.
//!
//! Each collaborator is a trait with a mock implementation for tests;
//! HTTP-backed implementations are behind the `http` feature.

pub mod llm;
#[cfg(feature = "http")]
pub mod pool;
pub mod transcriber;
pub mod transport;
pub mod tts;

pub use llm::{LanguageModel, MockLanguageModel, TokenStream};
pub use transcriber::{MockRecognizer, SpeechRecognizer, Transcript};
pub use transport::{MediaTransport, MockTransport};
pub use tts::{AudioStream, MockSynthesizer, SpeechSynthesizer};

#[cfg(feature = "http")]
pub use llm::OpenRouterClient;
#[cfg(feature = "http")]
pub use pool::ConnectionPool;
#[cfg(feature = "http")]
pub use tts::MinimaxClient;
