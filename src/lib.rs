//! Kausap: bilingual voice-chat assistant session controller.
//!
//! This crate reconciles three concurrent capabilities into one ordered
//! conversation transcript:
//! - **Recognition**: live-audio transcription behind [`recognition::TranscriptionSource`]
//! - **Generation**: provider calls behind [`generator::ResponseGenerator`]
//! - **Synthesis**: spoken replies behind [`synthesis::SynthesisEngine`]
//!
//! # Architecture
//!
//! The [`session::SessionController`] owns all sequencing: the phase
//! machine, the at-most-one-generation rule, barge-in cancellation, and the
//! transient draft. Capabilities are trait objects so hosts plug in real
//! engines, and tests plug in stubs, without touching session logic. State
//! changes stream to subscribers over a broadcast channel; persistence runs
//! in the background with debounced writes.
//!
//! The assistant is bilingual (English / Tagalog); a lightweight
//! function-word heuristic steers fallback flavor and speech rate.

pub mod config;
pub mod error;
pub mod generator;
pub mod lang;
pub mod persona;
pub mod recognition;
pub mod session;
pub mod store;
pub mod synthesis;
pub mod transcript;

pub use config::AssistantConfig;
pub use error::{AssistantError, Result};
pub use generator::{GeminiGenerator, ProviderError, ResponseGenerator};
pub use lang::Language;
pub use recognition::{RecognitionEvent, TranscriptionSource};
pub use session::{SessionController, SessionEvent, SessionPhase, TurnOutcome};
pub use store::{FileKvStore, HistoryStore, KvStore, MemoryKvStore};
pub use synthesis::{PlaybackEvent, SynthesisEngine, SynthesizerAdapter};
pub use transcript::{HistoryEnvelope, Message, Role};
