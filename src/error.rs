//! Error types for the conversation session.

/// Top-level error type for the voice-chat assistant.
#[derive(Debug, thiserror::Error)]
pub enum AssistantError {
    /// Speech recognition (transcription source) error.
    #[error("recognition error: {0}")]
    Recognition(String),

    /// Response generation (provider) error.
    #[error("generator error: {0}")]
    Generator(String),

    /// Speech synthesis error.
    #[error("synthesis error: {0}")]
    Synthesis(String),

    /// Session state machine error.
    #[error("session error: {0}")]
    Session(String),

    /// Persistence store error.
    #[error("store error: {0}")]
    Store(String),

    /// History import rejected (malformed or wrong shape).
    #[error("import error: {0}")]
    Import(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, AssistantError>;
