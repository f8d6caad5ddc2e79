//! Events broadcast by the session controller for UI/observability.

use crate::transcript::{HistoryEnvelope, Message, NoticeKind};

/// Phase of the conversation loop.
///
/// `Idle` and `Listening` both accept typed input, which skips `Drafting`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionPhase {
    /// Nothing in flight.
    #[default]
    Idle,
    /// The transcription source is capturing.
    Listening,
    /// An interim transcript draft is on screen.
    Drafting,
    /// A generator call is outstanding.
    Generating,
    /// The synthesizer is playing a reply.
    Speaking,
}

/// Events emitted on the session's broadcast channel.
///
/// Subscribers (UI frontends, the REPL binary, tests) observe state
/// transitions here; none of these events feed back into session logic.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The conversation loop moved to a new phase.
    Phase(SessionPhase),
    /// The transient draft (interim transcript) changed.
    Draft {
        /// Current draft text.
        text: String,
    },
    /// A message was committed to the transcript.
    Committed(Message),
    /// A status annotation for the user.
    Notice {
        /// Severity.
        kind: NoticeKind,
        /// Display text.
        text: String,
    },
    /// Whether the transcription source is capturing.
    Listening {
        /// Capture active.
        active: bool,
    },
    /// Whether a generator call is in flight.
    Generating {
        /// Call outstanding.
        active: bool,
    },
    /// Whether the synthesizer is playing.
    Speaking {
        /// Playback active.
        active: bool,
    },
    /// Brackets the debounced persistence window. Observability only.
    Saving {
        /// A coalesced write is pending or running.
        active: bool,
    },
    /// The persisted history was replaced wholesale (import or clear).
    HistoryReplaced(HistoryEnvelope),
}
