//! Speech recognition capability and restart policy.
//!
//! The transcription source is an external capability (a browser speech
//! recognizer, an OS service, a test stub). The session never talks to an
//! engine directly; it consumes [`RecognitionEvent`]s and drives the source
//! through the [`TranscriptionSource`] trait. A host environment without the
//! capability simply passes no source; voice input is disabled while text
//! input and synthesis stay operative.

use crate::error::Result;
use crate::lang::Language;
use std::time::Duration;

/// Persisted microphone permission state.
///
/// Denial is sticky: the session never re-requests on its own, the user has
/// to re-initiate voice input explicitly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MicPermission {
    /// Never asked, or no stored answer.
    #[default]
    Unknown,
    /// Granted and persisted.
    Granted,
    /// Denied and persisted.
    Denied,
}

impl MicPermission {
    /// Stored string form.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Granted => "granted",
            Self::Denied => "denied",
        }
    }

    /// Parse the stored string form. Anything unrecognized is `Unknown`.
    #[must_use]
    pub fn from_str_lossy(value: &str) -> Self {
        match value.trim() {
            "granted" => Self::Granted,
            "denied" => Self::Denied,
            _ => Self::Unknown,
        }
    }
}

/// Events emitted by a transcription source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    /// A transcript fragment.
    Transcript {
        /// Recognized text.
        text: String,
        /// `true` for an interim (still-mutating) result.
        is_interim: bool,
    },
    /// The user audibly started speaking. Fires before any transcript.
    SpeechStart,
    /// The capture session ended on its own (engine timeout, silence).
    Ended,
    /// The source failed.
    Error(RecognitionError),
}

/// Recognition failure classes, mirroring what speech engines report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionError {
    /// Microphone permission denied. Never auto-retried.
    PermissionDenied,
    /// No speech detected before the engine gave up. Benign.
    NoSpeech,
    /// Capture was aborted deliberately. Benign.
    Aborted,
    /// Anything else.
    Other(String),
}

/// Live-audio transcription capability.
pub trait TranscriptionSource: Send {
    /// Begin capturing. Events flow to the channel handed over at
    /// construction time.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying engine cannot start.
    fn start(&mut self) -> Result<()>;

    /// Stop capturing. Idempotent.
    fn stop(&mut self);

    /// Switch the recognition language. Takes effect on the next capture
    /// session at the latest.
    fn set_language(&mut self, language: Language);
}

/// Capped exponential backoff for automatic capture restarts.
///
/// Speech engines end capture sessions on their own (silence timeouts,
/// transient errors); while the user still wants to listen, the host
/// restarts the source. Unbounded immediate restarts can spin, so restarts
/// are delayed and capped.
#[derive(Debug)]
pub struct RestartBackoff {
    base: Duration,
    max_delay: Duration,
    max_attempts: u32,
    attempts: u32,
}

impl RestartBackoff {
    /// Create a backoff policy.
    #[must_use]
    pub fn new(base: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            max_delay,
            max_attempts,
            attempts: 0,
        }
    }

    /// Build from the recognition config section.
    #[must_use]
    pub fn from_config(config: &crate::config::RecognitionConfig) -> Self {
        Self::new(
            Duration::from_millis(config.restart_base_delay_ms),
            Duration::from_millis(config.restart_max_delay_ms),
            config.restart_max_attempts,
        )
    }

    /// Delay before the next restart, or `None` once attempts are exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts >= self.max_attempts {
            return None;
        }
        let delay = self
            .base
            .checked_mul(1_u32 << self.attempts.min(16))
            .map_or(self.max_delay, |d| d.min(self.max_delay));
        self.attempts += 1;
        Some(delay)
    }

    /// Reset after a successful capture session.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Number of restarts consumed since the last reset.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn backoff_doubles_until_cap() {
        let mut backoff = RestartBackoff::new(
            Duration::from_millis(300),
            Duration::from_millis(5_000),
            6,
        );
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(300)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(600)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(1_200)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(2_400)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(4_800)));
        // Capped.
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(5_000)));
        // Exhausted.
        assert_eq!(backoff.next_delay(), None);
    }

    #[test]
    fn backoff_reset_restores_attempts() {
        let mut backoff =
            RestartBackoff::new(Duration::from_millis(100), Duration::from_millis(1_000), 2);
        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_some());
        assert_eq!(backoff.next_delay(), None);

        backoff.reset();
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(100)));
    }

    #[test]
    fn permission_round_trips_through_storage_form() {
        for perm in [
            MicPermission::Unknown,
            MicPermission::Granted,
            MicPermission::Denied,
        ] {
            assert_eq!(MicPermission::from_str_lossy(perm.as_str()), perm);
        }
        assert_eq!(
            MicPermission::from_str_lossy("garbage"),
            MicPermission::Unknown
        );
    }
}
