//! Speech synthesis adapter.
//!
//! The synthesis engine itself (a browser voice library, an OS speech
//! service, a test stub) is an external capability behind
//! [`SynthesisEngine`]; this module owns everything around it: text
//! sanitation, voice resolution, the one-utterance-in-flight rule, and the
//! single-slot pending queue used while a cancel settles.

pub mod sanitize;

use crate::config::SynthesisConfig;
use crate::error::Result;
use crate::lang::looks_tagalog;
use tracing::{debug, warn};

/// Voices accepted without falling back to the default.
///
/// Fixed allow-list of names the hosted voice engine reliably supports.
pub const SUPPORTED_VOICES: &[&str] = &[
    "UK English Female",
    "UK English Male",
    "US English Female",
    "US English Male",
    "Australian Female",
    "Filipino Female",
    "French Female",
    "German Female",
    "Italian Female",
    "Japanese Female",
    "Spanish Female",
    "Spanish Male",
];

/// The vernacular voice that gets a reduced rate for Tagalog text.
pub const TAGALOG_VOICE: &str = "Filipino Female";

/// Prosody parameters handed to the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeechParams {
    /// Speech rate.
    pub rate: f32,
    /// Pitch.
    pub pitch: f32,
    /// Volume.
    pub volume: f32,
}

/// Playback lifecycle reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    /// Audio started.
    Started,
    /// Audio finished (including after a cancel).
    Finished,
    /// The engine failed; no more events for this utterance.
    Error(String),
}

/// Audio-producing capability consumed as a black box.
///
/// `speak` starts asynchronous playback; the engine reports
/// [`PlaybackEvent`]s back to the host, which feeds them into
/// [`SynthesizerAdapter::handle_engine_event`].
pub trait SynthesisEngine: Send {
    /// Start speaking `text` with the given voice and prosody.
    ///
    /// # Errors
    ///
    /// Returns an error if playback cannot start.
    fn speak(&mut self, text: &str, voice: &str, params: SpeechParams) -> Result<()>;

    /// Cancel the current utterance. The engine still reports a terminal
    /// `Finished` or `Error` event for it. Idempotent.
    fn cancel(&mut self);
}

/// Outcome of a `speak` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakOutcome {
    /// Handed to the engine.
    Spoken,
    /// Parked in the pending slot while a cancel settles.
    Queued,
    /// Nothing left after cleaning; the engine was not invoked.
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SpeakState {
    Idle,
    Speaking,
    /// A cancel was issued; waiting for the engine's terminal event.
    Cancelling,
}

#[derive(Debug)]
struct PendingUtterance {
    text: String,
    voice: String,
}

/// Wraps a [`SynthesisEngine`] with the session's synthesis rules.
pub struct SynthesizerAdapter {
    engine: Box<dyn SynthesisEngine>,
    config: SynthesisConfig,
    state: SpeakState,
    /// At most one utterance parked while a cancel settles. A newer request
    /// replaces the slot; it never grows.
    pending: Option<PendingUtterance>,
}

impl SynthesizerAdapter {
    /// Wrap an engine.
    #[must_use]
    pub fn new(engine: Box<dyn SynthesisEngine>, config: SynthesisConfig) -> Self {
        Self {
            engine,
            config,
            state: SpeakState::Idle,
            pending: None,
        }
    }

    /// Whether an utterance is currently audible.
    #[must_use]
    pub fn is_speaking(&self) -> bool {
        self.state == SpeakState::Speaking
    }

    /// Speak `text`, cancelling any current utterance first.
    ///
    /// Text is cleaned before synthesis; empty-after-cleaning requests skip
    /// the engine entirely and count as finished.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine rejects the utterance.
    pub fn speak(&mut self, text: &str, voice: &str) -> Result<SpeakOutcome> {
        let cleaned = sanitize::clean_for_speech(text);
        if cleaned.is_empty() {
            debug!("nothing to speak after cleaning");
            return Ok(SpeakOutcome::Skipped);
        }

        let voice = self.resolve_voice(voice).to_owned();

        match self.state {
            SpeakState::Idle => {
                self.start_utterance(&cleaned, &voice)?;
                Ok(SpeakOutcome::Spoken)
            }
            SpeakState::Speaking => {
                // One utterance in flight: cancel, park the new text until
                // the engine confirms the cancel settled.
                self.engine.cancel();
                self.state = SpeakState::Cancelling;
                self.pending = Some(PendingUtterance {
                    text: cleaned,
                    voice,
                });
                Ok(SpeakOutcome::Queued)
            }
            SpeakState::Cancelling => {
                if self.pending.is_some() {
                    debug!("replacing pending utterance while cancel settles");
                }
                self.pending = Some(PendingUtterance {
                    text: cleaned,
                    voice,
                });
                Ok(SpeakOutcome::Queued)
            }
        }
    }

    /// Cancel playback without queueing anything new (barge-in).
    ///
    /// Synchronous: playback is considered cancelled the moment this
    /// returns, regardless of when the engine's terminal event lands.
    pub fn cancel(&mut self) {
        self.pending = None;
        if self.state == SpeakState::Speaking {
            self.engine.cancel();
            self.state = SpeakState::Cancelling;
        }
    }

    /// Feed an engine lifecycle event through the adapter.
    ///
    /// Returns the event the session should observe, or `None` when the
    /// event was internal bookkeeping (a cancelled utterance settling
    /// before a pending one starts).
    pub fn handle_engine_event(&mut self, event: PlaybackEvent) -> Option<PlaybackEvent> {
        match event {
            PlaybackEvent::Started => {
                self.state = SpeakState::Speaking;
                Some(PlaybackEvent::Started)
            }
            PlaybackEvent::Finished | PlaybackEvent::Error(_) => {
                let was_cancelling = self.state == SpeakState::Cancelling;
                self.state = SpeakState::Idle;
                if let PlaybackEvent::Error(ref msg) = event {
                    warn!("synthesis engine error: {msg}");
                }
                // Drain the single-slot queue immediately.
                if let Some(pending) = self.pending.take() {
                    if let Err(e) = self.start_utterance(&pending.text, &pending.voice) {
                        warn!("failed to start pending utterance: {e}");
                        return Some(PlaybackEvent::Error(e.to_string()));
                    }
                }
                // The settling event of a cancelled utterance is not a real
                // end of speech; the session already announced the stop when
                // it issued the cancel.
                if was_cancelling {
                    return None;
                }
                Some(event)
            }
        }
    }

    /// Validate a requested voice against the allow-list.
    ///
    /// Empty or unrecognized names fall back to the configured default.
    #[must_use]
    pub fn resolve_voice<'a>(&'a self, requested: &'a str) -> &'a str {
        let requested = requested.trim();
        if !requested.is_empty() && SUPPORTED_VOICES.contains(&requested) {
            requested
        } else {
            if !requested.is_empty() {
                warn!("unsupported voice '{requested}', using default");
            }
            &self.config.default_voice
        }
    }

    fn start_utterance(&mut self, text: &str, voice: &str) -> Result<()> {
        let params = self.params_for(text, voice);
        debug!("speaking with voice '{voice}' (rate {})", params.rate);
        self.engine.speak(text, voice, params)
    }

    /// Prosody for an utterance. The vernacular voice slows down when the
    /// text looks Tagalog; default rate mis-pronounces it.
    fn params_for(&self, text: &str, voice: &str) -> SpeechParams {
        let rate = if voice == TAGALOG_VOICE && looks_tagalog(text) {
            self.config.tagalog_rate
        } else {
            self.config.rate
        };
        SpeechParams {
            rate,
            pitch: self.config.pitch,
            volume: self.config.volume,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use std::sync::{Arc, Mutex};

    /// Records engine calls; playback events are driven by the test.
    #[derive(Default)]
    struct RecordingEngine {
        calls: Arc<Mutex<Vec<(String, String, f32)>>>,
        cancels: Arc<Mutex<u32>>,
    }

    impl SynthesisEngine for RecordingEngine {
        fn speak(&mut self, text: &str, voice: &str, params: SpeechParams) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push((text.to_owned(), voice.to_owned(), params.rate));
            Ok(())
        }

        fn cancel(&mut self) {
            *self.cancels.lock().unwrap() += 1;
        }
    }

    fn adapter() -> (SynthesizerAdapter, Arc<Mutex<Vec<(String, String, f32)>>>, Arc<Mutex<u32>>) {
        let engine = RecordingEngine::default();
        let calls = Arc::clone(&engine.calls);
        let cancels = Arc::clone(&engine.cancels);
        (
            SynthesizerAdapter::new(Box::new(engine), SynthesisConfig::default()),
            calls,
            cancels,
        )
    }

    #[test]
    fn empty_after_cleaning_skips_engine() {
        let (mut adapter, calls, _) = adapter();
        let outcome = adapter.speak("😄 (only an aside)", "US English Female").unwrap();
        assert_eq!(outcome, SpeakOutcome::Skipped);
        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn speak_while_speaking_cancels_then_queues() {
        let (mut adapter, calls, cancels) = adapter();
        adapter.speak("first reply", "US English Female").unwrap();
        adapter.handle_engine_event(PlaybackEvent::Started);
        assert!(adapter.is_speaking());

        let outcome = adapter.speak("second reply", "US English Female").unwrap();
        assert_eq!(outcome, SpeakOutcome::Queued);
        assert_eq!(*cancels.lock().unwrap(), 1);
        // Engine not yet asked to speak the second utterance.
        assert_eq!(calls.lock().unwrap().len(), 1);

        // Cancel settles; pending slot drains immediately and silently.
        let observed = adapter.handle_engine_event(PlaybackEvent::Finished);
        assert!(observed.is_none());
        assert_eq!(calls.lock().unwrap().len(), 2);
        assert_eq!(calls.lock().unwrap()[1].0, "second reply");
    }

    #[test]
    fn pending_slot_never_grows() {
        let (mut adapter, calls, _) = adapter();
        adapter.speak("first", "US English Female").unwrap();
        adapter.handle_engine_event(PlaybackEvent::Started);
        adapter.speak("second", "US English Female").unwrap();
        adapter.speak("third", "US English Female").unwrap();

        adapter.handle_engine_event(PlaybackEvent::Finished);
        // Only the newest pending utterance is spoken.
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].0, "third");
    }

    #[test]
    fn barge_in_cancel_drops_pending() {
        let (mut adapter, calls, cancels) = adapter();
        adapter.speak("reply", "US English Female").unwrap();
        adapter.handle_engine_event(PlaybackEvent::Started);
        adapter.speak("queued reply", "US English Female").unwrap();

        adapter.cancel();
        assert_eq!(*cancels.lock().unwrap(), 1, "already cancelling");
        adapter.handle_engine_event(PlaybackEvent::Finished);
        // The queued utterance was dropped by the barge-in.
        assert_eq!(calls.lock().unwrap().len(), 1);
        assert!(!adapter.is_speaking());
    }

    #[test]
    fn settling_event_after_bare_cancel_is_absorbed() {
        let (mut adapter, _, cancels) = adapter();
        adapter.speak("reply", "US English Female").unwrap();
        adapter.handle_engine_event(PlaybackEvent::Started);

        adapter.cancel();
        assert_eq!(*cancels.lock().unwrap(), 1);
        // Nothing queued: the engine's terminal event is bookkeeping only.
        assert!(adapter.handle_engine_event(PlaybackEvent::Finished).is_none());
        assert!(!adapter.is_speaking());
    }

    #[test]
    fn unknown_voice_falls_back_to_default() {
        let (adapter, _, _) = adapter();
        assert_eq!(adapter.resolve_voice("Martian Male"), "US English Female");
        assert_eq!(adapter.resolve_voice(""), "US English Female");
        assert_eq!(adapter.resolve_voice("Filipino Female"), "Filipino Female");
    }

    #[test]
    fn tagalog_voice_slows_down_for_tagalog_text() {
        let (mut adapter, calls, _) = adapter();
        adapter
            .speak("Magandang umaga sa iyo po", TAGALOG_VOICE)
            .unwrap();
        adapter.handle_engine_event(PlaybackEvent::Finished);
        adapter.speak("Good morning to you", TAGALOG_VOICE).unwrap();

        let calls = calls.lock().unwrap();
        assert!((calls[0].2 - 0.9).abs() < f32::EPSILON);
        assert!((calls[1].2 - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn engine_error_surfaces_and_resets() {
        let (mut adapter, _, _) = adapter();
        adapter.speak("reply", "US English Female").unwrap();
        adapter.handle_engine_event(PlaybackEvent::Started);
        let observed = adapter.handle_engine_event(PlaybackEvent::Error("boom".into()));
        assert_eq!(observed, Some(PlaybackEvent::Error("boom".into())));
        assert!(!adapter.is_speaking());
    }
}
