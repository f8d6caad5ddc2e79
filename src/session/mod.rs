//! Conversation session controller.
//!
//! Reconciles three concurrent capabilities (speech recognition, response
//! generation, speech synthesis) into one ordered transcript. The
//! controller owns all sequencing rules: at most one generation in flight,
//! barge-in cancels playback synchronously, the transient draft never
//! reaches the persisted transcript, and provider failures surface as
//! canned replies instead of errors.
//!
//! State changes stream to subscribers over a `tokio::sync::broadcast`
//! channel; nothing a subscriber does feeds back into session logic.

pub mod events;

pub use events::{SessionEvent, SessionPhase};

use crate::config::AssistantConfig;
use crate::error::Result;
use crate::generator::{fallback, ProviderError, ResponseGenerator};
use crate::lang::Language;
use crate::persona::{self, WELCOME_MESSAGE};
use crate::recognition::{
    MicPermission, RecognitionError, RecognitionEvent, RestartBackoff, TranscriptionSource,
};
use crate::store::{HistoryStore, KvStore, Preferences};
use crate::synthesis::{
    PlaybackEvent, SpeakOutcome, SynthesisEngine, SynthesizerAdapter, TAGALOG_VOICE,
};
use crate::transcript::{HistoryEnvelope, Message, NoticeKind, Role};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Outcome of attempting to start a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnStart {
    /// The user message was committed; generate against this context.
    Started(Vec<Message>),
    /// A generation is already outstanding; nothing was committed.
    Busy,
    /// The input trimmed to nothing; nothing happened.
    Empty,
}

/// Outcome of a full turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The committed assistant reply.
    Completed(Message),
    /// A generation was already outstanding; the input was dropped.
    Busy,
    /// The input trimmed to nothing.
    Ignored,
    /// The transcript was replaced while the reply was in flight; the
    /// stale reply was dropped without committing.
    Discarded,
}

/// The conversation loop.
///
/// Single-owner: one controller per session, driven from one task. The
/// capabilities it coordinates run concurrently; their events are fed back
/// in through `on_recognition_event` and `on_playback_event`.
pub struct SessionController {
    generator: Arc<dyn ResponseGenerator>,
    synthesizer: SynthesizerAdapter,
    source: Option<Box<dyn TranscriptionSource>>,
    history: HistoryStore,
    prefs: Preferences,
    events: broadcast::Sender<SessionEvent>,

    /// Generation context: pinned persona priming pair, then the rolling
    /// user/assistant window. System notices never enter it.
    context: Vec<Message>,
    context_cap: usize,
    draft: Option<String>,
    phase: SessionPhase,
    generating: bool,
    /// Bumped whenever the transcript is replaced wholesale. A turn opened
    /// under an older epoch is stale and its reply is dropped.
    epoch: u64,
    /// The epoch captured when the outstanding turn opened.
    open_epoch: Option<u64>,
    listening: bool,
    /// User intent, as opposed to `listening` which tracks the engine.
    /// Governs whether capture restarts after the source ends on its own.
    wants_listening: bool,
    backoff: RestartBackoff,

    language: Language,
    voice: String,
    english_voice: String,
    tts_enabled: bool,

    last_commit_ms: i64,
    last_user_text: String,
    generation_timeout: Duration,
}

impl SessionController {
    /// Build a controller over its capabilities and storage.
    ///
    /// Preferences stored from earlier sessions (language, voice, TTS
    /// toggle) are applied immediately; call [`Self::start`] to load
    /// history and commit the welcome greeting.
    #[must_use]
    pub fn new(
        config: &AssistantConfig,
        generator: Arc<dyn ResponseGenerator>,
        engine: Box<dyn SynthesisEngine>,
        kv: Arc<dyn KvStore>,
    ) -> Self {
        let (events, _) = broadcast::channel(64);
        let history = HistoryStore::new(Arc::clone(&kv), &config.store, Some(events.clone()));
        let prefs = Preferences::new(kv);

        let english_voice = config.synthesis.default_voice.clone();
        let language = prefs.language();
        let voice = prefs.voice().unwrap_or_else(|| match language {
            Language::Tagalog => TAGALOG_VOICE.to_owned(),
            Language::English => english_voice.clone(),
        });
        let tts_enabled = config.session.tts_enabled && prefs.tts_enabled();

        Self {
            generator,
            synthesizer: SynthesizerAdapter::new(engine, config.synthesis.clone()),
            source: None,
            history,
            prefs,
            events,
            context: persona::priming_messages(),
            context_cap: config.session.context_max_messages,
            draft: None,
            phase: SessionPhase::Idle,
            generating: false,
            epoch: 0,
            open_epoch: None,
            listening: false,
            wants_listening: false,
            backoff: RestartBackoff::from_config(&config.recognition),
            language,
            voice,
            english_voice,
            tts_enabled,
            last_commit_ms: 0,
            last_user_text: String::new(),
            generation_timeout: Duration::from_secs(config.generator.timeout_secs),
        }
    }

    /// Attach a live-audio transcription source.
    ///
    /// Without one, voice input is disabled; text input and synthesis stay
    /// operative.
    #[must_use]
    pub fn with_source(mut self, source: Box<dyn TranscriptionSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Subscribe to session events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Load persisted history and open the session with the welcome
    /// greeting.
    ///
    /// The welcome message is committed and persisted like any assistant
    /// message but never handed to the synthesizer.
    pub fn start(&mut self) {
        let envelope = self.history.load();
        if !envelope.messages.is_empty() {
            info!("restored {} persisted messages", envelope.messages.len());
        }
        self.rebuild_context(&envelope);
        self.emit(SessionEvent::HistoryReplaced(envelope));
        self.commit(Message::assistant(WELCOME_MESSAGE));
        self.set_phase(SessionPhase::Idle);
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Whether a generator call is outstanding.
    #[must_use]
    pub fn is_generating(&self) -> bool {
        self.generating
    }

    /// Whether the transcription source is capturing.
    #[must_use]
    pub fn is_listening(&self) -> bool {
        self.listening
    }

    /// Whether the synthesizer is audible.
    #[must_use]
    pub fn is_speaking(&self) -> bool {
        self.synthesizer.is_speaking()
    }

    /// Current conversation language.
    #[must_use]
    pub fn language(&self) -> Language {
        self.language
    }

    /// Current synthesis voice.
    #[must_use]
    pub fn voice(&self) -> &str {
        &self.voice
    }

    /// The transient draft, if one is on screen.
    #[must_use]
    pub fn draft(&self) -> Option<&str> {
        self.draft.as_deref()
    }

    /// Snapshot of the persisted history.
    #[must_use]
    pub fn history_snapshot(&self) -> HistoryEnvelope {
        self.history.snapshot()
    }

    /// The generation context (priming pair included).
    #[must_use]
    pub fn context(&self) -> &[Message] {
        &self.context
    }

    // ---- voice input ----------------------------------------------------

    /// Begin capturing voice input.
    ///
    /// A stored permission denial keeps the microphone off until the user
    /// re-initiates; starting is never attempted behind their back.
    ///
    /// # Errors
    ///
    /// Returns an error if the transcription source fails to start.
    pub fn start_listening(&mut self) -> Result<()> {
        if self.prefs.mic_permission() == MicPermission::Denied {
            self.emit(SessionEvent::Notice {
                kind: NoticeKind::Warning,
                text: "Microphone access was denied earlier. Voice input stays off until you \
                       allow it again."
                    .to_owned(),
            });
            return Ok(());
        }
        let Some(source) = self.source.as_mut() else {
            self.emit(SessionEvent::Notice {
                kind: NoticeKind::Info,
                text: "Voice input is not available here. You can type instead.".to_owned(),
            });
            return Ok(());
        };
        source.start()?;
        self.prefs.set_mic_permission(MicPermission::Granted);
        self.wants_listening = true;
        self.listening = true;
        self.emit(SessionEvent::Listening { active: true });
        self.set_phase(SessionPhase::Listening);
        Ok(())
    }

    /// Stop capturing voice input. Idempotent. Drops any dangling draft.
    pub fn stop_listening(&mut self) {
        self.wants_listening = false;
        self.clear_draft();
        if let Some(source) = self.source.as_mut() {
            source.stop();
        }
        if self.listening {
            self.listening = false;
            self.emit(SessionEvent::Listening { active: false });
        }
        if matches!(self.phase, SessionPhase::Listening | SessionPhase::Drafting) {
            self.set_phase(SessionPhase::Idle);
        }
    }

    /// Feed one transcription source event through the session.
    ///
    /// Returns a delay when the host should restart capture after waiting
    /// it out (the source ended on its own while the user still wants to
    /// listen). `None` means no restart.
    pub async fn on_recognition_event(&mut self, event: RecognitionEvent) -> Option<Duration> {
        match event {
            RecognitionEvent::SpeechStart => {
                self.on_speech_start();
                self.backoff.reset();
                None
            }
            RecognitionEvent::Transcript { text, is_interim } => {
                if is_interim {
                    self.on_interim_transcript(&text);
                } else {
                    self.backoff.reset();
                    if self.on_final_transcript(&text).await == TurnOutcome::Busy {
                        // The typed path gets told at the prompt; voice
                        // users need to hear it too.
                        self.emit(SessionEvent::Notice {
                            kind: NoticeKind::Info,
                            text: "Still thinking about the last one. Say that again in a moment."
                                .to_owned(),
                        });
                    }
                }
                None
            }
            RecognitionEvent::Ended => {
                if self.listening {
                    self.listening = false;
                    self.emit(SessionEvent::Listening { active: false });
                }
                if !self.wants_listening {
                    return None;
                }
                match self.backoff.next_delay() {
                    Some(delay) => {
                        debug!("capture ended, restarting in {delay:?}");
                        Some(delay)
                    }
                    None => {
                        self.wants_listening = false;
                        self.emit(SessionEvent::Notice {
                            kind: NoticeKind::Warning,
                            text: "Voice input keeps stopping; tap the microphone to try again."
                                .to_owned(),
                        });
                        None
                    }
                }
            }
            RecognitionEvent::Error(error) => {
                self.on_recognition_error(&error);
                None
            }
        }
    }

    fn on_recognition_error(&mut self, error: &RecognitionError) {
        match error {
            RecognitionError::PermissionDenied => {
                self.prefs.set_mic_permission(MicPermission::Denied);
                self.wants_listening = false;
                if self.listening {
                    self.listening = false;
                    self.emit(SessionEvent::Listening { active: false });
                }
                self.set_phase(SessionPhase::Idle);
                self.emit(SessionEvent::Notice {
                    kind: NoticeKind::Error,
                    text: "Microphone access is blocked. Voice input is off until you allow it."
                        .to_owned(),
                });
            }
            // The engine giving up on silence or an explicit abort is
            // routine; the Ended event drives any restart.
            RecognitionError::NoSpeech | RecognitionError::Aborted => {
                debug!("benign recognition end: {error:?}");
            }
            RecognitionError::Other(message) => {
                warn!("recognition error: {message}");
                self.emit(SessionEvent::Notice {
                    kind: NoticeKind::Warning,
                    text: "Had trouble hearing you. Listening again.".to_owned(),
                });
            }
        }
    }

    // ---- the turn -------------------------------------------------------

    /// Update the transient draft from an interim transcript.
    ///
    /// Idempotent for identical text; ignored entirely while a committed
    /// utterance is pending generation.
    pub fn on_interim_transcript(&mut self, text: &str) {
        if self.generating {
            return;
        }
        let text = text.trim();
        if text.is_empty() || self.draft.as_deref() == Some(text) {
            return;
        }
        self.draft = Some(text.to_owned());
        self.set_phase(SessionPhase::Drafting);
        self.emit(SessionEvent::Draft {
            text: text.to_owned(),
        });
    }

    /// Commit a final transcript as a user turn and generate a reply.
    pub async fn on_final_transcript(&mut self, text: &str) -> TurnOutcome {
        self.clear_draft();
        self.run_turn(text).await
    }

    /// Typed-input entry point.
    ///
    /// Always cancels in-flight synthesis first; typing over the assistant
    /// is a barge-in just like speaking over it.
    pub async fn submit_text(&mut self, text: &str) -> TurnOutcome {
        self.cancel_speech();
        self.run_turn(text).await
    }

    /// Voice barge-in: the user audibly started speaking.
    ///
    /// Playback is cancelled synchronously before anything else; the
    /// engine's terminal event for the cancelled utterance is absorbed
    /// later by the synthesizer adapter.
    pub fn on_speech_start(&mut self) {
        self.cancel_speech();
        if self.listening {
            self.set_phase(SessionPhase::Listening);
        }
    }

    /// Try to start a turn: commit the user message and hand back the
    /// context to generate against.
    ///
    /// At most one turn is ever outstanding. A second attempt while one is
    /// pending returns [`TurnStart::Busy`] without committing anything.
    pub fn begin_turn(&mut self, text: &str) -> TurnStart {
        let text = text.trim();
        if text.is_empty() {
            return TurnStart::Empty;
        }
        if self.generating {
            debug!("turn dropped, generation already in flight");
            return TurnStart::Busy;
        }

        self.cancel_speech();
        self.clear_draft();
        self.commit(Message::user(text));
        self.last_user_text = text.to_owned();
        self.generating = true;
        self.open_epoch = Some(self.epoch);
        self.emit(SessionEvent::Generating { active: true });
        self.set_phase(SessionPhase::Generating);
        TurnStart::Started(self.context.clone())
    }

    /// Finish the turn opened by [`Self::begin_turn`].
    ///
    /// Provider failures become canned fallback replies; the raw error
    /// never reaches the transcript. The reply is spoken when TTS is
    /// enabled.
    ///
    /// Returns `None` when the transcript was replaced (cleared or
    /// imported) after the turn opened; the stale reply is dropped without
    /// committing.
    pub fn complete_turn(
        &mut self,
        result: std::result::Result<String, ProviderError>,
    ) -> Option<Message> {
        if self.open_epoch.take() != Some(self.epoch) {
            debug!("dropping reply from a superseded turn");
            return None;
        }
        let reply = match result {
            Ok(text) => text,
            Err(error) => {
                warn!("generation failed: {error}");
                fallback::reply_for(&error, &self.last_user_text)
            }
        };
        self.generating = false;
        self.emit(SessionEvent::Generating { active: false });
        let message = self.commit(Message::assistant(reply));
        self.speak_reply(&message.content);
        Some(message)
    }

    /// Run one full turn: commit the user message, generate with a bounded
    /// call, commit the reply.
    pub async fn run_turn(&mut self, text: &str) -> TurnOutcome {
        let context = match self.begin_turn(text) {
            TurnStart::Started(context) => context,
            TurnStart::Busy => return TurnOutcome::Busy,
            TurnStart::Empty => return TurnOutcome::Ignored,
        };
        let generator = Arc::clone(&self.generator);
        let result =
            match tokio::time::timeout(self.generation_timeout, generator.generate(&context))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Transport("generation timed out".to_owned())),
            };
        match self.complete_turn(result) {
            Some(message) => TurnOutcome::Completed(message),
            None => TurnOutcome::Discarded,
        }
    }

    fn speak_reply(&mut self, content: &str) {
        if !self.tts_enabled {
            self.settle_phase();
            return;
        }
        let voice = self.voice.clone();
        match self.synthesizer.speak(content, &voice) {
            Ok(SpeakOutcome::Spoken | SpeakOutcome::Queued) => {
                self.set_phase(SessionPhase::Speaking);
            }
            Ok(SpeakOutcome::Skipped) => self.settle_phase(),
            Err(error) => {
                warn!("synthesis failed: {error}");
                self.emit(SessionEvent::Notice {
                    kind: NoticeKind::Warning,
                    text: "Could not play that reply out loud.".to_owned(),
                });
                self.settle_phase();
            }
        }
    }

    /// Feed one synthesis engine lifecycle event through the session.
    pub fn on_playback_event(&mut self, event: PlaybackEvent) {
        let Some(observed) = self.synthesizer.handle_engine_event(event) else {
            return;
        };
        match observed {
            PlaybackEvent::Started => {
                self.emit(SessionEvent::Speaking { active: true });
                self.set_phase(SessionPhase::Speaking);
            }
            PlaybackEvent::Finished => {
                self.emit(SessionEvent::Speaking { active: false });
                self.settle_phase();
            }
            PlaybackEvent::Error(message) => {
                self.emit(SessionEvent::Speaking { active: false });
                self.emit(SessionEvent::Notice {
                    kind: NoticeKind::Warning,
                    text: format!("Speech playback failed: {message}"),
                });
                self.settle_phase();
            }
        }
    }

    // ---- settings -------------------------------------------------------

    /// Switch the conversation language.
    ///
    /// Updates the recognition language, selects the matching voice,
    /// persists both preferences, and commits a system notice.
    pub fn set_language(&mut self, language: Language) {
        if language == self.language {
            return;
        }
        self.language = language;
        if let Some(source) = self.source.as_mut() {
            source.set_language(language);
        }
        self.voice = match language {
            Language::Tagalog => TAGALOG_VOICE.to_owned(),
            Language::English => self.english_voice.clone(),
        };
        self.prefs.set_language(language);
        self.prefs.set_voice(&self.voice);
        info!("language switched to {}", language.code());

        let notice = match language {
            Language::English => "Switched to English.",
            Language::Tagalog => "Lumipat na tayo sa Tagalog.",
        };
        self.commit(Message::system(notice, NoticeKind::Info));
    }

    /// Toggle between English and Tagalog.
    pub fn toggle_language(&mut self) {
        self.set_language(self.language.toggled());
    }

    /// Select a synthesis voice; unknown names fall back to the default.
    pub fn set_voice(&mut self, voice: &str) {
        let resolved = self.synthesizer.resolve_voice(voice).to_owned();
        self.prefs.set_voice(&resolved);
        self.voice = resolved;
    }

    /// Enable or disable spoken replies. Disabling cancels playback.
    pub fn set_tts_enabled(&mut self, enabled: bool) {
        self.tts_enabled = enabled;
        self.prefs.set_tts_enabled(enabled);
        if !enabled {
            self.cancel_speech();
            self.settle_phase();
        }
    }

    // ---- history --------------------------------------------------------

    /// Wipe the transcript and start over with a fresh welcome.
    ///
    /// Cancels everything in flight: playback, the draft, and any
    /// outstanding generation. A reply still being generated when the
    /// clear lands is discarded when it arrives.
    pub fn clear_history(&mut self) {
        self.cancel_speech();
        self.clear_draft();
        self.release_turn();
        self.history.clear();
        self.context = persona::priming_messages();
        self.last_commit_ms = 0;
        self.emit(SessionEvent::HistoryReplaced(self.history.snapshot()));
        self.set_phase(SessionPhase::Idle);
        self.commit(Message::assistant(WELCOME_MESSAGE));
    }

    /// Serialize the history for download.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn export_history(&self) -> Result<String> {
        self.history.export()
    }

    /// Replace the history wholesale from an exported or legacy file.
    ///
    /// # Errors
    ///
    /// Returns an error when the payload is not a message array or history
    /// envelope; the existing history is left untouched.
    pub fn import_history(&mut self, payload: &str) -> Result<HistoryEnvelope> {
        let envelope = self.history.import(payload)?;
        self.release_turn();
        self.rebuild_context(&envelope);
        self.last_commit_ms = envelope
            .messages
            .last()
            .map_or(0, |m| m.timestamp_ms);
        self.emit(SessionEvent::HistoryReplaced(envelope.clone()));
        Ok(envelope)
    }

    /// Force pending history writes to disk.
    pub async fn flush(&self) {
        self.history.flush().await;
    }

    /// Flush and stop background work. Call once at shutdown.
    pub async fn shutdown(&mut self) {
        self.stop_listening();
        self.cancel_speech();
        self.history.flush().await;
        self.history.shutdown();
    }

    // ---- internals ------------------------------------------------------

    /// Commit a message: clamp its timestamp, grow the context, persist,
    /// announce.
    fn commit(&mut self, mut message: Message) -> Message {
        message.clamp_after(self.last_commit_ms);
        self.last_commit_ms = message.timestamp_ms;
        if message.role != Role::System {
            self.context.push(message.clone());
            self.trim_context();
        }
        self.history.save(&message);
        self.emit(SessionEvent::Committed(message.clone()));
        message
    }

    /// Rebuild the generation context from persisted history: priming pair
    /// pinned at the front, then the user/assistant window.
    fn rebuild_context(&mut self, envelope: &HistoryEnvelope) {
        self.context = persona::priming_messages();
        self.context.extend(
            envelope
                .messages
                .iter()
                .filter(|m| m.role != Role::System)
                .cloned(),
        );
        self.trim_context();
    }

    /// FIFO eviction that never touches the pinned priming entries.
    fn trim_context(&mut self) {
        let pinned = persona::priming_len();
        while self.context.len() > pinned + self.context_cap {
            self.context.remove(pinned);
        }
    }

    /// Invalidate any outstanding turn so its eventual reply is dropped.
    fn release_turn(&mut self) {
        self.epoch += 1;
        self.open_epoch = None;
        if self.generating {
            self.generating = false;
            self.emit(SessionEvent::Generating { active: false });
        }
    }

    fn clear_draft(&mut self) {
        if self.draft.take().is_some() {
            self.emit(SessionEvent::Draft {
                text: String::new(),
            });
        }
    }

    /// Cancel playback synchronously; the session treats speech as over
    /// the moment this returns.
    fn cancel_speech(&mut self) {
        if self.synthesizer.is_speaking() {
            self.synthesizer.cancel();
            self.emit(SessionEvent::Speaking { active: false });
        } else {
            self.synthesizer.cancel();
        }
    }

    /// Drop back to the resting phase for the current input mode.
    fn settle_phase(&mut self) {
        if self.listening {
            self.set_phase(SessionPhase::Listening);
        } else {
            self.set_phase(SessionPhase::Idle);
        }
    }

    fn set_phase(&mut self, phase: SessionPhase) {
        if self.phase != phase {
            self.phase = phase;
            self.emit(SessionEvent::Phase(phase));
        }
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}
