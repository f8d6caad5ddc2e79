//! Persisted conversation history with debounced writes.
//!
//! The session commits messages far faster than they need to hit disk, so
//! durable writes are coalesced: each save marks the history dirty and the
//! writer task flushes once a quiet period passes. The session never blocks
//! on, or reads back, its own writes; callers tolerate persistence lag up
//! to the debounce window.

use crate::config::StoreConfig;
use crate::error::{AssistantError, Result};
use crate::session::events::SessionEvent;
use crate::store::{keys, KvStore};
use crate::transcript::{now_ms, HistoryEnvelope, Message};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Notice attached to every exported history file.
pub const PRIVACY_NOTICE: &str = "This file contains your private \
conversation history. It never leaves your device unless you share it \
yourself.";

/// Exported history: the envelope plus export metadata.
#[derive(Debug, Serialize, Deserialize)]
pub struct ExportRecord {
    /// The history envelope itself.
    #[serde(flatten)]
    pub envelope: HistoryEnvelope,
    /// Export time in milliseconds since the Unix epoch.
    pub exported: i64,
    /// Fixed privacy notice.
    pub notice: String,
}

enum WriterCommand {
    /// The mirror changed; schedule a debounced write.
    Touch,
    /// Write now and acknowledge.
    Flush(oneshot::Sender<()>),
}

/// Durable conversation history backed by a [`KvStore`].
pub struct HistoryStore {
    kv: Arc<dyn KvStore>,
    cap: usize,
    mirror: Arc<Mutex<HistoryEnvelope>>,
    tx: mpsc::UnboundedSender<WriterCommand>,
    cancel: CancellationToken,
}

impl HistoryStore {
    /// Create the store and spawn its writer task.
    ///
    /// `events` (when given) receives `Saving` brackets and persistence
    /// warnings; it is observability only.
    #[must_use]
    pub fn new(
        kv: Arc<dyn KvStore>,
        config: &StoreConfig,
        events: Option<broadcast::Sender<SessionEvent>>,
    ) -> Self {
        let mirror = Arc::new(Mutex::new(HistoryEnvelope::empty()));
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        tokio::spawn(writer_task(
            Arc::clone(&kv),
            Arc::clone(&mirror),
            rx,
            Duration::from_millis(config.save_debounce_ms),
            events,
            cancel.clone(),
        ));

        Self {
            kv,
            cap: config.history_max_messages,
            mirror,
            tx,
            cancel,
        }
    }

    /// Load stored history into the in-memory mirror and return it.
    ///
    /// Accepts both the enveloped format and the legacy bare message array,
    /// migrating the latter losslessly. Corrupt or unparseable data
    /// degrades to an empty history rather than failing the session.
    pub fn load(&self) -> HistoryEnvelope {
        let envelope = match self.kv.get(keys::HISTORY) {
            Ok(Some(raw)) => parse_stored(&raw),
            Ok(None) => HistoryEnvelope::empty(),
            Err(e) => {
                warn!("history read failed, starting empty: {e}");
                HistoryEnvelope::empty()
            }
        };
        *self.lock_mirror() = envelope.clone();
        envelope
    }

    /// Append a committed message and schedule a coalesced write.
    ///
    /// Fire-and-forget: persistence failure is reported through the event
    /// channel, never to the caller.
    pub fn save(&self, message: &Message) {
        {
            let mut mirror = self.lock_mirror();
            mirror.messages.push(message.clone());
            mirror.trim_to(self.cap);
        }
        let _ = self.tx.send(WriterCommand::Touch);
    }

    /// Snapshot of the in-memory history.
    #[must_use]
    pub fn snapshot(&self) -> HistoryEnvelope {
        self.lock_mirror().clone()
    }

    /// Wipe persisted history. Synchronous; not debounced.
    pub fn clear(&self) {
        *self.lock_mirror() = HistoryEnvelope::empty();
        if let Err(e) = self.kv.remove(keys::HISTORY) {
            warn!("failed to clear stored history: {e}");
        }
        if let Err(e) = self.kv.remove(keys::LAST_SAVED) {
            warn!("failed to clear last-saved marker: {e}");
        }
        info!("conversation history cleared");
    }

    /// Serialize the current history for download.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn export(&self) -> Result<String> {
        let record = ExportRecord {
            envelope: self.snapshot(),
            exported: now_ms(),
            notice: PRIVACY_NOTICE.to_owned(),
        };
        serde_json::to_string_pretty(&record)
            .map_err(|e| AssistantError::Store(format!("export serialization failed: {e}")))
    }

    /// Validate an import payload and replace the stored history wholesale.
    ///
    /// Accepts a bare message array (legacy shape) or an enveloped object.
    /// On any validation failure the existing history is left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`AssistantError::Import`] when the payload has neither
    /// accepted shape, or a store error if the replacing write fails.
    pub fn import(&self, payload: &str) -> Result<HistoryEnvelope> {
        let value: serde_json::Value = serde_json::from_str(payload)
            .map_err(|e| AssistantError::Import(format!("not valid JSON: {e}")))?;

        let mut envelope = if value.is_array() {
            let messages: Vec<Message> = serde_json::from_value(value)
                .map_err(|e| AssistantError::Import(format!("invalid message array: {e}")))?;
            HistoryEnvelope::from_legacy(messages)
        } else if value.get("messages").is_some() {
            serde_json::from_value(value)
                .map_err(|e| AssistantError::Import(format!("invalid envelope: {e}")))?
        } else {
            return Err(AssistantError::Import(
                "expected a message array or a history envelope".to_owned(),
            ));
        };

        envelope.trim_to(self.cap);
        persist(self.kv.as_ref(), &envelope)?;
        *self.lock_mirror() = envelope.clone();
        info!("imported history with {} messages", envelope.messages.len());
        Ok(envelope)
    }

    /// Force any pending coalesced write to disk and wait for it.
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(WriterCommand::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
    }

    /// Millisecond timestamp of the last durable write, if any.
    #[must_use]
    pub fn last_saved_ms(&self) -> Option<i64> {
        self.kv
            .get(keys::LAST_SAVED)
            .ok()
            .flatten()
            .and_then(|v| v.trim().parse().ok())
    }

    /// Stop the writer task, writing any pending state first.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    fn lock_mirror(&self) -> std::sync::MutexGuard<'_, HistoryEnvelope> {
        // The mirror is only locked for short copies; poisoning means a
        // panic mid-clone, at which point continuing with the data is fine.
        self.mirror.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Drop for HistoryStore {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Parse stored history, accepting envelope and legacy-array shapes.
fn parse_stored(raw: &str) -> HistoryEnvelope {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(value) if value.is_array() => match serde_json::from_value::<Vec<Message>>(value) {
            Ok(messages) => {
                info!("migrating legacy history ({} messages)", messages.len());
                HistoryEnvelope::from_legacy(messages)
            }
            Err(e) => {
                warn!("legacy history unreadable, starting empty: {e}");
                HistoryEnvelope::empty()
            }
        },
        Ok(value) => match serde_json::from_value::<HistoryEnvelope>(value) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("stored history unreadable, starting empty: {e}");
                HistoryEnvelope::empty()
            }
        },
        Err(e) => {
            warn!("stored history is not JSON, starting empty: {e}");
            HistoryEnvelope::empty()
        }
    }
}

/// Write the envelope and last-saved marker durably.
fn persist(kv: &dyn KvStore, envelope: &HistoryEnvelope) -> Result<()> {
    let json = serde_json::to_string(envelope)
        .map_err(|e| AssistantError::Store(format!("history serialization failed: {e}")))?;
    kv.set(keys::HISTORY, &json)?;
    kv.set(keys::LAST_SAVED, &now_ms().to_string())?;
    Ok(())
}

async fn writer_task(
    kv: Arc<dyn KvStore>,
    mirror: Arc<Mutex<HistoryEnvelope>>,
    mut rx: mpsc::UnboundedReceiver<WriterCommand>,
    debounce: Duration,
    events: Option<broadcast::Sender<SessionEvent>>,
    cancel: CancellationToken,
) {
    let emit = |event: SessionEvent| {
        if let Some(ref tx) = events {
            let _ = tx.send(event);
        }
    };
    let write = |mirror: &Arc<Mutex<HistoryEnvelope>>| {
        let snapshot = {
            let mut guard = mirror
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            guard.updated = now_ms();
            guard.clone()
        };
        if let Err(e) = persist(kv.as_ref(), &snapshot) {
            warn!("history write failed: {e}");
            emit(SessionEvent::Notice {
                kind: crate::transcript::NoticeKind::Warning,
                text: "Could not save the conversation; it stays available in this session."
                    .to_owned(),
            });
        } else {
            debug!("history written ({} messages)", snapshot.messages.len());
        }
    };

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            cmd = rx.recv() => match cmd {
                None => break,
                Some(WriterCommand::Flush(ack)) => {
                    write(&mirror);
                    let _ = ack.send(());
                }
                Some(WriterCommand::Touch) => {
                    emit(SessionEvent::Saving { active: true });
                    let mut flushed = false;
                    // Quiet-period window: each further touch restarts it.
                    loop {
                        tokio::select! {
                            () = tokio::time::sleep(debounce) => break,
                            () = cancel.cancelled() => break,
                            cmd = rx.recv() => match cmd {
                                None => break,
                                Some(WriterCommand::Touch) => {}
                                Some(WriterCommand::Flush(ack)) => {
                                    write(&mirror);
                                    let _ = ack.send(());
                                    flushed = true;
                                    break;
                                }
                            },
                        }
                    }
                    if !flushed {
                        write(&mirror);
                    }
                    emit(SessionEvent::Saving { active: false });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::store::MemoryKvStore;
    use crate::transcript::Role;

    /// Counts durable writes per key on top of the in-memory store.
    #[derive(Default, Clone)]
    struct CountingKv {
        inner: MemoryKvStore,
        history_writes: Arc<Mutex<u32>>,
    }

    impl KvStore for CountingKv {
        fn get(&self, key: &str) -> Result<Option<String>> {
            self.inner.get(key)
        }
        fn set(&self, key: &str, value: &str) -> Result<()> {
            if key == keys::HISTORY {
                *self.history_writes.lock().unwrap() += 1;
            }
            self.inner.set(key, value)
        }
        fn remove(&self, key: &str) -> Result<()> {
            self.inner.remove(key)
        }
    }

    fn fast_config() -> StoreConfig {
        StoreConfig {
            save_debounce_ms: 30,
            ..StoreConfig::default()
        }
    }

    #[tokio::test]
    async fn rapid_saves_coalesce_into_one_write() {
        let kv = CountingKv::default();
        let writes = Arc::clone(&kv.history_writes);
        let store = HistoryStore::new(Arc::new(kv), &fast_config(), None);

        store.save(&Message::user("one"));
        store.save(&Message::user("two"));
        store.save(&Message::assistant("three"));

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(*writes.lock().unwrap(), 1);

        let stored = store.load();
        assert_eq!(stored.messages.len(), 3);
        assert!(store.last_saved_ms().is_some());
    }

    #[tokio::test]
    async fn flush_writes_immediately() {
        let kv = CountingKv::default();
        let writes = Arc::clone(&kv.history_writes);
        let store = HistoryStore::new(Arc::new(kv), &fast_config(), None);

        store.save(&Message::user("urgent"));
        store.flush().await;
        assert_eq!(*writes.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn legacy_array_migrates_to_envelope_idempotently() {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKvStore::default());
        let legacy = serde_json::to_string(&vec![
            Message::user("hello"),
            Message::assistant("hey there"),
        ])
        .unwrap();
        kv.set(keys::HISTORY, &legacy).unwrap();

        let store = HistoryStore::new(Arc::clone(&kv), &fast_config(), None);
        let first = store.load();
        assert_eq!(first.version, crate::transcript::ENVELOPE_VERSION);
        assert_eq!(first.messages.len(), 2);
        assert_eq!(first.messages[0].content, "hello");

        // Persist the migrated form, reload, and expect identical messages.
        store.save(&Message::user("third"));
        store.flush().await;
        let second = store.load();
        assert_eq!(second.messages.len(), 3);
        assert_eq!(second.messages[0].content, "hello");
        assert_eq!(second.messages[1].content, "hey there");
    }

    #[tokio::test]
    async fn corrupt_history_degrades_to_empty() {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKvStore::default());
        kv.set(keys::HISTORY, "{not json at all").unwrap();

        let store = HistoryStore::new(kv, &fast_config(), None);
        assert!(store.load().messages.is_empty());
    }

    #[tokio::test]
    async fn persistence_cap_trims_oldest() {
        let config = StoreConfig {
            history_max_messages: 3,
            save_debounce_ms: 10,
            ..StoreConfig::default()
        };
        let store = HistoryStore::new(Arc::new(MemoryKvStore::default()), &config, None);

        for i in 0..5 {
            store.save(&Message::user(format!("m{i}")));
        }
        store.flush().await;

        let stored = store.load();
        assert_eq!(stored.messages.len(), 3);
        assert_eq!(stored.messages[0].content, "m2");
    }

    #[tokio::test]
    async fn export_import_round_trips() {
        let store = HistoryStore::new(Arc::new(MemoryKvStore::default()), &fast_config(), None);
        store.save(&Message::user("kumusta"));
        store.save(&Message::assistant("Kumusta din!"));
        store.flush().await;

        let exported = store.export().unwrap();
        assert!(exported.contains(PRIVACY_NOTICE));

        let imported = store.import(&exported).unwrap();
        let original = store.snapshot();
        assert_eq!(imported.messages, original.messages);
        assert_eq!(imported.messages[0].role, Role::User);
    }

    #[tokio::test]
    async fn import_accepts_legacy_array() {
        let store = HistoryStore::new(Arc::new(MemoryKvStore::default()), &fast_config(), None);
        let legacy = serde_json::to_string(&vec![Message::user("from the old format")]).unwrap();

        let imported = store.import(&legacy).unwrap();
        assert_eq!(imported.messages.len(), 1);
        assert_eq!(imported.version, crate::transcript::ENVELOPE_VERSION);
    }

    #[tokio::test]
    async fn import_rejects_garbage_leaving_history_untouched() {
        let store = HistoryStore::new(Arc::new(MemoryKvStore::default()), &fast_config(), None);
        store.save(&Message::user("keep me"));
        store.flush().await;

        assert!(store.import("not json").is_err());
        assert!(store.import(r#"{"someone": "elses file"}"#).is_err());

        let stored = store.load();
        assert_eq!(stored.messages.len(), 1);
        assert_eq!(stored.messages[0].content, "keep me");
    }

    #[tokio::test]
    async fn clear_wipes_storage() {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKvStore::default());
        let store = HistoryStore::new(Arc::clone(&kv), &fast_config(), None);
        store.save(&Message::user("gone soon"));
        store.flush().await;
        assert!(kv.get(keys::HISTORY).unwrap().is_some());

        store.clear();
        assert!(kv.get(keys::HISTORY).unwrap().is_none());
        assert!(kv.get(keys::LAST_SAVED).unwrap().is_none());
        assert!(store.snapshot().messages.is_empty());
    }
}
