//! History persistence against the real file-backed store: legacy
//! migration, corrupt-data degradation, and the export/import cycle.

use async_trait::async_trait;
use kausap::config::AssistantConfig;
use kausap::generator::{ProviderError, ResponseGenerator};
use kausap::persona::WELCOME_MESSAGE;
use kausap::session::SessionController;
use kausap::store::{keys, FileKvStore, KvStore};
use kausap::synthesis::{SpeechParams, SynthesisEngine};
use kausap::transcript::{Message, ENVELOPE_VERSION};
use std::sync::Arc;

struct EchoGenerator;

#[async_trait]
impl ResponseGenerator for EchoGenerator {
    async fn generate(&self, context: &[Message]) -> Result<String, ProviderError> {
        let last = context.last().map_or("", |m| m.content.as_str());
        Ok(format!("you said: {last}"))
    }
}

struct MuteEngine;

impl SynthesisEngine for MuteEngine {
    fn speak(&mut self, _text: &str, _voice: &str, _params: SpeechParams) -> kausap::Result<()> {
        Ok(())
    }
    fn cancel(&mut self) {}
}

fn file_session(root: &std::path::Path) -> SessionController {
    let kv = FileKvStore::new(root).unwrap();
    SessionController::new(
        &AssistantConfig::default(),
        Arc::new(EchoGenerator),
        Box::new(MuteEngine),
        Arc::new(kv),
    )
}

#[tokio::test]
async fn legacy_bare_array_on_disk_migrates_once() {
    let dir = tempfile::tempdir().unwrap();

    // A file written by the pre-envelope format: a bare message array.
    let kv = FileKvStore::new(dir.path()).unwrap();
    let legacy = serde_json::to_string(&vec![
        Message::user("old question"),
        Message::assistant("old answer"),
    ])
    .unwrap();
    kv.set(keys::HISTORY, &legacy).unwrap();

    let mut session = file_session(dir.path());
    session.start();

    let history = session.history_snapshot();
    assert_eq!(history.version, ENVELOPE_VERSION);
    assert_eq!(history.messages[0].content, "old question");
    // Migration keeps the old turns ahead of the fresh welcome.
    assert_eq!(history.messages.last().unwrap().content, WELCOME_MESSAGE);

    // Persist in the enveloped format and read it back unchanged.
    session.flush().await;
    session.shutdown().await;

    let mut reopened = file_session(dir.path());
    reopened.start();
    let again = reopened.history_snapshot();
    assert_eq!(again.messages[0].content, "old question");
    assert_eq!(again.messages[1].content, "old answer");
    reopened.shutdown().await;
}

#[tokio::test]
async fn corrupt_history_file_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    let kv = FileKvStore::new(dir.path()).unwrap();
    kv.set(keys::HISTORY, "][ definitely not json").unwrap();

    let mut session = file_session(dir.path());
    session.start();

    // Only the fresh welcome; the session did not fail.
    let history = session.history_snapshot();
    assert_eq!(history.messages.len(), 1);
    assert_eq!(history.messages[0].content, WELCOME_MESSAGE);
    session.shutdown().await;
}

#[tokio::test]
async fn export_import_round_trips_through_files() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = file_session(dir.path());
    session.start();
    session.run_turn("mahilig ako sa mangga").await;

    let exported = session.export_history().unwrap();
    assert!(exported.contains("\"exported\""));
    assert!(exported.contains("notice"));

    // Import into a completely separate store.
    let other_dir = tempfile::tempdir().unwrap();
    let mut other = file_session(other_dir.path());
    other.start();
    let imported = other.import_history(&exported).unwrap();

    assert_eq!(imported.messages, session.history_snapshot().messages);
    // Imported turns feed the new session's generation context.
    assert!(other
        .context()
        .iter()
        .any(|m| m.content == "mahilig ako sa mangga"));

    session.shutdown().await;
    other.shutdown().await;
}

#[tokio::test]
async fn import_rejects_foreign_json() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = file_session(dir.path());
    session.start();
    session.run_turn("keep this").await;
    let before = session.history_snapshot();

    assert!(session.import_history(r#"{"settings": true}"#).is_err());
    assert!(session.import_history("plain text").is_err());
    assert_eq!(session.history_snapshot().messages, before.messages);
    session.shutdown().await;
}

#[tokio::test]
async fn clear_removes_the_files() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = file_session(dir.path());
    session.start();
    session.run_turn("soon gone").await;
    session.flush().await;

    let kv = FileKvStore::new(dir.path()).unwrap();
    assert!(kv.get(keys::HISTORY).unwrap().is_some());

    session.clear_history();
    assert!(kv.get(keys::HISTORY).unwrap().is_none());
    // The replayed welcome is persisted again after the debounce.
    session.flush().await;
    let stored: serde_json::Value =
        serde_json::from_str(&kv.get(keys::HISTORY).unwrap().unwrap()).unwrap();
    assert_eq!(stored["messages"][0]["content"], WELCOME_MESSAGE);
    session.shutdown().await;
}
