//! Durable key-value storage and user preferences.
//!
//! Everything durable goes through the [`KvStore`] trait: the history
//! envelope and a handful of preference strings. The file-backed
//! implementation keeps one file per key under the assistant's root
//! directory so state is easy to inspect, edit, and back up.

pub mod history;

pub use history::HistoryStore;

use crate::error::Result;
use crate::lang::Language;
use crate::recognition::MicPermission;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::warn;

/// Storage keys.
pub mod keys {
    /// Persisted history envelope (JSON).
    pub const HISTORY: &str = "conversation_history";
    /// Millisecond timestamp of the last durable history write.
    pub const LAST_SAVED: &str = "last_saved";
    /// Preferred conversation language (`en` / `tl`).
    pub const LANGUAGE: &str = "preferred_language";
    /// Preferred synthesis voice name.
    pub const VOICE: &str = "preferred_voice";
    /// Whether replies are spoken aloud (`true` / `false`).
    pub const TTS_ENABLED: &str = "tts_enabled";
    /// Microphone permission (`granted` / `denied` / `unknown`).
    pub const MIC_PERMISSION: &str = "microphone_permission";
}

/// Durable string key-value storage.
pub trait KvStore: Send + Sync {
    /// Read a value. `None` when the key was never written.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a value. Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be written.
    fn remove(&self, key: &str) -> Result<()>;
}

/// File-per-key store rooted at a directory.
#[derive(Debug, Clone)]
pub struct FileKvStore {
    root: PathBuf,
}

impl FileKvStore {
    /// Create a store rooted at `root_dir/store`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn new(root_dir: &Path) -> Result<Self> {
        let root = root_dir.join("store");
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // Keys are fixed identifiers (see [`keys`]); sanitize anyway so a
        // stray key cannot escape the store directory.
        let safe: String = key
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
            .collect();
        self.root.join(safe)
    }
}

impl KvStore for FileKvStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(std::fs::read_to_string(path)?))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        std::fs::write(self.path_for(key), value)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

/// In-memory store for tests and hosts without durable storage.
#[derive(Debug, Default, Clone)]
pub struct MemoryKvStore {
    map: Arc<Mutex<HashMap<String, String>>>,
}

impl KvStore for MemoryKvStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .map
            .lock()
            .map_err(|_| crate::error::AssistantError::Store("store mutex poisoned".into()))?
            .get(key)
            .cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.map
            .lock()
            .map_err(|_| crate::error::AssistantError::Store("store mutex poisoned".into()))?
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.map
            .lock()
            .map_err(|_| crate::error::AssistantError::Store("store mutex poisoned".into()))?
            .remove(key);
        Ok(())
    }
}

/// Typed access to the persisted user preferences.
///
/// Reads degrade to defaults on storage failure; writes log and continue.
/// Preference loss is annoying, never fatal.
#[derive(Clone)]
pub struct Preferences {
    kv: Arc<dyn KvStore>,
}

impl Preferences {
    /// Wrap a key-value store.
    #[must_use]
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// Preferred conversation language. Defaults to English.
    #[must_use]
    pub fn language(&self) -> Language {
        self.read(keys::LANGUAGE)
            .map_or(Language::English, |v| Language::from_code(&v))
    }

    /// Persist the preferred language.
    pub fn set_language(&self, language: Language) {
        self.write(keys::LANGUAGE, language.code());
    }

    /// Preferred voice name, if one was ever chosen.
    #[must_use]
    pub fn voice(&self) -> Option<String> {
        self.read(keys::VOICE)
    }

    /// Persist the preferred voice.
    pub fn set_voice(&self, voice: &str) {
        self.write(keys::VOICE, voice);
    }

    /// Whether replies are spoken aloud. Defaults to `true`.
    #[must_use]
    pub fn tts_enabled(&self) -> bool {
        self.read(keys::TTS_ENABLED).is_none_or(|v| v.trim() != "false")
    }

    /// Persist the TTS toggle.
    pub fn set_tts_enabled(&self, enabled: bool) {
        self.write(keys::TTS_ENABLED, if enabled { "true" } else { "false" });
    }

    /// Stored microphone permission.
    #[must_use]
    pub fn mic_permission(&self) -> MicPermission {
        self.read(keys::MIC_PERMISSION)
            .map_or(MicPermission::Unknown, |v| {
                MicPermission::from_str_lossy(&v)
            })
    }

    /// Persist the microphone permission.
    pub fn set_mic_permission(&self, permission: MicPermission) {
        self.write(keys::MIC_PERMISSION, permission.as_str());
    }

    fn read(&self, key: &str) -> Option<String> {
        match self.kv.get(key) {
            Ok(value) => value,
            Err(e) => {
                warn!("preference read failed for {key}: {e}");
                None
            }
        }
    }

    fn write(&self, key: &str, value: &str) {
        if let Err(e) = self.kv.set(key, value) {
            warn!("preference write failed for {key}: {e}");
        }
    }
}
