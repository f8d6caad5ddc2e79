//! Configuration types for the conversation session.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration for the assistant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    /// Session controller settings.
    pub session: SessionConfig,
    /// Response generator (provider) settings.
    pub generator: GeneratorConfig,
    /// Speech synthesis settings.
    pub synthesis: SynthesisConfig,
    /// Speech recognition settings.
    pub recognition: RecognitionConfig,
    /// Persistence store settings.
    pub store: StoreConfig,
}

/// Session controller configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Maximum messages kept in the generation context, not counting the
    /// pinned persona priming entries.
    ///
    /// Eviction is FIFO but always preserves the pinned persona priming
    /// entries at the front. Set to 0 to disable trimming.
    pub context_max_messages: usize,
    /// Whether assistant replies are spoken aloud.
    pub tts_enabled: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            context_max_messages: 50,
            tts_enabled: true,
        }
    }
}

/// Response generator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Provider base URL.
    pub base_url: String,
    /// Provider model name.
    pub model: String,
    /// Provider API key.
    pub api_key: String,
    /// Per-call timeout in seconds.
    ///
    /// An unbounded call would deadlock the session's one-generation-at-a-
    /// time gate, so the call is always bounded.
    pub timeout_secs: u64,
    /// Sampling temperature.
    pub temperature: f64,
    /// Top-k sampling cutoff.
    pub top_k: u32,
    /// Top-p (nucleus) sampling threshold.
    pub top_p: f64,
    /// Maximum tokens to generate per response.
    pub max_output_tokens: u32,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com".to_owned(),
            model: "gemini-1.5-flash".to_owned(),
            api_key: String::new(),
            timeout_secs: 15,
            temperature: 0.7,
            top_k: 40,
            top_p: 0.95,
            max_output_tokens: 1024,
        }
    }
}

/// Speech synthesis configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// Default voice when the requested voice is unknown or empty.
    pub default_voice: String,
    /// Speech rate (0.5 to 2.0).
    pub rate: f32,
    /// Rate used for the vernacular voice when the text looks Tagalog.
    ///
    /// The default rate mis-pronounces Tagalog, so the Filipino voice slows
    /// down slightly for detected Tagalog text.
    pub tagalog_rate: f32,
    /// Speech pitch (0.0 to 2.0).
    pub pitch: f32,
    /// Playback volume (0.0 to 1.0).
    pub volume: f32,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            default_voice: "US English Female".to_owned(),
            rate: 1.0,
            tagalog_rate: 0.9,
            pitch: 1.0,
            volume: 1.0,
        }
    }
}

/// Speech recognition configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    /// Initial delay before an automatic restart, in milliseconds.
    pub restart_base_delay_ms: u64,
    /// Upper bound on the restart delay, in milliseconds.
    pub restart_max_delay_ms: u64,
    /// Maximum consecutive automatic restarts before giving up.
    pub restart_max_attempts: u32,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            restart_base_delay_ms: 300,
            restart_max_delay_ms: 5_000,
            restart_max_attempts: 6,
        }
    }
}

/// Persistence store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Root directory for durable state (`None` = `~/.kausap`).
    pub root_dir: Option<PathBuf>,
    /// Maximum messages kept in the persisted history.
    ///
    /// Independent of the generation-context cap. Set to 0 to disable
    /// trimming.
    pub history_max_messages: usize,
    /// Quiet period before coalesced history writes hit disk, in
    /// milliseconds.
    pub save_debounce_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root_dir: None,
            history_max_messages: 100,
            save_debounce_ms: 500,
        }
    }
}

impl StoreConfig {
    /// Resolve the effective root directory.
    ///
    /// Order: explicit config, `KAUSAP_HOME`, `~/.kausap`, then a temp-dir
    /// fallback for environments with no home directory.
    #[must_use]
    pub fn effective_root(&self) -> PathBuf {
        if let Some(ref root) = self.root_dir {
            return root.clone();
        }
        if let Some(env_root) = std::env::var_os("KAUSAP_HOME") {
            return PathBuf::from(env_root);
        }
        dirs::home_dir().map_or_else(
            || std::env::temp_dir().join(".kausap"),
            |home| home.join(".kausap"),
        )
    }
}

impl AssistantConfig {
    /// Load configuration from a TOML file.
    ///
    /// Missing sections fall back to defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::AssistantError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::AssistantError::Config(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }
}
