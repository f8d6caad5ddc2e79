//! Transcript data model: messages and the persisted history envelope.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Current persisted envelope format version.
pub const ENVELOPE_VERSION: u32 = 1;

/// Who produced a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The human speaking or typing.
    User,
    /// The assistant's reply.
    Assistant,
    /// A UI annotation (language switched, errors, hints).
    System,
}

/// Severity of a system annotation message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeKind {
    /// Neutral information.
    #[default]
    Info,
    /// Something completed successfully.
    Success,
    /// Degraded but recoverable condition.
    Warning,
    /// A failure the user should see.
    Error,
}

/// One committed transcript entry.
///
/// Messages are immutable once committed; only the session's transient draft
/// (an in-progress interim transcript) is ever mutated, and that draft is
/// plain text owned by the controller, not a `Message`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Who produced this entry.
    pub role: Role,
    /// Entry text. Non-empty for user/assistant entries.
    pub content: String,
    /// Wall-clock commit time in milliseconds since the Unix epoch.
    pub timestamp_ms: i64,
    /// Annotation severity, present only on `System` entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notice: Option<NoticeKind>,
}

impl Message {
    /// Create a user message stamped with the current wall clock.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp_ms: now_ms(),
            notice: None,
        }
    }

    /// Create an assistant message stamped with the current wall clock.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            timestamp_ms: now_ms(),
            notice: None,
        }
    }

    /// Create a system annotation stamped with the current wall clock.
    #[must_use]
    pub fn system(content: impl Into<String>, notice: NoticeKind) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            timestamp_ms: now_ms(),
            notice: Some(notice),
        }
    }

    /// Clamp this message's timestamp so it never precedes `previous_ms`.
    ///
    /// Session timestamps are monotonically non-decreasing even when the
    /// wall clock steps backwards.
    pub fn clamp_after(&mut self, previous_ms: i64) {
        if self.timestamp_ms < previous_ms {
            self.timestamp_ms = previous_ms;
        }
    }
}

/// Durable record wrapping the persisted message history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEnvelope {
    /// Envelope format version.
    pub version: u32,
    /// Creation time in milliseconds since the Unix epoch.
    pub created: i64,
    /// Last update time in milliseconds since the Unix epoch.
    pub updated: i64,
    /// Ordered committed messages, oldest first.
    pub messages: Vec<Message>,
}

impl HistoryEnvelope {
    /// Create an empty envelope stamped with the current wall clock.
    #[must_use]
    pub fn empty() -> Self {
        let now = now_ms();
        Self {
            version: ENVELOPE_VERSION,
            created: now,
            updated: now,
            messages: Vec::new(),
        }
    }

    /// Wrap a legacy bare message array in the envelope format.
    ///
    /// The creation time is taken from the oldest message when available so
    /// migration does not fabricate a newer history than actually exists.
    #[must_use]
    pub fn from_legacy(messages: Vec<Message>) -> Self {
        let now = now_ms();
        let created = messages.first().map_or(now, |m| m.timestamp_ms);
        Self {
            version: ENVELOPE_VERSION,
            created,
            updated: now,
            messages,
        }
    }

    /// Trim to the newest `cap` messages, oldest evicted first.
    ///
    /// A cap of 0 disables trimming.
    pub fn trim_to(&mut self, cap: usize) {
        if cap > 0 && self.messages.len() > cap {
            let excess = self.messages.len() - cap;
            self.messages.drain(..excess);
        }
    }
}

/// Current wall clock in milliseconds since the Unix epoch.
#[must_use]
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
