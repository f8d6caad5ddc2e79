//! Language selection and the Tagalog detection heuristic.
//!
//! The assistant is bilingual (English/Tagalog). Two places need a
//! best-effort guess at which language a piece of text is in: the canned
//! fallback selection and the synthesizer's speech-rate adjustment. Both use
//! the same fixed function-word heuristic so guesses stay consistent across
//! the session. It is a flavour heuristic, not a classifier; a wrong guess
//! changes wording and speech rate, nothing else.

use serde::{Deserialize, Serialize};

/// User-facing conversation language.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// English.
    #[default]
    English,
    /// Filipino/Tagalog.
    Tagalog,
}

impl Language {
    /// Short preference code stored in the persistence store (`en` / `tl`).
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::English => "en",
            Self::Tagalog => "tl",
        }
    }

    /// BCP-47 tag handed to the transcription source.
    ///
    /// Unknown codes map to `en-US` at the parse step, so this is total.
    #[must_use]
    pub fn recognition_tag(self) -> &'static str {
        match self {
            Self::English => "en-US",
            Self::Tagalog => "fil-PH",
        }
    }

    /// Parse a stored preference code. Unknown codes default to English.
    #[must_use]
    pub fn from_code(code: &str) -> Self {
        match code.trim() {
            "tl" => Self::Tagalog,
            _ => Self::English,
        }
    }

    /// Toggle between the two supported languages.
    #[must_use]
    pub fn toggled(self) -> Self {
        match self {
            Self::English => Self::Tagalog,
            Self::Tagalog => Self::English,
        }
    }
}

/// Short Tagalog function words checked on word boundaries.
const TAGALOG_FUNCTION_WORDS: &[&str] = &[
    "ng", "mga", "ang", "na", "sa", "ko", "mo", "po", "ito", "yan", "ako", "tayo", "kayo", "sila",
    "natin",
];

/// Best-effort check whether `text` reads as Tagalog.
///
/// Returns `true` when the text contains `ñ` or any of a fixed set of short
/// Tagalog function words as whole words (case-insensitive).
#[must_use]
pub fn looks_tagalog(text: &str) -> bool {
    if text.contains(['ñ', 'Ñ']) {
        return true;
    }
    text.split(|c: char| !c.is_alphanumeric() && c != 'ñ' && c != 'Ñ')
        .filter(|w| !w.is_empty())
        .any(|word| {
            TAGALOG_FUNCTION_WORDS
                .iter()
                .any(|fw| word.eq_ignore_ascii_case(fw))
        })
}
