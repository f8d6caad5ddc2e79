//! Speech text sanitation.
//!
//! Replies are written for a chat transcript: they carry emoji, markdown
//! emphasis, and parenthetical asides (often a translation of a Tagalog
//! sentence). None of that should be vocalized, so text is cleaned before it
//! reaches the synthesis engine.

/// Clean `text` for synthesis.
///
/// Strips emoji, paired markdown emphasis markers, and parenthetical
/// asides, then collapses whitespace. May return an empty string; callers
/// treat that as nothing-to-speak.
#[must_use]
pub fn clean_for_speech(text: &str) -> String {
    let without_emoji: String = text.chars().filter(|&c| !is_emoji(c)).collect();
    let without_emphasis = strip_emphasis(&without_emoji);
    let without_asides = strip_parentheticals(&without_emphasis);
    collapse_whitespace(&without_asides)
}

/// Emoji and pictograph ranges that speech engines try to pronounce.
fn is_emoji(c: char) -> bool {
    matches!(u32::from(c),
        0x1F300..=0x1F5FF   // symbols and pictographs
        | 0x1F600..=0x1F64F // emoticons
        | 0x1F680..=0x1F6FF // transport
        | 0x1F700..=0x1F8FF // alchemical, arrows, supplemental symbols
        | 0x1F900..=0x1F9FF // supplemental symbols and pictographs
        | 0x1FA00..=0x1FAFF // extended pictographs
        | 0x2600..=0x26FF   // miscellaneous symbols
        | 0x2700..=0x27BF   // dingbats
        | 0xFE0F..=0xFE0F   // variation selector-16
        | 0x200D..=0x200D   // zero-width joiner
    )
}

/// Remove paired `**`, `__`, `*`, and `_` emphasis markers, keeping the
/// wrapped text. Unmatched markers are left alone.
fn strip_emphasis(text: &str) -> String {
    let mut out = text.to_owned();
    for marker in ["**", "__", "*", "_"] {
        loop {
            let Some(start) = out.find(marker) else { break };
            let after = start + marker.len();
            let Some(rel_end) = out[after..].find(marker) else {
                break;
            };
            // Empty emphasis ("**" directly followed by "**") carries no
            // text; drop the markers all the same.
            let end = after + rel_end;
            let inner = out[after..end].to_owned();
            out.replace_range(start..end + marker.len(), &inner);
        }
    }
    out
}

/// Remove `(...)` asides, parentheses included. Nested asides count as one.
fn strip_parentheticals(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut depth = 0_u32;
    for c in text.chars() {
        match c {
            '(' => depth += 1,
            ')' if depth > 0 => depth -= 1,
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn strips_emoji() {
        assert_eq!(clean_for_speech("Hello! 😄✨🌟"), "Hello!");
        assert_eq!(clean_for_speech("☀️ sunny day"), "sunny day");
    }

    #[test]
    fn strips_markdown_emphasis_keeping_text() {
        assert_eq!(clean_for_speech("that is **very** good"), "that is very good");
        assert_eq!(clean_for_speech("*hello* _world_"), "hello world");
        assert_eq!(clean_for_speech("__all__ of it"), "all of it");
    }

    #[test]
    fn unmatched_markers_are_left_alone() {
        assert_eq!(clean_for_speech("rated 5* overall"), "rated 5* overall");
        assert_eq!(clean_for_speech("snake_case"), "snake_case");
    }

    #[test]
    fn strips_parenthetical_asides() {
        assert_eq!(
            clean_for_speech("Magandang umaga! (Good morning!)"),
            "Magandang umaga!"
        );
    }

    #[test]
    fn collapses_whitespace() {
        assert_eq!(clean_for_speech("  too   many\n\nspaces "), "too many spaces");
    }

    #[test]
    fn can_clean_to_empty() {
        assert_eq!(clean_for_speech("😄😄 (aside only)"), "");
        assert_eq!(clean_for_speech(""), "");
    }
}
