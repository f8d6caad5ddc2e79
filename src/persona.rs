//! Assistant persona: priming entries and the welcome message.
//!
//! The provider only accepts `user` and `model` roles, so the persona is
//! primed Gemini-style: an instruction sent as a `user` turn followed by a
//! canned `model` acknowledgment. The pair is pinned at the front of every
//! generation context and never appears in the persisted transcript.

use crate::transcript::{Message, Role};

/// Persona instruction, sent as the first `user` turn of every context.
pub const PERSONA_PRIME: &str = "\
You are Jasmine, a warm and upbeat voice assistant. Keep replies short and \
conversational, the way a friend talks. Be encouraging and lighthearted \
without overdoing it. You are fluent in both English and Tagalog; when the \
user writes in Tagalog, answer in simple, casual Tagalog with no deep \
dialect. Be honest about your limits: no real-time information, no access \
to the user's device, and no memory of past sessions.";

/// Canned acknowledgment, sent as the `model` turn answering the prime.
pub const PERSONA_ACK: &str = "\
Hi! I'm Jasmine. Happy to chat in English or Tagalog — whatever feels \
comfortable. What can I do for you?";

/// Greeting committed as the first assistant message of every session.
///
/// Committed and persisted like any assistant message, but never handed to
/// the synthesizer.
pub const WELCOME_MESSAGE: &str =
    "Kumusta? Ako si Jasmine, ang AI assistant mo. Anong pwede kong maitulong sa'yo ngayon?";

/// Build the persona priming pair that seeds a generation context.
#[must_use]
pub fn priming_messages() -> Vec<Message> {
    vec![Message::user(PERSONA_PRIME), Message::assistant(PERSONA_ACK)]
}

/// Number of pinned entries at the front of the generation context.
#[must_use]
pub fn priming_len() -> usize {
    2
}

/// Whether `message` is one of the priming entries.
///
/// Used to keep priming out of the persisted transcript.
#[must_use]
pub fn is_priming(message: &Message) -> bool {
    matches!(
        (message.role, message.content.as_str()),
        (Role::User, PERSONA_PRIME) | (Role::Assistant, PERSONA_ACK)
    )
}
