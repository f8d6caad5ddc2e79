//! Canned fallback replies for provider failures.
//!
//! Provider errors never reach the transcript raw. Rate limits get a fixed
//! locale-aware placeholder; everything else gets a context-sensitive canned
//! reply: the last user message is scanned for keyword triggers in priority
//! order, and the language heuristic picks the English or Tagalog set.
//! Selection is deterministic in set membership: the same input always
//! draws from the same fixed candidate set, even where the specific pick is
//! randomized.

use crate::generator::ProviderError;
use crate::lang::looks_tagalog;
use rand::seq::SliceRandom;
use tracing::debug;

/// Rate-limit placeholder, English.
pub const RATE_LIMITED_EN: &str = "Oh no, I'm a little overloaded right now! \
Can we pick this up again in a bit? I promise I'll be all ears.";

/// Rate-limit placeholder, Tagalog.
pub const RATE_LIMITED_TL: &str = "Ay, pasensya na! Medyo busy ako ngayon sa \
dami ng messages. Pwede ba nating ituloy mamaya? Promise, babalikan kita.";

/// Keyword triggers scanned in priority order against the last user message.
///
/// Substring matching, same as the keyword scan users already rely on; a
/// word like "something" matching the greeting "hi" is accepted noise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// "hello" / "hi".
    Greeting,
    /// "how are you".
    HowAreYou,
    /// "weather".
    Weather,
    /// "thank".
    Gratitude,
    /// "jasper".
    Creator,
    /// "name" / "who are you".
    Identity,
}

/// Fixed single-response table for the English triggers.
const GREETING_EN: &str = "Well hello there! I'm Jasmine, your friendly \
assistant. What can I do for you today?";
const HOW_ARE_YOU_EN: &str = "I'm doing great, especially now that we're \
chatting! How are you doing today?";
const WEATHER_EN: &str = "I wish I could tell you about the weather, but I \
don't have access to that right now. Maybe we could check a weather app \
together?";
const GRATITUDE_EN: &str = "You're very welcome! I love helping out. Is \
there anything else I can do for you?";
const CREATOR_EN: &str = "You're asking about Jasper? He's the one who \
built me so I could have these chats with you.";
const IDENTITY_EN: &str = "I'm Jasmine, your virtual companion, here to \
keep you company and brighten your day. And what should I call you?";

/// Fixed single-response table for the Tagalog triggers.
const GREETING_TL: &str = "Uy, kumusta! Ako si Jasmine, ang assistant mo. \
Ano ang maitutulong ko sa'yo ngayon?";
const HOW_ARE_YOU_TL: &str = "Ayos na ayos ako, lalo na't nakakausap kita! \
Ikaw, kumusta ka naman?";
const WEATHER_TL: &str = "Gusto ko sanang sabihin ang lagay ng panahon, pero \
wala akong access doon ngayon. Baka pwede nating tingnan sa weather app?";
const GRATITUDE_TL: &str = "Walang anuman! Masaya akong makatulong. May iba \
pa ba akong magagawa para sa'yo?";
const CREATOR_TL: &str = "Si Jasper? Siya ang gumawa sa akin para makausap \
kita nang ganito.";
const IDENTITY_TL: &str = "Ako si Jasmine, ang virtual na kasama mo. Nandito \
ako para samahan ka. Ano ang itatawag ko sa'yo?";

/// General English fallbacks when no trigger matches.
pub const GENERAL_EN: &[&str] = &[
    "I'd be happy to help with that! What specifically would you like to know?",
    "That's an interesting question! Could you share a bit more so I can give you a better answer?",
    "Let me see how I can help you with that.",
    "Thanks for your message! I'm always happy to chat.",
    "I'm not quite sure I understood that. Could you rephrase it for me?",
];

/// General Tagalog fallbacks when no trigger matches.
pub const GENERAL_TL: &[&str] = &[
    "Hindi ko gaanong naintindihan yan. Pwede mo bang i-explain ulit?",
    "Salamat sa message mo! Ano pa ang pwede kong gawin para sa'yo?",
    "Gets ko na ang sinasabi mo. May iba pa ba akong maitutulong sa'yo?",
    "Interesting yan ah! Gusto mo bang pag-usapan pa natin ito?",
    "Pasensya na, medyo nagka-problema ang system ko. Pwede ba nating subukan ulit?",
];

/// Identify the highest-priority trigger in `last_user_text`, if any.
#[must_use]
pub fn detect_trigger(last_user_text: &str) -> Option<Trigger> {
    let text = last_user_text.to_lowercase();
    if text.contains("hello") || text.contains("hi") {
        Some(Trigger::Greeting)
    } else if text.contains("how are you") || text.contains("kumusta ka") {
        Some(Trigger::HowAreYou)
    } else if text.contains("weather") || text.contains("panahon") {
        Some(Trigger::Weather)
    } else if text.contains("thank") || text.contains("salamat") {
        Some(Trigger::Gratitude)
    } else if text.contains("jasper") {
        Some(Trigger::Creator)
    } else if text.contains("name") || text.contains("who are you") || text.contains("sino ka") {
        Some(Trigger::Identity)
    } else {
        None
    }
}

/// The fixed candidate set a given input draws from.
///
/// Exposed so callers (and tests) can check set membership; the selection
/// inside the set may be randomized, the set itself never is.
#[must_use]
pub fn candidates_for(last_user_text: &str) -> &'static [&'static str] {
    let tagalog = looks_tagalog(last_user_text);
    match detect_trigger(last_user_text) {
        Some(Trigger::Greeting) => {
            if tagalog {
                std::slice::from_ref(&GREETING_TL)
            } else {
                std::slice::from_ref(&GREETING_EN)
            }
        }
        Some(Trigger::HowAreYou) => {
            if tagalog {
                std::slice::from_ref(&HOW_ARE_YOU_TL)
            } else {
                std::slice::from_ref(&HOW_ARE_YOU_EN)
            }
        }
        Some(Trigger::Gratitude) => {
            if tagalog {
                std::slice::from_ref(&GRATITUDE_TL)
            } else {
                std::slice::from_ref(&GRATITUDE_EN)
            }
        }
        Some(Trigger::Creator) => {
            if tagalog {
                std::slice::from_ref(&CREATOR_TL)
            } else {
                std::slice::from_ref(&CREATOR_EN)
            }
        }
        Some(Trigger::Weather) => {
            if tagalog {
                std::slice::from_ref(&WEATHER_TL)
            } else {
                std::slice::from_ref(&WEATHER_EN)
            }
        }
        Some(Trigger::Identity) => {
            if tagalog {
                std::slice::from_ref(&IDENTITY_TL)
            } else {
                std::slice::from_ref(&IDENTITY_EN)
            }
        }
        None => {
            if tagalog {
                GENERAL_TL
            } else {
                GENERAL_EN
            }
        }
    }
}

/// Choose the canned reply for a provider failure.
///
/// Always returns displayable text; never an error.
#[must_use]
pub fn reply_for(error: &ProviderError, last_user_text: &str) -> String {
    match error {
        ProviderError::RateLimited => {
            debug!("rate-limited fallback");
            if looks_tagalog(last_user_text) {
                RATE_LIMITED_TL.to_owned()
            } else {
                RATE_LIMITED_EN.to_owned()
            }
        }
        ProviderError::Transport(_) | ProviderError::MalformedResponse(_) => {
            let set = candidates_for(last_user_text);
            debug!("canned fallback from a set of {}", set.len());
            let mut rng = rand::thread_rng();
            (*set.choose(&mut rng).unwrap_or(&set[0])).to_owned()
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn rate_limited_is_fixed_and_locale_aware() {
        let err = ProviderError::RateLimited;
        assert_eq!(reply_for(&err, "hello there"), RATE_LIMITED_EN);
        assert_eq!(reply_for(&err, "kumusta ka po"), RATE_LIMITED_TL);
        // Deterministic: same input, same output.
        assert_eq!(reply_for(&err, "hello there"), reply_for(&err, "hello there"));
    }

    #[test]
    fn triggers_scan_in_priority_order() {
        assert_eq!(detect_trigger("hello friend"), Some(Trigger::Greeting));
        assert_eq!(detect_trigger("so, how are you today"), Some(Trigger::HowAreYou));
        assert_eq!(detect_trigger("how cold was the weather"), Some(Trigger::Weather));
        assert_eq!(detect_trigger("thank you so much"), Some(Trigger::Gratitude));
        assert_eq!(detect_trigger("was jasper around"), Some(Trigger::Creator));
        assert_eq!(detect_trigger("what was your name"), Some(Trigger::Identity));
        // Greeting outranks everything it co-occurs with.
        assert_eq!(
            detect_trigger("hi, thanks for the weather info"),
            Some(Trigger::Greeting)
        );
        assert_eq!(detect_trigger("tell me a story"), None);
        // Substring matching: "something" carries the "hi" greeting keyword.
        assert_eq!(detect_trigger("tell me something"), Some(Trigger::Greeting));
    }

    #[test]
    fn transport_fallback_is_member_of_the_fixed_set() {
        let err = ProviderError::Transport("timeout".into());
        for _ in 0..20 {
            let reply = reply_for(&err, "tell me a random fact");
            assert!(GENERAL_EN.contains(&reply.as_str()));
        }
    }

    #[test]
    fn tagalog_input_draws_from_the_tagalog_set() {
        let err = ProviderError::MalformedResponse("empty".into());
        for _ in 0..20 {
            let reply = reply_for(&err, "ano ang gagawin natin ngayon");
            assert!(GENERAL_TL.contains(&reply.as_str()));
        }
    }

    #[test]
    fn triggered_fallbacks_are_single_fixed_responses() {
        let err = ProviderError::Transport("down".into());
        assert_eq!(reply_for(&err, "hello!"), GREETING_EN);
        assert_eq!(reply_for(&err, "thank you"), GRATITUDE_EN);
        assert_eq!(reply_for(&err, "weather today?"), WEATHER_EN);
        assert_eq!(reply_for(&err, "what's your name?"), IDENTITY_EN);
        assert_eq!(reply_for(&err, "salamat po"), GRATITUDE_TL);
    }
}
