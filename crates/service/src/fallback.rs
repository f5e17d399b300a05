//! Fallback generator — the backstop of last resort.
//!
//! Produces a plausible, non-empty reply when the remote model is
//! categorically unavailable. Never fails, always terminates with text.

use rand::Rng;

/// Self-referential phrases that get the fixed identity statement instead of
/// a canned topic reply. Matched case-insensitively as substrings.
const IDENTITY_KEYWORDS: [&str; 4] = ["who are you", "what can you do", "your purpose", "about you"];

/// The fixed identity/capability statement, mentioning the offline state.
pub const IDENTITY_REPLY: &str = "Aloha! I'm KiloK\u{14d}kua, the Hawai\u{2bb}i Climate AI \
Concierge. I can answer questions about Hawai\u{2bb}i's climate, weather patterns, climate \
change impacts, and sustainability efforts. Right now I'm running in offline mode, so my \
replies come from a small set of saved notes rather than the full knowledge base.";

/// Canned topic statements served while offline. Selection is uniformly
/// random; the pool must never be empty and every entry is non-empty text.
pub const CANNED_REPLIES: [&str; 6] = [
    "Hawai\u{2bb}i's climate is warming: average temperatures across the islands have risen \
     steadily over the past century, with the strongest warming at high elevations.",
    "Sea levels around the Hawaiian Islands are rising and are projected to rise another foot \
     or more by mid-century, increasing coastal flooding during king tides.",
    "Trade winds shape daily weather in Hawai\u{2bb}i, and studies show their frequency has \
     declined in recent decades, affecting rainfall and humidity across the islands.",
    "Rainfall patterns in Hawai\u{2bb}i are changing: windward areas are generally seeing less \
     rain than a century ago, which puts pressure on freshwater supplies.",
    "Coral reefs around Hawai\u{2bb}i suffer bleaching when ocean temperatures spike; the 2014\u{2013}2015 \
     marine heat wave caused widespread bleaching across the islands.",
    "Hawai\u{2bb}i aims to reach 100% renewable electricity by 2045, one of the most ambitious \
     clean-energy commitments in the United States.",
];

/// Generates replies without the remote model.
pub struct FallbackResponder;

impl FallbackResponder {
    pub fn new() -> Self {
        Self
    }

    /// Produce a reply for the given message.
    ///
    /// Identity questions get the fixed statement; everything else gets a
    /// uniformly random pick from the canned pool.
    pub fn reply(&self, message: &str) -> String {
        let lowered = message.to_lowercase();
        if IDENTITY_KEYWORDS.iter().any(|k| lowered.contains(k)) {
            return IDENTITY_REPLY.to_string();
        }

        let idx = rand::rng().random_range(0..CANNED_REPLIES.len());
        CANNED_REPLIES[idx].to_string()
    }
}

impl Default for FallbackResponder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_query_is_deterministic() {
        let responder = FallbackResponder::new();
        for _ in 0..10 {
            assert_eq!(responder.reply("So, who are you exactly?"), IDENTITY_REPLY);
        }
    }

    #[test]
    fn identity_match_is_case_insensitive() {
        let responder = FallbackResponder::new();
        assert_eq!(responder.reply("WHO ARE YOU"), IDENTITY_REPLY);
        assert_eq!(responder.reply("Tell me About You"), IDENTITY_REPLY);
        assert_eq!(responder.reply("what is your purpose?"), IDENTITY_REPLY);
    }

    #[test]
    fn other_messages_come_from_pool() {
        let responder = FallbackResponder::new();
        for _ in 0..20 {
            let reply = responder.reply("hello");
            assert!(CANNED_REPLIES.contains(&reply.as_str()));
        }
    }

    #[test]
    fn replies_are_never_empty() {
        let responder = FallbackResponder::new();
        assert!(!responder.reply("").is_empty());
        assert!(!responder.reply("anything at all").is_empty());
        for entry in CANNED_REPLIES {
            assert!(!entry.is_empty());
        }
    }
}
