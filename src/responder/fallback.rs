use rand::seq::IndexedRandom;
use rand::Rng;

pub const DEFAULT_FALLBACKS: &[&str] = &[
    "Hmm, I'm having trouble thinking right now. 🤔",
    "My AI is taking a coffee break! ☕",
    "Let me try that again later! 🔄",
    "I'm currently optimizing my circuits! 💻",
];

/// Canned replies for when no provider produced text. Always non-empty.
#[derive(Debug, Clone)]
pub struct FallbackCatalog {
    messages: Vec<String>,
}

impl Default for FallbackCatalog {
    fn default() -> Self {
        Self::new(DEFAULT_FALLBACKS.iter().map(|m| (*m).to_string()).collect())
    }
}

impl FallbackCatalog {
    /// Blank entries are dropped; an empty list falls back to the defaults.
    pub fn new(messages: Vec<String>) -> Self {
        let messages: Vec<String> = messages
            .into_iter()
            .filter(|m| !m.trim().is_empty())
            .collect();
        if messages.is_empty() {
            return Self::default();
        }
        Self { messages }
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> &str {
        self.messages
            .choose(rng)
            .map_or(DEFAULT_FALLBACKS[0], String::as_str)
    }
}
