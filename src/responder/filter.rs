use crate::persona::PersonalityProfile;
use crate::util::clamp_with_ellipsis;
use rand::seq::IndexedRandom;
use rand::Rng;

pub const GENERAL_EMOJIS: &[&str] = &["😊", "🤔", "✨", "💭", "🚀", "🎉", "💻", "🌟"];
pub const QUESTION_EMOJIS: &[&str] = &["🤔", "💭", "🧐"];

/// Post-processing for generated text: optional emoji, then the length clamp.
#[derive(Debug, Clone)]
pub struct ResponseFilter {
    general: Vec<String>,
    question: Vec<String>,
}

impl Default for ResponseFilter {
    fn default() -> Self {
        Self::new(GENERAL_EMOJIS, QUESTION_EMOJIS)
    }
}

impl ResponseFilter {
    pub fn new(general: &[&str], question: &[&str]) -> Self {
        Self {
            general: general.iter().map(|e| (*e).to_string()).collect(),
            question: question.iter().map(|e| (*e).to_string()).collect(),
        }
    }

    /// Emoji pool for `text`: the question set when it asks something.
    fn pool_for(&self, text: &str) -> &[String] {
        if text.contains('?') && !self.question.is_empty() {
            &self.question
        } else {
            &self.general
        }
    }

    /// Decorate then clamp. The result never exceeds the profile's
    /// `max_response_length`, emoji included.
    pub fn apply<R: Rng + ?Sized>(
        &self,
        raw: &str,
        profile: &PersonalityProfile,
        rng: &mut R,
    ) -> String {
        let mut text = raw.to_string();

        let probability = profile.emoji_probability();
        if probability > 0.0 && rng.random::<f64>() < probability {
            if let Some(emoji) = self.pool_for(raw).choose(rng) {
                text.push(' ');
                text.push_str(emoji);
            }
        }

        Self::clamp(&text, profile)
    }

    /// Length clamp alone, for text that must not be decorated.
    pub fn clamp(text: &str, profile: &PersonalityProfile) -> String {
        clamp_with_ellipsis(text, profile.response_style.max_response_length)
    }
}
