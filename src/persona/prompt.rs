use super::PersonalityProfile;
use std::fmt::Write;

/// Domains at or below this strength are left out of the prompt.
const KNOWLEDGE_STRENGTH_THRESHOLD: f64 = 0.7;

pub struct PromptContext<'a> {
    pub profile: &'a PersonalityProfile,
    pub user_message: &'a str,
}

pub trait PromptSection: Send + Sync {
    fn name(&self) -> &str;
    fn build(&self, ctx: &PromptContext<'_>) -> String;
}

/// Renders a profile plus one user message into a provider-agnostic
/// instruction string. Section order is part of the prompt format.
pub struct PromptBuilder {
    sections: Vec<Box<dyn PromptSection>>,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl PromptBuilder {
    pub fn with_defaults() -> Self {
        Self {
            sections: vec![
                Box::new(IdentitySection),
                Box::new(EmotionSection),
                Box::new(KnowledgeSection),
                Box::new(BehaviorSection),
                Box::new(LengthSection),
                Box::new(EmojiSection),
                Box::new(ConversationSection),
            ],
        }
    }

    pub fn section_names(&self) -> Vec<&str> {
        self.sections.iter().map(|s| s.name()).collect()
    }

    pub fn build(&self, user_message: &str, profile: &PersonalityProfile) -> String {
        let ctx = PromptContext {
            profile,
            user_message,
        };
        let mut lines = Vec::with_capacity(self.sections.len());
        for section in &self.sections {
            let part = section.build(&ctx);
            if part.trim().is_empty() {
                continue;
            }
            lines.push(part.trim_end().to_string());
        }
        lines.join("\n")
    }
}

pub struct IdentitySection;
pub struct EmotionSection;
pub struct KnowledgeSection;
pub struct BehaviorSection;
pub struct LengthSection;
pub struct EmojiSection;
pub struct ConversationSection;

impl PromptSection for IdentitySection {
    fn name(&self) -> &str {
        "identity"
    }

    fn build(&self, ctx: &PromptContext<'_>) -> String {
        let p = ctx.profile;
        format!(
            "You are {}, a chat companion with a {} personality.\nKey traits: {}, {} intelligence.",
            p.name, p.tone, p.formality_level, p.intelligence_level
        )
    }
}

/// Adjective form of the stock emotion names; unknown names pass through.
fn emotion_adjective(emotion: &str) -> &str {
    match emotion {
        "friendliness" => "friendly",
        "sarcasm" => "sarcastic",
        "curiosity" => "curious",
        "enthusiasm" => "enthusiastic",
        "patience" => "patient",
        "humor" => "humorous",
        other => other,
    }
}

/// Bucket an intensity into a descriptor, `None` when it is too faint to mention.
pub fn describe_emotion(emotion: &str, intensity: f64) -> Option<String> {
    let adjective = emotion_adjective(emotion);
    if intensity > 0.7 {
        Some(format!("very {adjective}"))
    } else if intensity > 0.4 {
        Some(adjective.to_string())
    } else if intensity > 0.1 {
        Some(format!("slightly {adjective}"))
    } else {
        None
    }
}

impl PromptSection for EmotionSection {
    fn name(&self) -> &str {
        "emotions"
    }

    fn build(&self, ctx: &PromptContext<'_>) -> String {
        let descriptors: Vec<String> = ctx
            .profile
            .emotions
            .iter()
            .filter_map(|(emotion, intensity)| describe_emotion(emotion, *intensity))
            .collect();
        if descriptors.is_empty() {
            return String::new();
        }
        format!("Your emotional state: {}.", descriptors.join(", "))
    }
}

impl PromptSection for KnowledgeSection {
    fn name(&self) -> &str {
        "knowledge"
    }

    fn build(&self, ctx: &PromptContext<'_>) -> String {
        let strong: Vec<&str> = ctx
            .profile
            .knowledge_domains
            .iter()
            .filter(|(_, strength)| **strength > KNOWLEDGE_STRENGTH_THRESHOLD)
            .map(|(domain, _)| domain.as_str())
            .collect();
        if strong.is_empty() {
            return String::new();
        }
        format!("You are especially knowledgeable about: {}.", strong.join(", "))
    }
}

fn behavior_instruction(flag: &str) -> String {
    match flag {
        "ask_questions_back" => "Ask follow-up questions to keep the conversation going.".into(),
        "share_opinions" => "Share your own opinions when it fits.".into(),
        "use_facts" => "Back up claims with concrete facts.".into(),
        "tell_jokes" => "Crack a joke now and then.".into(),
        "use_pop_culture_references" => "Sprinkle in pop culture references.".into(),
        "admit_ignorance" => "Admit it when you don't know something.".into(),
        other => format!("Make a habit of this: {}.", other.replace('_', " ")),
    }
}

impl PromptSection for BehaviorSection {
    fn name(&self) -> &str {
        "behaviors"
    }

    fn build(&self, ctx: &PromptContext<'_>) -> String {
        let mut out = String::new();
        for (flag, _) in ctx.profile.behaviors.iter().filter(|(_, on)| **on) {
            let _ = writeln!(out, "{}", behavior_instruction(flag));
        }
        out
    }
}

impl PromptSection for LengthSection {
    fn name(&self) -> &str {
        "length"
    }

    fn build(&self, ctx: &PromptContext<'_>) -> String {
        format!(
            "Keep responses under {} characters. Be engaging and conversational.",
            ctx.profile.response_style.max_response_length
        )
    }
}

impl PromptSection for EmojiSection {
    fn name(&self) -> &str {
        "emoji"
    }

    fn build(&self, ctx: &PromptContext<'_>) -> String {
        if ctx.profile.response_style.use_emojis {
            "Feel free to use emojis.".into()
        } else {
            String::new()
        }
    }
}

impl PromptSection for ConversationSection {
    fn name(&self) -> &str {
        "conversation"
    }

    fn build(&self, ctx: &PromptContext<'_>) -> String {
        format!("\nUser: {}\n{}:", ctx.user_message, ctx.profile.name)
    }
}
