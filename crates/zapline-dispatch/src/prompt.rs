// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! System prompt assembly from the session's bot profile.

use zapline_core::types::{BotProfile, Exchange, Personality, Prompt};

fn personality_tone(personality: Personality) -> &'static str {
    match personality {
        Personality::Professional => "courteous, precise, and businesslike",
        Personality::Friendly => "warm, welcoming, and helpful",
        Personality::Casual => "relaxed and conversational",
        Personality::Formal => "strictly formal, always using polite address",
        Personality::Playful => "light-hearted, with an occasional touch of humor",
    }
}

/// Builds the system prompt: base assistant framing, personality, business
/// context, language, and formatting constraints.
pub fn build_system_prompt(profile: &BotProfile) -> String {
    let mut sections = Vec::new();

    sections.push(
        "You are a customer-service assistant answering messages on behalf of a business."
            .to_string(),
    );

    if !profile.business_name.is_empty() {
        sections.push(format!("The business is called \"{}\".", profile.business_name));
    }
    if !profile.business_category.is_empty() {
        sections.push(format!(
            "It operates in the {} segment; frame answers with that context in mind.",
            profile.business_category
        ));
    }

    sections.push(format!(
        "Your tone is {}.",
        personality_tone(profile.personality)
    ));
    sections.push(format!("Always reply in {}.", profile.language));
    sections.push(format!(
        "Keep replies under {} characters.",
        profile.max_reply_chars
    ));
    sections.push(if profile.use_emoji {
        "Emojis are welcome where they fit naturally.".to_string()
    } else {
        "Do not use emojis.".to_string()
    });
    sections.push(
        "Never invent prices, stock, or appointments; when unsure, ask the customer to wait \
         for a human attendant."
            .to_string(),
    );

    sections.join(" ")
}

/// Assembles the full generation request for the providers.
pub fn build_prompt(profile: &BotProfile, history: &[Exchange], user_text: &str) -> Prompt {
    Prompt {
        system: build_system_prompt(profile),
        history: history.to_vec(),
        user: user_text.to_string(),
    }
}

/// Hard-enforces the profile's length cap on a generated reply, trimming on
/// a character boundary.
pub fn enforce_reply_limits(reply: String, profile: &BotProfile) -> String {
    if reply.chars().count() <= profile.max_reply_chars {
        return reply;
    }
    reply.chars().take(profile.max_reply_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_carries_business_context_and_language() {
        let profile = BotProfile {
            business_name: "Padaria do Zé".to_string(),
            business_category: "bakery".to_string(),
            language: "pt-BR".to_string(),
            ..BotProfile::default()
        };
        let system = build_system_prompt(&profile);
        assert!(system.contains("Padaria do Zé"));
        assert!(system.contains("bakery"));
        assert!(system.contains("pt-BR"));
    }

    #[test]
    fn personality_changes_tone_section() {
        let mut profile = BotProfile::default();
        profile.personality = Personality::Playful;
        let playful = build_system_prompt(&profile);
        profile.personality = Personality::Formal;
        let formal = build_system_prompt(&profile);
        assert_ne!(playful, formal);
        assert!(playful.contains("humor"));
    }

    #[test]
    fn emoji_constraint_follows_profile() {
        let mut profile = BotProfile::default();
        profile.use_emoji = false;
        assert!(build_system_prompt(&profile).contains("Do not use emojis"));
    }

    #[test]
    fn reply_limit_trims_on_char_boundary() {
        let profile = BotProfile {
            max_reply_chars: 5,
            ..BotProfile::default()
        };
        // Multi-byte characters must not be split.
        let trimmed = enforce_reply_limits("olá, tudo bem?".to_string(), &profile);
        assert_eq!(trimmed, "olá, ");
    }

    #[test]
    fn short_reply_passes_untouched() {
        let profile = BotProfile::default();
        let reply = enforce_reply_limits("oi!".to_string(), &profile);
        assert_eq!(reply, "oi!");
    }

    #[test]
    fn history_is_threaded_through() {
        let history = vec![Exchange {
            user: "oi".into(),
            assistant: "olá!".into(),
        }];
        let prompt = build_prompt(&BotProfile::default(), &history, "tudo bem?");
        assert_eq!(prompt.history.len(), 1);
        assert_eq!(prompt.user, "tudo bem?");
    }
}
