//! Per-section flashcard generation.
//!
//! Runs only when `[generation] enabled = true`. Each section is sent to the
//! completion service with a prompt asking for a JSON array of
//! `{"front", "back"}` cards. Failures are per section and never fail the
//! ingestion run.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::Arc;

use crate::completion::{ChatMessage, CompletionClient, CompletionRequest};
use crate::config::{CompletionConfig, GenerationConfig};
use crate::models::{DocumentSection, FlashcardDraft};

#[async_trait]
pub trait SectionGenerator: Send + Sync {
    async fn generate(&self, section: &DocumentSection) -> Result<Vec<FlashcardDraft>>;
}

pub struct CompletionSectionGenerator {
    client: Arc<dyn CompletionClient>,
    model: String,
    max_tokens: u32,
    temperature: f32,
    cards_per_section: usize,
}

impl CompletionSectionGenerator {
    pub fn new(
        client: Arc<dyn CompletionClient>,
        completion: &CompletionConfig,
        generation: &GenerationConfig,
    ) -> Self {
        let model = completion
            .model
            .clone()
            .unwrap_or_else(|| client.default_model().to_string());
        Self {
            client,
            model,
            max_tokens: completion.max_tokens,
            temperature: completion.temperature,
            cards_per_section: generation.cards_per_section,
        }
    }

    fn request(&self, section: &DocumentSection) -> CompletionRequest {
        let system = format!(
            "You write study flashcards. Reply with only a JSON array of at most {} objects, \
             each with string fields \"front\" (a question) and \"back\" (its answer). \
             Use the language of the source text.",
            self.cards_per_section
        );
        let user = format!("Section: {}\n\n{}", section.heading, section.content);
        CompletionRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage::system(system), ChatMessage::user(user)],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }
}

#[async_trait]
impl SectionGenerator for CompletionSectionGenerator {
    async fn generate(&self, section: &DocumentSection) -> Result<Vec<FlashcardDraft>> {
        let reply = self.client.complete(&self.request(section)).await?;
        let mut cards = parse_cards(&reply)?;
        cards.truncate(self.cards_per_section);
        Ok(cards)
    }
}

/// Parse the card array out of a model reply, tolerating prose or code
/// fences around it. Cards with an empty side are dropped.
pub fn parse_cards(reply: &str) -> Result<Vec<FlashcardDraft>> {
    let start = reply
        .find('[')
        .ok_or_else(|| anyhow!("no JSON array in generation reply"))?;
    let end = reply
        .rfind(']')
        .filter(|&end| end > start)
        .ok_or_else(|| anyhow!("unterminated JSON array in generation reply"))?;

    let cards: Vec<FlashcardDraft> = serde_json::from_str(&reply[start..=end])?;
    Ok(cards
        .into_iter()
        .map(|c| FlashcardDraft {
            front: c.front.trim().to_string(),
            back: c.back.trim().to_string(),
        })
        .filter(|c| !c.front.is_empty() && !c.back.is_empty())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fenced_reply() {
        let reply = "Here you go:\n```json\n[{\"front\": \"What is ATP?\", \"back\": \"Energy currency\"},\n {\"front\": \" \", \"back\": \"dropped\"}]\n```";
        let cards = parse_cards(reply).unwrap();
        assert_eq!(
            cards,
            vec![FlashcardDraft {
                front: "What is ATP?".to_string(),
                back: "Energy currency".to_string(),
            }]
        );
    }

    #[test]
    fn rejects_reply_without_array() {
        assert!(parse_cards("I cannot help with that.").is_err());
        assert!(parse_cards("] oops [").is_err());
    }
}
