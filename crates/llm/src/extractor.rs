//! `LlmExtractor` implementation (C6, §4.4) over an OpenAI-compatible endpoint.
//!
//! Mirrors the original extraction prompt's contract: strict JSON output,
//! quantity defaults to 1, unit defaults to "boxes", and any provider error or
//! malformed payload degrades to an empty item list rather than a call error.

use async_trait::async_trait;
use serde::Deserialize;

use voice_agent_core::{DialogueTurn, ExtractedItem, ExtractionResult, LlmExtractor, Result, TurnRole};

use crate::client::{ChatClient, ChatMessage};

const SYSTEM_PROMPT: &str = r#"You are an order extraction assistant for a phone-based product ordering system.
Extract the products and quantities mentioned in the caller's transcript.

Respond with strict JSON in this shape:
{
  "items": [
    {"name": "product name", "quantity": number, "unit": "boxes" or "units"}
  ]
}

Rules:
- If no quantity is stated, use 1.
- If no unit is stated, use "boxes".
- Normalize product names (strip filler words like "um", "so").
- If multiple products are mentioned, return all of them.
- If no product is detected, return an empty items array."#;

pub struct OpenAiExtractor {
    client: ChatClient,
}

impl OpenAiExtractor {
    pub fn new(client: ChatClient) -> Self {
        Self { client }
    }

    fn user_prompt(final_transcript: &str, recent_turns: &[DialogueTurn]) -> String {
        let history: String = recent_turns
            .iter()
            .map(|t| {
                let role = match t.role {
                    TurnRole::User => "caller",
                    TurnRole::Assistant => "agent",
                };
                format!("{role}: {}", t.text)
            })
            .collect::<Vec<_>>()
            .join("\n");

        format!("Transcript: {final_transcript}\n\nRecent dialogue:\n{history}\n\nExtract the ordered products.")
    }
}

#[async_trait]
impl LlmExtractor for OpenAiExtractor {
    async fn extract(&self, final_transcript: &str, recent_turns: &[DialogueTurn]) -> Result<ExtractionResult> {
        let messages = [
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(Self::user_prompt(final_transcript, recent_turns)),
        ];

        let raw = match self.client.chat(&messages, true).await {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!(error = %err, "llm extraction call failed, returning empty result");
                return Ok(ExtractionResult::default());
            }
        };

        match parse_extraction(&raw) {
            Ok(result) => Ok(result),
            Err(err) => {
                tracing::warn!(error = %err, raw = %raw, "llm extraction payload malformed, returning empty result");
                Ok(ExtractionResult::default())
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct WirePayload {
    #[serde(default)]
    items: Vec<WireItem>,
}

#[derive(Debug, Deserialize)]
struct WireItem {
    name: String,
    #[serde(default = "default_quantity")]
    quantity: i64,
    #[serde(default = "default_unit")]
    unit: String,
}

fn default_quantity() -> i64 {
    1
}

fn default_unit() -> String {
    "boxes".to_string()
}

fn parse_extraction(raw: &str) -> Result<ExtractionResult> {
    let payload: WirePayload = serde_json::from_str(raw)
        .map_err(|e| voice_agent_core::Error::ParseFailure(e.to_string()))?;

    Ok(ExtractionResult {
        items: payload
            .items
            .into_iter()
            .map(|i| ExtractedItem { name: i.name, quantity: i.quantity, unit: i.unit })
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_payload() {
        let raw = r#"{"items":[{"name":"Doliprane","quantity":10,"unit":"boxes"}]}"#;
        let result = parse_extraction(raw).unwrap();
        assert_eq!(result.items.len(), 1);
        assert_eq!(result.items[0].name, "Doliprane");
        assert_eq!(result.items[0].quantity, 10);
    }

    #[test]
    fn defaults_quantity_and_unit_when_omitted() {
        let raw = r#"{"items":[{"name":"Efferalgan"}]}"#;
        let result = parse_extraction(raw).unwrap();
        assert_eq!(result.items[0].quantity, 1);
        assert_eq!(result.items[0].unit, "boxes");
    }

    #[test]
    fn empty_items_array_parses_to_empty_result() {
        let raw = r#"{"items":[]}"#;
        let result = parse_extraction(raw).unwrap();
        assert!(result.items.is_empty());
    }

    #[test]
    fn malformed_json_is_an_error_the_caller_downgrades_to_empty() {
        assert!(parse_extraction("not json").is_err());
    }

    #[test]
    fn user_prompt_includes_transcript_and_history() {
        let turns = vec![DialogueTurn {
            role: TurnRole::User,
            text: "I need some Doliprane".to_string(),
            timestamp: chrono::Utc::now(),
        }];
        let prompt = OpenAiExtractor::user_prompt("ten boxes please", &turns);
        assert!(prompt.contains("ten boxes please"));
        assert!(prompt.contains("Doliprane"));
    }
}
