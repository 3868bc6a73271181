//! Gemini API client
//!
//! The opaque text-generation collaborator. The core hands it a formatted
//! prompt plus recent conversation turns and consumes free text back.
//! Uses a long-lived reqwest::Client for connection pooling.

use crate::error::AssistantError;
use crate::models::{Message, MessageSender};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info};

/// Reusable Gemini client (connection-pooled)
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            api_key,
            base_url: "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent".to_string(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(std::env::var("GEMINI_API_KEY").unwrap_or_default())
    }

    /// Generate a conversational reply from a prompt and recent history
    pub async fn generate(
        &self,
        prompt: &str,
        history: &[Message],
    ) -> crate::Result<(String, f32)> {
        if self.api_key.is_empty() {
            return Err(AssistantError::LlmError(
                "GEMINI_API_KEY not configured".to_string(),
            ));
        }

        let url = format!("{}?key={}", self.base_url, self.api_key);

        let mut contents: Vec<Content> = history
            .iter()
            .map(|msg| Content {
                role: match msg.sender {
                    MessageSender::User => "user".to_string(),
                    MessageSender::Assistant => "model".to_string(),
                },
                parts: vec![Part {
                    text: msg.text.clone(),
                }],
            })
            .collect();
        contents.push(Content {
            role: "user".to_string(),
            parts: vec![Part {
                text: prompt.to_string(),
            }],
        });

        let request = GeminiRequest {
            contents,
            generation_config: GenerationConfig {
                temperature: 0.4,
                top_p: 0.9,
                top_k: 40,
                max_output_tokens: 1024,
            },
            system_instruction: SystemInstruction {
                parts: vec![Part {
                    text: SYSTEM_PROMPT.to_string(),
                }],
            },
        };

        info!("Calling Gemini API");

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("Gemini API request failed: {}", e);
                AssistantError::LlmError(format!("Gemini API error: {}", e))
            })?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Gemini API error response: {}", error_text);
            return Err(AssistantError::LlmError(format!(
                "Gemini API error: {}",
                error_text
            )));
        }

        let gemini_response: GeminiResponse = response.json().await.map_err(|e| {
            error!("Failed to parse Gemini response: {}", e);
            AssistantError::LlmError(format!("Gemini parse error: {}", e))
        })?;

        if gemini_response.candidates.is_empty() {
            return Err(AssistantError::LlmError(
                "No response from Gemini API".to_string(),
            ));
        }

        let answer = gemini_response.candidates[0]
            .content
            .parts
            .first()
            .ok_or_else(|| AssistantError::LlmError("Empty response from Gemini".to_string()))?
            .text
            .clone();

        let confidence = calculate_confidence(&gemini_response);

        info!("Gemini response received (confidence: {})", confidence);

        Ok((answer, confidence))
    }
}

const SYSTEM_PROMPT: &str = r#"You are a helpful trading assistant for a stock market simulator.

Guidelines:
- Answer using the market data context you are given; do not invent prices
- Be conversational but concise
- Explain market terms simply when asked
- Remind users this is a simulator when they ask about real trades
- Never give personalized investment advice"#;

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
    system_instruction: SystemInstruction,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    role: String,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: i32,
    max_output_tokens: i32,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

/// Calculate response confidence
fn calculate_confidence(response: &GeminiResponse) -> f32 {
    let base_confidence: f32 = 0.85;

    let finish_confidence = match response.candidates[0].finish_reason.as_deref() {
        Some("STOP") => 1.0,
        Some("LENGTH") => 0.8,
        Some("SAFETY") => 0.6,
        _ => 0.7,
    };

    let response_length = response.candidates[0]
        .content
        .parts
        .first()
        .map(|p| p.text.len())
        .unwrap_or(0);

    let length_confidence = if response_length < 50 {
        0.6
    } else if response_length > 2000 {
        0.8
    } else {
        1.0
    };

    (base_confidence * finish_confidence * length_confidence).clamp(0.5, 0.98)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MessageKind;

    #[test]
    fn test_request_serialization() {
        let request = GeminiRequest {
            contents: vec![Content {
                role: "user".to_string(),
                parts: vec![Part {
                    text: "What is the TCS stock price?".to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.4,
                top_p: 0.9,
                top_k: 40,
                max_output_tokens: 1024,
            },
            system_instruction: SystemInstruction {
                parts: vec![Part {
                    text: "You are a trading assistant".to_string(),
                }],
            },
        };

        let json = serde_json::to_string(&request);
        assert!(json.is_ok());
        assert!(json.unwrap().contains("What is the TCS stock price?"));
    }

    #[tokio::test]
    async fn test_missing_api_key_errors_before_network() {
        let client = GeminiClient::new(String::new());
        let history = [Message::user("hi", MessageKind::Text)];
        let result = client.generate("hello", &history).await;

        assert!(result.is_err());
        let error_msg = result.unwrap_err().to_string();
        assert!(error_msg.contains("GEMINI_API_KEY"));
    }

    #[test]
    fn test_confidence_calculation() {
        let response = GeminiResponse {
            candidates: vec![Candidate {
                content: Content {
                    role: "model".to_string(),
                    parts: vec![Part {
                        text: "A reasonably detailed answer about market capitalization \
                               that easily clears the short-response threshold."
                            .to_string(),
                    }],
                },
                finish_reason: Some("STOP".to_string()),
            }],
        };

        let confidence = calculate_confidence(&response);
        assert!(confidence > 0.8);
    }
}
