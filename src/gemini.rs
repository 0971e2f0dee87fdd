//! Minimal Gemini text-generation client.
//!
//! Only used to phrase user-facing summaries; every caller keeps a
//! deterministic fallback, so scheduling works without a key.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::error::Error;

const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

pub const GEMINI_FLASH: &str = "gemini-2.5-flash";

#[derive(Debug, Serialize, Deserialize, Clone)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(rename = "maxOutputTokens", skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    error: ErrorDetails,
}

#[derive(Debug, Deserialize)]
struct ErrorDetails {
    message: String,
    #[serde(default)]
    status: String,
}

pub struct GeminiClient {
    client: Client,
    api_key: String,
}

impl GeminiClient {
    pub fn new(api_key: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
        }
    }

    /// Build a client from `GEMINI_API_KEY` if it is set.
    pub fn from_env() -> Option<Self> {
        std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|key| !key.is_empty())
            .map(|key| Self::new(&key))
    }

    /// One-shot text generation against the flash model.
    pub async fn generate(
        &self,
        system_prompt: Option<&str>,
        prompt: &str,
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> Result<String, Box<dyn Error + Send + Sync>> {
        let request = GenerateRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part { text: prompt.to_string() }],
            }],
            system_instruction: system_prompt.map(|s| Content {
                role: None,
                parts: vec![Part { text: s.to_string() }],
            }),
            generation_config: GenerationConfig {
                temperature: Some(temperature),
                max_output_tokens: max_tokens,
            },
        };

        let url = format!("{}/{}:generateContent", GEMINI_API_URL, GEMINI_FLASH);
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;

            if let Ok(parsed) = serde_json::from_str::<GeminiError>(&error_text) {
                return Err(format!(
                    "Gemini API error ({}): {} - {}",
                    status, parsed.error.status, parsed.error.message
                )
                .into());
            }
            return Err(format!("Gemini API error ({}): {}", status, error_text).into());
        }

        let completion: GenerateResponse = response.json().await?;
        extract_text(&completion).ok_or_else(|| "No text response from Gemini".into())
    }

    /// Validate the API key with a tiny request.
    pub async fn validate_api_key(&self) -> Result<bool, Box<dyn Error + Send + Sync>> {
        match self.generate(None, "Say 'ok'", 0.0, Some(10)).await {
            Ok(_) => Ok(true),
            Err(e) => {
                let message = e.to_string();
                if message.contains("API_KEY_INVALID") || message.contains("(401") {
                    return Err("Invalid Gemini API key".into());
                }
                if message.contains("(429") {
                    return Err("Rate limited - too many requests".into());
                }
                Err(e)
            }
        }
    }
}

/// Concatenate the text parts of the first candidate.
fn extract_text(response: &GenerateResponse) -> Option<String> {
    let candidate = response.candidates.first()?;
    let text: String = candidate
        .content
        .parts
        .iter()
        .map(|part| part.text.as_str())
        .collect();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}
