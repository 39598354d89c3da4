//! Optional narration rewriting through a chat-completions endpoint.
//!
//! When configured, extracted slide text is rewritten into spoken prose
//! before synthesis. Any failure falls back to the raw extracted text.

use tracing::warn;

use crate::config::ExplanationConfig;
use crate::foundation::error::{SlidecastError, SlidecastResult};

const SYSTEM_PROMPT: &str = "You turn slide bullet points into a short spoken \
explanation for a presentation voiceover. Answer with the narration text only.";

pub struct ExplanationGenerator {
    client: reqwest::blocking::Client,
    config: ExplanationConfig,
}

#[derive(serde::Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(serde::Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(serde::Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(serde::Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(serde::Deserialize)]
struct ChatResponseMessage {
    content: String,
}

impl ExplanationGenerator {
    pub fn new(config: ExplanationConfig) -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
            config,
        }
    }

    /// Rewrite `slide_text`, returning the original text when the endpoint
    /// fails or produces nothing usable.
    pub fn rewrite(&self, slide_text: &str) -> String {
        if slide_text.trim().is_empty() {
            return slide_text.to_string();
        }
        match self.request(slide_text) {
            Ok(rewritten) if !rewritten.trim().is_empty() => rewritten.trim().to_string(),
            Ok(_) => slide_text.to_string(),
            Err(err) => {
                warn!(error = %err, "explanation rewrite failed, using extracted text");
                slide_text.to_string()
            }
        }
    }

    fn request(&self, slide_text: &str) -> SlidecastResult<String> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: slide_text,
                },
            ],
            max_tokens: 300,
        };

        let response = self
            .client
            .post(&self.config.endpoint)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&request)
            .send()
            .map_err(|e| SlidecastError::synthesis(format!("explanation request failed: {e}")))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(SlidecastError::synthesis(format!(
                "explanation endpoint returned {status}: {body}"
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .map_err(|e| SlidecastError::synthesis(format!("explanation response: {e}")))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| SlidecastError::synthesis("explanation response had no choices"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_response_parses_first_choice() {
        let raw = r#"{"choices":[{"message":{"role":"assistant","content":"Narration."}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.choices[0].message.content, "Narration.");
    }

    #[test]
    fn unreachable_endpoint_falls_back_to_input() {
        let generator = ExplanationGenerator::new(ExplanationConfig {
            api_key: "k".into(),
            endpoint: "http://127.0.0.1:1/v1/chat/completions".into(),
            model: "test".into(),
        });
        assert_eq!(generator.rewrite("Title: Intro"), "Title: Intro");
        assert_eq!(generator.rewrite("   "), "   ");
    }
}
