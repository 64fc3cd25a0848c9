use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::judge::{parse_judgment, AiJudge, JudgeRequest, Judgment};
use crate::error::{AppError, Result};

pub const DEFAULT_API_URL: &str = "https://api.anthropic.com/v1/messages";
pub const DEFAULT_MODEL: &str = "claude-3-5-haiku-20241022";

const CONTENT_LIMIT: usize = 2000;

#[derive(Debug, Serialize)]
struct MessageRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<Message>,
    system: Option<String>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    text: Option<String>,
}

const SYSTEM_PROMPT: &str = r#"You classify regulatory news for a product certification team.
Decide whether the record concerns product certification, market access,
conformity assessment, type approval, radio/EMC/safety standards or related
regulatory requirements.
Reply with a single JSON object and nothing else:
{"relatedToCertification": true|false, "confidence": 0.0-1.0, "reason": "one sentence", "extractedKeywords": ["short certification terms found in the text"]}"#;

/// Judge backed by the Anthropic messages API.
pub struct ClaudeJudge {
    client: Client,
    api_key: String,
    api_url: String,
    model: String,
}

impl ClaudeJudge {
    pub fn new(api_key: String) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;
        Ok(Self {
            client,
            api_key,
            api_url: DEFAULT_API_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
        })
    }

    pub fn with_endpoint(mut self, api_url: impl Into<String>, model: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self.model = model.into();
        self
    }

    pub fn model_version(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl AiJudge for ClaudeJudge {
    async fn judge(&self, request: &JudgeRequest) -> Result<Judgment> {
        let request = MessageRequest {
            model: self.model.clone(),
            max_tokens: 800,
            temperature: 0.3,
            messages: vec![Message {
                role: "user".to_string(),
                content: build_user_message(request),
            }],
            system: Some(SYSTEM_PROMPT.to_string()),
        };

        let response = self
            .client
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            return Err(AppError::AiJudge(format!("API error {}: {}", status, error_text)));
        }

        let message_response: MessageResponse = response.json().await?;
        let reply = message_response
            .content
            .into_iter()
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("\n");

        parse_judgment(&reply)
    }
}

fn build_user_message(request: &JudgeRequest) -> String {
    let content = if request.content.chars().count() > CONTENT_LIMIT {
        let cut: String = request.content.chars().take(CONTENT_LIMIT).collect();
        format!("{cut}...")
    } else {
        request.content.clone()
    };

    format!(
        "Title: {}\nSummary: {}\nCountry: {}\nSource: {}\n\nContent:\n{}",
        request.title, request.summary, request.country, request.source_name, content
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_content_is_truncated_in_prompt() {
        let request = JudgeRequest {
            title: "EU radio rules".into(),
            content: "é".repeat(CONTENT_LIMIT + 10),
            ..Default::default()
        };
        let message = build_user_message(&request);
        assert!(message.contains("Title: EU radio rules"));
        assert!(message.ends_with("..."));
        let body = message.split("Content:\n").nth(1).unwrap();
        assert_eq!(body.chars().count(), CONTENT_LIMIT + 3);
    }
}
