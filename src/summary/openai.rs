use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::Summarizer;
use crate::submission::EmailFields;

pub const API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

const MAX_TOKENS: u32 = 150;
const TEMPERATURE: f32 = 0.3;

const SYSTEM_PROMPT: &str = "You write time entries for a law practice. Describe the legal work \
an email represents in plain, client-appropriate language.";

/// Chat-completions backed summarizer.
pub struct OpenAiSummarizer {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

impl OpenAiSummarizer {
    pub fn new(api_key: impl Into<String>, base_url: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    /// Reads the key from `OPENAI_API_KEY`; `None` when unset or blank.
    pub fn from_env(base_url: Option<String>) -> Option<Self> {
        let key = std::env::var(API_KEY_ENV).ok()?;
        if key.trim().is_empty() {
            return None;
        }
        Some(Self::new(key.trim(), base_url))
    }

    fn prompt(fields: &EmailFields) -> String {
        format!(
            "Turn this email into a billable time entry description.\n\n\
             To: {}\nSubject: {}\nContent: {}\n\n\
             Write one or two sentences that describe the legal work performed, \
             not merely that an email was sent.",
            fields.recipient, fields.subject, fields.content
        )
    }
}

#[async_trait]
impl Summarizer for OpenAiSummarizer {
    async fn summarize(&self, fields: &EmailFields) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let prompt = Self::prompt(fields);
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
        };

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .context("Failed to reach summarizer")?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            bail!("Summarizer returned HTTP {status}: {text}");
        }

        let parsed: ChatResponse = resp
            .json()
            .await
            .context("Failed to parse summarizer response")?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .ok_or_else(|| anyhow!("Summarizer returned no choices"))
    }
}
