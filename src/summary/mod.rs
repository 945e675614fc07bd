//! Narrative descriptions for billable entries.

mod openai;

use anyhow::Result;
use async_trait::async_trait;

pub use openai::{OpenAiSummarizer, API_KEY_ENV, DEFAULT_BASE_URL, DEFAULT_MODEL};

use crate::submission::{fallback_summary, EmailFields};

#[async_trait]
pub trait Summarizer: Send + Sync {
    /// One or two sentences describing the work in the draft. An error or
    /// an empty string makes the pipeline fall back to a template.
    async fn summarize(&self, fields: &EmailFields) -> Result<String>;
}

/// Offline summarizer that always produces the template text.
#[derive(Debug, Default, Clone)]
pub struct TemplateSummarizer;

#[async_trait]
impl Summarizer for TemplateSummarizer {
    async fn summarize(&self, fields: &EmailFields) -> Result<String> {
        Ok(fallback_summary(fields))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn template_names_recipient_and_subject() {
        let fields = EmailFields {
            recipient: "jane@acme.com".into(),
            subject: "Lease review".into(),
            content: "See attached.".into(),
        };
        let summary = TemplateSummarizer.summarize(&fields).await.unwrap();
        assert_eq!(summary, "Email communication with jane@acme.com regarding Lease review");
    }
}
