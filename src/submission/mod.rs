//! Turns a frozen tracker into a persisted billable entry.

mod entry;
mod extract;
mod failure;

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use tokio::time;

pub use entry::{
    billable_hours, fallback_summary, identify_client, BillableEntry, DEFAULT_CASE, UNKNOWN_CLIENT,
};
pub use extract::{EmailFields, FieldExtractor, NO_SUBJECT, UNKNOWN_RECIPIENT};
pub use failure::FailureClass;

use crate::{
    config::TrackerConfig,
    dom::{Document, NodeId},
    settings::TokenStore,
    store::EntryStore,
    summary::Summarizer,
};
use crate::{log_info, log_warn};

const ENABLE_LOGS: bool = true;

const UNKNOWN_ERROR: &str = "Unknown error occurred";

#[derive(Debug, Clone)]
pub enum SubmissionOutcome {
    Succeeded {
        entry: BillableEntry,
        entry_id: String,
        platform_synced: bool,
    },
    Failed {
        class: FailureClass,
        message: String,
    },
}

impl SubmissionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SubmissionOutcome::Succeeded { .. })
    }
}

pub struct SubmissionPipeline {
    extractor: FieldExtractor,
    summarizer: Arc<dyn Summarizer>,
    store: Arc<dyn EntryStore>,
    tokens: Arc<dyn TokenStore>,
    min_billable_hours: f64,
    summarize_timeout: Duration,
    persist_timeout: Duration,
}

impl SubmissionPipeline {
    pub fn new(
        summarizer: Arc<dyn Summarizer>,
        store: Arc<dyn EntryStore>,
        tokens: Arc<dyn TokenStore>,
        config: &TrackerConfig,
    ) -> Result<Self> {
        Ok(Self {
            extractor: FieldExtractor::new()?,
            summarizer,
            store,
            tokens,
            min_billable_hours: config.min_billable_hours,
            summarize_timeout: config.summarize_timeout,
            persist_timeout: config.persist_timeout,
        })
    }

    /// Reads the draft while the surface is still in the document.
    pub fn extract(&self, doc: &dyn Document, surface: NodeId) -> EmailFields {
        self.extractor.extract(doc, surface)
    }

    /// Summarizes, builds and persists the entry. Never panics or errors;
    /// every failure ends up as `SubmissionOutcome::Failed`.
    pub async fn process(&self, fields: EmailFields, elapsed_ms: u64) -> SubmissionOutcome {
        let hours = billable_hours(elapsed_ms, self.min_billable_hours);
        let summary = self.summarize(&fields).await;
        let entry = BillableEntry::new(fields, hours, summary);
        let token = self.tokens.get();

        let response = match time::timeout(
            self.persist_timeout,
            self.store.submit(&entry, token.as_deref()),
        )
        .await
        {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => return failed(&format!("{err:#}")),
            Err(_) => return failed("request timed out"),
        };

        if !response.success {
            return failed(response.error.as_deref().unwrap_or(UNKNOWN_ERROR));
        }

        let entry_id = response.id.unwrap_or_default();
        log_info!(
            "entry {entry_id} saved for {} ({} h, synced: {})",
            entry.client,
            entry.hours,
            response.platform_synced
        );
        SubmissionOutcome::Succeeded {
            entry,
            entry_id,
            platform_synced: response.platform_synced,
        }
    }

    async fn summarize(&self, fields: &EmailFields) -> String {
        match time::timeout(self.summarize_timeout, self.summarizer.summarize(fields)).await {
            Ok(Ok(summary)) if !summary.trim().is_empty() => summary.trim().to_string(),
            Ok(Ok(_)) => {
                log_warn!("summarizer returned an empty summary, using fallback");
                fallback_summary(fields)
            }
            Ok(Err(err)) => {
                log_warn!("summarizer failed, using fallback: {err:#}");
                fallback_summary(fields)
            }
            Err(_) => {
                log_warn!("summarizer timed out, using fallback");
                fallback_summary(fields)
            }
        }
    }
}

fn failed(raw: &str) -> SubmissionOutcome {
    let class = FailureClass::classify(raw);
    SubmissionOutcome::Failed {
        class,
        message: class.user_message(raw),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use anyhow::anyhow;
    use async_trait::async_trait;

    use super::*;
    use crate::{settings::StaticToken, store::SubmitResponse};

    struct FixedSummarizer(Result<String, String>);

    #[async_trait]
    impl Summarizer for FixedSummarizer {
        async fn summarize(&self, _fields: &EmailFields) -> Result<String> {
            self.0.clone().map_err(|message| anyhow!(message))
        }
    }

    #[derive(Default)]
    struct FakeStore {
        reply: Option<SubmitResponse>,
        error: Option<String>,
        seen: Mutex<Vec<(BillableEntry, Option<String>)>>,
    }

    #[async_trait]
    impl EntryStore for FakeStore {
        async fn submit(&self, entry: &BillableEntry, token: Option<&str>) -> Result<SubmitResponse> {
            self.seen
                .lock()
                .unwrap()
                .push((entry.clone(), token.map(str::to_string)));
            if let Some(error) = &self.error {
                return Err(anyhow!(error.clone()));
            }
            Ok(self.reply.clone().unwrap_or(SubmitResponse {
                success: true,
                id: Some("entry-1".into()),
                error: None,
                platform_synced: false,
            }))
        }
    }

    fn fields() -> EmailFields {
        EmailFields {
            recipient: "jane@acme.com".into(),
            subject: "Settlement".into(),
            content: "Draft terms attached.".into(),
        }
    }

    fn pipeline(summary: Result<String, String>, store: Arc<FakeStore>, token: Option<&str>) -> SubmissionPipeline {
        SubmissionPipeline::new(
            Arc::new(FixedSummarizer(summary)),
            store,
            Arc::new(StaticToken(token.map(str::to_string))),
            &TrackerConfig::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn successful_submission_bills_the_floor_for_short_drafts() {
        let store = Arc::new(FakeStore::default());
        let outcome = pipeline(Ok("Reviewed settlement terms".into()), store.clone(), Some("tok"))
            .process(fields(), 144_000)
            .await;

        match outcome {
            SubmissionOutcome::Succeeded { entry, entry_id, platform_synced } => {
                assert_eq!(entry.hours, 0.1);
                assert_eq!(entry.summary, "Reviewed settlement terms");
                assert_eq!(entry.client, "Jane");
                assert_eq!(entry_id, "entry-1");
                assert!(!platform_synced);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        let seen = store.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].1.as_deref(), Some("tok"));
    }

    #[tokio::test]
    async fn rejected_or_empty_summary_uses_fallback() {
        for summary in [Err("model unavailable".to_string()), Ok("   ".to_string())] {
            let store = Arc::new(FakeStore::default());
            let outcome = pipeline(summary, store.clone(), None).process(fields(), 60_000).await;
            assert!(outcome.is_success());
            let seen = store.seen.lock().unwrap();
            assert_eq!(
                seen[0].0.summary,
                "Email communication with jane@acme.com regarding Settlement"
            );
            assert_eq!(seen[0].1, None);
        }
    }

    #[tokio::test]
    async fn unsuccessful_response_becomes_failure() {
        let store = Arc::new(FakeStore {
            reply: Some(SubmitResponse {
                success: false,
                id: None,
                error: Some("disk quota exceeded".into()),
                platform_synced: false,
            }),
            ..Default::default()
        });
        let outcome = pipeline(Ok("x".into()), store, None).process(fields(), 1_000).await;
        match outcome {
            SubmissionOutcome::Failed { class, message } => {
                assert_eq!(class, FailureClass::Other);
                assert_eq!(message, "disk quota exceeded");
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_error_text_gets_a_generic_message() {
        let store = Arc::new(FakeStore {
            reply: Some(SubmitResponse::default()),
            ..Default::default()
        });
        let outcome = pipeline(Ok("x".into()), store, None).process(fields(), 1_000).await;
        assert!(matches!(
            outcome,
            SubmissionOutcome::Failed { ref message, .. } if message == UNKNOWN_ERROR
        ));
    }

    #[tokio::test]
    async fn store_errors_are_classified() {
        let store = Arc::new(FakeStore {
            error: Some("error sending request: connection refused".into()),
            ..Default::default()
        });
        let outcome = pipeline(Ok("x".into()), store, None).process(fields(), 1_000).await;
        assert!(matches!(
            outcome,
            SubmissionOutcome::Failed { class: FailureClass::Network, .. }
        ));
    }
}
