use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::round_hundredths;

use super::extract::EmailFields;

const SHORT_SUMMARY_CHARS: usize = 60;

pub const UNKNOWN_CLIENT: &str = "Unknown Client";
pub const DEFAULT_CASE: &str = "General Legal Matter";

/// One billable block of drafting time, ready to persist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillableEntry {
    pub recipient: String,
    pub subject: String,
    pub content: String,
    #[serde(rename = "elapsedHours")]
    pub hours: f64,
    #[serde(rename = "summaryText")]
    pub summary: String,
    pub client: String,
    pub case_label: String,
    pub created_at: DateTime<Utc>,
}

impl BillableEntry {
    pub fn new(fields: EmailFields, hours: f64, summary: String) -> Self {
        let (client, case_label) = identify_client(&fields.recipient);
        Self {
            recipient: fields.recipient,
            subject: fields.subject,
            content: fields.content,
            hours,
            summary,
            client,
            case_label,
            created_at: Utc::now(),
        }
    }

    /// Summary cut to fit the outcome panel.
    pub fn short_summary(&self) -> String {
        if self.summary.chars().count() <= SHORT_SUMMARY_CHARS {
            return self.summary.clone();
        }
        let cut: String = self.summary.chars().take(SHORT_SUMMARY_CHARS).collect();
        format!("{cut}...")
    }
}

/// Milliseconds to hours, rounded to hundredths, never below `floor`.
pub fn billable_hours(elapsed_ms: u64, floor: f64) -> f64 {
    let hours = round_hundredths(elapsed_ms as f64 / 3_600_000.0);
    hours.max(floor)
}

/// Client and case labels derived from the recipient's address.
pub fn identify_client(recipient: &str) -> (String, String) {
    let client = match recipient.split_once('@') {
        Some((local, _)) if !local.trim().is_empty() => {
            capitalize(&local.trim().replace(['.', '_'], " "))
        }
        _ => UNKNOWN_CLIENT.to_string(),
    };
    (client, DEFAULT_CASE.to_string())
}

/// Stand-in description when no summary could be produced.
pub fn fallback_summary(fields: &EmailFields) -> String {
    format!(
        "Email communication with {} regarding {}",
        fields.recipient, fields.subject
    )
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(recipient: &str) -> EmailFields {
        EmailFields {
            recipient: recipient.into(),
            subject: "Discovery schedule".into(),
            content: String::new(),
        }
    }

    #[test]
    fn short_sessions_bill_the_minimum() {
        assert_eq!(billable_hours(144_000, 0.1), 0.1);
        assert_eq!(billable_hours(0, 0.1), 0.1);
        assert_eq!(billable_hours(5_400_000, 0.1), 1.5);
        assert_eq!(billable_hours(1_000_000, 0.1), 0.28);
    }

    #[test]
    fn client_comes_from_recipient_local_part() {
        assert_eq!(
            identify_client("jane.doe@acme.com"),
            ("Jane doe".to_string(), DEFAULT_CASE.to_string())
        );
        assert_eq!(identify_client("m_smith@firm.org").0, "M smith");
        assert_eq!(identify_client("Unknown Recipient").0, UNKNOWN_CLIENT);
    }

    #[test]
    fn long_summaries_are_truncated_for_display() {
        let long = "a".repeat(75);
        let entry = BillableEntry::new(fields("x@y.com"), 0.1, long);
        assert_eq!(entry.short_summary(), format!("{}...", "a".repeat(60)));

        let entry = BillableEntry::new(fields("x@y.com"), 0.1, "Short".into());
        assert_eq!(entry.short_summary(), "Short");
    }

    #[test]
    fn fallback_mentions_recipient_and_subject() {
        assert_eq!(
            fallback_summary(&fields("jane@acme.com")),
            "Email communication with jane@acme.com regarding Discovery schedule"
        );
    }

    #[test]
    fn entry_serializes_with_wire_names() {
        let entry = BillableEntry::new(fields("jane@acme.com"), 0.25, "Drafted".into());
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["elapsedHours"], 0.25);
        assert_eq!(json["summaryText"], "Drafted");
        assert_eq!(json["caseLabel"], "General Legal Matter");
        assert_eq!(json["client"], "Jane");
    }
}
