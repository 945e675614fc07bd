use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::submission::BillableEntry;

/// A billable entry as kept in the local database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredEntry {
    pub id: String,
    pub recipient: String,
    pub subject: String,
    pub content: String,
    pub hours: f64,
    pub summary: String,
    pub client: String,
    pub case_label: String,
    pub source: String,
    pub platform_synced: bool,
    pub platform_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl StoredEntry {
    pub fn from_entry(id: String, entry: &BillableEntry) -> Self {
        Self {
            id,
            recipient: entry.recipient.clone(),
            subject: entry.subject.clone(),
            content: entry.content.clone(),
            hours: entry.hours,
            summary: entry.summary.clone(),
            client: entry.client.clone(),
            case_label: entry.case_label.clone(),
            source: "email".into(),
            platform_synced: false,
            platform_id: None,
            created_at: entry.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyStats {
    pub date: NaiveDate,
    pub emails_logged: u64,
    /// Hours, rounded to hundredths.
    pub time_tracked: f64,
    pub revenue: f64,
    pub unique_clients: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryStats {
    pub total_entries: u64,
    pub today_entries: u64,
    pub total_time_today: f64,
}
