use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::Local;
use serde::{Deserialize, Serialize};

use crate::{
    config::{BillingConfig, EntryDatePolicy},
    db::StoredEntry,
    utils::round_hundredths,
};

pub const CLIO_BASE_URL: &str = "https://app.clio.com/api/v4";

/// What the billing platform assigned to a pushed entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlatformReceipt {
    pub id: Option<String>,
}

/// Pushes saved entries to an external practice-management platform.
#[async_trait]
pub trait PlatformSync: Send + Sync {
    async fn push(&self, entry: &StoredEntry, token: &str) -> Result<PlatformReceipt>;
}

/// A time-entry activity in the platform's wire format.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ActivityPayload {
    #[serde(rename = "type")]
    pub kind: String,
    pub note: String,
    /// Seconds.
    pub quantity: u64,
    pub date: String,
    pub non_billable: bool,
    pub no_charge: bool,
    pub tax_setting: String,
    pub reference: String,
    pub price: f64,
    pub currency: String,
}

impl ActivityPayload {
    pub fn from_entry(entry: &StoredEntry, billing: &BillingConfig) -> Self {
        let date = match billing.entry_date {
            EntryDatePolicy::EntryDate => entry.created_at.with_timezone(&Local).date_naive(),
            EntryDatePolicy::Fixed(date) => date,
        };
        Self {
            kind: "TimeEntry".into(),
            note: entry.summary.clone(),
            quantity: (entry.hours * 3600.0).round().max(0.0) as u64,
            date: date.format("%Y-%m-%d").to_string(),
            non_billable: false,
            no_charge: false,
            tax_setting: "no_tax".into(),
            reference: entry.id.clone(),
            price: round_hundredths(billing.hourly_rate * entry.hours),
            currency: billing.currency.clone(),
        }
    }
}

#[derive(Serialize)]
struct ActivityEnvelope<'a> {
    data: &'a ActivityPayload,
}

#[derive(Deserialize)]
struct CreatedEnvelope {
    data: CreatedActivity,
}

#[derive(Deserialize)]
struct CreatedActivity {
    id: serde_json::Value,
}

/// Clio activities API.
pub struct ClioSync {
    client: reqwest::Client,
    base_url: String,
    billing: BillingConfig,
}

impl ClioSync {
    pub fn new(base_url: Option<String>, billing: BillingConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.unwrap_or_else(|| CLIO_BASE_URL.to_string()),
            billing,
        }
    }
}

#[async_trait]
impl PlatformSync for ClioSync {
    async fn push(&self, entry: &StoredEntry, token: &str) -> Result<PlatformReceipt> {
        let url = format!("{}/activities.json", self.base_url.trim_end_matches('/'));
        let payload = ActivityPayload::from_entry(entry, &self.billing);

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {token}"))
            .header("Accept", "application/json")
            .json(&ActivityEnvelope { data: &payload })
            .send()
            .await
            .context("Failed to reach Clio")?;

        match resp.status().as_u16() {
            201 => {
                let created: CreatedEnvelope = resp
                    .json()
                    .await
                    .context("Failed to parse Clio response")?;
                let id = match created.data.id {
                    serde_json::Value::String(id) => id,
                    other => other.to_string(),
                };
                Ok(PlatformReceipt { id: Some(id) })
            }
            401 => bail!("Clio authentication expired, please re-authenticate"),
            400 => {
                let detail = resp.text().await.unwrap_or_default();
                bail!("Clio API validation error: {detail}")
            }
            422 => {
                let detail = resp.text().await.unwrap_or_default();
                bail!("Clio API unprocessable entity: {detail}")
            }
            status => bail!("Clio API returned HTTP {status}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};

    use super::*;

    fn stored(hours: f64) -> StoredEntry {
        StoredEntry {
            id: "entry-7".into(),
            recipient: "jane@acme.com".into(),
            subject: "Lease".into(),
            content: String::new(),
            hours,
            summary: "Reviewed lease amendments".into(),
            client: "Jane".into(),
            case_label: "General Legal Matter".into(),
            source: "email".into(),
            platform_synced: false,
            platform_id: None,
            created_at: Utc.with_ymd_and_hms(2026, 2, 10, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn payload_converts_hours_and_prices_the_entry() {
        let billing = BillingConfig {
            hourly_rate: 300.0,
            currency: "EUR".into(),
            entry_date: EntryDatePolicy::Fixed(NaiveDate::from_ymd_opt(2026, 2, 11).unwrap()),
        };
        let payload = ActivityPayload::from_entry(&stored(0.25), &billing);
        assert_eq!(payload.quantity, 900);
        assert_eq!(payload.price, 75.0);
        assert_eq!(payload.date, "2026-02-11");
        assert_eq!(payload.currency, "EUR");
        assert_eq!(payload.reference, "entry-7");

        let json = serde_json::to_value(&ActivityEnvelope { data: &payload }).unwrap();
        assert_eq!(json["data"]["type"], "TimeEntry");
        assert_eq!(json["data"]["tax_setting"], "no_tax");
        assert_eq!(json["data"]["non_billable"], false);
    }

    #[test]
    fn entry_date_policy_uses_creation_day() {
        let payload = ActivityPayload::from_entry(&stored(0.1), &BillingConfig::default());
        let expected = stored(0.1)
            .created_at
            .with_timezone(&Local)
            .date_naive()
            .format("%Y-%m-%d")
            .to_string();
        assert_eq!(payload.date, expected);
        assert_eq!(payload.quantity, 360);
        assert_eq!(payload.price, 20.0);
    }

    #[test]
    fn created_id_accepts_numbers() {
        let created: CreatedEnvelope =
            serde_json::from_str(r#"{"data":{"id":12345,"type":"TimeEntry"}}"#).unwrap();
        assert_eq!(created.data.id.to_string(), "12345");
    }
}
