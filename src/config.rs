use std::time::Duration;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Timing knobs for compose-window tracking.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Inactivity before the first warning.
    pub warn_after: Duration,
    /// Inactivity before the second, stronger warning.
    pub strong_warn_after: Duration,
    /// Inactivity before the clock is paused.
    pub pause_after: Duration,
    /// Period of the surface validity check and display refresh.
    pub validity_interval: Duration,
    /// Trailing debounce applied to document-wide keystrokes and clicks.
    pub global_debounce: Duration,
    pub success_display: Duration,
    pub failure_display: Duration,
    /// Floor applied to billed time, in hours.
    pub min_billable_hours: f64,
    /// How often to poll for the webmail shell before detection starts.
    pub ready_poll: Duration,
    /// Longest wait for a summary before the fallback text is used.
    pub summarize_timeout: Duration,
    pub persist_timeout: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            warn_after: Duration::from_secs(30),
            strong_warn_after: Duration::from_secs(45),
            pause_after: Duration::from_secs(60),
            validity_interval: Duration::from_secs(1),
            global_debounce: Duration::from_secs(2),
            success_display: Duration::from_secs(5),
            failure_display: Duration::from_secs(3),
            min_billable_hours: 0.1,
            ready_poll: Duration::from_millis(500),
            summarize_timeout: Duration::from_secs(20),
            persist_timeout: Duration::from_secs(30),
        }
    }
}

impl TrackerConfig {
    /// Divides every UI duration by `factor`; used by `billsync simulate`.
    /// Backend timeouts are left alone.
    pub fn compressed(&self, factor: u32) -> Self {
        let factor = factor.max(1);
        Self {
            warn_after: self.warn_after / factor,
            strong_warn_after: self.strong_warn_after / factor,
            pause_after: self.pause_after / factor,
            validity_interval: self.validity_interval / factor,
            global_debounce: self.global_debounce / factor,
            success_display: self.success_display / factor,
            failure_display: self.failure_display / factor,
            min_billable_hours: self.min_billable_hours,
            ready_poll: self.ready_poll / factor,
            summarize_timeout: self.summarize_timeout,
            persist_timeout: self.persist_timeout,
        }
    }
}

/// Which calendar date a time entry is booked under on the billing platform.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", tag = "kind", content = "date")]
pub enum EntryDatePolicy {
    /// The local date the entry was created.
    EntryDate,
    Fixed(NaiveDate),
}

impl Default for EntryDatePolicy {
    fn default() -> Self {
        EntryDatePolicy::EntryDate
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct BillingConfig {
    pub hourly_rate: f64,
    pub currency: String,
    pub entry_date: EntryDatePolicy,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            hourly_rate: 200.0,
            currency: "USD".into(),
            entry_date: EntryDatePolicy::EntryDate,
        }
    }
}
