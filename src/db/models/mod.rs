mod entry;

pub use entry::{DailyStats, StoredEntry, SummaryStats};
