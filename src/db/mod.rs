//! SQLite persistence for billable entries.

mod connection;
mod helpers;
mod migrations;
pub mod models;
mod repositories;

pub use connection::Database;
pub use models::{DailyStats, StoredEntry, SummaryStats};
