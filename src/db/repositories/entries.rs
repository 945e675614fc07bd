use std::collections::HashSet;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension, Row};

use crate::{
    db::{
        connection::Database,
        helpers::{day_bounds, format_datetime, parse_datetime},
        models::{DailyStats, StoredEntry, SummaryStats},
    },
    utils::round_hundredths,
};

const ENTRY_COLUMNS: &str = "id, recipient, subject, content, hours, summary, client, case_label,
     source, platform_synced, platform_id, created_at";

fn row_to_entry(row: &Row) -> Result<StoredEntry> {
    let created_at: String = row.get("created_at")?;
    Ok(StoredEntry {
        id: row.get("id")?,
        recipient: row.get("recipient")?,
        subject: row.get("subject")?,
        content: row.get("content")?,
        hours: row.get("hours")?,
        summary: row.get("summary")?,
        client: row.get("client")?,
        case_label: row.get("case_label")?,
        source: row.get("source")?,
        platform_synced: row.get("platform_synced")?,
        platform_id: row.get("platform_id")?,
        created_at: parse_datetime(&created_at, "created_at")?,
    })
}

impl Database {
    pub async fn insert_entry(&self, entry: &StoredEntry) -> Result<()> {
        let record = entry.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO billable_entries (id, recipient, subject, content, hours, summary, client,
                     case_label, source, platform_synced, platform_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    record.id,
                    record.recipient,
                    record.subject,
                    record.content,
                    record.hours,
                    record.summary,
                    record.client,
                    record.case_label,
                    record.source,
                    record.platform_synced,
                    record.platform_id,
                    format_datetime(&record.created_at),
                ],
            )
            .context("failed to insert billable entry")?;
            Ok(())
        })
        .await
    }

    /// Newest first.
    pub async fn list_entries(&self, limit: Option<u32>) -> Result<Vec<StoredEntry>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ENTRY_COLUMNS}
                 FROM billable_entries
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?1"
            ))?;
            // SQLite treats a negative limit as no limit.
            let limit = limit.map(i64::from).unwrap_or(-1);
            let mut rows = stmt.query(params![limit])?;
            let mut entries = Vec::new();
            while let Some(row) = rows.next()? {
                entries.push(row_to_entry(row)?);
            }
            Ok(entries)
        })
        .await
    }

    pub async fn get_entry(&self, id: &str) -> Result<Option<StoredEntry>> {
        let id = id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ENTRY_COLUMNS} FROM billable_entries WHERE id = ?1"
            ))?;
            let mut rows = stmt.query(params![id])?;
            match rows.next()? {
                Some(row) => Ok(Some(row_to_entry(row)?)),
                None => Ok(None),
            }
        })
        .await
    }

    /// Returns `false` if no entry had that id.
    pub async fn delete_entry(&self, id: &str) -> Result<bool> {
        let id = id.to_string();
        self.execute(move |conn| {
            let removed = conn
                .execute("DELETE FROM billable_entries WHERE id = ?1", params![id])
                .context("failed to delete billable entry")?;
            Ok(removed > 0)
        })
        .await
    }

    pub async fn mark_entry_synced(&self, id: &str, platform_id: Option<String>) -> Result<()> {
        let id = id.to_string();
        self.execute(move |conn| {
            conn.execute(
                "UPDATE billable_entries
                 SET platform_synced = 1,
                     platform_id = ?1
                 WHERE id = ?2",
                params![platform_id, id],
            )
            .context("failed to mark entry as synced")?;
            Ok(())
        })
        .await
    }

    pub async fn daily_stats(&self, date: NaiveDate, hourly_rate: f64) -> Result<DailyStats> {
        let (start, end) = day_bounds(date);
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT hours, client FROM billable_entries
                 WHERE created_at >= ?1 AND created_at < ?2",
            )?;
            let mut rows = stmt.query(params![start, end])?;

            let mut emails_logged = 0u64;
            let mut hours = 0.0f64;
            let mut clients = HashSet::new();
            while let Some(row) = rows.next()? {
                emails_logged += 1;
                hours += row.get::<_, f64>(0)?;
                clients.insert(row.get::<_, String>(1)?);
            }

            let time_tracked = round_hundredths(hours);
            Ok(DailyStats {
                date,
                emails_logged,
                time_tracked,
                revenue: round_hundredths(time_tracked * hourly_rate),
                unique_clients: clients.len() as u64,
            })
        })
        .await
    }

    pub async fn summary_stats(&self, today: NaiveDate) -> Result<SummaryStats> {
        let (start, end) = day_bounds(today);
        self.execute(move |conn| {
            let total_entries: i64 =
                conn.query_row("SELECT COUNT(*) FROM billable_entries", [], |row| row.get(0))?;
            let (today_entries, today_hours): (i64, Option<f64>) = conn
                .query_row(
                    "SELECT COUNT(*), SUM(hours) FROM billable_entries
                     WHERE created_at >= ?1 AND created_at < ?2",
                    params![start, end],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?
                .unwrap_or((0, None));

            Ok(SummaryStats {
                total_entries: total_entries.max(0) as u64,
                today_entries: today_entries.max(0) as u64,
                total_time_today: round_hundredths(today_hours.unwrap_or(0.0)),
            })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn entry(id: &str, client: &str, hours: f64, day: u32, hour: u32) -> StoredEntry {
        StoredEntry {
            id: id.into(),
            recipient: format!("{}@firm.com", client.to_lowercase()),
            subject: "Motion".into(),
            content: "Body".into(),
            hours,
            summary: "Drafted motion".into(),
            client: client.into(),
            case_label: "General Legal Matter".into(),
            source: "email".into(),
            platform_synced: false,
            platform_id: None,
            created_at: Utc.with_ymd_and_hms(2026, 5, day, hour, 0, 0).unwrap(),
        }
    }

    fn open() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("entries.db")).unwrap();
        (dir, db)
    }

    #[tokio::test]
    async fn lists_newest_first_with_limit() {
        let (_dir, db) = open();
        db.insert_entry(&entry("a", "Jane", 0.1, 1, 9)).await.unwrap();
        db.insert_entry(&entry("b", "Jane", 0.2, 2, 9)).await.unwrap();
        db.insert_entry(&entry("c", "Sam", 0.3, 3, 9)).await.unwrap();

        let all = db.list_entries(None).await.unwrap();
        let ids: Vec<_> = all.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b", "a"]);

        let limited = db.list_entries(Some(2)).await.unwrap();
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[0], entry("c", "Sam", 0.3, 3, 9));
    }

    #[tokio::test]
    async fn get_delete_and_mark_synced() {
        let (_dir, db) = open();
        db.insert_entry(&entry("a", "Jane", 0.1, 1, 9)).await.unwrap();

        db.mark_entry_synced("a", Some("clio-42".into())).await.unwrap();
        let stored = db.get_entry("a").await.unwrap().unwrap();
        assert!(stored.platform_synced);
        assert_eq!(stored.platform_id.as_deref(), Some("clio-42"));

        assert!(db.delete_entry("a").await.unwrap());
        assert!(!db.delete_entry("a").await.unwrap());
        assert!(db.get_entry("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn daily_stats_cover_one_calendar_day() {
        let (_dir, db) = open();
        db.insert_entry(&entry("a", "Jane", 0.1, 4, 8)).await.unwrap();
        db.insert_entry(&entry("b", "Jane", 0.25, 4, 23)).await.unwrap();
        db.insert_entry(&entry("c", "Sam", 0.5, 4, 12)).await.unwrap();
        db.insert_entry(&entry("d", "Sam", 1.0, 5, 0)).await.unwrap();

        let date = NaiveDate::from_ymd_opt(2026, 5, 4).unwrap();
        let stats = db.daily_stats(date, 200.0).await.unwrap();
        assert_eq!(stats.emails_logged, 3);
        assert_eq!(stats.time_tracked, 0.85);
        assert_eq!(stats.revenue, 170.0);
        assert_eq!(stats.unique_clients, 2);

        let summary = db.summary_stats(date).await.unwrap();
        assert_eq!(summary.total_entries, 4);
        assert_eq!(summary.today_entries, 3);
        assert_eq!(summary.total_time_today, 0.85);
    }

    #[tokio::test]
    async fn empty_day_reports_zeroes() {
        let (_dir, db) = open();
        let date = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let stats = db.daily_stats(date, 200.0).await.unwrap();
        assert_eq!(stats.emails_logged, 0);
        assert_eq!(stats.revenue, 0.0);
        assert_eq!(db.summary_stats(date).await.unwrap().total_time_today, 0.0);
    }
}
