use anyhow::{bail, Context, Result};
use rusqlite::Connection;

/// Schema scripts in order; entry `n` upgrades `user_version` from `n` to `n + 1`.
const MIGRATIONS: &[(&str, &str)] = &[("schema_v1.sql", include_str!("schemas/schema_v1.sql"))];

const CURRENT_SCHEMA_VERSION: i32 = MIGRATIONS.len() as i32;

fn schema_version(conn: &Connection) -> Result<i32> {
    conn.pragma_query_value(None, "user_version", |row| row.get(0))
        .context("failed to read user_version pragma")
}

/// Brings the schema up to `CURRENT_SCHEMA_VERSION` in one transaction.
pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    let found = schema_version(conn)?;
    if found > CURRENT_SCHEMA_VERSION {
        bail!(
            "entry database is at schema {found}, this build only knows up to {CURRENT_SCHEMA_VERSION}"
        );
    }
    if found == CURRENT_SCHEMA_VERSION {
        return Ok(());
    }

    let tx = conn
        .transaction()
        .context("failed to open migration transaction")?;
    for (name, script) in &MIGRATIONS[found.max(0) as usize..] {
        tx.execute_batch(script)
            .with_context(|| format!("failed to apply {name}"))?;
    }
    tx.pragma_update(None, "user_version", CURRENT_SCHEMA_VERSION)
        .context("failed to update user_version pragma")?;
    tx.commit().context("failed to commit migrations")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrates_fresh_database_once() {
        let mut conn = Connection::open_in_memory().unwrap();
        run_migrations(&mut conn).unwrap();
        run_migrations(&mut conn).unwrap();

        let version: i32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, CURRENT_SCHEMA_VERSION);

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'billable_entries'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 1);
    }

    #[test]
    fn refuses_newer_schema() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "user_version", CURRENT_SCHEMA_VERSION + 1)
            .unwrap();
        assert!(run_migrations(&mut conn).is_err());
    }
}
