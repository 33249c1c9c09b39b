use super::SqliteStore;
use anyhow::{Context, Result};
use rusqlite::{params, OptionalExtension};

impl SqliteStore {
    pub fn record_heartbeat(&self, component: &str, status: &str) -> Result<()> {
        self.write_with_retry(|conn| {
            conn.execute(
                "INSERT INTO system_heartbeat(component, ts, status) VALUES (?1, datetime('now'), ?2)",
                params![component, status],
            )
        })
        .context("failed to record heartbeat")?;
        Ok(())
    }

    pub fn latest_heartbeat(&self, component: &str) -> Result<Option<(String, String)>> {
        let row: Option<(String, String)> = self
            .conn
            .query_row(
                "SELECT status, ts FROM system_heartbeat
                 WHERE component = ?1
                 ORDER BY id DESC
                 LIMIT 1",
                params![component],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .context("failed reading latest heartbeat")?;
        Ok(row)
    }
}
