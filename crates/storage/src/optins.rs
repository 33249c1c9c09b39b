use super::SqliteStore;
use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::params;

impl SqliteStore {
    pub fn add_ping_optin(&self, context_id: i64, user_id: i64) -> Result<bool> {
        let created_at = Utc::now().to_rfc3339();
        let changed = self
            .write_with_retry(|conn| {
                conn.execute(
                    "INSERT OR IGNORE INTO chain_ping_optins(context_id, user_id, created_at)
                     VALUES (?1, ?2, ?3)",
                    params![context_id, user_id, created_at],
                )
            })
            .context("failed adding chain ping opt-in")?;
        Ok(changed > 0)
    }

    pub fn remove_ping_optin(&self, context_id: i64, user_id: i64) -> Result<bool> {
        let changed = self
            .write_with_retry(|conn| {
                conn.execute(
                    "DELETE FROM chain_ping_optins WHERE context_id = ?1 AND user_id = ?2",
                    params![context_id, user_id],
                )
            })
            .context("failed removing chain ping opt-in")?;
        Ok(changed > 0)
    }

    pub fn clear_ping_optins(&self, context_id: i64) -> Result<usize> {
        let changed = self
            .write_with_retry(|conn| {
                conn.execute(
                    "DELETE FROM chain_ping_optins WHERE context_id = ?1",
                    params![context_id],
                )
            })
            .context("failed clearing chain ping opt-ins")?;
        Ok(changed)
    }

    pub fn list_ping_optins(&self, context_id: i64) -> Result<Vec<i64>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT user_id FROM chain_ping_optins
                 WHERE context_id = ?1
                 ORDER BY user_id ASC",
            )
            .context("failed to prepare chain ping opt-in query")?;
        let users = stmt
            .query_map(params![context_id], |row| row.get(0))
            .context("failed querying chain ping opt-ins")?
            .collect::<rusqlite::Result<Vec<i64>>>()
            .context("failed reading chain ping opt-in rows")?;
        Ok(users)
    }
}
