use super::{u64_to_sql_i64, SqliteStore};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use warbot_core_types::{ScanCheckpoint, ScanMode, ScanTotals};

impl SqliteStore {
    pub fn load_checkpoint(
        &self,
        mode: ScanMode,
        member_id: i64,
    ) -> Result<Option<ScanCheckpoint>> {
        let row: Option<(i64, i64, i64, i64, i64, i64, f64, i64, f64, String)> = self
            .conn
            .query_row(
                "SELECT war_start, last_ts, last_seq, total, in_war, out_war,
                        fair_fight_sum, fair_fight_count, respect_sum, updated_at
                 FROM war_scan_checkpoints
                 WHERE mode = ?1 AND member_id = ?2",
                params![mode.as_str(), member_id],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                        row.get(7)?,
                        row.get(8)?,
                        row.get(9)?,
                    ))
                },
            )
            .optional()
            .context("failed loading scan checkpoint")?;

        let Some((
            war_start,
            last_ts,
            last_seq,
            total,
            in_war,
            out_war,
            fair_fight_sum,
            fair_fight_count,
            respect_sum,
            updated_raw,
        )) = row
        else {
            return Ok(None);
        };

        let updated_at = DateTime::parse_from_rfc3339(&updated_raw)
            .map(|dt| dt.with_timezone(&Utc))
            .with_context(|| {
                format!("invalid war_scan_checkpoints.updated_at rfc3339 value: {updated_raw}")
            })?;

        Ok(Some(ScanCheckpoint {
            war_start,
            last_ts,
            last_seq,
            totals: ScanTotals {
                total: total.max(0) as u64,
                in_war: in_war.max(0) as u64,
                out_war: out_war.max(0) as u64,
                fair_fight_sum,
                fair_fight_count: fair_fight_count.max(0) as u64,
                respect_sum,
            },
            updated_at,
        }))
    }

    pub fn save_checkpoint(
        &self,
        mode: ScanMode,
        member_id: i64,
        checkpoint: &ScanCheckpoint,
    ) -> Result<()> {
        let totals = &checkpoint.totals;
        let total = u64_to_sql_i64("war_scan_checkpoints.total", totals.total)?;
        let in_war = u64_to_sql_i64("war_scan_checkpoints.in_war", totals.in_war)?;
        let out_war = u64_to_sql_i64("war_scan_checkpoints.out_war", totals.out_war)?;
        let fair_fight_count = u64_to_sql_i64(
            "war_scan_checkpoints.fair_fight_count",
            totals.fair_fight_count,
        )?;
        self.write_with_retry(|conn| {
            conn.execute(
                "INSERT INTO war_scan_checkpoints(
                     mode, member_id, war_start, last_ts, last_seq,
                     total, in_war, out_war, fair_fight_sum, fair_fight_count,
                     respect_sum, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                 ON CONFLICT(mode, member_id) DO UPDATE SET
                     war_start = excluded.war_start,
                     last_ts = excluded.last_ts,
                     last_seq = excluded.last_seq,
                     total = excluded.total,
                     in_war = excluded.in_war,
                     out_war = excluded.out_war,
                     fair_fight_sum = excluded.fair_fight_sum,
                     fair_fight_count = excluded.fair_fight_count,
                     respect_sum = excluded.respect_sum,
                     updated_at = excluded.updated_at",
                params![
                    mode.as_str(),
                    member_id,
                    checkpoint.war_start,
                    checkpoint.last_ts,
                    checkpoint.last_seq,
                    total,
                    in_war,
                    out_war,
                    totals.fair_fight_sum,
                    fair_fight_count,
                    totals.respect_sum,
                    checkpoint.updated_at.to_rfc3339(),
                ],
            )
        })
        .context("failed saving scan checkpoint")?;
        Ok(())
    }
}
