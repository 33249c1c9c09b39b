use super::SqliteStore;
use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::{Path, PathBuf};

impl SqliteStore {
    /// Applies every pending `.sql` script in name order inside a single
    /// transaction. Returns how many scripts were newly applied.
    pub fn run_migrations(&mut self, migrations_dir: &Path) -> Result<usize> {
        let scripts = collect_sql_scripts(migrations_dir)?;

        let tx = self
            .conn
            .transaction()
            .context("failed to open sqlite migration transaction")?;
        let mut applied = 0usize;
        for (version, path) in &scripts {
            if migration_recorded(&tx, version)? {
                continue;
            }
            let sql = fs::read_to_string(path)
                .with_context(|| format!("failed reading migration file {}", path.display()))?;
            tx.execute_batch(&sql)
                .with_context(|| format!("failed applying migration {version}"))?;
            tx.execute(
                "INSERT INTO schema_migrations(version, applied_at) VALUES (?1, datetime('now'))",
                params![version],
            )
            .with_context(|| format!("failed recording migration {version}"))?;
            applied += 1;
            tracing::info!(version = %version, "migration applied");
        }
        tx.commit().context("failed to commit migrations")?;
        Ok(applied)
    }
}

fn collect_sql_scripts(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    if !dir.exists() {
        return Err(anyhow!("migrations directory not found: {}", dir.display()));
    }
    let entries = fs::read_dir(dir)
        .with_context(|| format!("failed to read migrations dir {}", dir.display()))?;
    let mut scripts = Vec::new();
    for entry in entries {
        let path = entry
            .with_context(|| format!("failed to read entry in {}", dir.display()))?
            .path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("sql") {
            continue;
        }
        let version = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_owned)
            .ok_or_else(|| anyhow!("invalid migration filename: {}", path.display()))?;
        scripts.push((version, path));
    }
    scripts.sort();
    Ok(scripts)
}

fn migration_recorded(conn: &Connection, version: &str) -> Result<bool> {
    let row: Option<String> = conn
        .query_row(
            "SELECT version FROM schema_migrations WHERE version = ?1",
            params![version],
            |row| row.get(0),
        )
        .optional()
        .with_context(|| format!("failed checking migration {version}"))?;
    Ok(row.is_some())
}
