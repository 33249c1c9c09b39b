use anyhow::{Context, Result};
use rusqlite::Connection;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration as StdDuration;

pub use warbot_core_types::{ScanCheckpoint, ScanMode, ScanTotals};

static WRITE_RETRY_TOTAL: AtomicU64 = AtomicU64::new(0);
static BUSY_ERROR_TOTAL: AtomicU64 = AtomicU64::new(0);

const BUSY_TIMEOUT: StdDuration = StdDuration::from_secs(5);

mod checkpoints;
mod migrations;
mod optins;
mod sqlite_retry;
mod system_events;

pub struct SqliteStore {
    conn: Connection,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WriteContention {
    pub retries: u64,
    pub busy_errors: u64,
}

/// Process-wide counters for sqlite write contention, surfaced in the
/// periodic heartbeat log.
pub fn write_contention() -> WriteContention {
    WriteContention {
        retries: WRITE_RETRY_TOTAL.load(Ordering::Relaxed),
        busy_errors: BUSY_ERROR_TOTAL.load(Ordering::Relaxed),
    }
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create sqlite parent dir: {}", parent.display())
            })?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open sqlite db: {}", path.display()))?;
        configure_connection(&conn)?;
        Ok(Self { conn })
    }
}

fn configure_connection(conn: &Connection) -> Result<()> {
    conn.busy_timeout(BUSY_TIMEOUT)
        .context("failed to set sqlite busy_timeout")?;
    for (pragma, value) in [
        ("journal_mode", "WAL"),
        ("synchronous", "NORMAL"),
        ("foreign_keys", "ON"),
    ] {
        conn.pragma_update(None, pragma, value)
            .with_context(|| format!("failed to set sqlite pragma {pragma}={value}"))?;
    }
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL
        );",
    )
    .context("failed to create schema_migrations table")?;
    Ok(())
}

/// Clone-able handle over a single sqlite connection. Callers hold the lock
/// only for the duration of one store call, never across awaits.
#[derive(Clone)]
pub struct SharedStore {
    inner: Arc<Mutex<SqliteStore>>,
}

impl SharedStore {
    pub fn new(store: SqliteStore) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SqliteStore> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn load_checkpoint(
        &self,
        mode: ScanMode,
        member_id: i64,
    ) -> Result<Option<ScanCheckpoint>> {
        self.lock().load_checkpoint(mode, member_id)
    }

    pub fn save_checkpoint(
        &self,
        mode: ScanMode,
        member_id: i64,
        checkpoint: &ScanCheckpoint,
    ) -> Result<()> {
        self.lock().save_checkpoint(mode, member_id, checkpoint)
    }

    pub fn add_ping_optin(&self, context_id: i64, user_id: i64) -> Result<bool> {
        self.lock().add_ping_optin(context_id, user_id)
    }

    pub fn remove_ping_optin(&self, context_id: i64, user_id: i64) -> Result<bool> {
        self.lock().remove_ping_optin(context_id, user_id)
    }

    pub fn clear_ping_optins(&self, context_id: i64) -> Result<usize> {
        self.lock().clear_ping_optins(context_id)
    }

    pub fn list_ping_optins(&self, context_id: i64) -> Result<Vec<i64>> {
        self.lock().list_ping_optins(context_id)
    }

    pub fn record_heartbeat(&self, component: &str, status: &str) -> Result<()> {
        self.lock().record_heartbeat(component, status)
    }
}

fn u64_to_sql_i64(field: &str, value: u64) -> Result<i64> {
    i64::try_from(value)
        .with_context(|| format!("{}={} exceeds sqlite INTEGER max (i64::MAX)", field, value))
}
