use super::{SqliteStore, BUSY_ERROR_TOTAL, WRITE_RETRY_TOTAL};
use rusqlite::{Connection, ErrorCode};
use std::sync::atomic::Ordering;
use std::time::Duration as StdDuration;

/// Backoff schedule for writes that hit sqlite contention. One initial
/// attempt plus one retry per slot, so four attempts in the worst case.
const WRITE_BACKOFF_MS: [u64; 3] = [100, 300, 700];

const CONTENTION_MESSAGES: [&str; 3] = [
    "database is locked",
    "database is busy",
    "database table is locked",
];

impl SqliteStore {
    pub(crate) fn write_with_retry<F>(&self, mut write: F) -> rusqlite::Result<usize>
    where
        F: FnMut(&Connection) -> rusqlite::Result<usize>,
    {
        let mut backoff = WRITE_BACKOFF_MS.iter();
        loop {
            let error = match write(&self.conn) {
                Ok(changed) => return Ok(changed),
                Err(error) => error,
            };
            if !is_contention(&error) {
                return Err(error);
            }
            BUSY_ERROR_TOTAL.fetch_add(1, Ordering::Relaxed);
            let Some(delay_ms) = backoff.next() else {
                return Err(error);
            };
            WRITE_RETRY_TOTAL.fetch_add(1, Ordering::Relaxed);
            std::thread::sleep(StdDuration::from_millis(*delay_ms));
        }
    }
}

fn message_reports_contention(message: &str) -> bool {
    let lowered = message.to_ascii_lowercase();
    CONTENTION_MESSAGES
        .iter()
        .any(|needle| lowered.contains(needle))
}

fn is_contention(error: &rusqlite::Error) -> bool {
    if let rusqlite::Error::SqliteFailure(code, message) = error {
        if matches!(
            code.code,
            ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
        ) {
            return true;
        }
        return message
            .as_deref()
            .map(message_reports_contention)
            .unwrap_or(false);
    }
    message_reports_contention(&error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_result_code_counts_as_contention() {
        let busy = rusqlite::Error::SqliteFailure(rusqlite::ffi::Error::new(5), None);
        assert!(is_contention(&busy));
    }

    #[test]
    fn lock_message_counts_even_under_a_generic_code() {
        let generic = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(1),
            Some("database table is locked: war_scan_checkpoints".to_string()),
        );
        assert!(is_contention(&generic));
    }

    #[test]
    fn constraint_failures_are_not_retried() {
        let constraint = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(19),
            Some("UNIQUE constraint failed: chain_ping_optins.user_id".to_string()),
        );
        assert!(!is_contention(&constraint));
    }
}
