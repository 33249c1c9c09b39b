use anyhow::Result;

use warbot_storage::SharedStore;

/// Chain-session ping opt-ins. Rows are scoped to one context and cleared
/// in bulk when that context's watcher stops.
pub trait OptInStore: Send + Sync {
    fn add(&self, context_id: i64, user_id: i64) -> Result<bool>;
    fn remove(&self, context_id: i64, user_id: i64) -> Result<bool>;
    fn clear_all(&self, context_id: i64) -> Result<usize>;
    fn list_active(&self, context_id: i64) -> Result<Vec<i64>>;
}

impl OptInStore for SharedStore {
    fn add(&self, context_id: i64, user_id: i64) -> Result<bool> {
        self.add_ping_optin(context_id, user_id)
    }

    fn remove(&self, context_id: i64, user_id: i64) -> Result<bool> {
        self.remove_ping_optin(context_id, user_id)
    }

    fn clear_all(&self, context_id: i64) -> Result<usize> {
        self.clear_ping_optins(context_id)
    }

    fn list_active(&self, context_id: i64) -> Result<Vec<i64>> {
        self.list_ping_optins(context_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::tempdir;
    use warbot_storage::SqliteStore;

    #[test]
    fn shared_store_satisfies_the_contract() -> Result<()> {
        let temp = tempdir()?;
        let migration_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../migrations");
        let mut store = SqliteStore::open(&temp.path().join("optins.db"))?;
        store.run_migrations(&migration_dir)?;
        let store: &dyn OptInStore = &SharedStore::new(store);

        assert!(store.add(7, 100)?);
        assert!(store.add(7, 101)?);
        assert!(store.remove(7, 100)?);
        assert_eq!(store.list_active(7)?, vec![101]);
        assert_eq!(store.clear_all(7)?, 1);
        assert!(store.list_active(7)?.is_empty());
        Ok(())
    }
}
