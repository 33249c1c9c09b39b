use anyhow::Result;

use warbot_core_types::{ScanCheckpoint, ScanMode};
use warbot_storage::SharedStore;

/// Persistence the scan engine resumes from. Calls are short and synchronous;
/// implementations must not block for longer than a single sqlite statement.
pub trait CheckpointStore: Send + Sync {
    fn load(&self, mode: ScanMode, member_id: i64) -> Result<Option<ScanCheckpoint>>;
    fn save(&self, mode: ScanMode, member_id: i64, checkpoint: &ScanCheckpoint) -> Result<()>;
}

impl CheckpointStore for SharedStore {
    fn load(&self, mode: ScanMode, member_id: i64) -> Result<Option<ScanCheckpoint>> {
        self.load_checkpoint(mode, member_id)
    }

    fn save(&self, mode: ScanMode, member_id: i64, checkpoint: &ScanCheckpoint) -> Result<()> {
        self.save_checkpoint(mode, member_id, checkpoint)
    }
}
