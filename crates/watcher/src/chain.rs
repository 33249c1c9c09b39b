use warbot_core_types::ChainStatus;

/// Arm/fire/re-arm logic for one watched context. Lives inside the watcher
/// task; the rest of the world sees it only through the snapshot.
pub(crate) struct ChainMachine {
    armed: bool,
    last_chain_id: Option<i64>,
}

impl ChainMachine {
    pub(crate) fn new() -> Self {
        Self {
            armed: true,
            last_chain_id: None,
        }
    }

    /// Folds one poll observation in. Returns true when an alert must fire
    /// for it; the machine disarms before reporting so a failed dispatch
    /// can never double-fire.
    pub(crate) fn observe(&mut self, status: &ChainStatus, alert_threshold: i64) -> bool {
        if let Some(last) = self.last_chain_id {
            // A different chain id is a fresh danger window.
            if last != status.id {
                self.armed = true;
            }
        }
        self.last_chain_id = Some(status.id);

        if self.armed && status.timeout <= alert_threshold {
            self.armed = false;
            return true;
        }
        if !self.armed && status.timeout > alert_threshold {
            self.armed = true;
        }
        false
    }

    pub(crate) fn armed(&self) -> bool {
        self.armed
    }
}
