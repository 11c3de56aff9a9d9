use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use tracing::warn;

use crate::state::SessionSnapshot;

static SNAPSHOT_LOCK_POISON_WARNED: AtomicBool = AtomicBool::new(false);

fn warn_snapshot_lock_poison_once(operation: &'static str) {
    if SNAPSHOT_LOCK_POISON_WARNED
        .compare_exchange(false, true, Ordering::Relaxed, Ordering::Relaxed)
        .is_ok()
    {
        warn!(operation, "snapshot lock poisoned; recovered inner value");
    }
}

/// Read side of the session state for display code. Only the controller publishes.
#[derive(Clone, Debug)]
pub struct SnapshotHandle {
    snapshot: Arc<RwLock<SessionSnapshot>>,
}

impl Default for SnapshotHandle {
    fn default() -> Self {
        Self {
            snapshot: Arc::new(RwLock::new(SessionSnapshot::default())),
        }
    }
}

impl SnapshotHandle {
    pub fn snapshot(&self) -> SessionSnapshot {
        match self.snapshot.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => {
                warn_snapshot_lock_poison_once("read");
                poisoned.into_inner().clone()
            }
        }
    }

    pub(crate) fn publish(&self, snapshot: SessionSnapshot) {
        match self.snapshot.write() {
            Ok(mut guard) => *guard = snapshot,
            Err(poisoned) => {
                warn_snapshot_lock_poison_once("write");
                let mut guard = poisoned.into_inner();
                *guard = snapshot;
            }
        }
    }
}
