use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use taskdeck_shared::TaskId;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::trace;

/// One FIFO slot per task id. Holding an [`ItemTurn`] means no other
/// mutation of that item is between its local apply and its
/// reconciliation.
#[derive(Debug)]
pub struct ItemQueues {
    enabled: bool,
    slots: Mutex<HashMap<TaskId, Arc<AsyncMutex<()>>>>,
}

/// Released on drop.
#[derive(Debug)]
pub struct ItemTurn {
    _guard: Option<OwnedMutexGuard<()>>,
}

impl ItemQueues {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Waits until every earlier turn for `id` has been released.
    pub async fn turn(&self, id: TaskId) -> ItemTurn {
        if !self.enabled {
            return ItemTurn { _guard: None };
        }

        let slot = {
            let mut slots = self.slots.lock();
            slots.retain(|_, slot| Arc::strong_count(slot) > 1);
            slots.entry(id).or_default().clone()
        };
        trace!(id, "waiting for item turn");
        ItemTurn {
            _guard: Some(slot.lock_owned().await),
        }
    }

    /// Ids with a turn held or awaited.
    pub fn busy_items(&self) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|slot| Arc::strong_count(slot) > 1)
            .count()
    }
}
