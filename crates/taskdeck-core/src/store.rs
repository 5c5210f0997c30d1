use taskdeck_shared::{TaskId, TaskItem};
use tracing::{debug, warn};

/// Ordered in-memory collection of task items. Ids are unique.
#[derive(Debug, Clone, Default)]
pub struct TaskStore {
    items: Vec<TaskItem>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot copy of the current items, in order.
    pub fn list(&self) -> Vec<TaskItem> {
        self.items.clone()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaskItem> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: TaskId) -> Option<&TaskItem> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.position(id).is_some()
    }

    /// Swaps in a whole new collection. A repeated id keeps its first
    /// position and the later entry's content.
    pub fn replace_all(&mut self, items: Vec<TaskItem>) {
        let incoming = items.len();
        self.items = Vec::with_capacity(incoming);
        for item in items {
            self.upsert(item);
        }
        if self.items.len() != incoming {
            warn!(
                incoming,
                kept = self.items.len(),
                "duplicate task ids collapsed while replacing store"
            );
        }
        debug!(count = self.items.len(), "store replaced");
    }

    /// Inserts at the end when the id is new, otherwise replaces the entry
    /// in place. Returns true on insert.
    pub fn upsert(&mut self, item: TaskItem) -> bool {
        match self.position(item.id) {
            Some(idx) => {
                self.items[idx] = item;
                false
            }
            None => {
                self.items.push(item);
                true
            }
        }
    }

    /// Removes the entry if present.
    pub fn remove(&mut self, id: TaskId) -> Option<TaskItem> {
        let idx = self.position(id)?;
        Some(self.items.remove(idx))
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Replaces the entry under `old_id` with `item` (which may carry a
    /// different id) without moving it. Any other entry already holding the
    /// new id is dropped. Falls back to an upsert when `old_id` is absent.
    pub fn rekey(&mut self, old_id: TaskId, item: TaskItem) {
        let Some(idx) = self.position(old_id) else {
            self.upsert(item);
            return;
        };

        let new_id = item.id;
        self.items[idx] = item;
        if new_id != old_id
            && let Some(dup) = self
                .items
                .iter()
                .enumerate()
                .position(|(i, other)| i != idx && other.id == new_id)
        {
            debug!(id = new_id, "dropping stale entry superseded by rekey");
            self.items.remove(dup);
        }
    }

    fn position(&self, id: TaskId) -> Option<usize> {
        self.items.iter().position(|item| item.id == id)
    }
}
