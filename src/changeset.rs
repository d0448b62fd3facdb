/// Changeset - change notification for base tables.
///
/// Base tables notify registered [`ChangeListener`]s of every row added or
/// removed. Views never mutate rows; registering a listener on a view
/// registers it on every base table at the root of that view.
///
/// # Usage Pattern
///
/// 1. Register a listener on any table (base or derived)
/// 2. The storage layer inserts/removes rows through the owning base table
/// 3. The base table pushes a `TableChange` to each listener
/// 4. Higher layers (e.g. materialized view refresh) react to the changes
use crate::rowtable::{RowId, TableId};
use parking_lot::Mutex;
use std::sync::Arc;

/// Represents a single structural change to a base table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableChange {
    /// A row was added at the given slot
    RowAdded { table: TableId, row: RowId },

    /// The row at the given slot was removed
    RowRemoved { table: TableId, row: RowId },
}

impl TableChange {
    /// Returns the row affected by this change
    pub fn row(&self) -> RowId {
        match self {
            TableChange::RowAdded { row, .. } => *row,
            TableChange::RowRemoved { row, .. } => *row,
        }
    }

    /// Returns the base table that changed
    pub fn table(&self) -> TableId {
        match self {
            TableChange::RowAdded { table, .. } => *table,
            TableChange::RowRemoved { table, .. } => *table,
        }
    }
}

/// Receiver of base-table change notifications.
pub trait ChangeListener: Send + Sync {
    fn table_changed(&self, change: &TableChange);
}

/// Listener identity. Two handles are the same listener if they point at the
/// same allocation.
pub(crate) fn same_listener(a: &Arc<dyn ChangeListener>, b: &Arc<dyn ChangeListener>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

#[derive(Debug, Default)]
struct ChangesetInner {
    changes: Vec<TableChange>,
    generation: u64,
}

/// A listener that records every change it receives.
#[derive(Debug, Default)]
pub struct Changeset {
    inner: Mutex<ChangesetInner>,
}

impl Changeset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all changes since the last clear
    pub fn changes(&self) -> Vec<TableChange> {
        self.inner.lock().changes.clone()
    }

    /// Returns the current generation number
    pub fn generation(&self) -> u64 {
        self.inner.lock().generation
    }

    /// Clear all changes and increment generation
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.changes.clear();
        inner.generation += 1;
    }

    /// Drain changes, returning ownership and clearing the buffer
    pub fn drain(&self) -> Vec<TableChange> {
        let mut inner = self.inner.lock();
        inner.generation += 1;
        std::mem::take(&mut inner.changes)
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().changes.len()
    }
}

impl ChangeListener for Changeset {
    fn table_changed(&self, change: &TableChange) {
        self.inner.lock().changes.push(*change);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_changeset_basic() {
        let cs = Changeset::new();
        assert!(cs.is_empty());
        assert_eq!(cs.generation(), 0);

        let table = TableId::next();
        cs.table_changed(&TableChange::RowAdded { table, row: 3 });
        cs.table_changed(&TableChange::RowRemoved { table, row: 1 });

        assert_eq!(cs.len(), 2);
        assert_eq!(cs.changes()[1].row(), 1);
        assert_eq!(cs.changes()[0].table(), table);

        let drained = cs.drain();
        assert_eq!(drained.len(), 2);
        assert!(cs.is_empty());
        assert_eq!(cs.generation(), 1);

        cs.clear();
        assert_eq!(cs.generation(), 2);
    }

    #[test]
    fn test_listener_identity() {
        let a: Arc<dyn ChangeListener> = Arc::new(Changeset::new());
        let b: Arc<dyn ChangeListener> = Arc::new(Changeset::new());
        assert!(same_listener(&a, &a.clone()));
        assert!(!same_listener(&a, &b));
    }
}
