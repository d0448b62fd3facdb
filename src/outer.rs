/// Outer-join views.
///
/// An [`OuterView`] takes the result of an inner join and prepends synthetic
/// rows for the outer side's unmatched rows. For the synthetic rows, every
/// column owned by a table that has no matching row reads as NULL.
///
/// Logical rows `[0, outer_row_count)` are the synthetic rows; rows from
/// `outer_row_count` upward are the inner join's rows, offset.
use crate::changeset::ChangeListener;
use crate::column::{DataValue, TableField};
use crate::error::{Result, TableError};
use crate::name::{ColumnName, TableName};
use crate::rowtable::{flatten_to_raw, RowEnumeration, RowId, RowTable, TableId};
use crate::scheme::SelectableScheme;
use crate::view::VirtualView;
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;

pub struct OuterView {
    id: TableId,
    inner: VirtualView,
    outer_rows: Vec<Option<Vec<RowId>>>,
    outer_row_count: usize,
    column_scheme: Mutex<Vec<Option<Arc<SelectableScheme>>>>,
    root_locks: AtomicUsize,
}

impl OuterView {
    /// Builds an outer view over `inner`, flattened to its raw tables.
    pub fn new(inner: &Arc<dyn RowTable>) -> Result<Self> {
        let raw = flatten_to_raw(inner)?;
        let (tables, rows): (Vec<_>, Vec<_>) = raw.into_segments().into_iter().map(|s| (s.table, s.rows)).unzip();
        let inner = VirtualView::new(tables, rows)?;
        let columns = inner.column_count();

        Ok(OuterView {
            id: TableId::next(),
            outer_rows: vec![None; inner.reference_tables().len()],
            outer_row_count: 0,
            column_scheme: Mutex::new(vec![None; columns]),
            root_locks: AtomicUsize::new(0),
            inner,
        })
    }

    /// Merges the unmatched rows of `outside` in as synthetic outer rows.
    ///
    /// Each raw table of this view that also appears in `outside` takes its
    /// row list from there; every other raw table is NULL for the outer rows.
    /// Nothing changes if the merged row lists disagree in length.
    pub fn merge_in(&mut self, outside: &Arc<dyn RowTable>) -> Result<()> {
        let raw = flatten_to_raw(outside)?;
        let outer_row_count = raw.segments().first().map_or(0, |s| s.rows.len());

        let mut outer_rows = Vec::with_capacity(self.outer_rows.len());
        for table in self.inner.reference_tables() {
            match raw.position_of(table.id()) {
                None => outer_rows.push(None),
                Some(index) => {
                    let rows = &raw.segments()[index].rows;
                    if rows.len() != outer_row_count {
                        return Err(TableError::MergeRowCountMismatch {
                            expected: outer_row_count,
                            actual: rows.len(),
                        });
                    }
                    outer_rows.push(Some(rows.clone()));
                }
            }
        }

        log::debug!(
            "merged {} outer rows into outer view over {} raw tables",
            outer_row_count,
            outer_rows.len()
        );
        self.outer_rows = outer_rows;
        self.outer_row_count = outer_row_count;
        self.column_scheme.lock().iter_mut().for_each(|s| *s = None);
        Ok(())
    }

    pub fn outer_row_count(&self) -> usize {
        self.outer_row_count
    }

    /// Two outer views are only the same root shape if they are the same view.
    pub fn type_equals(&self, other: &dyn RowTable) -> bool {
        self.id == other.id()
    }

    /// The raw table and row backing `(column, row)`, `None` for a NULL slot.
    fn source(&self, column: usize, row: RowId) -> Result<Option<(&Arc<dyn RowTable>, usize, RowId)>> {
        let (t, c) = self.inner.locate(column)?;
        let table = &self.inner.reference_tables()[t];
        if row >= self.outer_row_count {
            let inner_row = self.inner.parent_row(t, row - self.outer_row_count)?;
            return Ok(Some((table, c, inner_row)));
        }
        match &self.outer_rows[t] {
            None => Ok(None),
            Some(rows) => Ok(Some((table, c, rows[row]))),
        }
    }
}

impl RowTable for OuterView {
    fn id(&self) -> TableId {
        self.id
    }

    fn name(&self) -> TableName {
        self.inner.name()
    }

    fn column_count(&self) -> usize {
        self.inner.column_count()
    }

    fn row_count(&self) -> usize {
        self.inner.row_count() + self.outer_row_count
    }

    fn fields(&self) -> Vec<TableField> {
        self.inner.fields()
    }

    fn field_at(&self, column: usize) -> Result<TableField> {
        self.inner.field_at(column)
    }

    fn find_column(&self, name: &ColumnName) -> Option<usize> {
        self.inner.find_column(name)
    }

    fn resolved_column(&self, column: usize) -> Result<ColumnName> {
        self.inner.resolved_column(column)
    }

    fn cell(&self, column: usize, row: RowId) -> Result<DataValue> {
        match self.source(column, row)? {
            Some((table, c, r)) => table.cell(c, r),
            None => Ok(DataValue::Null),
        }
    }

    fn compare_cell(&self, value: &DataValue, column: usize, row: RowId) -> Result<Ordering> {
        match self.source(column, row)? {
            Some((table, c, r)) => table.compare_cell(value, c, r),
            None if value.is_null() => Ok(Ordering::Equal),
            None => Ok(Ordering::Greater),
        }
    }

    fn row_enumeration(&self) -> RowEnumeration {
        RowEnumeration::dense(self.row_count())
    }

    fn index_for(
        &self,
        column: usize,
        original_column: usize,
        requester: &dyn RowTable,
    ) -> Result<Arc<SelectableScheme>> {
        self.inner.locate(column)?;
        let scheme = {
            let mut cache = self.column_scheme.lock();
            Arc::clone(cache[column].get_or_insert_with(|| Arc::new(SelectableScheme::scan(column))))
        };

        if requester.id() == self.id {
            Ok(scheme)
        } else {
            Ok(Arc::new(scheme.subset(self.id, requester, original_column)?))
        }
    }

    fn set_to_row_table_domain(&self, _column: usize, _rows: &mut [RowId], ancestor: TableId) -> Result<()> {
        if ancestor == self.id {
            Ok(())
        } else {
            Err(TableError::DomainRouting {
                ancestor,
                reached: self.id,
            })
        }
    }

    fn lock_root(&self, lock_key: u32) {
        self.root_locks.fetch_add(1, AtomicOrdering::SeqCst);
        self.inner.lock_root(lock_key);
    }

    fn unlock_root(&self, lock_key: u32) {
        let previous = self
            .root_locks
            .fetch_update(AtomicOrdering::SeqCst, AtomicOrdering::SeqCst, |n| Some(n.saturating_sub(1)))
            .unwrap_or(0);
        if previous == 0 {
            log::warn!("unlock_root on outer view {:?} without a matching lock", self.id);
            return;
        }
        self.inner.unlock_root(lock_key);
    }

    fn has_roots_locked(&self) -> bool {
        self.root_locks.load(AtomicOrdering::SeqCst) != 0
    }

    fn add_change_listener(&self, listener: Arc<dyn ChangeListener>) {
        self.inner.add_change_listener(listener)
    }

    fn remove_change_listener(&self, listener: &Arc<dyn ChangeListener>) {
        self.inner.remove_change_listener(listener)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::ColumnType;
    use crate::scheme::CompareOp;
    use crate::table::{BaseTable, Schema};
    use crate::view::FilterView;

    fn base(name: &str, values: &[i32]) -> Arc<dyn RowTable> {
        let schema = Schema::new(TableName::new(name), vec![TableField::new("id", ColumnType::Int32)]).unwrap();
        let table = BaseTable::new(schema);
        for v in values {
            table.insert_row(vec![DataValue::Int32(*v)]).unwrap();
        }
        Arc::new(table)
    }

    /// left [1,2,3] joined to right [2,3,4] on id, with left's unmatched row merged in.
    fn left_outer() -> (Arc<dyn RowTable>, Arc<dyn RowTable>, OuterView) {
        let left = base("l", &[1, 2, 3]);
        let right = base("r", &[2, 3, 4]);
        let join: Arc<dyn RowTable> = Arc::new(
            VirtualView::new(
                vec![Arc::clone(&left), Arc::clone(&right)],
                vec![vec![1, 2], vec![0, 1]],
            )
            .unwrap(),
        );
        let mut outer = OuterView::new(&join).unwrap();
        let unmatched: Arc<dyn RowTable> = Arc::new(VirtualView::from_rows(Arc::clone(&left), vec![0]));
        outer.merge_in(&unmatched).unwrap();
        (left, right, outer)
    }

    #[test]
    fn test_outer_rows_come_first() {
        let (_, _, outer) = left_outer();
        assert_eq!(outer.outer_row_count(), 1);
        assert_eq!(outer.row_count(), 3);

        assert_eq!(outer.cell(0, 0).unwrap(), DataValue::Int32(1));
        assert_eq!(outer.cell(1, 0).unwrap(), DataValue::Null);
        assert_eq!(outer.cell(0, 1).unwrap(), DataValue::Int32(2));
        assert_eq!(outer.cell(1, 2).unwrap(), DataValue::Int32(3));
        assert!(matches!(outer.cell(0, 3), Err(TableError::RowOutOfBounds { .. })));
    }

    #[test]
    fn test_null_slot_comparison() {
        let (_, _, outer) = left_outer();
        assert_eq!(outer.compare_cell(&DataValue::Null, 1, 0).unwrap(), Ordering::Equal);
        assert_eq!(outer.compare_cell(&DataValue::Int32(100), 1, 0).unwrap(), Ordering::Greater);
        assert_eq!(outer.compare_cell(&DataValue::Int32(2), 1, 1).unwrap(), Ordering::Equal);
    }

    #[test]
    fn test_no_matches_gives_all_null_outer_rows() {
        let left = base("l", &[1, 2, 3]);
        let right = base("r", &[7]);
        let join: Arc<dyn RowTable> = Arc::new(
            VirtualView::new(vec![Arc::clone(&left), Arc::clone(&right)], vec![vec![], vec![]]).unwrap(),
        );
        let mut outer = OuterView::new(&join).unwrap();
        let all_left: Arc<dyn RowTable> = Arc::new(VirtualView::from_rows(Arc::clone(&left), vec![0, 1, 2]));
        outer.merge_in(&all_left).unwrap();

        assert_eq!(outer.row_count(), 3);
        for row in 0..3 {
            assert_eq!(outer.cell(1, row).unwrap(), DataValue::Null);
        }
    }

    #[test]
    fn test_index_sees_outer_rows() {
        let (_, _, outer) = left_outer();
        let outer: Arc<dyn RowTable> = Arc::new(outer);
        assert_eq!(outer.select_all(1).unwrap(), vec![1, 2, 0]);
        assert_eq!(outer.select_rows(1, CompareOp::Eq, &DataValue::Null).unwrap(), vec![0]);
        assert_eq!(outer.select_rows(0, CompareOp::Lt, &DataValue::Int32(3)).unwrap(), vec![0, 1]);

        let top: Arc<dyn RowTable> = Arc::new(VirtualView::from_rows(Arc::clone(&outer), vec![2, 0]));
        assert_eq!(top.select_all(1).unwrap(), vec![0, 1]);
    }

    #[test]
    fn test_merge_in_replaces_previous_merge() {
        let (left, _, mut outer) = left_outer();
        let none: Arc<dyn RowTable> = Arc::new(VirtualView::from_rows(Arc::clone(&left), vec![]));
        outer.merge_in(&none).unwrap();
        assert_eq!(outer.outer_row_count(), 0);
        assert_eq!(outer.row_count(), 2);
        assert_eq!(outer.cell(0, 0).unwrap(), DataValue::Int32(2));
    }

    #[test]
    fn test_outside_through_filter_is_a_different_raw_table() {
        let left = base("l", &[1, 2, 3]);
        let right = base("r", &[2, 3, 4]);
        let join: Arc<dyn RowTable> = Arc::new(
            VirtualView::new(
                vec![Arc::clone(&left), Arc::clone(&right)],
                vec![vec![1, 2], vec![0, 1]],
            )
            .unwrap(),
        );
        let mut outer = OuterView::new(&join).unwrap();

        let renamed: Arc<dyn RowTable> = Arc::new(FilterView::new(Arc::clone(&left), TableName::new("l2")));
        let unmatched: Arc<dyn RowTable> = Arc::new(VirtualView::from_rows(renamed, vec![0]));
        outer.merge_in(&unmatched).unwrap();

        assert_eq!(outer.outer_row_count(), 1);
        assert_eq!(outer.cell(0, 0).unwrap(), DataValue::Null);
        assert_eq!(outer.cell(1, 0).unwrap(), DataValue::Null);
        assert_eq!(outer.cell(0, 1).unwrap(), DataValue::Int32(2));
    }

    #[test]
    fn test_lock_reaches_raw_tables() {
        let (left, right, outer) = left_outer();
        outer.lock_root(3);
        assert!(outer.has_roots_locked());
        assert!(left.has_roots_locked() && right.has_roots_locked());
        outer.unlock_root(3);
        assert!(!left.has_roots_locked());
        assert!(outer.type_equals(&outer));
    }
}
