/// Derived views that never copy row data.
///
/// - [`FilterView`] is a transparent wrapper that only renames its parent.
/// - [`VirtualView`] expresses its rows as index lists into one or more
///   reference tables. Joins and semi-joins produce virtual views.
use crate::changeset::ChangeListener;
use crate::column::{DataValue, TableField};
use crate::error::{Result, TableError};
use crate::name::{ColumnName, TableName};
use crate::rowtable::{RawSegment, RowEnumeration, RowId, RowTable, TableId};
use crate::scheme::SelectableScheme;
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::sync::Arc;

/// A pass-through view over exactly one parent.
///
/// Every operation forwards to the parent except [`RowTable::name`]. Index
/// and domain requests that name this filter are re-addressed to the parent,
/// so the filter never shows up as a row-domain boundary.
pub struct FilterView {
    id: TableId,
    name: TableName,
    parent: Arc<dyn RowTable>,
}

impl FilterView {
    pub fn new(parent: Arc<dyn RowTable>, name: TableName) -> Self {
        FilterView {
            id: TableId::next(),
            name,
            parent,
        }
    }

    pub fn parent(&self) -> &Arc<dyn RowTable> {
        &self.parent
    }
}

impl RowTable for FilterView {
    fn id(&self) -> TableId {
        self.id
    }

    fn name(&self) -> TableName {
        self.name.clone()
    }

    fn column_count(&self) -> usize {
        self.parent.column_count()
    }

    fn row_count(&self) -> usize {
        self.parent.row_count()
    }

    fn fields(&self) -> Vec<TableField> {
        self.parent.fields()
    }

    fn field_at(&self, column: usize) -> Result<TableField> {
        self.parent.field_at(column)
    }

    fn find_column(&self, name: &ColumnName) -> Option<usize> {
        self.parent.find_column(name)
    }

    fn resolved_column(&self, column: usize) -> Result<ColumnName> {
        self.parent.resolved_column(column)
    }

    fn cell(&self, column: usize, row: RowId) -> Result<DataValue> {
        self.parent.cell(column, row)
    }

    fn compare_cell(&self, value: &DataValue, column: usize, row: RowId) -> Result<Ordering> {
        self.parent.compare_cell(value, column, row)
    }

    fn row_enumeration(&self) -> RowEnumeration {
        self.parent.row_enumeration()
    }

    fn index_for(
        &self,
        column: usize,
        original_column: usize,
        requester: &dyn RowTable,
    ) -> Result<Arc<SelectableScheme>> {
        if requester.id() == self.id {
            self.parent.index_for(column, original_column, self.parent.as_ref())
        } else {
            self.parent.index_for(column, original_column, requester)
        }
    }

    fn set_to_row_table_domain(&self, column: usize, rows: &mut [RowId], ancestor: TableId) -> Result<()> {
        let ancestor = if ancestor == self.id { self.parent.id() } else { ancestor };
        self.parent.set_to_row_table_domain(column, rows, ancestor)
    }

    fn lock_root(&self, lock_key: u32) {
        self.parent.lock_root(lock_key)
    }

    fn unlock_root(&self, lock_key: u32) {
        self.parent.unlock_root(lock_key)
    }

    fn has_roots_locked(&self) -> bool {
        self.parent.has_roots_locked()
    }

    fn add_change_listener(&self, listener: Arc<dyn ChangeListener>) {
        self.parent.add_change_listener(listener)
    }

    fn remove_change_listener(&self, listener: &Arc<dyn ChangeListener>) {
        self.parent.remove_change_listener(listener)
    }
}

/// A table whose rows are index lists into reference tables.
///
/// Row `r` of the view is made of row `row_lists[k][r]` of every reference
/// table `k`. Columns are the reference tables' columns, concatenated.
pub struct VirtualView {
    id: TableId,
    name: TableName,
    tables: Vec<Arc<dyn RowTable>>,
    row_lists: Vec<Vec<RowId>>,
    row_count: usize,
    column_table: Vec<usize>,
    column_filter: Vec<usize>,
    column_scheme: Mutex<Vec<Option<Arc<SelectableScheme>>>>,
}

impl VirtualView {
    /// A view joining `tables` on the given per-table row lists.
    ///
    /// `row_lists` must hold one list per table, all of the same length.
    pub fn new(tables: Vec<Arc<dyn RowTable>>, row_lists: Vec<Vec<RowId>>) -> Result<Self> {
        if row_lists.len() != tables.len() {
            return Err(TableError::MergeRowCountMismatch {
                expected: tables.len(),
                actual: row_lists.len(),
            });
        }
        let row_count = row_lists.first().map_or(0, Vec::len);
        if let Some(bad) = row_lists.iter().find(|rows| rows.len() != row_count) {
            return Err(TableError::MergeRowCountMismatch {
                expected: row_count,
                actual: bad.len(),
            });
        }

        let mut column_table = Vec::new();
        let mut column_filter = Vec::new();
        for (t, table) in tables.iter().enumerate() {
            for c in 0..table.column_count() {
                column_table.push(t);
                column_filter.push(c);
            }
        }

        let name = match tables.as_slice() {
            [single] => single.name(),
            _ => TableName::new("#VIRTUAL"),
        };

        Ok(VirtualView {
            id: TableId::next(),
            name,
            column_scheme: Mutex::new(vec![None; column_table.len()]),
            tables,
            row_lists,
            row_count,
            column_table,
            column_filter,
        })
    }

    /// A view over the given rows of one table.
    pub fn from_rows(table: Arc<dyn RowTable>, rows: Vec<RowId>) -> Self {
        let row_count = rows.len();
        let columns = table.column_count();
        VirtualView {
            id: TableId::next(),
            name: table.name(),
            tables: vec![table],
            row_lists: vec![rows],
            row_count,
            column_table: vec![0; columns],
            column_filter: (0..columns).collect(),
            column_scheme: Mutex::new(vec![None; columns]),
        }
    }

    pub fn reference_tables(&self) -> &[Arc<dyn RowTable>] {
        &self.tables
    }

    /// Row list into reference table `table`.
    pub fn rows_of(&self, table: usize) -> Option<&[RowId]> {
        self.row_lists.get(table).map(Vec::as_slice)
    }

    pub(crate) fn locate(&self, column: usize) -> Result<(usize, usize)> {
        match (self.column_table.get(column), self.column_filter.get(column)) {
            (Some(&t), Some(&c)) => Ok((t, c)),
            _ => Err(TableError::ColumnOutOfBounds {
                column,
                column_count: self.column_table.len(),
            }),
        }
    }

    pub(crate) fn parent_row(&self, table: usize, row: RowId) -> Result<RowId> {
        self.row_lists[table]
            .get(row)
            .copied()
            .ok_or(TableError::RowOutOfBounds {
                row,
                row_count: self.row_count,
            })
    }
}

impl RowTable for VirtualView {
    fn id(&self) -> TableId {
        self.id
    }

    fn name(&self) -> TableName {
        self.name.clone()
    }

    fn column_count(&self) -> usize {
        self.column_table.len()
    }

    fn row_count(&self) -> usize {
        self.row_count
    }

    fn fields(&self) -> Vec<TableField> {
        self.tables.iter().flat_map(|t| t.fields()).collect()
    }

    fn field_at(&self, column: usize) -> Result<TableField> {
        let (t, c) = self.locate(column)?;
        self.tables[t].field_at(c)
    }

    fn find_column(&self, name: &ColumnName) -> Option<usize> {
        self.tables.iter().enumerate().find_map(|(t, table)| {
            let c = table.find_column(name)?;
            (0..self.column_table.len()).find(|&i| self.column_table[i] == t && self.column_filter[i] == c)
        })
    }

    fn resolved_column(&self, column: usize) -> Result<ColumnName> {
        let (t, c) = self.locate(column)?;
        self.tables[t].resolved_column(c)
    }

    fn cell(&self, column: usize, row: RowId) -> Result<DataValue> {
        let (t, c) = self.locate(column)?;
        self.tables[t].cell(c, self.parent_row(t, row)?)
    }

    fn compare_cell(&self, value: &DataValue, column: usize, row: RowId) -> Result<Ordering> {
        let (t, c) = self.locate(column)?;
        self.tables[t].compare_cell(value, c, self.parent_row(t, row)?)
    }

    fn row_enumeration(&self) -> RowEnumeration {
        RowEnumeration::dense(self.row_count)
    }

    fn index_for(
        &self,
        column: usize,
        original_column: usize,
        requester: &dyn RowTable,
    ) -> Result<Arc<SelectableScheme>> {
        let (t, c) = self.locate(column)?;
        let scheme = {
            let mut cache = self.column_scheme.lock();
            match &cache[column] {
                Some(scheme) => Arc::clone(scheme),
                None => {
                    let scheme = self.tables[t].index_for(c, column, self)?;
                    cache[column] = Some(Arc::clone(&scheme));
                    scheme
                }
            }
        };

        if requester.id() == self.id {
            Ok(scheme)
        } else {
            Ok(Arc::new(scheme.subset(self.id, requester, original_column)?))
        }
    }

    fn set_to_row_table_domain(&self, column: usize, rows: &mut [RowId], ancestor: TableId) -> Result<()> {
        if ancestor == self.id {
            return Ok(());
        }
        let (t, c) = self.locate(column)?;
        for row in rows.iter_mut() {
            *row = self.parent_row(t, *row)?;
        }
        let parent = &self.tables[t];
        if parent.id() == ancestor {
            Ok(())
        } else {
            parent.set_to_row_table_domain(c, rows, ancestor)
        }
    }

    fn raw_children(&self, rows: &[RowId]) -> Result<Option<Vec<RawSegment>>> {
        let mut children = Vec::with_capacity(self.tables.len());
        for (t, table) in self.tables.iter().enumerate() {
            let mapped = rows
                .iter()
                .map(|&r| self.parent_row(t, r))
                .collect::<Result<Vec<_>>>()?;
            children.push(RawSegment {
                table: Arc::clone(table),
                rows: mapped,
            });
        }
        Ok(Some(children))
    }

    fn lock_root(&self, lock_key: u32) {
        for table in &self.tables {
            table.lock_root(lock_key);
        }
    }

    fn unlock_root(&self, lock_key: u32) {
        for table in &self.tables {
            table.unlock_root(lock_key);
        }
    }

    fn has_roots_locked(&self) -> bool {
        self.tables.iter().any(|t| t.has_roots_locked())
    }

    fn add_change_listener(&self, listener: Arc<dyn ChangeListener>) {
        for table in &self.tables {
            table.add_change_listener(Arc::clone(&listener));
        }
    }

    fn remove_change_listener(&self, listener: &Arc<dyn ChangeListener>) {
        for table in &self.tables {
            table.remove_change_listener(listener);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::ColumnType;
    use crate::rowtable::flatten_to_raw;
    use crate::scheme::CompareOp;
    use crate::table::{BaseTable, Schema};

    fn base(name: &str, values: &[i32]) -> Arc<BaseTable> {
        let schema = Schema::new(
            TableName::new(name),
            vec![
                TableField::new("id", ColumnType::Int32),
                TableField::new("label", ColumnType::String),
            ],
        )
        .unwrap();
        let table = BaseTable::new(schema);
        for v in values {
            table
                .insert_row(vec![DataValue::Int32(*v), DataValue::String(format!("{}-{}", name, v))])
                .unwrap();
        }
        Arc::new(table)
    }

    #[test]
    fn test_filter_is_transparent() {
        let parent: Arc<dyn RowTable> = base("t", &[3, 1, 2]);
        let filter: Arc<dyn RowTable> = Arc::new(FilterView::new(Arc::clone(&parent), TableName::new("alias")));

        assert_eq!(filter.name(), TableName::new("alias"));
        assert_eq!(filter.row_count(), parent.row_count());
        assert_eq!(filter.fields(), parent.fields());
        assert_eq!(filter.cell(1, 2).unwrap(), parent.cell(1, 2).unwrap());
        assert_eq!(
            filter.compare_cell(&DataValue::Int32(2), 0, 0).unwrap(),
            parent.compare_cell(&DataValue::Int32(2), 0, 0).unwrap()
        );
        assert_eq!(filter.select_all(0).unwrap(), parent.select_all(0).unwrap());
        assert_eq!(
            filter.select_rows(0, CompareOp::Ge, &DataValue::Int32(2)).unwrap(),
            parent.select_rows(0, CompareOp::Ge, &DataValue::Int32(2)).unwrap()
        );
        assert_eq!(filter.find_column(&ColumnName::parse("t.id")), Some(0));
    }

    #[test]
    fn test_filter_shares_parent_lock_count() {
        let parent: Arc<dyn RowTable> = base("t", &[1]);
        let inner: Arc<dyn RowTable> = Arc::new(FilterView::new(Arc::clone(&parent), TableName::new("a")));
        let outer = FilterView::new(inner, TableName::new("b"));

        outer.lock_root(1);
        assert!(parent.has_roots_locked());
        outer.unlock_root(1);
        assert!(!parent.has_roots_locked());
    }

    #[test]
    fn test_filter_domain_routing() {
        let parent: Arc<dyn RowTable> = base("t", &[1, 2]);
        let filter = FilterView::new(Arc::clone(&parent), TableName::new("a"));
        let mut rows = vec![1, 0];
        filter.set_to_row_table_domain(0, &mut rows, filter.id()).unwrap();
        filter.set_to_row_table_domain(0, &mut rows, parent.id()).unwrap();
        assert_eq!(rows, vec![1, 0]);
        assert!(filter.set_to_row_table_domain(0, &mut rows, TableId::next()).is_err());
    }

    #[test]
    fn test_virtual_view_cells_and_index() {
        let parent: Arc<dyn RowTable> = base("t", &[5, 1, 4, 2]);
        let view: Arc<dyn RowTable> = Arc::new(VirtualView::from_rows(Arc::clone(&parent), vec![3, 0, 2]));

        assert_eq!(view.row_count(), 3);
        assert_eq!(view.cell(0, 0).unwrap(), DataValue::Int32(2));
        assert!(matches!(view.cell(0, 3), Err(TableError::RowOutOfBounds { .. })));

        // view rows ordered by id: 0 (2), 2 (4), 1 (5)
        assert_eq!(view.select_all(0).unwrap(), vec![0, 2, 1]);
        assert_eq!(view.select_rows(0, CompareOp::Eq, &DataValue::Int32(4)).unwrap(), vec![2]);
        assert_eq!(view.select_rows(0, CompareOp::Lt, &DataValue::Int32(3)).unwrap(), vec![0]);
    }

    #[test]
    fn test_stacked_views_resolve_to_base_index() {
        let parent: Arc<dyn RowTable> = base("t", &[5, 1, 4, 2]);
        let filter: Arc<dyn RowTable> = Arc::new(FilterView::new(Arc::clone(&parent), TableName::new("f")));
        let first: Arc<dyn RowTable> = Arc::new(VirtualView::from_rows(filter, vec![0, 2, 3]));
        let second: Arc<dyn RowTable> = Arc::new(VirtualView::from_rows(Arc::clone(&first), vec![2, 0]));

        assert_eq!(second.cell(0, 0).unwrap(), DataValue::Int32(2));
        assert_eq!(second.select_all(0).unwrap(), vec![0, 1]);

        let mut rows = vec![0, 1];
        second.set_to_row_table_domain(0, &mut rows, parent.id()).unwrap();
        assert_eq!(rows, vec![3, 0]);
    }

    #[test]
    fn test_join_view_flattens_to_raw_segments() {
        let left: Arc<dyn RowTable> = base("l", &[1, 2]);
        let right: Arc<dyn RowTable> = base("r", &[7, 8, 9]);
        let join = VirtualView::new(
            vec![Arc::clone(&left), Arc::clone(&right)],
            vec![vec![0, 0, 1], vec![2, 1, 0]],
        )
        .unwrap();

        assert_eq!(join.column_count(), 4);
        assert_eq!(join.cell(2, 1).unwrap(), DataValue::Int32(8));
        assert_eq!(join.find_column(&ColumnName::parse("r.label")), Some(3));

        let join: Arc<dyn RowTable> = Arc::new(join);
        let raw = flatten_to_raw(&join).unwrap();
        assert_eq!(raw.len(), 2);
        assert_eq!(raw.segments()[0].table.id(), left.id());
        assert_eq!(raw.segments()[1].rows, vec![2, 1, 0]);
        assert_eq!(raw.position_of(right.id()), Some(1));
    }

    #[test]
    fn test_virtual_view_rejects_ragged_rows() {
        let left: Arc<dyn RowTable> = base("l", &[1, 2]);
        let right: Arc<dyn RowTable> = base("r", &[1]);
        assert!(matches!(
            VirtualView::new(vec![left, right], vec![vec![0, 1], vec![0]]),
            Err(TableError::MergeRowCountMismatch { expected: 2, actual: 1 })
        ));
    }
}
