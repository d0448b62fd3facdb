/// Base tables: the leaf producers of rows.
///
/// A [`BaseTable`] owns its column descriptors (a [`Schema`]), the row
/// storage and one lazily-built [`SelectableScheme`] per column. Every view in
/// the crate eventually bottoms out in base tables.
///
/// # Row slots
///
/// Row ids are slot numbers. Removing a row frees its slot; a later insert
/// reuses a freed slot only while no root lock is held on the table, so ids
/// handed out to a locked view keep pointing at the same data.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use tablealgebra::{BaseTable, ColumnType, CompareOp, DataValue, RowTable, Schema, TableField, TableName};
///
/// let schema = Schema::new(
///     TableName::new("users"),
///     vec![
///         TableField::new("id", ColumnType::Int32).not_null(),
///         TableField::new("name", ColumnType::String),
///     ],
/// )
/// .unwrap();
///
/// let table = BaseTable::new(schema);
/// table.insert_row(vec![DataValue::Int32(1), DataValue::from("Alice")]).unwrap();
/// table.insert_row(vec![DataValue::Int32(2), DataValue::from("Bob")]).unwrap();
///
/// let table: Arc<dyn RowTable> = Arc::new(table);
/// assert_eq!(table.row_count(), 2);
/// assert_eq!(table.select_rows(0, CompareOp::Eq, &DataValue::Int32(2)).unwrap(), vec![1]);
/// ```
use crate::changeset::{same_listener, ChangeListener, TableChange};
use crate::column::{DataValue, TableField};
use crate::config::{IndexHint, SessionConfig};
use crate::error::{Result, TableError};
use crate::name::{ColumnName, TableName};
use crate::rowtable::{RowEnumeration, RowId, RowTable, TableId};
use crate::scheme::{CellSource, SelectableScheme};
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;

/// Column layout of a base table.
///
/// Fields are filled left to right up to a fixed capacity. A schema is
/// complete once it is handed to [`BaseTable::new`]; after that it never
/// changes.
#[derive(Debug, Clone)]
pub struct Schema {
    name: TableName,
    capacity: usize,
    fields: Vec<TableField>,
}

impl Schema {
    /// An empty schema with room for `capacity` fields.
    pub fn with_capacity(name: TableName, capacity: usize) -> Self {
        Schema {
            name,
            capacity,
            fields: Vec::with_capacity(capacity),
        }
    }

    /// A schema holding exactly `fields`.
    pub fn new(name: TableName, fields: Vec<TableField>) -> Result<Self> {
        let mut schema = Schema::with_capacity(name, fields.len());
        for field in fields {
            schema.add_field(field)?;
        }
        Ok(schema)
    }

    /// Appends a field. Fails on a repeated name or past capacity.
    pub fn add_field(&mut self, field: TableField) -> Result<()> {
        if self.fields.iter().any(|f| f.name() == field.name()) {
            return Err(TableError::DuplicateField {
                table: self.name.to_string(),
                field: field.name().to_string(),
            });
        }
        if self.fields.len() >= self.capacity {
            return Err(TableError::FieldOverrun {
                table: self.name.to_string(),
                capacity: self.capacity,
            });
        }
        self.fields.push(field);
        Ok(())
    }

    pub fn name(&self) -> &TableName {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &[TableField] {
        &self.fields
    }

    pub fn field(&self, index: usize) -> Option<&TableField> {
        self.fields.get(index)
    }

    /// Returns the index of a column by name, or None if not found.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name() == name)
    }
}

#[derive(Debug, Default)]
struct Cells {
    slots: Vec<Option<Vec<DataValue>>>,
    free: Vec<RowId>,
    live: usize,
}

impl Cells {
    fn row(&self, row: RowId) -> Result<&[DataValue]> {
        match self.slots.get(row) {
            Some(Some(values)) => Ok(values),
            _ => Err(TableError::RowOutOfBounds {
                row,
                row_count: self.slots.len(),
            }),
        }
    }

    fn live_rows(&self) -> RowEnumeration {
        if self.free.is_empty() {
            RowEnumeration::dense(self.slots.len())
        } else {
            let rows: Vec<RowId> = (0..self.slots.len()).filter(|&r| self.slots[r].is_some()).collect();
            RowEnumeration::Rows(rows.into_iter())
        }
    }
}

impl CellSource for Cells {
    fn source_cell(&self, column: usize, row: RowId) -> Result<DataValue> {
        let values = self.row(row)?;
        values.get(column).cloned().ok_or(TableError::ColumnOutOfBounds {
            column,
            column_count: values.len(),
        })
    }

    fn source_compare(&self, value: &DataValue, column: usize, row: RowId) -> Result<Ordering> {
        let values = self.row(row)?;
        match values.get(column) {
            Some(cell) => Ok(cell.compare(value)),
            None => Err(TableError::ColumnOutOfBounds {
                column,
                column_count: values.len(),
            }),
        }
    }

    fn source_rows(&self) -> Vec<RowId> {
        self.live_rows().collect()
    }
}

#[derive(Debug)]
struct Storage {
    cells: Cells,
    schemes: Vec<Option<Arc<SelectableScheme>>>,
}

impl Storage {
    fn index_row(&mut self, row: RowId) -> Result<()> {
        for scheme in self.schemes.iter_mut().flatten() {
            Arc::make_mut(scheme).insert(&self.cells, row)?;
        }
        Ok(())
    }

    fn unindex_row(&mut self, row: RowId) {
        for scheme in self.schemes.iter_mut().flatten() {
            Arc::make_mut(scheme).remove(row);
        }
    }
}

/// A stored table with per-column indexes.
pub struct BaseTable {
    id: TableId,
    schema: Schema,
    hint: IndexHint,
    storage: RwLock<Storage>,
    root_locks: AtomicUsize,
    listeners: RwLock<Vec<Arc<dyn ChangeListener>>>,
}

impl BaseTable {
    pub fn new(schema: Schema) -> Self {
        BaseTable::with_hint(schema, IndexHint::default())
    }

    /// Creates a table whose indexes follow `hint`.
    pub fn with_hint(schema: Schema, hint: IndexHint) -> Self {
        let columns = schema.len();
        BaseTable {
            id: TableId::next(),
            schema,
            hint,
            storage: RwLock::new(Storage {
                cells: Cells::default(),
                schemes: vec![None; columns],
            }),
            root_locks: AtomicUsize::new(0),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Creates a table whose indexes follow the session's index hint.
    pub fn with_config(schema: Schema, config: &SessionConfig) -> Self {
        BaseTable::with_hint(schema, config.index_hint)
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn index_hint(&self) -> IndexHint {
        self.hint
    }

    /// Stores a new row and pushes it into every built index.
    pub fn insert_row(&self, values: Vec<DataValue>) -> Result<RowId> {
        self.check_row(&values)?;
        let locked = self.has_roots_locked();

        let row = {
            let mut storage = self.storage.write();
            let cells = &mut storage.cells;
            let row = match cells.free.pop() {
                Some(slot) if !locked => {
                    cells.slots[slot] = Some(values);
                    slot
                }
                reclaimed => {
                    cells.free.extend(reclaimed);
                    cells.slots.push(Some(values));
                    cells.slots.len() - 1
                }
            };
            cells.live += 1;
            storage.index_row(row)?;
            row
        };

        self.notify(TableChange::RowAdded { table: self.id, row });
        Ok(row)
    }

    /// Inserts every row in order, returning their ids.
    pub fn insert_rows<I>(&self, rows: I) -> Result<Vec<RowId>>
    where
        I: IntoIterator<Item = Vec<DataValue>>,
    {
        rows.into_iter().map(|row| self.insert_row(row)).collect()
    }

    /// Removes a row, dropping it from every built index first.
    pub fn remove_row(&self, row: RowId) -> Result<Vec<DataValue>> {
        let values = {
            let mut storage = self.storage.write();
            storage.cells.row(row)?;
            storage.unindex_row(row);
            let cells = &mut storage.cells;
            let values = cells.slots[row].take().unwrap_or_default();
            cells.free.push(row);
            cells.live -= 1;
            values
        };

        self.notify(TableChange::RowRemoved { table: self.id, row });
        Ok(values)
    }

    /// Pushes an already stored row into every built index.
    ///
    /// [`BaseTable::insert_row`] does this itself, and a column cleared with
    /// [`BaseTable::clear_column_scheme`] rebuilds itself from every live row.
    /// Indexes that already hold `row` are left unchanged, so this is only
    /// needed to restore a row taken out with
    /// [`BaseTable::remove_row_from_indices`].
    pub fn add_row_to_indices(&self, row: RowId) -> Result<()> {
        let mut storage = self.storage.write();
        storage.cells.row(row)?;
        storage.index_row(row)
    }

    /// Drops a row from every built index without touching its storage.
    pub fn remove_row_from_indices(&self, row: RowId) -> Result<()> {
        let mut storage = self.storage.write();
        storage.cells.row(row)?;
        storage.unindex_row(row);
        Ok(())
    }

    /// Discards the cached index of `column`. The next request rebuilds it.
    pub fn clear_column_scheme(&self, column: usize) -> Result<()> {
        self.check_column(column)?;
        self.storage.write().schemes[column] = None;
        Ok(())
    }

    fn check_column(&self, column: usize) -> Result<()> {
        if column < self.schema.len() {
            Ok(())
        } else {
            Err(TableError::ColumnOutOfBounds {
                column,
                column_count: self.schema.len(),
            })
        }
    }

    fn check_row(&self, values: &[DataValue]) -> Result<()> {
        if values.len() != self.schema.len() {
            return Err(TableError::ShapeMismatch {
                table: self.schema.name().to_string(),
                reason: format!("expected {} values, got {}", self.schema.len(), values.len()),
            });
        }
        for (field, value) in self.schema.fields().iter().zip(values) {
            field.accepts(value).map_err(|reason| TableError::ShapeMismatch {
                table: self.schema.name().to_string(),
                reason,
            })?;
        }
        Ok(())
    }

    fn root_scheme(&self, column: usize) -> Result<Arc<SelectableScheme>> {
        self.check_column(column)?;
        if let Some(scheme) = &self.storage.read().schemes[column] {
            return Ok(Arc::clone(scheme));
        }

        let mut storage = self.storage.write();
        if let Some(scheme) = &storage.schemes[column] {
            return Ok(Arc::clone(scheme));
        }
        let quantifiable = self.schema.fields()[column].is_quantifiable();
        let scheme = if self.hint == IndexHint::Scan || !quantifiable {
            SelectableScheme::scan(column)
        } else {
            SelectableScheme::build_sorted(&storage.cells, column)?
        };
        log::debug!(
            "built {:?} scheme for {}.{} over {} rows",
            scheme.kind(),
            self.schema.name(),
            self.schema.fields()[column].name(),
            storage.cells.live
        );
        let scheme = Arc::new(scheme);
        storage.schemes[column] = Some(Arc::clone(&scheme));
        Ok(scheme)
    }

    fn notify(&self, change: TableChange) {
        let listeners = self.listeners.read().clone();
        for listener in listeners {
            listener.table_changed(&change);
        }
    }
}

impl RowTable for BaseTable {
    fn id(&self) -> TableId {
        self.id
    }

    fn name(&self) -> TableName {
        self.schema.name().clone()
    }

    fn column_count(&self) -> usize {
        self.schema.len()
    }

    fn row_count(&self) -> usize {
        self.storage.read().cells.live
    }

    fn fields(&self) -> Vec<TableField> {
        self.schema.fields().to_vec()
    }

    fn field_at(&self, column: usize) -> Result<TableField> {
        self.check_column(column)?;
        Ok(self.schema.fields()[column].clone())
    }

    fn find_column(&self, name: &ColumnName) -> Option<usize> {
        let table = name.table()?;
        if !self.schema.name().matches(table.schema(), Some(table.name()), false) {
            return None;
        }
        self.schema.column_index(name.name())
    }

    fn resolved_column(&self, column: usize) -> Result<ColumnName> {
        let field = self.field_at(column)?;
        Ok(ColumnName::qualified(self.schema.name().clone(), field.name()))
    }

    fn cell(&self, column: usize, row: RowId) -> Result<DataValue> {
        self.check_column(column)?;
        self.storage.read().cells.source_cell(column, row)
    }

    fn compare_cell(&self, value: &DataValue, column: usize, row: RowId) -> Result<Ordering> {
        self.check_column(column)?;
        self.storage.read().cells.source_compare(value, column, row)
    }

    fn row_enumeration(&self) -> RowEnumeration {
        self.storage.read().cells.live_rows()
    }

    fn index_for(
        &self,
        column: usize,
        original_column: usize,
        requester: &dyn RowTable,
    ) -> Result<Arc<SelectableScheme>> {
        let scheme = self.root_scheme(column)?;
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

    fn lock_root(&self, _lock_key: u32) {
        let count = self.root_locks.fetch_add(1, AtomicOrdering::SeqCst) + 1;
        log::trace!("root lock on {} -> {}", self.schema.name(), count);
    }

    fn unlock_root(&self, _lock_key: u32) {
        let previous = self
            .root_locks
            .fetch_update(AtomicOrdering::SeqCst, AtomicOrdering::SeqCst, |n| Some(n.saturating_sub(1)))
            .unwrap_or(0);
        if previous == 0 {
            log::warn!("unlock_root on {} without a matching lock", self.schema.name());
        } else {
            log::trace!("root unlock on {} -> {}", self.schema.name(), previous - 1);
        }
    }

    fn has_roots_locked(&self) -> bool {
        self.root_locks.load(AtomicOrdering::SeqCst) != 0
    }

    fn add_change_listener(&self, listener: Arc<dyn ChangeListener>) {
        self.listeners.write().push(listener);
    }

    fn remove_change_listener(&self, listener: &Arc<dyn ChangeListener>) {
        self.listeners.write().retain(|l| !same_listener(l, listener));
    }
}

impl std::fmt::Debug for BaseTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "BaseTable {{ name: '{}', columns: {}, rows: {} }}",
            self.schema.name(),
            self.schema.len(),
            self.row_count()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changeset::Changeset;
    use crate::column::ColumnType;
    use crate::scheme::{CompareOp, SchemeKind};

    fn people(hint: IndexHint) -> BaseTable {
        let schema = Schema::new(
            TableName::new("people"),
            vec![
                TableField::new("id", ColumnType::Int32).not_null(),
                TableField::new("city", ColumnType::String),
                TableField::new("note", ColumnType::String).unindexed(),
            ],
        )
        .unwrap();
        let table = BaseTable::with_hint(schema, hint);
        table
            .insert_rows(vec![
                vec![DataValue::Int32(1), DataValue::from("Oslo"), DataValue::from("a")],
                vec![DataValue::Int32(2), DataValue::from("Rome"), DataValue::Null],
                vec![DataValue::Int32(3), DataValue::from("Oslo"), DataValue::from("c")],
                vec![DataValue::Int32(4), DataValue::Null, DataValue::from("d")],
            ])
            .unwrap();
        table
    }

    #[test]
    fn test_schema_construction_errors() {
        let mut schema = Schema::with_capacity(TableName::new("t"), 2);
        schema.add_field(TableField::new("a", ColumnType::Int32)).unwrap();
        assert!(matches!(
            schema.add_field(TableField::new("a", ColumnType::String)),
            Err(TableError::DuplicateField { .. })
        ));
        schema.add_field(TableField::new("b", ColumnType::Int32)).unwrap();
        assert!(matches!(
            schema.add_field(TableField::new("c", ColumnType::Int32)),
            Err(TableError::FieldOverrun { capacity: 2, .. })
        ));
        assert_eq!(schema.column_index("b"), Some(1));
    }

    #[test]
    fn test_equality_probe_after_mutation() {
        let table = people(IndexHint::Sorted);
        let dyn_table: &dyn RowTable = &table;
        let oslo = DataValue::from("Oslo");

        assert_eq!(dyn_table.select_rows(1, CompareOp::Eq, &oslo).unwrap(), vec![0, 2]);

        table.remove_row(0).unwrap();
        let row = table
            .insert_row(vec![DataValue::Int32(5), oslo.clone(), DataValue::Null])
            .unwrap();
        assert_eq!(row, 0);
        assert_eq!(table.row_count(), 4);

        let mut found = dyn_table.select_rows(1, CompareOp::Eq, &oslo).unwrap();
        found.sort_unstable();
        assert_eq!(found, vec![0, 2]);
        assert_eq!(table.cell(0, 0).unwrap(), DataValue::Int32(5));
        assert_eq!(dyn_table.select_all(1).unwrap().last(), Some(&3));
    }

    #[test]
    fn test_scan_hint_and_unindexed_columns() {
        let table = people(IndexHint::Scan);
        assert_eq!(table.index_for(0, 0, &table).unwrap().kind(), SchemeKind::Scan);

        let sorted = people(IndexHint::Sorted);
        assert_eq!(sorted.index_for(0, 0, &sorted).unwrap().kind(), SchemeKind::Sorted);
        assert_eq!(sorted.index_for(2, 2, &sorted).unwrap().kind(), SchemeKind::Scan);

        let dyn_table: &dyn RowTable = &table;
        assert_eq!(
            dyn_table.select_rows(0, CompareOp::Gt, &DataValue::Int32(2)).unwrap(),
            vec![2, 3]
        );
    }

    #[test]
    fn test_session_config_picks_index_kind() {
        let config = SessionConfig::from_json(r#"{"index_hint": "scan"}"#).unwrap();
        let schema = people(IndexHint::Sorted).schema().clone();
        let table = BaseTable::with_config(schema.clone(), &config);
        assert_eq!(table.index_hint(), IndexHint::Scan);
        table
            .insert_row(vec![DataValue::Int32(1), DataValue::from("Oslo"), DataValue::Null])
            .unwrap();
        assert_eq!(table.index_for(1, 1, &table).unwrap().kind(), SchemeKind::Scan);

        let table = BaseTable::with_config(schema, &SessionConfig::default());
        assert_eq!(table.index_for(1, 1, &table).unwrap().kind(), SchemeKind::Sorted);
    }

    #[test]
    fn test_locked_table_does_not_reuse_slots() {
        let table = people(IndexHint::Sorted);
        table.remove_row(1).unwrap();

        table.lock_root(0);
        let row = table
            .insert_row(vec![DataValue::Int32(9), DataValue::Null, DataValue::Null])
            .unwrap();
        assert_eq!(row, 4);
        assert!(matches!(table.cell(0, 1), Err(TableError::RowOutOfBounds { .. })));
        table.unlock_root(0);
        assert!(!table.has_roots_locked());

        let row = table
            .insert_row(vec![DataValue::Int32(10), DataValue::Null, DataValue::Null])
            .unwrap();
        assert_eq!(row, 1);
        assert_eq!(table.row_enumeration().collect::<Vec<_>>(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_rejects_bad_rows() {
        let table = people(IndexHint::Sorted);
        assert!(matches!(
            table.insert_row(vec![DataValue::Int32(1)]),
            Err(TableError::ShapeMismatch { .. })
        ));
        assert!(matches!(
            table.insert_row(vec![DataValue::Null, DataValue::Null, DataValue::Null]),
            Err(TableError::ShapeMismatch { .. })
        ));
        assert!(matches!(table.remove_row(17), Err(TableError::RowOutOfBounds { .. })));
        assert!(matches!(table.cell(9, 0), Err(TableError::ColumnOutOfBounds { .. })));
    }

    #[test]
    fn test_clear_column_scheme_rebuilds() {
        let table = people(IndexHint::Sorted);
        let before = table.index_for(0, 0, &table).unwrap();
        table.clear_column_scheme(0).unwrap();
        let after = table.index_for(0, 0, &table).unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(after.len(), 4);

        table.remove_row_from_indices(3).unwrap();
        assert_eq!(table.index_for(0, 0, &table).unwrap().len(), 3);
        table.add_row_to_indices(3).unwrap();
        assert_eq!(table.index_for(0, 0, &table).unwrap().len(), 4);
    }

    #[test]
    fn test_add_row_to_indices_keeps_rows_unique() {
        let table = people(IndexHint::Sorted);
        let dyn_table: &dyn RowTable = &table;
        let oslo = DataValue::from("Oslo");
        assert_eq!(dyn_table.select_rows(1, CompareOp::Eq, &oslo).unwrap(), vec![0, 2]);

        table.clear_column_scheme(0).unwrap();
        for row in 0..4 {
            table.add_row_to_indices(row).unwrap();
        }

        assert_eq!(dyn_table.select_rows(1, CompareOp::Eq, &oslo).unwrap(), vec![0, 2]);
        assert_eq!(table.index_for(1, 1, &table).unwrap().len(), 4);
        assert_eq!(
            dyn_table.select_rows(0, CompareOp::Eq, &DataValue::Int32(3)).unwrap(),
            vec![2]
        );
        assert_eq!(table.index_for(0, 0, &table).unwrap().len(), 4);
    }

    #[test]
    fn test_root_locks_from_many_threads() {
        let table = Arc::new(people(IndexHint::Sorted));
        let handles: Vec<_> = (0..8)
            .map(|key| {
                let table = Arc::clone(&table);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        table.lock_root(key);
                        table.unlock_root(key);
                    }
                    table.lock_root(key);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(table.has_roots_locked());
        for key in 0..8 {
            table.unlock_root(key);
        }
        assert!(!table.has_roots_locked());
    }

    #[test]
    fn test_find_column_requires_own_name() {
        let table = people(IndexHint::Sorted);
        assert_eq!(table.find_column(&ColumnName::parse("people.city")), Some(1));
        assert_eq!(table.find_column(&ColumnName::parse("city")), None);
        assert_eq!(table.find_column(&ColumnName::parse("other.city")), None);
        assert_eq!(table.resolved_column(2).unwrap().to_string(), "people.note");
    }

    #[test]
    fn test_domain_routing_to_foreign_ancestor_fails() {
        let table = people(IndexHint::Sorted);
        let mut rows = vec![0, 1];
        table.set_to_row_table_domain(0, &mut rows, table.id()).unwrap();
        assert!(matches!(
            table.set_to_row_table_domain(0, &mut rows, TableId::next()),
            Err(TableError::DomainRouting { .. })
        ));
    }

    #[test]
    fn test_change_listeners() {
        let table = people(IndexHint::Sorted);
        let changes = Arc::new(Changeset::new());
        let listener: Arc<dyn ChangeListener> = changes.clone();
        table.add_change_listener(Arc::clone(&listener));

        table.remove_row(2).unwrap();
        assert_eq!(
            changes.changes(),
            vec![TableChange::RowRemoved { table: table.id(), row: 2 }]
        );

        table.remove_change_listener(&listener);
        table.remove_row(0).unwrap();
        assert_eq!(changes.len(), 1);
    }
}
