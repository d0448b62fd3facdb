/// The row-addressable table contract.
///
/// Every node of a query plan implements [`RowTable`]: base tables at the
/// leaves, and filters, virtual views, outer views and composites stacked on
/// top of them. Consumers only ever see this trait, never the concrete view
/// types.
///
/// # Row domains
///
/// Row ids are only meaningful relative to the table that produced them.
/// Two calls move ids between tables:
///
/// - [`RowTable::set_to_row_table_domain`] rewrites a list of this table's
///   row ids into the domain of an ancestor table, following the provenance
///   of one column.
/// - [`RowTable::index_for`] hands out a [`SelectableScheme`] expressed in the
///   domain of a *requesting* table, projecting the real index held further
///   down the stack.
///
/// Identity is always passed explicitly (`requester`, `ancestor`) so that a
/// transparent layer can substitute its parent at the boundary.
use crate::changeset::ChangeListener;
use crate::column::{DataValue, TableField};
use crate::error::Result;
use crate::name::{ColumnName, TableName};
use crate::scheme::{CompareOp, SelectableScheme};
use std::cmp::Ordering;
use std::ops::{Bound, Range};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

/// Row identity inside one table.
pub type RowId = usize;

/// Identity of a table instance, unique for the life of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableId(u64);

impl TableId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        TableId(NEXT.fetch_add(1, AtomicOrdering::Relaxed))
    }
}

/// Row ids of a table, in table order.
///
/// Derived views number their rows densely; base tables yield the ids of
/// their live slots, which may have gaps after removals.
#[derive(Debug, Clone)]
pub enum RowEnumeration {
    Range(Range<RowId>),
    Rows(std::vec::IntoIter<RowId>),
}

impl RowEnumeration {
    pub fn dense(row_count: usize) -> Self {
        RowEnumeration::Range(0..row_count)
    }
}

impl Iterator for RowEnumeration {
    type Item = RowId;

    fn next(&mut self) -> Option<RowId> {
        match self {
            RowEnumeration::Range(r) => r.next(),
            RowEnumeration::Rows(r) => r.next(),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self {
            RowEnumeration::Range(r) => r.size_hint(),
            RowEnumeration::Rows(r) => r.size_hint(),
        }
    }
}

impl ExactSizeIterator for RowEnumeration {}

/// One `(table, rows)` pair of a flattened view.
#[derive(Clone)]
pub struct RawSegment {
    pub table: Arc<dyn RowTable>,
    pub rows: Vec<RowId>,
}

impl std::fmt::Debug for RawSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawSegment")
            .field("table", &self.table.id())
            .field("rows", &self.rows)
            .finish()
    }
}

/// A view flattened to its raw tables.
///
/// All segments have the same length: logical row `i` of the flattened view
/// is made of row `segments[k].rows[i]` of every `segments[k].table`.
#[derive(Debug, Clone, Default)]
pub struct RawTableInfo {
    segments: Vec<RawSegment>,
}

impl RawTableInfo {
    pub fn segments(&self) -> &[RawSegment] {
        &self.segments
    }

    pub fn into_segments(self) -> Vec<RawSegment> {
        self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Index of the segment whose table is `id`.
    pub fn position_of(&self, id: TableId) -> Option<usize> {
        self.segments.iter().position(|s| s.table.id() == id)
    }
}

/// Flattens `table` into its raw `(table, rows)` segments.
///
/// Uses an explicit work list, so arbitrarily deep view stacks do not grow
/// the call stack. Segments come out depth-first, left to right.
pub fn flatten_to_raw(table: &Arc<dyn RowTable>) -> Result<RawTableInfo> {
    let mut work = vec![RawSegment {
        table: Arc::clone(table),
        rows: table.row_enumeration().collect(),
    }];
    let mut segments = Vec::new();

    while let Some(segment) = work.pop() {
        match segment.table.raw_children(&segment.rows)? {
            None => segments.push(segment),
            Some(children) => work.extend(children.into_iter().rev()),
        }
    }

    log::debug!("flattened table {:?} into {} raw segments", table.id(), segments.len());
    Ok(RawTableInfo { segments })
}

/// The capability interface every table variant implements.
pub trait RowTable: Send + Sync {
    fn id(&self) -> TableId;

    /// The name this table answers to when qualifying column references.
    fn name(&self) -> TableName;

    fn column_count(&self) -> usize;

    fn row_count(&self) -> usize;

    fn fields(&self) -> Vec<TableField>;

    fn field_at(&self, column: usize) -> Result<TableField>;

    /// Column index of a qualified column reference, `None` if the reference
    /// does not name a column of this table.
    fn find_column(&self, name: &ColumnName) -> Option<usize>;

    /// Fully qualified name of `column`.
    fn resolved_column(&self, column: usize) -> Result<ColumnName>;

    fn cell(&self, column: usize, row: RowId) -> Result<DataValue>;

    /// Compares `value` against the cell, returning the ordering of the
    /// *cell* relative to `value` (Greater means the cell sorts after it).
    fn compare_cell(&self, value: &DataValue, column: usize, row: RowId) -> Result<Ordering>;

    fn row_enumeration(&self) -> RowEnumeration;

    /// Returns a selectable scheme for `column`, expressed in the row domain
    /// of `requester`. When `requester` is not this table, `original_column`
    /// is the requester's column the scheme will be asked about.
    fn index_for(
        &self,
        column: usize,
        original_column: usize,
        requester: &dyn RowTable,
    ) -> Result<Arc<SelectableScheme>>;

    /// Rewrites `rows` (ids of this table) into the domain of `ancestor`,
    /// following the provenance of `column`.
    fn set_to_row_table_domain(&self, column: usize, rows: &mut [RowId], ancestor: TableId) -> Result<()>;

    /// Children of this table for flattening, with `rows` (ids of this table)
    /// mapped into each child's domain. Raw tables return `None`.
    fn raw_children(&self, _rows: &[RowId]) -> Result<Option<Vec<RawSegment>>> {
        Ok(None)
    }

    /// Prevents the rows underneath this table from being reused until a
    /// matching [`RowTable::unlock_root`].
    fn lock_root(&self, lock_key: u32);

    fn unlock_root(&self, lock_key: u32);

    fn has_roots_locked(&self) -> bool;

    fn add_change_listener(&self, listener: Arc<dyn ChangeListener>);

    fn remove_change_listener(&self, listener: &Arc<dyn ChangeListener>);
}

/// Selection and rendering helpers available on every table.
impl<'a> dyn RowTable + 'a {
    /// Rows whose cell in `column` satisfies `cell <op> value`, in index order.
    pub fn select_rows(&self, column: usize, op: CompareOp, value: &DataValue) -> Result<Vec<RowId>> {
        let scheme = self.index_for(column, column, self)?;
        scheme.select(self, op, value)
    }

    /// Every row, ordered by the value of `column` (NULLs last).
    pub fn select_all(&self, column: usize) -> Result<Vec<RowId>> {
        let scheme = self.index_for(column, column, self)?;
        scheme.select_all(self)
    }

    /// Rows whose cell in `column` lies within the bounds, in index order.
    pub fn select_range(
        &self,
        column: usize,
        low: Bound<&DataValue>,
        high: Bound<&DataValue>,
    ) -> Result<Vec<RowId>> {
        let scheme = self.index_for(column, column, self)?;
        scheme.select_range(self, low, high)
    }

    /// All cells of one row, in column order.
    pub fn row_values(&self, row: RowId) -> Result<Vec<DataValue>> {
        (0..self.column_count()).map(|c| self.cell(c, row)).collect()
    }

    /// Renders the table as a JSON array of objects keyed by column name.
    pub fn to_json(&self) -> Result<String> {
        let fields = self.fields();
        let mut rows = Vec::with_capacity(self.row_count());
        for row in self.row_enumeration() {
            let mut obj = serde_json::Map::new();
            for (column, field) in fields.iter().enumerate() {
                obj.insert(field.name().to_string(), self.cell(column, row)?.to_json());
            }
            rows.push(serde_json::Value::Object(obj));
        }
        Ok(serde_json::to_string_pretty(&rows)?)
    }
}
