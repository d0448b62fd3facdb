/// Composite views: UNION, INTERSECT and EXCEPT over same-shaped tables.
///
/// A [`CompositeView`] concatenates row lists drawn from several operand
/// tables. The master table supplies the column layout; every operand must
/// match it column for column. Logical row `r` is found by walking the
/// operand row lists in order, subtracting each list's length.
use crate::changeset::ChangeListener;
use crate::column::{DataValue, TableField};
use crate::error::{Result, TableError};
use crate::name::{ColumnName, TableName};
use crate::rowtable::{RowEnumeration, RowId, RowTable, TableId};
use crate::scheme::SelectableScheme;
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;

/// Set operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositeOp {
    /// Every row of every operand
    Union,
    /// Rows of the first operand present in all other operands
    Intersect,
    /// Rows of the first operand present in no other operand
    Except,
}

impl CompositeOp {
    /// Parse a composite operator from its SQL keyword.
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "UNION" => Ok(CompositeOp::Union),
            "INTERSECT" => Ok(CompositeOp::Intersect),
            "EXCEPT" | "MINUS" => Ok(CompositeOp::Except),
            _ => Err(TableError::UnsupportedComposite(s.to_string())),
        }
    }
}

impl fmt::Display for CompositeOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompositeOp::Union => write!(f, "UNION"),
            CompositeOp::Intersect => write!(f, "INTERSECT"),
            CompositeOp::Except => write!(f, "EXCEPT"),
        }
    }
}

pub struct CompositeView {
    id: TableId,
    master: Arc<dyn RowTable>,
    tables: Vec<Arc<dyn RowTable>>,
    table_indexes: Vec<Vec<RowId>>,
    column_scheme: Mutex<Vec<Option<Arc<SelectableScheme>>>>,
    root_locks: AtomicUsize,
}

impl CompositeView {
    /// A composite over `tables` shaped like `master`. It has no rows until
    /// [`CompositeView::setup_composite`] is called.
    pub fn new(master: Arc<dyn RowTable>, tables: Vec<Arc<dyn RowTable>>) -> Result<Self> {
        let master_fields = master.fields();
        for table in &tables {
            let fields = table.fields();
            if fields.len() != master_fields.len() {
                return Err(TableError::ShapeMismatch {
                    table: table.name().to_string(),
                    reason: format!("expected {} columns, got {}", master_fields.len(), fields.len()),
                });
            }
            if let Some((mine, theirs)) = master_fields
                .iter()
                .zip(&fields)
                .find(|(a, b)| a.column_type() != b.column_type())
            {
                return Err(TableError::ShapeMismatch {
                    table: table.name().to_string(),
                    reason: format!(
                        "column '{}' is {:?}, expected {:?}",
                        theirs.name(),
                        theirs.column_type(),
                        mine.column_type()
                    ),
                });
            }
        }

        let columns = master_fields.len();
        Ok(CompositeView {
            id: TableId::next(),
            table_indexes: vec![Vec::new(); tables.len()],
            master,
            tables,
            column_scheme: Mutex::new(vec![None; columns]),
            root_locks: AtomicUsize::new(0),
        })
    }

    /// A composite whose master is the first of `tables`.
    pub fn from_tables(tables: Vec<Arc<dyn RowTable>>) -> Result<Self> {
        let master = tables.first().cloned().ok_or_else(|| TableError::ShapeMismatch {
            table: String::new(),
            reason: "a composite needs at least one operand".to_string(),
        })?;
        CompositeView::new(master, tables)
    }

    /// Fills the row lists for `op`. With `keep_all == false` duplicate rows
    /// are removed; the first occurrence (by operand, then by position) wins
    /// and survivors keep their original order.
    pub fn setup_composite(&mut self, op: CompositeOp, keep_all: bool) -> Result<()> {
        let mut indexes: Vec<Vec<RowId>> = self.tables.iter().map(|t| t.row_enumeration().collect()).collect();

        if op != CompositeOp::Union {
            if let Some((first, others)) = indexes.split_first_mut() {
                let lookups = self.tables[1..]
                    .iter()
                    .map(|t| sorted_rows(t.as_ref()))
                    .collect::<Result<Vec<_>>>()?;
                let master = &self.tables[0];
                let mut kept = Vec::with_capacity(first.len());
                for &row in first.iter() {
                    let values = master.row_values(row)?;
                    let hits = lookups.iter().filter(|l| contains_row(l, &values)).count();
                    let keep = match op {
                        CompositeOp::Intersect => hits == lookups.len(),
                        _ => hits == 0,
                    };
                    if keep {
                        kept.push(row);
                    }
                }
                *first = kept;
                others.iter_mut().for_each(Vec::clear);
            }
        }

        if !keep_all {
            self.remove_duplicates(&mut indexes)?;
        }

        log::debug!(
            "composite {} (all = {}) over {} operands -> {} rows",
            op,
            keep_all,
            self.tables.len(),
            indexes.iter().map(Vec::len).sum::<usize>()
        );
        self.table_indexes = indexes;
        self.column_scheme.lock().iter_mut().for_each(|s| *s = None);
        Ok(())
    }

    fn remove_duplicates(&self, indexes: &mut [Vec<RowId>]) -> Result<()> {
        let mut keyed = Vec::new();
        for (segment, rows) in indexes.iter().enumerate() {
            for (position, &row) in rows.iter().enumerate() {
                keyed.push((self.tables[segment].row_values(row)?, segment, position));
            }
        }
        keyed.sort_by(|(a, sa, pa), (b, sb, pb)| compare_rows(a, b).then(sa.cmp(sb)).then(pa.cmp(pb)));

        let mut survivors: Vec<(usize, usize)> = Vec::with_capacity(keyed.len());
        let mut previous: Option<&Vec<DataValue>> = None;
        for (values, segment, position) in &keyed {
            if previous.map_or(true, |p| compare_rows(p, values) != Ordering::Equal) {
                survivors.push((*segment, *position));
            }
            previous = Some(values);
        }
        survivors.sort_unstable();

        let mut deduped = vec![Vec::new(); indexes.len()];
        for (segment, position) in survivors {
            deduped[segment].push(indexes[segment][position]);
        }
        indexes.iter_mut().zip(deduped).for_each(|(old, new)| *old = new);
        Ok(())
    }

    /// Same root shape only if `other` is this very composite.
    pub fn type_equals(&self, other: &dyn RowTable) -> bool {
        self.id == other.id()
    }

    fn locate(&self, row: RowId) -> Result<(usize, RowId)> {
        let mut remaining = row;
        for (segment, rows) in self.table_indexes.iter().enumerate() {
            if remaining < rows.len() {
                return Ok((segment, rows[remaining]));
            }
            remaining -= rows.len();
        }
        Err(TableError::RowOutOfBounds {
            row,
            row_count: self.row_count(),
        })
    }
}

fn compare_rows(a: &[DataValue], b: &[DataValue]) -> Ordering {
    a.iter()
        .zip(b)
        .map(|(x, y)| x.compare(y))
        .find(|o| *o != Ordering::Equal)
        .unwrap_or_else(|| a.len().cmp(&b.len()))
}

fn sorted_rows(table: &dyn RowTable) -> Result<Vec<Vec<DataValue>>> {
    let mut rows = table
        .row_enumeration()
        .map(|r| table.row_values(r))
        .collect::<Result<Vec<_>>>()?;
    rows.sort_by(|a, b| compare_rows(a, b));
    Ok(rows)
}

fn contains_row(sorted: &[Vec<DataValue>], values: &[DataValue]) -> bool {
    sorted.binary_search_by(|probe| compare_rows(probe, values)).is_ok()
}

impl RowTable for CompositeView {
    fn id(&self) -> TableId {
        self.id
    }

    fn name(&self) -> TableName {
        self.master.name()
    }

    fn column_count(&self) -> usize {
        self.master.column_count()
    }

    fn row_count(&self) -> usize {
        self.table_indexes.iter().map(Vec::len).sum()
    }

    fn fields(&self) -> Vec<TableField> {
        self.master.fields()
    }

    fn field_at(&self, column: usize) -> Result<TableField> {
        self.master.field_at(column)
    }

    fn find_column(&self, name: &ColumnName) -> Option<usize> {
        self.master.find_column(name)
    }

    fn resolved_column(&self, column: usize) -> Result<ColumnName> {
        self.master.resolved_column(column)
    }

    fn cell(&self, column: usize, row: RowId) -> Result<DataValue> {
        let (segment, row) = self.locate(row)?;
        self.tables[segment].cell(column, row)
    }

    fn compare_cell(&self, value: &DataValue, column: usize, row: RowId) -> Result<Ordering> {
        let (segment, row) = self.locate(row)?;
        self.tables[segment].compare_cell(value, column, row)
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
        let scheme = {
            let mut cache = self.column_scheme.lock();
            let slot = cache.get_mut(column).ok_or(TableError::ColumnOutOfBounds {
                column,
                column_count: self.master.column_count(),
            })?;
            Arc::clone(slot.get_or_insert_with(|| Arc::new(SelectableScheme::scan(column))))
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
        for table in &self.tables {
            table.lock_root(lock_key);
        }
    }

    fn unlock_root(&self, lock_key: u32) {
        let previous = self
            .root_locks
            .fetch_update(AtomicOrdering::SeqCst, AtomicOrdering::SeqCst, |n| Some(n.saturating_sub(1)))
            .unwrap_or(0);
        if previous == 0 {
            log::warn!("unlock_root on composite {:?} without a matching lock", self.id);
            return;
        }
        for table in &self.tables {
            table.unlock_root(lock_key);
        }
    }

    fn has_roots_locked(&self) -> bool {
        self.root_locks.load(AtomicOrdering::SeqCst) != 0
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
