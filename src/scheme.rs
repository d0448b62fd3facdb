/// Selectable schemes: the per-column indexes behind every selection.
///
/// A scheme answers ordered and equality selections over one column of one
/// table. There are two layouts:
///
/// - **Sorted**: a list of row ids kept in column order, maintained on every
///   insert and remove. Probes are binary searches.
/// - **Scan**: no stored structure. Every probe reads the whole column.
///
/// A scheme never owns cell data; comparisons go back to a [`CellSource`]
/// (normally the table the scheme describes). Projecting a scheme onto the
/// row domain of a derived view ([`SelectableScheme::subset`]) produces a
/// new scheme and leaves the original untouched.
use crate::column::DataValue;
use crate::error::{Result, TableError};
use crate::rowtable::{RowId, RowTable, TableId};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::ops::Bound;

/// Comparison operators for selections
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq, // ==
    Ne, // !=
    Lt, // <
    Le, // <=
    Gt, // >
    Ge, // >=
}

/// Kind of selectable scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemeKind {
    Sorted,
    Scan,
}

/// Read access to the cells a scheme orders.
pub trait CellSource {
    fn source_cell(&self, column: usize, row: RowId) -> Result<DataValue>;

    /// Ordering of the cell relative to `value`.
    fn source_compare(&self, value: &DataValue, column: usize, row: RowId) -> Result<Ordering>;

    fn source_rows(&self) -> Vec<RowId>;
}

impl<T: RowTable + ?Sized> CellSource for T {
    fn source_cell(&self, column: usize, row: RowId) -> Result<DataValue> {
        self.cell(column, row)
    }

    fn source_compare(&self, value: &DataValue, column: usize, row: RowId) -> Result<Ordering> {
        self.compare_cell(value, column, row)
    }

    fn source_rows(&self) -> Vec<RowId> {
        self.row_enumeration().collect()
    }
}

#[derive(Debug, Clone)]
enum Layout {
    Sorted(Vec<RowId>),
    Scan,
}

/// An index over one column of one table.
#[derive(Debug, Clone)]
pub struct SelectableScheme {
    column: usize,
    layout: Layout,
}

impl SelectableScheme {
    /// An empty sorted scheme.
    pub fn sorted(column: usize) -> Self {
        SelectableScheme {
            column,
            layout: Layout::Sorted(Vec::new()),
        }
    }

    /// A scan-based ("blind") scheme.
    pub fn scan(column: usize) -> Self {
        SelectableScheme {
            column,
            layout: Layout::Scan,
        }
    }

    /// Builds a sorted scheme over every row of `source`.
    pub fn build_sorted<S: CellSource + ?Sized>(source: &S, column: usize) -> Result<Self> {
        Ok(SelectableScheme {
            column,
            layout: Layout::Sorted(sorted_rows(source, column)?),
        })
    }

    pub fn column(&self) -> usize {
        self.column
    }

    pub fn kind(&self) -> SchemeKind {
        match self.layout {
            Layout::Sorted(_) => SchemeKind::Sorted,
            Layout::Scan => SchemeKind::Scan,
        }
    }

    /// Number of rows held by a sorted scheme. Scan schemes hold none.
    pub fn len(&self) -> usize {
        match &self.layout {
            Layout::Sorted(order) => order.len(),
            Layout::Scan => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Adds `row` to the ordering. Ties keep row-id order. A row already
    /// held is left where it is.
    pub fn insert<S: CellSource + ?Sized>(&mut self, source: &S, row: RowId) -> Result<()> {
        let column = self.column;
        if let Layout::Sorted(order) = &mut self.layout {
            let value = source.source_cell(column, row)?;
            let mut lo = 0;
            let mut hi = order.len();
            while lo < hi {
                let mid = lo + (hi - lo) / 2;
                let ord = source
                    .source_compare(&value, column, order[mid])?
                    .then(order[mid].cmp(&row));
                if ord == Ordering::Less {
                    lo = mid + 1;
                } else {
                    hi = mid;
                }
            }
            if order.get(lo) != Some(&row) {
                order.insert(lo, row);
            }
        }
        Ok(())
    }

    /// Drops `row` from the ordering.
    pub fn remove(&mut self, row: RowId) {
        if let Layout::Sorted(order) = &mut self.layout {
            if let Some(pos) = order.iter().position(|&r| r == row) {
                order.remove(pos);
            }
        }
    }

    /// Rows whose cell satisfies `cell <op> value`, in column order.
    ///
    /// Range operators (`<`, `<=`, `>`, `>=`) never select NULL cells unless
    /// the probe is itself NULL. `=` and `!=` follow the total order, so a
    /// NULL probe equals NULL cells.
    pub fn select<S: CellSource + ?Sized>(&self, source: &S, op: CompareOp, value: &DataValue) -> Result<Vec<RowId>> {
        self.with_order(source, |order| {
            let lo = lower_bound(source, self.column, order, value)?;
            let hi = upper_bound(source, self.column, order, value)?;
            let nulls = if value.is_null() {
                order.len()
            } else {
                lower_bound(source, self.column, order, &DataValue::Null)?
            };
            Ok(match op {
                CompareOp::Eq => order[lo..hi].to_vec(),
                CompareOp::Ne => order[..lo].iter().chain(&order[hi..]).copied().collect(),
                CompareOp::Lt => order[..lo].to_vec(),
                CompareOp::Le => order[..hi].to_vec(),
                CompareOp::Gt => order[hi..nulls.max(hi)].to_vec(),
                CompareOp::Ge => order[lo..nulls.max(lo)].to_vec(),
            })
        })
    }

    /// Every row, in column order.
    pub fn select_all<S: CellSource + ?Sized>(&self, source: &S) -> Result<Vec<RowId>> {
        self.with_order(source, |order| Ok(order.to_vec()))
    }

    /// Rows between two bounds, in column order. An unbounded upper end
    /// stops before the NULL cells.
    pub fn select_range<S: CellSource + ?Sized>(
        &self,
        source: &S,
        low: Bound<&DataValue>,
        high: Bound<&DataValue>,
    ) -> Result<Vec<RowId>> {
        self.with_order(source, |order| {
            let start = match low {
                Bound::Included(v) => lower_bound(source, self.column, order, v)?,
                Bound::Excluded(v) => upper_bound(source, self.column, order, v)?,
                Bound::Unbounded => 0,
            };
            let end = match high {
                Bound::Included(v) => upper_bound(source, self.column, order, v)?,
                Bound::Excluded(v) => lower_bound(source, self.column, order, v)?,
                Bound::Unbounded => lower_bound(source, self.column, order, &DataValue::Null)?,
            };
            Ok(if start < end { order[start..end].to_vec() } else { Vec::new() })
        })
    }

    /// Projects this scheme onto the row domain of `target`.
    ///
    /// `owner` is the table this scheme describes and must be an ancestor of
    /// `target` along `target_column`. The result orders `target`'s rows the
    /// same way this scheme orders their counterparts in `owner`.
    pub fn subset(&self, owner: TableId, target: &dyn RowTable, target_column: usize) -> Result<SelectableScheme> {
        let order = match &self.layout {
            Layout::Scan => return Ok(SelectableScheme::scan(target_column)),
            Layout::Sorted(order) => order,
        };

        let rows: Vec<RowId> = target.row_enumeration().collect();
        let mut mapped = rows.clone();
        target.set_to_row_table_domain(target_column, &mut mapped, owner)?;

        let rank: HashMap<RowId, usize> = order.iter().enumerate().map(|(i, &r)| (r, i)).collect();
        let mut ranked = Vec::with_capacity(rows.len());
        for (&row, parent_row) in rows.iter().zip(mapped) {
            let position = rank.get(&parent_row).copied().ok_or(TableError::RowOutOfBounds {
                row: parent_row,
                row_count: order.len(),
            })?;
            ranked.push((position, row));
        }
        ranked.sort_unstable();

        Ok(SelectableScheme {
            column: target_column,
            layout: Layout::Sorted(ranked.into_iter().map(|(_, row)| row).collect()),
        })
    }

    fn with_order<S, F>(&self, source: &S, f: F) -> Result<Vec<RowId>>
    where
        S: CellSource + ?Sized,
        F: FnOnce(&[RowId]) -> Result<Vec<RowId>>,
    {
        match &self.layout {
            Layout::Sorted(order) => f(order),
            Layout::Scan => f(&sorted_rows(source, self.column)?),
        }
    }
}

fn sorted_rows<S: CellSource + ?Sized>(source: &S, column: usize) -> Result<Vec<RowId>> {
    let mut keyed = Vec::new();
    for row in source.source_rows() {
        keyed.push((source.source_cell(column, row)?, row));
    }
    keyed.sort_by(|(a, ra), (b, rb)| a.compare(b).then(ra.cmp(rb)));
    Ok(keyed.into_iter().map(|(_, row)| row).collect())
}

/// First position whose cell is not less than `value`.
fn lower_bound<S: CellSource + ?Sized>(source: &S, column: usize, order: &[RowId], value: &DataValue) -> Result<usize> {
    partition(source, column, order, value, |ord| ord == Ordering::Less)
}

/// First position whose cell is greater than `value`.
fn upper_bound<S: CellSource + ?Sized>(source: &S, column: usize, order: &[RowId], value: &DataValue) -> Result<usize> {
    partition(source, column, order, value, |ord| ord != Ordering::Greater)
}

fn partition<S, P>(source: &S, column: usize, order: &[RowId], value: &DataValue, before: P) -> Result<usize>
where
    S: CellSource + ?Sized,
    P: Fn(Ordering) -> bool,
{
    let mut lo = 0;
    let mut hi = order.len();
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if before(source.source_compare(value, column, order[mid])?) {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    Ok(lo)
}
