/// Semi-joins (`IN`) and anti-joins (`NOT IN`) over any two tables.
///
/// Results are row ids of the first table. Both operators probe the other
/// side's index for equality matches, so they run over views as cheaply as
/// over base tables.
use crate::error::{Result, TableError};
use crate::name::ColumnName;
use crate::rowtable::{RowId, RowTable};
use crate::scheme::CompareOp;
use crate::view::VirtualView;
use std::sync::Arc;

/// Rows of `a` whose `col_a` value equals the `col_b` value of some row of `b`.
///
/// The smaller table drives the iteration. The result holds no duplicates.
/// When `a` drives, it is in `a`'s enumeration order; otherwise it is sorted.
pub fn in_rows(a: &dyn RowTable, col_a: usize, b: &dyn RowTable, col_b: usize) -> Result<Vec<RowId>> {
    let a_drives = a.row_count() < b.row_count();
    let (small, small_col, large, large_col) = if a_drives {
        (a, col_a, b, col_b)
    } else {
        (b, col_b, a, col_a)
    };

    let mut result: Vec<RowId> = Vec::new();
    for small_row in small.row_enumeration() {
        let value = small.cell(small_col, small_row)?;
        let matched = large.select_rows(large_col, CompareOp::Eq, &value)?;
        if matched.is_empty() {
            continue;
        }
        if a_drives {
            result.push(small_row);
        } else {
            result.extend(matched);
        }
    }
    if !a_drives {
        result.sort_unstable();
        result.dedup();
    }
    Ok(result)
}

/// Rows of `a` whose `col_a` value matches no `col_b` value of `b`.
pub fn not_in_rows(a: &dyn RowTable, col_a: usize, b: &dyn RowTable, col_b: usize) -> Result<Vec<RowId>> {
    let mut b_rows = b.row_enumeration();
    match b.row_count() {
        0 => return a.select_all(col_a),
        1 => {
            if let Some(only) = b_rows.next() {
                let value = b.cell(col_b, only)?;
                return a.select_rows(col_a, CompareOp::Ne, &value);
            }
        }
        _ => {}
    }

    let mut result = Vec::new();
    for row in a.row_enumeration() {
        let value = a.cell(col_a, row)?;
        if b.select_rows(col_b, CompareOp::Eq, &value)?.is_empty() {
            result.push(row);
        }
    }
    Ok(result)
}

/// Column-list form of [`in_rows`]. Only single-column lists are supported.
pub fn in_columns(a: &dyn RowTable, cols_a: &[usize], b: &dyn RowTable, cols_b: &[usize]) -> Result<Vec<RowId>> {
    let (col_a, col_b) = single_pair(cols_a, cols_b, "in")?;
    in_rows(a, col_a, b, col_b)
}

/// Column-list form of [`not_in_rows`]. Only single-column lists are supported.
pub fn not_in_columns(a: &dyn RowTable, cols_a: &[usize], b: &dyn RowTable, cols_b: &[usize]) -> Result<Vec<RowId>> {
    let (col_a, col_b) = single_pair(cols_a, cols_b, "not in")?;
    not_in_rows(a, col_a, b, col_b)
}

/// `a IN b` on named columns, as a view over `a`.
pub fn in_view(a: &Arc<dyn RowTable>, b: &dyn RowTable, column_a: &ColumnName, column_b: &ColumnName) -> Result<VirtualView> {
    let (col_a, col_b) = find_pair(a.as_ref(), b, column_a, column_b, "in")?;
    let rows = in_rows(a.as_ref(), col_a, b, col_b)?;
    Ok(VirtualView::from_rows(Arc::clone(a), rows))
}

/// `a NOT IN b` on named columns, as a view over `a`.
pub fn not_in_view(
    a: &Arc<dyn RowTable>,
    b: &dyn RowTable,
    column_a: &ColumnName,
    column_b: &ColumnName,
) -> Result<VirtualView> {
    let (col_a, col_b) = find_pair(a.as_ref(), b, column_a, column_b, "not in")?;
    let rows = not_in_rows(a.as_ref(), col_a, b, col_b)?;
    Ok(VirtualView::from_rows(Arc::clone(a), rows))
}

fn single_pair(cols_a: &[usize], cols_b: &[usize], op: &'static str) -> Result<(usize, usize)> {
    match (cols_a, cols_b) {
        ([a], [b]) => Ok((*a, *b)),
        ([], _) | (_, []) => Err(TableError::ColumnNotFound(format!("empty column list in '{}'", op))),
        _ => Err(TableError::MultiColumnNotSupported(op)),
    }
}

fn find_pair(
    a: &dyn RowTable,
    b: &dyn RowTable,
    column_a: &ColumnName,
    column_b: &ColumnName,
    op: &str,
) -> Result<(usize, usize)> {
    match (a.find_column(column_a), b.find_column(column_b)) {
        (Some(col_a), Some(col_b)) => Ok((col_a, col_b)),
        _ => Err(TableError::ColumnNotFound(format!(
            "either '{}' or '{}' in '{}'",
            column_a, column_b, op
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::{ColumnType, DataValue, TableField};
    use crate::name::TableName;
    use crate::table::{BaseTable, Schema};

    fn base(name: &str, values: &[Option<i32>]) -> Arc<dyn RowTable> {
        let schema = Schema::new(TableName::new(name), vec![TableField::new("id", ColumnType::Int32)]).unwrap();
        let table = BaseTable::new(schema);
        for v in values {
            let value = v.map_or(DataValue::Null, DataValue::Int32);
            table.insert_row(vec![value]).unwrap();
        }
        Arc::new(table)
    }

    fn ints(values: &[i32]) -> Vec<Option<i32>> {
        values.iter().copied().map(Some).collect()
    }

    fn sorted(mut rows: Vec<RowId>) -> Vec<RowId> {
        rows.sort_unstable();
        rows
    }

    #[test]
    fn test_in_and_not_in_basic() {
        let t1 = base("t1", &ints(&[1, 2, 3]));
        let t2 = base("t2", &ints(&[2, 3, 4]));
        assert_eq!(sorted(in_rows(t1.as_ref(), 0, t2.as_ref(), 0).unwrap()), vec![1, 2]);
        assert_eq!(sorted(not_in_rows(t1.as_ref(), 0, t2.as_ref(), 0).unwrap()), vec![0]);
    }

    #[test]
    fn test_in_when_larger_side_is_a_has_no_duplicates() {
        let a = base("a", &ints(&[7, 1, 7, 3, 7, 1]));
        let b = base("b", &ints(&[7, 7, 1]));
        let rows = in_rows(a.as_ref(), 0, b.as_ref(), 0).unwrap();
        assert_eq!(rows, vec![0, 1, 2, 4, 5]);
    }

    #[test]
    fn test_in_with_many_repeated_matches() {
        let values: Vec<i32> = (0..500).map(|i| i % 5).collect();
        let a = base("a", &ints(&values));
        let b = base("b", &ints(&[1, 0]));
        let rows = in_rows(a.as_ref(), 0, b.as_ref(), 0).unwrap();
        let expected: Vec<RowId> = (0..500).filter(|i| i % 5 < 2).collect();
        assert_eq!(rows, expected);
    }

    #[test]
    fn test_in_when_a_drives() {
        let a = base("a", &ints(&[4, 9]));
        let b = base("b", &ints(&[1, 4, 4, 5]));
        assert_eq!(in_rows(a.as_ref(), 0, b.as_ref(), 0).unwrap(), vec![0]);
    }

    #[test]
    fn test_complement_law() {
        let a = base("a", &[Some(1), None, Some(3), Some(5), Some(3), None]);
        for b_values in [vec![], vec![Some(3)], vec![None], vec![Some(3), Some(5), Some(8)], vec![None, Some(1)]] {
            let b = base("b", &b_values);
            let hits = sorted(in_rows(a.as_ref(), 0, b.as_ref(), 0).unwrap());
            let misses = sorted(not_in_rows(a.as_ref(), 0, b.as_ref(), 0).unwrap());
            let mut all = hits.clone();
            all.extend(&misses);
            assert_eq!(sorted(all), (0..6).collect::<Vec<_>>(), "b = {:?}", b_values);
            assert!(hits.iter().all(|r| !misses.contains(r)));
        }
    }

    #[test]
    fn test_not_in_special_cases() {
        let a = base("a", &ints(&[3, 1, 2]));
        let empty = base("e", &[]);
        assert_eq!(not_in_rows(a.as_ref(), 0, empty.as_ref(), 0).unwrap(), vec![1, 2, 0]);

        let single = BaseTable::new(Schema::new(TableName::new("s"), vec![TableField::new("id", ColumnType::Int32)]).unwrap());
        single.insert_row(vec![DataValue::Int32(9)]).unwrap();
        single.insert_row(vec![DataValue::Int32(2)]).unwrap();
        single.remove_row(0).unwrap();
        assert_eq!(sorted(not_in_rows(a.as_ref(), 0, &single, 0).unwrap()), vec![0, 1]);
    }

    #[test]
    fn test_multi_column_rejected() {
        let a = base("a", &ints(&[1]));
        let b = base("b", &ints(&[1]));
        assert!(matches!(
            in_columns(a.as_ref(), &[0, 0], b.as_ref(), &[0, 0]),
            Err(TableError::MultiColumnNotSupported("in"))
        ));
        assert!(matches!(
            not_in_columns(a.as_ref(), &[0, 0], b.as_ref(), &[0, 0]),
            Err(TableError::MultiColumnNotSupported("not in"))
        ));
        assert_eq!(in_columns(a.as_ref(), &[0], b.as_ref(), &[0]).unwrap(), vec![0]);
    }

    #[test]
    fn test_named_views() {
        let t1 = base("t1", &ints(&[1, 2, 3]));
        let t2 = base("t2", &ints(&[2, 3, 4]));
        let view = in_view(&t1, t2.as_ref(), &ColumnName::parse("t1.id"), &ColumnName::parse("t2.id")).unwrap();
        assert_eq!(view.row_count(), 2);
        assert_eq!(view.cell(0, 0).unwrap(), DataValue::Int32(2));

        let view = not_in_view(&t1, t2.as_ref(), &ColumnName::parse("t1.id"), &ColumnName::parse("t2.id")).unwrap();
        assert_eq!(view.row_count(), 1);
        assert_eq!(view.cell(0, 0).unwrap(), DataValue::Int32(1));

        assert!(matches!(
            in_view(&t1, t2.as_ref(), &ColumnName::parse("t1.nope"), &ColumnName::parse("t2.id")),
            Err(TableError::ColumnNotFound(_))
        ));
    }
}
