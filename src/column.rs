/// Column descriptors and cell values.
///
/// A [`TableField`] describes one column of a table: its name, its type and
/// whether rows may be selected through an index on it ("quantifiable").
/// [`DataValue`] is the value stored in (or synthesized for) a single cell.
///
/// # Ordering
///
/// Cell values have a total order used by every index in the crate. NULL
/// compares equal to NULL and greater than any non-NULL value, so NULLs sort
/// last in ascending order.
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Column data types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    Int32,
    Int64,
    Float32,
    Float64,
    String,
    Bool,
}

impl ColumnType {
    fn is_numeric(&self) -> bool {
        matches!(
            self,
            ColumnType::Int32 | ColumnType::Int64 | ColumnType::Float32 | ColumnType::Float64
        )
    }
}

/// A single cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DataValue {
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    String(String),
    Bool(bool),
    Null,
}

impl DataValue {
    pub fn is_null(&self) -> bool {
        matches!(self, DataValue::Null)
    }

    /// The column type this value belongs to, `None` for NULL.
    pub fn value_type(&self) -> Option<ColumnType> {
        match self {
            DataValue::Int32(_) => Some(ColumnType::Int32),
            DataValue::Int64(_) => Some(ColumnType::Int64),
            DataValue::Float32(_) => Some(ColumnType::Float32),
            DataValue::Float64(_) => Some(ColumnType::Float64),
            DataValue::String(_) => Some(ColumnType::String),
            DataValue::Bool(_) => Some(ColumnType::Bool),
            DataValue::Null => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            DataValue::Int32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            DataValue::Int32(v) => Some(*v as i64),
            DataValue::Int64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            DataValue::Int32(v) => Some(*v as f64),
            DataValue::Int64(v) => Some(*v as f64),
            DataValue::Float32(v) => Some(*v as f64),
            DataValue::Float64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            DataValue::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            DataValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Total order over cell values.
    ///
    /// Integers compare exactly, also against floats. `-0.0` equals `0.0`
    /// and NaN sorts by sign beyond every other number. Values of unrelated
    /// types (a string against a number, say) order by type so that the
    /// relation stays total.
    pub fn compare(&self, other: &DataValue) -> Ordering {
        use DataValue::*;
        match (self, other) {
            (Null, Null) => Ordering::Equal,
            (Null, _) => Ordering::Greater,
            (_, Null) => Ordering::Less,
            (String(a), String(b)) => a.cmp(b),
            (Bool(a), Bool(b)) => a.cmp(b),
            (Int32(_) | Int64(_), Int32(_) | Int64(_)) => {
                // as_i64 is always Some for the integer variants
                self.as_i64().cmp(&other.as_i64())
            }
            (Int32(_) | Int64(_), Float32(_) | Float64(_)) => match (self.as_i64(), other.as_f64()) {
                (Some(i), Some(f)) => compare_int_float(i, f),
                _ => Ordering::Equal,
            },
            (Float32(_) | Float64(_), Int32(_) | Int64(_)) => match (other.as_i64(), self.as_f64()) {
                (Some(i), Some(f)) => compare_int_float(i, f).reverse(),
                _ => Ordering::Equal,
            },
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or_else(|| x.total_cmp(&y)),
                _ => a.type_rank().cmp(&b.type_rank()),
            },
        }
    }

    fn type_rank(&self) -> u8 {
        match self.value_type() {
            Some(t) if t.is_numeric() => 0,
            Some(ColumnType::Bool) => 1,
            Some(_) => 2,
            None => 3,
        }
    }

    /// Converts the value for JSON rendering. Non-finite floats become NULL.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            DataValue::Int32(n) => serde_json::Value::Number((*n).into()),
            DataValue::Int64(n) => serde_json::Value::Number((*n).into()),
            DataValue::Float32(f) => serde_json::Number::from_f64(*f as f64)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            DataValue::Float64(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            DataValue::String(s) => serde_json::Value::String(s.clone()),
            DataValue::Bool(b) => serde_json::Value::Bool(*b),
            DataValue::Null => serde_json::Value::Null,
        }
    }
}

/// Orders `i` against `f` without rounding `i` through `f64`.
fn compare_int_float(i: i64, f: f64) -> Ordering {
    // 2^63, the first float above i64::MAX
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    if f.is_nan() {
        return if f.is_sign_negative() { Ordering::Greater } else { Ordering::Less };
    }
    if f >= LIMIT {
        return Ordering::Less;
    }
    if f < -LIMIT {
        return Ordering::Greater;
    }
    let whole = f.trunc();
    i.cmp(&(whole as i64)).then_with(|| {
        if f > whole {
            Ordering::Less
        } else if f < whole {
            Ordering::Greater
        } else {
            Ordering::Equal
        }
    })
}

impl fmt::Display for DataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataValue::Int32(v) => write!(f, "{}", v),
            DataValue::Int64(v) => write!(f, "{}", v),
            DataValue::Float32(v) => write!(f, "{}", v),
            DataValue::Float64(v) => write!(f, "{}", v),
            DataValue::String(v) => write!(f, "'{}'", v),
            DataValue::Bool(v) => write!(f, "{}", v),
            DataValue::Null => write!(f, "NULL"),
        }
    }
}

impl From<i32> for DataValue {
    fn from(v: i32) -> Self {
        DataValue::Int32(v)
    }
}

impl From<i64> for DataValue {
    fn from(v: i64) -> Self {
        DataValue::Int64(v)
    }
}

impl From<f64> for DataValue {
    fn from(v: f64) -> Self {
        DataValue::Float64(v)
    }
}

impl From<&str> for DataValue {
    fn from(v: &str) -> Self {
        DataValue::String(v.to_string())
    }
}

impl From<bool> for DataValue {
    fn from(v: bool) -> Self {
        DataValue::Bool(v)
    }
}

/// Describes a single column of a table.
///
/// The name carries no table qualification; qualified names are produced by
/// the owning table (see [`crate::RowTable::resolved_column`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableField {
    name: String,
    column_type: ColumnType,
    nullable: bool,
    quantifiable: bool,
}

impl TableField {
    /// A nullable, indexable column.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        TableField {
            name: name.into(),
            column_type,
            nullable: true,
            quantifiable: true,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Marks the column as not indexable. Selections on it fall back to a scan.
    pub fn unindexed(mut self) -> Self {
        self.quantifiable = false;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn column_type(&self) -> ColumnType {
        self.column_type
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn is_quantifiable(&self) -> bool {
        self.quantifiable
    }

    /// Checks that `value` may be stored in this column.
    pub(crate) fn accepts(&self, value: &DataValue) -> Result<(), String> {
        match value.value_type() {
            None if self.nullable => Ok(()),
            None => Err(format!("Column '{}' is not nullable", self.name)),
            Some(t) if t == self.column_type => Ok(()),
            Some(t) => Err(format!(
                "Type mismatch in column '{}': expected {:?}, got {:?}",
                self.name, self.column_type, t
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_sorts_last() {
        assert_eq!(DataValue::Null.compare(&DataValue::Null), Ordering::Equal);
        assert_eq!(DataValue::Null.compare(&DataValue::Int32(i32::MAX)), Ordering::Greater);
        assert_eq!(DataValue::from("z").compare(&DataValue::Null), Ordering::Less);
    }

    #[test]
    fn test_mixed_numeric_compare() {
        assert_eq!(DataValue::Int32(3).compare(&DataValue::Int64(3)), Ordering::Equal);
        assert_eq!(DataValue::Int32(2).compare(&DataValue::Float64(2.5)), Ordering::Less);
        assert_eq!(DataValue::Int64(i64::MAX).compare(&DataValue::Int64(i64::MAX - 1)), Ordering::Greater);
    }

    #[test]
    fn test_large_integers_against_floats() {
        let two_53 = 9_007_199_254_740_992i64;
        let float = DataValue::Float64(two_53 as f64);
        assert_eq!(DataValue::Int64(two_53 + 1).compare(&float), Ordering::Greater);
        assert_eq!(float.compare(&DataValue::Int64(two_53 + 1)), Ordering::Less);
        assert_eq!(DataValue::Int64(two_53).compare(&float), Ordering::Equal);

        assert_eq!(DataValue::Int64(i64::MAX).compare(&DataValue::Float64(9.3e18)), Ordering::Less);
        assert_eq!(DataValue::Int64(i64::MIN).compare(&DataValue::Float64(-1e19)), Ordering::Greater);
        assert_eq!(DataValue::Int32(-3).compare(&DataValue::Float64(-2.5)), Ordering::Less);
        assert_eq!(DataValue::Int32(0).compare(&DataValue::Float64(-0.0)), Ordering::Equal);
        assert_eq!(DataValue::Float64(-0.0).compare(&DataValue::Float32(0.0)), Ordering::Equal);
        assert_eq!(DataValue::Int64(i64::MAX).compare(&DataValue::Float64(f64::NAN)), Ordering::Less);
        assert_eq!(DataValue::Float64(f64::INFINITY).compare(&DataValue::Int64(i64::MAX)), Ordering::Greater);
    }

    #[test]
    fn test_unrelated_types_are_ordered() {
        let n = DataValue::Int32(1);
        let s = DataValue::from("a");
        assert_eq!(n.compare(&s), Ordering::Less);
        assert_eq!(s.compare(&n), Ordering::Greater);
    }

    #[test]
    fn test_field_accepts() {
        let f = TableField::new("id", ColumnType::Int32).not_null();
        assert!(f.accepts(&DataValue::Int32(1)).is_ok());
        assert!(f.accepts(&DataValue::Null).is_err());
        assert!(f.accepts(&DataValue::from("x")).is_err());
        assert!(TableField::new("id", ColumnType::Int32).accepts(&DataValue::Null).is_ok());
    }

    #[test]
    fn test_to_json() {
        assert_eq!(DataValue::Int32(7).to_json(), serde_json::json!(7));
        assert_eq!(DataValue::Float64(f64::NAN).to_json(), serde_json::Value::Null);
        assert_eq!(DataValue::Null.to_json(), serde_json::Value::Null);
    }
}
