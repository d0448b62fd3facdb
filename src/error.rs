/// Error types for the table algebra.
///
/// Every fallible operation in the crate returns [`Result`]. None of these
/// conditions are transient, so nothing is retried internally.
use crate::rowtable::{RowId, TableId};

#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("field with name '{field}' already exists in table '{table}'")]
    DuplicateField { table: String, field: String },

    #[error("add field overrun on table '{table}' (capacity {capacity})")]
    FieldOverrun { table: String, capacity: usize },

    #[error("unrecognised composite function: {0}")]
    UnsupportedComposite(String),

    #[error("table '{table}' has the wrong shape: {reason}")]
    ShapeMismatch { table: String, reason: String },

    #[error("wrong size for rows being merged in: expected {expected}, got {actual}")]
    MergeRowCountMismatch { expected: usize, actual: usize },

    #[error("row {row} out of bounds (row count {row_count})")]
    RowOutOfBounds { row: RowId, row_count: usize },

    #[error("column {column} out of range [0, {column_count})")]
    ColumnOutOfBounds { column: usize, column_count: usize },

    #[error("table field not found: {0}")]
    ColumnNotFound(String),

    #[error("ambiguous reference '{0}'")]
    AmbiguousReference(String),

    #[error("reference '{0}' not found")]
    ReferenceNotFound(String),

    #[error("multi-column '{0}' not supported")]
    MultiColumnNotSupported(&'static str),

    #[error("method routed to incorrect table ancestor: asked {ancestor:?}, reached {reached:?}")]
    DomainRouting { ancestor: TableId, reached: TableId },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T, E = TableError> = std::result::Result<T, E>;
