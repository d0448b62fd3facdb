/// TableAlgebra - composable relational table views
///
/// The table-algebra core of a relational engine: base tables with lazily
/// built per-column indexes, views stacked on top of them that never copy row
/// data (filters, virtual/join views, outer-join views, composites), the
/// semi-join and set-operator algorithms, and name resolution for nested
/// query scopes. Every node speaks the same [`RowTable`] contract, so index
/// lookups made at the top of a stack are answered by the base table at the
/// bottom and projected back up.

pub mod changeset;
pub mod column;
pub mod composite;
pub mod config;
pub mod error;
pub mod expression;
pub mod name;
pub mod outer;
pub mod rowtable;
pub mod scheme;
pub mod scope;
pub mod semijoin;
pub mod table;
pub mod view;

pub use changeset::{ChangeListener, Changeset, TableChange};
pub use column::{ColumnType, DataValue, TableField};
pub use composite::{CompositeOp, CompositeView};
pub use config::{IndexHint, SessionConfig};
pub use error::{Result, TableError};
pub use expression::{CorrelatedVariable, Expression, VariableResolver};
pub use name::{ColumnName, TableName};
pub use outer::OuterView;
pub use rowtable::{flatten_to_raw, RawSegment, RawTableInfo, RowEnumeration, RowId, RowTable, TableId};
pub use scheme::{CompareOp, SchemeKind, SelectableScheme};
pub use scope::{FromSet, FromTableDirect, FromTableSource, Resolved, RowBinding};
pub use semijoin::{in_columns, in_rows, in_view, not_in_columns, not_in_rows, not_in_view};
pub use table::{BaseTable, Schema};
pub use view::{FilterView, VirtualView};
