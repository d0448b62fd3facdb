/// Table and column names.
///
/// A [`ColumnName`] may be unqualified (`id`), table-qualified (`t.id`) or
/// schema-qualified (`app.t.id`). Tables answer `find_column` only for names
/// qualified with their own table name.
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableName {
    schema: Option<String>,
    name: String,
}

impl TableName {
    pub fn new(name: impl Into<String>) -> Self {
        TableName {
            schema: None,
            name: name.into(),
        }
    }

    pub fn with_schema(schema: impl Into<String>, name: impl Into<String>) -> Self {
        TableName {
            schema: Some(schema.into()),
            name: name.into(),
        }
    }

    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// True if `self` satisfies a possibly partial reference. A missing
    /// schema or table part in the reference matches anything.
    pub fn matches(&self, schema: Option<&str>, name: Option<&str>, case_insensitive: bool) -> bool {
        let part = |mine: Option<&str>, theirs: Option<&str>| match (mine, theirs) {
            (_, None) => true,
            (None, Some(_)) => false,
            (Some(a), Some(b)) => names_equal(a, b, case_insensitive),
        };
        part(Some(&self.name), name) && part(self.schema.as_deref(), schema)
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// A possibly qualified reference to a column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnName {
    table: Option<TableName>,
    name: String,
}

impl ColumnName {
    pub fn unqualified(name: impl Into<String>) -> Self {
        ColumnName {
            table: None,
            name: name.into(),
        }
    }

    pub fn qualified(table: TableName, name: impl Into<String>) -> Self {
        ColumnName {
            table: Some(table),
            name: name.into(),
        }
    }

    /// Parses `col`, `table.col` or `schema.table.col`.
    pub fn parse(reference: &str) -> Self {
        let parts: Vec<&str> = reference.split('.').collect();
        match parts.as_slice() {
            [col] => ColumnName::unqualified(*col),
            [table, col] => ColumnName::qualified(TableName::new(*table), *col),
            [schema, table, col] => ColumnName::qualified(TableName::with_schema(*schema, *table), *col),
            _ => ColumnName::unqualified(reference),
        }
    }

    pub fn table(&self) -> Option<&TableName> {
        self.table.as_ref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_qualified(&self) -> bool {
        self.table.is_some()
    }
}

impl fmt::Display for ColumnName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.table {
            Some(table) => write!(f, "{}.{}", table, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

pub(crate) fn names_equal(a: &str, b: &str, case_insensitive: bool) -> bool {
    if case_insensitive {
        a.eq_ignore_ascii_case(b)
    } else {
        a == b
    }
}
