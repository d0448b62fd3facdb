/// Name resolution for table expressions.
///
/// A [`FromSet`] is one query block's scope: the table sources in its FROM
/// clause, the computed-column aliases of its select list and the columns it
/// exposes. Scopes chain to their enclosing block through `parent`, which is
/// how a sub-query sees the columns of the query around it.
///
/// A reference that only resolves in an enclosing scope becomes a
/// [`CorrelatedVariable`] tagged with how many scopes out it was found.
use crate::column::DataValue;
use crate::config::SessionConfig;
use crate::error::{Result, TableError};
use crate::expression::{CorrelatedVariable, Expression, VariableResolver};
use crate::name::{names_equal, ColumnName, TableName};
use crate::rowtable::{RowId, RowTable};
use std::sync::Arc;

/// A table source in a FROM clause.
pub trait FromTableSource: Send + Sync {
    /// Name unique within the scope, used to tell sources apart.
    fn unique_name(&self) -> &str;

    /// True if this source answers to the (possibly partial) table reference.
    fn matches_reference(&self, schema: Option<&str>, table: Option<&str>, case_insensitive: bool) -> bool;

    /// Number of columns the reference could mean.
    fn resolve_column_count(
        &self,
        schema: Option<&str>,
        table: Option<&str>,
        column: &str,
        case_insensitive: bool,
    ) -> usize;

    /// The fully qualified column the reference means, if any.
    fn resolve_column(
        &self,
        schema: Option<&str>,
        table: Option<&str>,
        column: &str,
        case_insensitive: bool,
    ) -> Option<ColumnName>;

    /// Every column, qualified with the name the source is exposed under.
    fn all_columns(&self) -> Vec<ColumnName>;
}

/// A FROM clause entry backed directly by a table.
pub struct FromTableDirect {
    unique_name: String,
    table: Arc<dyn RowTable>,
    exposed: TableName,
}

impl FromTableDirect {
    /// `alias` replaces the table's own name when given (`FROM t AS x`).
    pub fn new(unique_name: impl Into<String>, table: Arc<dyn RowTable>, alias: Option<TableName>) -> Self {
        let exposed = alias.unwrap_or_else(|| table.name());
        FromTableDirect {
            unique_name: unique_name.into(),
            table,
            exposed,
        }
    }

    pub fn table(&self) -> &Arc<dyn RowTable> {
        &self.table
    }

    pub fn exposed_name(&self) -> &TableName {
        &self.exposed
    }

    /// A resolver reading this source's columns from `row`.
    pub fn bind(&self, row: RowId) -> RowBinding<'_> {
        RowBinding { source: self, row }
    }

    fn matching_columns<'a>(&'a self, column: &'a str, case_insensitive: bool) -> impl Iterator<Item = String> + 'a {
        self.table
            .fields()
            .into_iter()
            .map(|f| f.name().to_string())
            .filter(move |name| names_equal(name, column, case_insensitive))
    }
}

impl FromTableSource for FromTableDirect {
    fn unique_name(&self) -> &str {
        &self.unique_name
    }

    fn matches_reference(&self, schema: Option<&str>, table: Option<&str>, case_insensitive: bool) -> bool {
        self.exposed.matches(schema, table, case_insensitive)
    }

    fn resolve_column_count(
        &self,
        schema: Option<&str>,
        table: Option<&str>,
        column: &str,
        case_insensitive: bool,
    ) -> usize {
        if !self.matches_reference(schema, table, case_insensitive) {
            return 0;
        }
        self.matching_columns(column, case_insensitive).count()
    }

    fn resolve_column(
        &self,
        schema: Option<&str>,
        table: Option<&str>,
        column: &str,
        case_insensitive: bool,
    ) -> Option<ColumnName> {
        if !self.matches_reference(schema, table, case_insensitive) {
            return None;
        }
        let name = self.matching_columns(column, case_insensitive).next()?;
        Some(ColumnName::qualified(self.exposed.clone(), name))
    }

    fn all_columns(&self) -> Vec<ColumnName> {
        self.table
            .fields()
            .iter()
            .map(|f| ColumnName::qualified(self.exposed.clone(), f.name()))
            .collect()
    }
}

/// One row of a [`FromTableDirect`], seen through its exposed name.
pub struct RowBinding<'a> {
    source: &'a FromTableDirect,
    row: RowId,
}

impl VariableResolver for RowBinding<'_> {
    fn resolve(&self, variable: &ColumnName) -> Result<DataValue> {
        let table_ok = variable
            .table()
            .map_or(true, |t| self.source.exposed.matches(t.schema(), Some(t.name()), false));
        let column = if table_ok {
            self.source.table.fields().iter().position(|f| f.name() == variable.name())
        } else {
            None
        };
        match column {
            Some(column) => self.source.table.cell(column, self.row),
            None => Err(TableError::ReferenceNotFound(variable.to_string())),
        }
    }
}

/// Outcome of qualifying a reference.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    /// Found in the scope itself
    Variable(ColumnName),
    /// Found in an enclosing scope
    Correlated(CorrelatedVariable),
}

impl Resolved {
    pub fn into_expression(self) -> Expression {
        match self {
            Resolved::Variable(v) => Expression::Variable(v),
            Resolved::Correlated(cv) => Expression::Correlated(cv),
        }
    }
}

/// The name-resolution scope of one query block.
#[derive(Default)]
pub struct FromSet {
    tables: Vec<Arc<dyn FromTableSource>>,
    aliases: Vec<(String, Expression)>,
    exposed: Vec<ColumnName>,
    case_insensitive: bool,
    parent: Option<Arc<FromSet>>,
}

impl FromSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: &SessionConfig) -> Self {
        FromSet {
            case_insensitive: config.case_insensitive,
            ..Self::default()
        }
    }

    pub fn set_parent(&mut self, parent: Arc<FromSet>) {
        self.parent = Some(parent);
    }

    pub fn parent(&self) -> Option<&Arc<FromSet>> {
        self.parent.as_ref()
    }

    pub fn set_case_insensitive(&mut self, status: bool) {
        self.case_insensitive = status;
    }

    pub fn add_table(&mut self, source: Arc<dyn FromTableSource>) {
        self.tables.push(source);
    }

    /// Registers a computed column of the select list under `name`.
    pub fn add_alias(&mut self, name: impl Into<String>, expression: Expression) {
        self.aliases.push((name.into(), expression));
    }

    pub fn expose_variable(&mut self, variable: ColumnName) {
        self.exposed.push(variable);
    }

    pub fn expose_all_columns_from_source(&mut self, source: &dyn FromTableSource) {
        self.exposed.extend(source.all_columns());
    }

    pub fn expose_all_columns(&mut self) {
        let columns: Vec<ColumnName> = self.tables.iter().flat_map(|t| t.all_columns()).collect();
        self.exposed.extend(columns);
    }

    /// Exposes every column of the source called `name` (`SELECT t.*`).
    pub fn expose_all_columns_from_table(&mut self, name: &TableName) -> Result<()> {
        let source = self
            .find_table(name.schema(), name.name())
            .cloned()
            .ok_or_else(|| TableError::ReferenceNotFound(name.to_string()))?;
        self.expose_all_columns_from_source(source.as_ref());
        Ok(())
    }

    /// The exposed columns, in exposure order.
    pub fn generate_resolved_variable_list(&self) -> Vec<ColumnName> {
        self.exposed.clone()
    }

    pub fn find_table(&self, schema: Option<&str>, name: &str) -> Option<&Arc<dyn FromTableSource>> {
        self.tables
            .iter()
            .find(|t| t.matches_reference(schema, Some(name), self.case_insensitive))
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    pub fn table(&self, index: usize) -> Option<&Arc<dyn FromTableSource>> {
        self.tables.get(index)
    }

    /// The expression behind an unqualified alias reference.
    pub fn dereference_assignment(&self, variable: &ColumnName) -> Result<Option<&Expression>> {
        Ok(self.find_alias(variable)?.map(|(_, expression)| expression))
    }

    fn find_alias(&self, variable: &ColumnName) -> Result<Option<&(String, Expression)>> {
        if variable.is_qualified() {
            return Ok(None);
        }
        let mut found = None;
        for alias in &self.aliases {
            if names_equal(&alias.0, variable.name(), self.case_insensitive) {
                if found.is_some() {
                    return Err(TableError::AmbiguousReference(variable.to_string()));
                }
                found = Some(alias);
            }
        }
        Ok(found)
    }

    /// Resolves a reference against this scope only.
    ///
    /// Returns `Ok(None)` when nothing matches and `AmbiguousReference` when
    /// more than one alias or column does.
    pub fn resolve_reference(&self, variable: &ColumnName) -> Result<Option<ColumnName>> {
        let mut matches = Vec::new();
        if let Some((name, _)) = self.find_alias(variable)? {
            matches.push(ColumnName::unqualified(name.as_str()));
        }

        let (schema, table) = match variable.table() {
            Some(t) => (t.schema(), Some(t.name())),
            None => (None, None),
        };
        for source in &self.tables {
            match source.resolve_column_count(schema, table, variable.name(), self.case_insensitive) {
                0 => {}
                1 => matches.extend(source.resolve_column(schema, table, variable.name(), self.case_insensitive)),
                _ => return Err(TableError::AmbiguousReference(variable.to_string())),
            }
        }

        match matches.len() {
            0 => Ok(None),
            1 => Ok(matches.pop()),
            _ => Err(TableError::AmbiguousReference(variable.to_string())),
        }
    }

    /// Resolves a reference in this scope or the nearest enclosing scope that
    /// knows it. `level` is the depth of this scope; each step out adds one.
    pub fn global_resolve_reference(&self, level: usize, variable: &ColumnName) -> Result<Option<CorrelatedVariable>> {
        let mut scope = self;
        let mut level = level;
        loop {
            if let Some(found) = scope.resolve_reference(variable)? {
                return Ok(Some(CorrelatedVariable::new(found, level)));
            }
            match &scope.parent {
                Some(parent) => {
                    scope = parent.as_ref();
                    level += 1;
                }
                None => return Ok(None),
            }
        }
    }

    /// Qualifies a reference, falling back to the enclosing scopes.
    pub fn qualify_variable(&self, variable: &ColumnName) -> Result<Resolved> {
        if let Some(found) = self.resolve_reference(variable)? {
            return Ok(Resolved::Variable(found));
        }
        let correlated = match &self.parent {
            Some(parent) => parent.global_resolve_reference(1, variable)?,
            None => None,
        };
        correlated
            .map(Resolved::Correlated)
            .ok_or_else(|| TableError::ReferenceNotFound(variable.to_string()))
    }

    /// Qualifies every column reference in `expression`.
    pub fn qualify_expression(&self, expression: &Expression) -> Result<Expression> {
        expression.prepare(&mut |v| Ok(self.qualify_variable(v)?.into_expression()))
    }
}
